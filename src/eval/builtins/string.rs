use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use regex::Regex;

use super::{array_arg, i64_arg, str_arg, to_plain_string};

/// String manipulation functions
pub fn create_upper_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_uppercase())))
}

pub fn create_lower_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_lowercase())))
}

/// Uppercase the first letter of every word
pub fn create_title_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let mut out = String::new();
            let mut at_word_start = true;
            for c in str_arg(&args, 0)?.chars() {
                if at_word_start && c.is_alphabetic() {
                    out.extend(c.to_uppercase());
                } else {
                    out.push(c);
                }
                at_word_start = !c.is_alphanumeric();
            }
            Ok(Value::from(out))
        })
}

pub fn create_trimspace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.trim())))
}

/// Remove any of the given characters from both ends
pub fn create_trim_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let cutset: Vec<char> = str_arg(&args, 1)?.chars().collect();
            Ok(Value::from(s.trim_matches(|c| cutset.contains(&c))))
        })
}

pub fn create_trimprefix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let prefix = str_arg(&args, 1)?;
            Ok(Value::from(s.strip_prefix(prefix).unwrap_or(s)))
        })
}

pub fn create_trimsuffix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let suffix = str_arg(&args, 1)?;
            Ok(Value::from(s.strip_suffix(suffix).unwrap_or(s)))
        })
}

/// Remove trailing newlines
pub fn create_chomp_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(
                str_arg(&args, 0)?.trim_end_matches(['\n', '\r']),
            ))
        })
}

/// Replace a substring, or a regular expression when wrapped in slashes
pub fn create_replace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let from = str_arg(&args, 1)?;
            let to = str_arg(&args, 2)?;
            if from.len() > 1 && from.starts_with('/') && from.ends_with('/') {
                let re = Regex::new(&from[1..from.len() - 1]).map_err(|e| e.to_string())?;
                return Ok(Value::from(re.replace_all(s, to).into_owned()));
            }
            Ok(Value::from(s.replace(from, to)))
        })
}

/// Character-based substring; a length of -1 means "to the end"
pub fn create_substr_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let chars: Vec<char> = str_arg(&args, 0)?.chars().collect();
            let len = chars.len() as i64;
            let mut offset = i64_arg(&args, 1)?;
            let length = i64_arg(&args, 2)?;
            if offset < 0 {
                offset += len;
            }
            if offset < 0 || offset > len {
                return Err("offset out of range".to_string());
            }
            let end = if length < 0 {
                len
            } else {
                (offset + length).min(len)
            };
            let out: String = chars[offset as usize..end as usize].iter().collect();
            Ok(Value::from(out))
        })
}

pub fn create_startswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(
                str_arg(&args, 0)?.starts_with(str_arg(&args, 1)?),
            ))
        })
}

pub fn create_endswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(str_arg(&args, 0)?.ends_with(str_arg(&args, 1)?)))
        })
}

pub fn create_strcontains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(str_arg(&args, 0)?.contains(str_arg(&args, 1)?)))
        })
}

pub fn create_strrev_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.chars().rev().collect::<String>())))
}

/// printf-style formatting supporting %s, %d, %v and %%
pub fn create_format_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let layout = str_arg(&args, 0)?;
            Ok(Value::from(format_values(layout, &args[1..])?))
        })
}

fn format_values(layout: &str, args: &[Value]) -> Result<String, String> {
    let mut values = args.iter();
    let mut out = String::new();
    let mut chars = layout.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'v') => {
                let v = values.next().ok_or("not enough arguments for format")?;
                out.push_str(&to_plain_string(v)?);
            }
            Some('d') => {
                let v = values.next().ok_or("not enough arguments for format")?;
                let n = v.as_f64().ok_or("%d requires a number")?;
                out.push_str(&(n as i64).to_string());
            }
            Some(other) => return Err(format!("unsupported format verb %{other}")),
            None => return Err("format string ends with %".to_string()),
        }
    }
    Ok(out)
}

/// `format` applied element-wise; list arguments must share a length and
/// scalars are repeated.
pub fn create_formatlist_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let layout = str_arg(&args, 0)?;
            let rest = &args[1..];
            let mut count = None;
            for list in rest.iter().filter_map(Value::as_array) {
                match count {
                    Some(n) if n != list.len() => {
                        return Err("all list arguments must have the same length".to_string())
                    }
                    _ => count = Some(list.len()),
                }
            }
            let count = count.unwrap_or(1);
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let row: Vec<Value> = rest
                    .iter()
                    .map(|v| match v {
                        Value::Array(items) => items[i].clone(),
                        other => other.clone(),
                    })
                    .collect();
                out.push(Value::from(format_values(layout, &row)?));
            }
            Ok(Value::from(out))
        })
}

/// Value of one match: the whole match without groups, an object for
/// named groups and a list for positional ones.
fn capture_value(re: &Regex, caps: &regex::Captures<'_>) -> Value {
    let group = |m: Option<regex::Match<'_>>| m.map_or(Value::Null, |m| Value::from(m.as_str()));
    if re.captures_len() == 1 {
        return group(caps.get(0));
    }
    let named: Vec<&str> = re.capture_names().flatten().collect();
    if !named.is_empty() {
        let object = named
            .into_iter()
            .map(|name| (name.to_string(), group(caps.name(name))))
            .collect();
        return Value::Object(object);
    }
    Value::from((1..re.captures_len()).map(|i| group(caps.get(i))).collect::<Vec<_>>())
}

pub fn create_regex_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let re = Regex::new(str_arg(&args, 0)?).map_err(|e| e.to_string())?;
            let s = str_arg(&args, 1)?;
            let caps = re.captures(s).ok_or("pattern did not match any part of the string")?;
            Ok(capture_value(&re, &caps))
        })
}

pub fn create_regexall_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let re = Regex::new(str_arg(&args, 0)?).map_err(|e| e.to_string())?;
            let s = str_arg(&args, 1)?;
            let matches: Vec<Value> = re
                .captures_iter(s)
                .map(|caps| capture_value(&re, &caps))
                .collect();
            Ok(Value::from(matches))
        })
}

pub fn create_join_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let mut strings = Vec::new();
            for i in 1..args.len() {
                for v in array_arg(&args, i)? {
                    strings.push(to_plain_string(v)?);
                }
            }
            Ok(Value::from(strings.join(separator)))
        })
}

pub fn create_split_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let s = str_arg(&args, 1)?;
            if s.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            let parts: Vec<Value> = s.split(separator).map(Value::from).collect();
            Ok(Value::from(parts))
        })
}
