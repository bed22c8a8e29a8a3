use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::{array_arg, f64_arg, i64_arg, number, object_arg, str_arg, to_plain_string};

/// Length of a string, list or map
pub fn create_length_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(format!("cannot take length of {other}")),
            };
            Ok(Value::from(len as i64))
        })
}

/// Concatenate multiple lists into a single list
pub fn create_concat_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for i in 0..args.len() {
                result.extend(array_arg(&args, i)?.iter().cloned());
            }
            Ok(Value::from(result))
        })
}

/// Flatten a nested list into a single level list
pub fn create_flatten_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            fn flatten(values: &[Value], out: &mut Vec<Value>) {
                for v in values {
                    if let Some(arr) = v.as_array() {
                        flatten(arr, out);
                    } else {
                        out.push(v.clone());
                    }
                }
            }

            let mut result = Vec::new();
            flatten(array_arg(&args, 0)?, &mut result);
            Ok(Value::from(result))
        })
}

/// Remove duplicate values preserving the first occurrence
pub fn create_distinct_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| Ok(Value::from(distinct(array_arg(&args, 0)?))))
}

pub(crate) fn distinct(values: &[Value]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();
    for v in values {
        if !result.contains(v) {
            result.push(v.clone());
        }
    }
    result
}

/// Elements from start (inclusive) to end (exclusive)
pub fn create_slice_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            let start = i64_arg(&args, 1)?;
            let end = i64_arg(&args, 2)?;
            if start < 0 || end < start || end > arr.len() as i64 {
                return Err(format!(
                    "invalid slice bounds {start}..{end} for list of length {}",
                    arr.len()
                ));
            }
            Ok(Value::from(arr[start as usize..end as usize].to_vec()))
        })
}

/// Sort a list of strings lexicographically
pub fn create_sort_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut strings = array_arg(&args, 0)?
                .iter()
                .map(to_plain_string)
                .collect::<Result<Vec<_>, _>>()?;
            strings.sort();
            Ok(Value::from(
                strings.into_iter().map(Value::from).collect::<Vec<_>>(),
            ))
        })
}

pub fn create_reverse_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?.iter().rev().cloned().collect();
            Ok(Value::from(result))
        })
}

/// Index of a value in a list, or an error if not found
pub fn create_index_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            match arr.iter().position(|v| v == &args[1]) {
                Some(pos) => Ok(Value::from(pos as i64)),
                None => Err("value not found".to_string()),
            }
        })
}

/// Whether a list contains the given value
pub fn create_contains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Any)
        .build(|args: FuncArgs| Ok(Value::from(array_arg(&args, 0)?.contains(&args[1]))))
}

/// Map keys in lexical order
pub fn create_keys_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut keys: Vec<&String> = object_arg(&args, 0)?.keys().collect();
            keys.sort();
            Ok(Value::from(
                keys.into_iter()
                    .map(|k| Value::from(k.as_str()))
                    .collect::<Vec<_>>(),
            ))
        })
}

/// Map values ordered by their keys
pub fn create_values_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let map = object_arg(&args, 0)?;
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Ok(Value::from(
                keys.into_iter().map(|k| map[k].clone()).collect::<Vec<_>>(),
            ))
        })
}

/// Single map element by key, with an optional default
pub fn create_lookup_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let map = object_arg(&args, 0)?;
            let key = str_arg(&args, 1)?;
            match (map.get(key), args.get(2)) {
                (Some(v), _) => Ok(v.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(format!("key {key:?} not found and no default given")),
            }
        })
}

/// Shallow merge of maps, later arguments winning
pub fn create_merge_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut merged = hcl::value::Map::new();
            for (i, arg) in args.iter().enumerate() {
                if arg.is_null() {
                    continue;
                }
                for (k, v) in object_arg(&args, i)? {
                    merged.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Object(merged))
        })
}

/// Element at index, wrapping around the list length
pub fn create_element_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            if arr.is_empty() {
                return Err("cannot use element function with an empty list".to_string());
            }
            let index = i64_arg(&args, 1)?;
            if index < 0 {
                return Err("cannot use element function with a negative index".to_string());
            }
            Ok(arr[index as usize % arr.len()].clone())
        })
}

/// Build a map from a list of keys and a list of values
pub fn create_zipmap_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let keys = array_arg(&args, 0)?;
            let values = array_arg(&args, 1)?;
            if keys.len() != values.len() {
                return Err("number of keys and values must match".to_string());
            }
            let mut map = hcl::value::Map::new();
            for (k, v) in keys.iter().zip(values) {
                map.insert(to_plain_string(k)?, v.clone());
            }
            Ok(Value::Object(map))
        })
}

/// Drop null and empty strings from a list
pub fn create_compact_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?
                .iter()
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .collect();
            Ok(Value::from(result))
        })
}

/// First argument that is neither null nor an empty string
pub fn create_coalesce_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            args.iter()
                .find(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .ok_or_else(|| "no non-null arguments".to_string())
        })
}

/// First non-empty list
pub fn create_coalescelist_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            for i in 0..args.len() {
                if !array_arg(&args, i)?.is_empty() {
                    return Ok(args[i].clone());
                }
            }
            Ok(Value::Array(Vec::new()))
        })
}

/// range(limit), range(start, limit) or range(start, limit, step)
pub fn create_range_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let (start, limit, step) = match args.len() {
                1 => (0.0, f64_arg(&args, 0)?, 1.0),
                2 => {
                    let start = f64_arg(&args, 0)?;
                    let limit = f64_arg(&args, 1)?;
                    (start, limit, if limit < start { -1.0 } else { 1.0 })
                }
                3 => (f64_arg(&args, 0)?, f64_arg(&args, 1)?, f64_arg(&args, 2)?),
                _ => return Err("range accepts one to three arguments".to_string()),
            };
            if step == 0.0 {
                return Err("step must not be zero".to_string());
            }
            let mut out = Vec::new();
            let mut current = start;
            while (step > 0.0 && current < limit) || (step < 0.0 && current > limit) {
                out.push(number(current));
                current += step;
                if out.len() > 1024 {
                    return Err("more than 1024 values were generated".to_string());
                }
            }
            Ok(Value::from(out))
        })
}

fn set_args(args: &FuncArgs) -> Result<Vec<Vec<Value>>, String> {
    (0..args.len())
        .map(|i| array_arg(args, i).map(|set| distinct(set)))
        .collect()
}

/// Elements of any of the sets, in first-seen order
pub fn create_setunion_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let all: Vec<Value> = set_args(&args)?.into_iter().flatten().collect();
            Ok(Value::from(distinct(&all)))
        })
}

/// Elements of the first set found in every other set
pub fn create_setintersection_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut sets = set_args(&args)?.into_iter();
            let first = sets.next().unwrap_or_default();
            let rest: Vec<Vec<Value>> = sets.collect();
            let common: Vec<Value> = first
                .into_iter()
                .filter(|v| rest.iter().all(|set| set.contains(v)))
                .collect();
            Ok(Value::from(common))
        })
}

pub fn create_setsubtract_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let removed = array_arg(&args, 1)?;
            let left: Vec<Value> = distinct(array_arg(&args, 0)?)
                .into_iter()
                .filter(|v| !removed.contains(v))
                .collect();
            Ok(Value::from(left))
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::eval;
    use hcl::Value;

    fn strings(items: &[&str]) -> Value {
        Value::from(items.iter().map(|s| Value::from(*s)).collect::<Vec<_>>())
    }

    #[test]
    fn test_length_function() {
        assert_eq!(eval("length(\"héllo\")").unwrap(), Value::from(5));
        assert_eq!(eval("length([1, 2, 3])").unwrap(), Value::from(3));
        assert_eq!(eval("length({a = 1})").unwrap(), Value::from(1));
        assert!(eval("length(true)").is_err());
    }

    #[test]
    fn test_list_functions() {
        assert_eq!(
            eval("concat([\"a\"], [\"b\", \"c\"])").unwrap(),
            strings(&["a", "b", "c"])
        );
        assert_eq!(
            eval("flatten([[\"a\"], [[\"b\"]], \"c\"])").unwrap(),
            strings(&["a", "b", "c"])
        );
        assert_eq!(eval("distinct([\"a\", \"b\", \"a\"])").unwrap(), strings(&["a", "b"]));
        assert_eq!(eval("slice([\"a\", \"b\", \"c\"], 1, 3)").unwrap(), strings(&["b", "c"]));
        assert_eq!(eval("sort([\"b\", \"a\"])").unwrap(), strings(&["a", "b"]));
        assert_eq!(eval("reverse([\"a\", \"b\"])").unwrap(), strings(&["b", "a"]));
        assert_eq!(eval("index([\"a\", \"b\"], \"b\")").unwrap(), Value::from(1));
        assert_eq!(eval("contains([\"a\"], \"a\")").unwrap(), Value::from(true));
        assert_eq!(eval("element([\"a\", \"b\"], 3)").unwrap(), Value::from("b"));
        assert_eq!(eval("compact([\"a\", \"\", null])").unwrap(), strings(&["a"]));
    }

    #[test]
    fn test_map_functions() {
        assert_eq!(eval("keys({b = 1, a = 2})").unwrap(), strings(&["a", "b"]));
        assert_eq!(
            eval("values({b = 1, a = 2})").unwrap(),
            Value::from(vec![Value::from(2), Value::from(1)])
        );
        assert_eq!(eval("lookup({a = \"x\"}, \"a\")").unwrap(), Value::from("x"));
        assert_eq!(eval("lookup({a = \"x\"}, \"b\", \"d\")").unwrap(), Value::from("d"));
        assert!(eval("lookup({a = \"x\"}, \"b\")").is_err());

        let merged = eval("merge({a = 1, b = 1}, {b = 2})").unwrap();
        let obj = merged.as_object().unwrap();
        assert_eq!(obj["a"], Value::from(1));
        assert_eq!(obj["b"], Value::from(2));

        let zipped = eval("zipmap([\"a\", \"b\"], [1, 2])").unwrap();
        assert_eq!(zipped.as_object().unwrap()["b"], Value::from(2));
    }

    #[test]
    fn test_coalesce_functions() {
        assert_eq!(eval("coalesce(null, \"\", \"x\")").unwrap(), Value::from("x"));
        assert_eq!(eval("coalescelist([], [\"a\"])").unwrap(), strings(&["a"]));
    }

    #[test]
    fn test_range_function() {
        assert_eq!(
            eval("range(3)").unwrap(),
            Value::from(vec![Value::from(0), Value::from(1), Value::from(2)])
        );
        assert_eq!(
            eval("range(3, 0)").unwrap(),
            Value::from(vec![Value::from(3), Value::from(2), Value::from(1)])
        );
        assert!(eval("range(0, 1, 0)").is_err());
    }

    #[test]
    fn test_set_functions() {
        assert_eq!(
            eval("setunion([\"a\", \"b\"], [\"b\", \"c\"], [\"a\"])").unwrap(),
            strings(&["a", "b", "c"])
        );
        assert_eq!(
            eval("setintersection([\"a\", \"b\", \"b\"], [\"b\", \"c\"])").unwrap(),
            strings(&["b"])
        );
        assert_eq!(
            eval("setsubtract([\"a\", \"b\", \"c\"], [\"b\"])").unwrap(),
            strings(&["a", "c"])
        );
        assert!(eval("setunion([\"a\"], \"b\")").is_err());
    }
}
