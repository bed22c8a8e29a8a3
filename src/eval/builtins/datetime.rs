use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::str_arg;

/// Fixed value returned by `timestamp()`. A wall clock reading would change
/// on every pass and keep dependent values from ever settling.
pub const FIXED_TIMESTAMP: &str = "2022-01-01T00:00:00Z";

pub fn create_timestamp_func() -> FuncDef {
    FuncDef::builder().build(|_: FuncArgs| Ok(Value::from(FIXED_TIMESTAMP)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| format!("not a valid RFC 3339 timestamp {raw:?}: {e}"))
}

/// Translates a Terraform date layout into a chrono format string.
fn chrono_format(layout: &str) -> Result<String, String> {
    const TOKENS: [(&str, &str); 24] = [
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("M", "%-m"),
        ("DD", "%d"),
        ("D", "%-d"),
        ("EEEE", "%A"),
        ("EEE", "%a"),
        ("hh", "%H"),
        ("h", "%-H"),
        ("HH", "%I"),
        ("H", "%-I"),
        ("AA", "%p"),
        ("aa", "%P"),
        ("mm", "%M"),
        ("m", "%-M"),
        ("ss", "%S"),
        ("s", "%-S"),
        ("ZZZZZ", "%:z"),
        ("ZZZZ", "%z"),
        ("ZZZ", "%Z"),
        ("Z", "Z"),
    ];

    let mut out = String::new();
    let mut rest = layout;
    'outer: while let Some(c) = rest.chars().next() {
        if c == '\'' {
            let end = rest[1..]
                .find('\'')
                .ok_or("unterminated literal in date format")?;
            let literal = &rest[1..=end];
            if literal.is_empty() {
                out.push('\'');
            } else {
                out.push_str(&literal.replace('%', "%%"));
            }
            rest = &rest[end + 2..];
            continue;
        }
        if c.is_ascii_alphabetic() {
            for (token, replacement) in TOKENS {
                if rest.starts_with(token) {
                    out.push_str(replacement);
                    rest = &rest[token.len()..];
                    continue 'outer;
                }
            }
            return Err(format!("unsupported date format token starting at {rest:?}"));
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    Ok(out)
}

pub fn create_formatdate_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let format = chrono_format(str_arg(&args, 0)?)?;
            let dt = parse_timestamp(str_arg(&args, 1)?)?;
            // a zero offset names its zone "UTC"
            let formatted = if dt.offset().local_minus_utc() == 0 {
                dt.with_timezone(&Utc).format(&format).to_string()
            } else {
                dt.format(&format).to_string()
            };
            Ok(Value::from(formatted))
        })
}

/// Parses durations such as `1h30m`, `-10s` or `1.5h`.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {raw:?}");
    let (negative, mut rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let amount: f64 = rest[..split].parse().map_err(|_| invalid())?;
        rest = &rest[split..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3.6e12,
            "m" => 6e10,
            "s" => 1e9,
            "ms" => 1e6,
            "us" | "µs" => 1e3,
            "ns" => 1.0,
            _ => return Err(invalid()),
        };
        nanos += amount * scale;
        rest = &rest[unit_len..];
    }
    let nanos = if negative { -nanos } else { nanos };
    Ok(Duration::nanoseconds(nanos as i64))
}

pub fn create_timeadd_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let dt = parse_timestamp(str_arg(&args, 0)?)?.with_timezone(&Utc);
            let later = dt + parse_duration(str_arg(&args, 1)?)?;
            Ok(Value::from(later.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        })
}

/// Compare two timestamps returning -1, 0, or 1
pub fn create_timecmp_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let a = parse_timestamp(str_arg(&args, 0)?)?;
            let b = parse_timestamp(str_arg(&args, 1)?)?;
            Ok(Value::from(a.cmp(&b) as i64))
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::eval;
    use super::*;

    #[test]
    fn test_timestamp_function() {
        let first = eval("timestamp()").unwrap();
        assert_eq!(first, eval("timestamp()").unwrap());
        assert!(DateTime::parse_from_rfc3339(first.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_formatdate_function() {
        assert_eq!(
            eval("formatdate(\"DD MMM YYYY hh:mm ZZZ\", \"2018-01-02T23:12:01Z\")").unwrap(),
            Value::from("02 Jan 2018 23:12 UTC")
        );
        assert_eq!(
            eval("formatdate(\"EEEE, MMMM D, YYYY\", \"2018-01-02T23:12:01Z\")").unwrap(),
            Value::from("Tuesday, January 2, 2018")
        );
        assert_eq!(
            eval("formatdate(\"h:mm'%'aa\", \"2018-01-02T09:05:01Z\")").unwrap(),
            Value::from("9:05%am")
        );
        assert!(eval("formatdate(\"YYYY\", \"invalid\")").is_err());
        assert!(eval("formatdate(\"Q\", \"2018-01-02T23:12:01Z\")").is_err());
    }

    #[test]
    fn test_timeadd_function() {
        assert_eq!(
            eval("timeadd(\"2017-11-22T00:00:00Z\", \"10m\")").unwrap(),
            Value::from("2017-11-22T00:10:00Z")
        );
        assert_eq!(
            eval("timeadd(\"2017-11-22T00:00:00Z\", \"-1h30m\")").unwrap(),
            Value::from("2017-11-21T22:30:00Z")
        );
        assert!(eval("timeadd(\"2017-11-22T00:00:00Z\", \"10x\")").is_err());
        assert!(eval("timeadd(\"2017-11-22T00:00:00Z\", \"\")").is_err());
    }

    #[test]
    fn test_timecmp_function() {
        assert_eq!(
            eval("timecmp(\"2020-01-01T00:00:00Z\", \"2020-01-02T00:00:00Z\")").unwrap(),
            Value::from(-1)
        );
        assert_eq!(
            eval("timecmp(\"2020-01-01T01:00:00+01:00\", \"2020-01-01T00:00:00Z\")").unwrap(),
            Value::from(0)
        );
    }
}
