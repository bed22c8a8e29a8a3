use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::collection::distinct;
use super::{str_arg, to_plain_string};

/// Convert a primitive value to a string
pub fn create_tostring_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| to_plain_string(&args[0]).map(Value::from))
}

/// Convert a value to a number
pub fn create_tonumber_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::Null => Ok(Value::Null),
            Value::String(s) => crate::value::parse_number(s)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert {s:?} to number")),
            other => Err(format!("cannot convert {other} to number")),
        })
}

/// Convert a value to a boolean
pub fn create_tobool_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Bool(b) => Ok(Value::from(*b)),
            Value::Null => Ok(Value::Null),
            Value::String(s) if s == "true" => Ok(Value::from(true)),
            Value::String(s) if s == "false" => Ok(Value::from(false)),
            other => Err(format!("cannot convert {other} to bool")),
        })
}

/// Convert a value to a list; a map becomes the list of its values
pub fn create_tolist_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Array(arr) => Ok(Value::Array(arr.clone())),
            Value::Object(obj) => Ok(Value::Array(obj.values().cloned().collect())),
            Value::Null => Ok(Value::Null),
            other => Ok(Value::from(vec![other.clone()])),
        })
}

/// Convert a list to a set, dropping duplicates
pub fn create_toset_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Array(arr) => Ok(Value::from(distinct(arr))),
            Value::Null => Ok(Value::Null),
            other => Err(format!("cannot convert {other} to set")),
        })
}

/// Convert a value to a map
pub fn create_tomap_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Object(obj) => Ok(Value::Object(obj.clone())),
            Value::Null => Ok(Value::Null),
            other => Err(format!("cannot convert {other} to map")),
        })
}

pub fn create_jsonencode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            serde_json::to_string(&args[0])
                .map(Value::from)
                .map_err(|e| e.to_string())
        })
}

pub fn create_jsondecode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            serde_json::from_str::<Value>(str_arg(&args, 0)?).map_err(|e| e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::eval;
    use hcl::Value;

    #[test]
    fn test_tostring_function() {
        assert_eq!(eval("tostring(123)").unwrap(), Value::from("123"));
        assert_eq!(eval("tostring(true)").unwrap(), Value::from("true"));
        assert!(eval("tostring([1])").is_err());
    }

    #[test]
    fn test_tonumber_function() {
        assert_eq!(eval("tonumber(\"123\")").unwrap(), Value::from(123));
        assert_eq!(eval("tonumber(\"1.5\")").unwrap(), Value::from(1.5));
        assert!(eval("tonumber(\"abc\")").is_err());
    }

    #[test]
    fn test_tobool_function() {
        assert_eq!(eval("tobool(\"true\")").unwrap(), Value::from(true));
        assert!(eval("tobool(\"maybe\")").is_err());
    }

    #[test]
    fn test_collection_conversions() {
        assert_eq!(eval("tolist(1)").unwrap(), Value::from(vec![Value::from(1)]));
        assert_eq!(
            eval("toset([\"a\", \"a\", \"b\"])").unwrap(),
            Value::from(vec![Value::from("a"), Value::from("b")])
        );

        let mut map = hcl::value::Map::new();
        map.insert("a".to_string(), Value::from(1));
        assert_eq!(eval("tomap({a = 1})").unwrap(), Value::from(map));
        assert!(eval("tomap([1,2])").is_err());
    }

    #[test]
    fn test_json_functions() {
        assert_eq!(
            eval("jsonencode({a = [1, \"b\"]})").unwrap(),
            Value::from(r#"{"a":[1,"b"]}"#)
        );
        let decoded = eval(r#"jsondecode("{\"x\": true}")"#).unwrap();
        assert_eq!(decoded.as_object().unwrap()["x"], Value::from(true));
    }
}
