//! Resolved configuration values.
//!
//! A [`Value`] is what an attribute expression turns into once it has been
//! evaluated against a context. Besides the usual JSON-like shapes it carries
//! two things HCL evaluation alone does not:
//! - `Unknown`, for values that could not be resolved yet (they propagate
//!   through containers instead of failing the whole evaluation),
//! - separate `List`/`Set` and `Map`/`Object` variants, so collection helpers
//!   can keep the distinction the configuration language makes.
//!
//! Numbers are stored as [`hcl::Number`] and compare by magnitude, so `1`
//! and `1.0` are equal.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use std::fmt;

pub type Map = IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Unknown,
    Bool(bool),
    Number(hcl::Number),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Map),
    Object(Map),
}

/// Primitive type constraint as written in a `variable` block's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    Number,
    Bool,
}

impl PrimitiveType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// True when neither this value nor anything nested inside it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::List(items) | Value::Set(items) => items.iter().all(Value::is_wholly_known),
            Value::Map(map) | Value::Object(map) => map.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    pub fn is_iterable(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Object(_)
        )
    }

    pub fn is_list_like(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_))
    }

    pub fn is_map_like(&self) -> bool {
        matches!(self, Value::Map(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&hcl::Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(hcl::Number::as_f64)
    }

    /// Integral view of a number; fractional numbers are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        let n = self.as_number()?;
        n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) | Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::List(items) | Value::Set(items) => Some(items.len()),
            Value::Map(map) | Value::Object(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Key/value pairs of a collection: lists and sets are keyed by their
    /// numeric position, maps and objects by key in lexical order.
    pub fn elements(&self) -> Vec<(Value, Value)> {
        match self {
            Value::List(items) | Value::Set(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i as u64), v.clone()))
                .collect(),
            Value::Map(map) | Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| (Value::String(k.clone()), map[k].clone()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Converts into an HCL value for expression evaluation. Unknown values
    /// have no HCL counterpart: object keys holding them are dropped and list
    /// elements become null.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        Some(match self {
            Value::Unknown => return None,
            Value::Null => hcl::Value::Null,
            Value::Bool(b) => hcl::Value::Bool(*b),
            Value::Number(n) => hcl::Value::Number(n.clone()),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::List(items) | Value::Set(items) => hcl::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_hcl().unwrap_or(hcl::Value::Null))
                    .collect(),
            ),
            Value::Map(map) | Value::Object(map) => hcl::Value::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_hcl().map(|v| (k.clone(), v)))
                    .collect::<hcl::value::Map<String, hcl::Value>>(),
            ),
        })
    }

    /// Lossless conversion to a primitive type, or `None` when the value
    /// cannot be represented in it.
    pub fn convert(&self, ty: PrimitiveType) -> Option<Value> {
        match (ty, self) {
            (_, Value::Null | Value::Unknown) => Some(self.clone()),
            (PrimitiveType::String, Value::String(_)) => Some(self.clone()),
            (PrimitiveType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (PrimitiveType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (PrimitiveType::Number, Value::Number(_)) => Some(self.clone()),
            (PrimitiveType::Number, Value::String(s)) => parse_number(s).map(Value::Number),
            (PrimitiveType::Bool, Value::Bool(_)) => Some(self.clone()),
            (PrimitiveType::Bool, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

pub(crate) fn parse_number(s: &str) -> Option<hcl::Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(hcl::Number::from(i));
    }
    s.parse::<f64>().ok().and_then(hcl::Number::from_f64)
}

fn numbers_equal(a: &hcl::Number, b: &hcl::Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unknown, Value::Unknown) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (Value::Map(a), Value::Map(b)) | (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Unknown => f.write_str("(unknown)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Object(_) => {
                match serde_json::to_string(self) {
                    Ok(s) => f.write_str(&s),
                    Err(_) => Err(fmt::Error),
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(hcl::Number::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(hcl::Number::from(i64::from(value)))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(hcl::Number::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        hcl::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        Value::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Self {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => Value::Bool(b),
            hcl::Value::Number(n) => Value::Number(n),
            hcl::Value::String(s) => Value::String(s),
            hcl::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            hcl::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    n.as_f64().map_or(Value::Null, Value::from)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Unknown => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serde::Serialize::serialize(n, serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) | Value::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) | Value::Object(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    ser.serialize_entry(k, v)?;
                }
                ser.end()
            }
        }
    }
}
