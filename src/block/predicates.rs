//! Typed checks over attribute values.
//!
//! None of these fail: an attribute that cannot be evaluated, or whose value
//! has the wrong shape for the check, simply answers `false`.

use log::debug;
use regex::Regex;

use super::{Attribute, EqualityOption};
use crate::value::Value;

fn ignore_case(options: &[EqualityOption]) -> bool {
    options.contains(&EqualityOption::IgnoreCase)
}

/// Text form used when a check value is compared against a string.
fn check_text(check: &Value) -> String {
    check.to_string()
}

fn check_number(check: &Value) -> Option<f64> {
    match check {
        Value::Number(_) => check.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Applies a `{ action = "...", value = ... }` matcher, or plain equality
/// when `check` is not shaped like one.
fn matches_check(check: &Value, actual: &Value) -> bool {
    let (Some(action), Some(expected)) = (
        check.get("action").and_then(Value::as_str),
        check.get("value"),
    ) else {
        return check == actual;
    };
    let options = expected.as_list().unwrap_or_default();
    match action {
        "isAny" => options.contains(actual),
        "isNone" => !options.contains(actual),
        "regexMatches" => match (expected.as_str(), actual.as_str()) {
            (Some(pattern), Some(text)) => Regex::new(pattern)
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            _ => false,
        },
        other => {
            debug!("unknown matcher action {other:?}");
            false
        }
    }
}

impl Attribute<'_> {
    /// Containment, by shape of the attribute value:
    /// - maps match a key, or every `{key = matcher}` entry of a map check,
    /// - lists match an element (or an element object's `key` field),
    /// - strings match a substring.
    pub fn contains(&self, check: impl Into<Value>, options: &[EqualityOption]) -> bool {
        let check = check.into();
        let ignore_case = ignore_case(options);
        match self.value() {
            Value::Map(map) | Value::Object(map) => match check.as_map() {
                Some(checks) => checks.iter().any(|(key, matcher)| {
                    map.get(key)
                        .is_some_and(|actual| matches_check(matcher, actual))
                }),
                None => map.contains_key(&check_text(&check)),
            },
            Value::List(items) | Value::Set(items) => {
                let wanted = check_text(&check);
                items.iter().any(|item| {
                    let candidate = match item {
                        Value::Map(_) | Value::Object(_) => item.get("key"),
                        _ => Some(item),
                    };
                    match candidate.and_then(Value::as_str) {
                        Some(s) if ignore_case => s.eq_ignore_ascii_case(&wanted),
                        Some(s) => s == wanted,
                        None => false,
                    }
                })
            }
            Value::String(s) => {
                let wanted = check_text(&check);
                if ignore_case {
                    s.to_lowercase().contains(&wanted.to_lowercase())
                } else {
                    s.contains(&wanted)
                }
            }
            _ => false,
        }
    }

    pub fn not_contains(&self, check: impl Into<Value>, options: &[EqualityOption]) -> bool {
        !self.contains(check, options)
    }

    pub fn starts_with(&self, prefix: impl Into<Value>) -> bool {
        match self.value() {
            Value::String(s) => s.starts_with(&check_text(&prefix.into())),
            _ => false,
        }
    }

    pub fn ends_with(&self, suffix: impl Into<Value>) -> bool {
        match self.value() {
            Value::String(s) => s.ends_with(&check_text(&suffix.into())),
            _ => false,
        }
    }

    /// Strings compare case-sensitively unless [`EqualityOption::IgnoreCase`]
    /// is given. Numbers compare by magnitude, bools only against bools.
    pub fn equals(&self, check: impl Into<Value>, options: &[EqualityOption]) -> bool {
        let check = check.into();
        match self.value() {
            Value::String(s) if ignore_case(options) => {
                s.to_lowercase() == check_text(&check).to_lowercase()
            }
            Value::String(s) => s == check_text(&check),
            Value::Bool(b) => check.as_bool() == Some(b),
            value @ Value::Number(_) => match (value.as_f64(), check_number(&check)) {
                (Some(actual), Some(expected)) => actual == expected,
                _ => false,
            },
            _ => false,
        }
    }

    pub fn not_equal(&self, check: impl Into<Value>, options: &[EqualityOption]) -> bool {
        !self.equals(check, options)
    }

    pub fn regex_matches(&self, pattern: &str) -> bool {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => {
                debug!("invalid pattern {pattern:?}: {err}");
                return false;
            }
        };
        match self.value() {
            Value::String(s) => re.is_match(&s),
            _ => false,
        }
    }

    /// True when the value (or, for lists, any string element) is one of
    /// `options`.
    pub fn is_any<V: Into<Value>>(&self, options: impl IntoIterator<Item = V>) -> bool {
        let options: Vec<Value> = options.into_iter().map(Into::into).collect();
        match self.value() {
            value @ (Value::String(_) | Value::Number(_)) => options.contains(&value),
            Value::List(items) | Value::Set(items) => items
                .iter()
                .any(|item| matches!(item, Value::String(_)) && options.contains(item)),
            _ => false,
        }
    }

    pub fn is_not_any<V: Into<Value>>(&self, options: impl IntoIterator<Item = V>) -> bool {
        !self.is_any(options)
    }

    /// True unless a string or number value is one of `options`.
    pub fn is_none<V: Into<Value>>(&self, options: impl IntoIterator<Item = V>) -> bool {
        let options: Vec<Value> = options.into_iter().map(Into::into).collect();
        match self.value() {
            value @ (Value::String(_) | Value::Number(_)) => !options.contains(&value),
            _ => true,
        }
    }

    pub fn is_true(&self) -> bool {
        match self.value() {
            Value::Bool(b) => b,
            Value::String(s) => s.trim_matches('"').eq_ignore_ascii_case("true"),
            value @ Value::Number(_) => value.as_f64().is_some_and(|n| n > 0.0),
            _ => false,
        }
    }

    pub fn is_false(&self) -> bool {
        match self.value() {
            Value::Bool(b) => !b,
            Value::String(s) => s.trim_matches('"').eq_ignore_ascii_case("false"),
            _ => false,
        }
    }

    /// Zero-length strings, lists and maps are empty, and so is an
    /// expression that evaluates to null. Unresolved attributes are not.
    pub fn is_empty(&self) -> bool {
        match self.evaluate() {
            Ok(Value::Null) => true,
            Ok(value @ (Value::String(_) | Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Object(_))) => {
                value.len() == Some(0)
            }
            _ => false,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// Entry `key` of a map value, or null.
    pub fn map_value(&self, key: &str) -> Value {
        self.value().get(key).cloned().unwrap_or_default()
    }

    fn compare_number(&self, check: impl Into<Value>, cmp: fn(f64, f64) -> bool) -> bool {
        let value = self.value();
        match (value.as_f64(), check_number(&check.into())) {
            (Some(actual), Some(expected)) => cmp(actual, expected),
            _ => false,
        }
    }

    pub fn less_than(&self, check: impl Into<Value>) -> bool {
        self.compare_number(check, |a, b| a < b)
    }

    pub fn less_than_or_equal_to(&self, check: impl Into<Value>) -> bool {
        self.compare_number(check, |a, b| a <= b)
    }

    pub fn greater_than(&self, check: impl Into<Value>) -> bool {
        self.compare_number(check, |a, b| a > b)
    }

    pub fn greater_than_or_equal_to(&self, check: impl Into<Value>) -> bool {
        self.compare_number(check, |a, b| a >= b)
    }

    /// True when a list value contains any of `checks`.
    pub fn has_intersect<V: Into<Value>>(&self, checks: impl IntoIterator<Item = V>) -> bool {
        if !self.value().is_list_like() {
            return false;
        }
        checks.into_iter().any(|check| self.contains(check, &[]))
    }
}

#[cfg(test)]
mod tests {
    use crate::block::tests::arena_from;
    use crate::block::{Arena, Attribute, BlockId, EqualityOption};
    use crate::value::{Map, Value};

    const SOURCE: &str = r#"
resource "aws_s3_bucket" "logs" {
  acl       = "Private"
  size      = 20
  enabled   = true
  flag      = "true"
  off       = "false"
  blank     = ""
  nothing   = null
  missing   = var.undefined
  regions   = ["eu-west-1", "us-east-1"]
  tags      = [{ key = "Owner", value = "ops" }]
  labels    = { env = "prod", team = "core" }
  empty     = []
}
"#;

    fn attr<'a>(arena: &'a Arena, id: BlockId, name: &str) -> Attribute<'a> {
        arena.block(id).get_attribute(name).unwrap()
    }

    #[test]
    fn equals_is_case_sensitive_by_default() {
        let (arena, ids) = arena_from(SOURCE);
        let acl = attr(&arena, ids[0], "acl");
        assert!(!acl.equals("private", &[]));
        assert!(acl.equals("private", &[EqualityOption::IgnoreCase]));
        assert!(acl.equals("Private", &[]));
        assert!(acl.not_equal("public", &[]));

        assert!(attr(&arena, ids[0], "size").equals(20i64, &[]));
        assert!(attr(&arena, ids[0], "size").equals("20", &[]));
        assert!(attr(&arena, ids[0], "enabled").equals(true, &[]));
        assert!(!attr(&arena, ids[0], "enabled").equals("true", &[]));
        assert!(!attr(&arena, ids[0], "missing").equals("x", &[]));
    }

    #[test]
    fn contains_by_value_shape() {
        let (arena, ids) = arena_from(SOURCE);
        let regions = attr(&arena, ids[0], "regions");
        assert!(regions.contains("us-east-1", &[]));
        assert!(regions.contains("US-EAST-1", &[EqualityOption::IgnoreCase]));
        assert!(regions.not_contains("ap-south-1", &[]));

        assert!(attr(&arena, ids[0], "tags").contains("Owner", &[]));
        assert!(attr(&arena, ids[0], "acl").contains("riv", &[]));

        let labels = attr(&arena, ids[0], "labels");
        assert!(labels.contains("env", &[]));
        assert!(!labels.contains("prod", &[]));

        let mut check = Map::new();
        check.insert("env".into(), Value::from("prod"));
        assert!(labels.contains(Value::Object(check), &[]));

        assert!(!attr(&arena, ids[0], "nothing").contains("x", &[]));
        assert!(!attr(&arena, ids[0], "missing").contains("x", &[]));
    }

    #[test]
    fn contains_with_matchers() {
        let (arena, ids) = arena_from(SOURCE);
        let labels = attr(&arena, ids[0], "labels");
        let matcher = |action: &str, value: Value| {
            let mut inner = Map::new();
            inner.insert("action".into(), Value::from(action));
            inner.insert("value".into(), value);
            let mut check = Map::new();
            check.insert("env".into(), Value::Object(inner));
            Value::Object(check)
        };
        assert!(labels.contains(matcher("isAny", Value::from(vec!["dev", "prod"])), &[]));
        assert!(!labels.contains(matcher("isNone", Value::from(vec!["prod"])), &[]));
        assert!(labels.contains(matcher("regexMatches", Value::from("^pr")), &[]));
    }

    #[test]
    fn string_affixes_and_patterns() {
        let (arena, ids) = arena_from(SOURCE);
        let acl = attr(&arena, ids[0], "acl");
        assert!(acl.starts_with("Pri"));
        assert!(acl.ends_with("ate"));
        assert!(acl.regex_matches("^P[a-z]+$"));
        assert!(!acl.regex_matches("("));
        assert!(!attr(&arena, ids[0], "size").starts_with("2"));
    }

    #[test]
    fn membership() {
        let (arena, ids) = arena_from(SOURCE);
        let acl = attr(&arena, ids[0], "acl");
        assert!(acl.is_any(["Private", "public-read"]));
        assert!(acl.is_not_any(["public-read"]));
        assert!(acl.is_none(["public-read"]));
        assert!(!acl.is_none(["Private"]));
        assert!(attr(&arena, ids[0], "size").is_any([10i64, 20]));
        assert!(attr(&arena, ids[0], "regions").is_any(["eu-west-1"]));
        assert!(attr(&arena, ids[0], "regions").has_intersect(["x", "eu-west-1"]));
        assert!(!attr(&arena, ids[0], "acl").has_intersect(["Private"]));
    }

    #[test]
    fn truthiness() {
        let (arena, ids) = arena_from(SOURCE);
        assert!(attr(&arena, ids[0], "enabled").is_true());
        assert!(attr(&arena, ids[0], "flag").is_true());
        assert!(attr(&arena, ids[0], "size").is_true());
        assert!(attr(&arena, ids[0], "off").is_false());
        assert!(!attr(&arena, ids[0], "size").is_false());
        assert!(!attr(&arena, ids[0], "missing").is_true());
        assert!(!attr(&arena, ids[0], "missing").is_false());
    }

    #[test]
    fn emptiness_distinguishes_null_from_unresolved() {
        let (arena, ids) = arena_from(SOURCE);
        assert!(attr(&arena, ids[0], "blank").is_empty());
        assert!(attr(&arena, ids[0], "nothing").is_empty());
        assert!(attr(&arena, ids[0], "empty").is_empty());
        assert!(!attr(&arena, ids[0], "missing").is_empty());
        assert!(!attr(&arena, ids[0], "size").is_empty());
        assert!(!attr(&arena, ids[0], "enabled").is_empty());
        assert!(attr(&arena, ids[0], "regions").is_not_empty());
    }

    #[test]
    fn ordering_and_map_values() {
        let (arena, ids) = arena_from(SOURCE);
        let size = attr(&arena, ids[0], "size");
        assert!(size.less_than(30i64));
        assert!(size.less_than_or_equal_to(20i64));
        assert!(size.greater_than(10i64));
        assert!(size.greater_than_or_equal_to("20"));
        assert!(!attr(&arena, ids[0], "acl").less_than(30i64));

        let labels = attr(&arena, ids[0], "labels");
        assert_eq!(labels.map_value("team"), Value::from("core"));
        assert_eq!(labels.map_value("nope"), Value::Null);
    }
}
