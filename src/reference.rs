use std::fmt;

use crate::error::ReferenceError;
use crate::value::Value;

/// Block category addressed by a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Data,
    Resource,
    Variable,
    Local,
    Provider,
    Output,
    Module,
    Terraform,
}

impl RefKind {
    /// Maps the root name of a traversal (or a block kind) to a reference
    /// kind. Anything unrecognised addresses a resource.
    pub fn from_root(root: &str) -> Self {
        match root {
            "data" => RefKind::Data,
            "var" | "variable" => RefKind::Variable,
            "local" | "locals" => RefKind::Local,
            "provider" => RefKind::Provider,
            "output" => RefKind::Output,
            "module" => RefKind::Module,
            "terraform" => RefKind::Terraform,
            _ => RefKind::Resource,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Data => "data",
            RefKind::Resource => "resource",
            RefKind::Variable => "var",
            RefKind::Local => "local",
            RefKind::Provider => "provider",
            RefKind::Output => "output",
            RefKind::Module => "module",
            RefKind::Terraform => "terraform",
        }
    }
}

/// Instance key of an expanded block: `[0]` or `["name"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    Index(i64),
    Name(String),
}

impl ReferenceKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => value.as_i64().map(ReferenceKey::Index),
            Value::String(s) => Some(ReferenceKey::Name(s.clone())),
            _ => None,
        }
    }

    /// Parses the text between brackets of a label such as `web[0]` or `web["a"]`.
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return Some(ReferenceKey::Index(i));
        }
        let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
        Some(ReferenceKey::Name(inner.replace("\\\"", "\"")))
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKey::Index(i) => write!(f, "[{i}]"),
            ReferenceKey::Name(s) => write!(f, "[{s:?}]"),
        }
    }
}

/// Splits `web[0]` into `("web", Some(Index(0)))`.
pub(crate) fn split_key(label: &str) -> (&str, Option<ReferenceKey>) {
    match label.find('[') {
        Some(open) if label.ends_with(']') => {
            let key = ReferenceKey::parse(&label[open + 1..label.len() - 1]);
            match key {
                Some(key) => (&label[..open], Some(key)),
                None => (label, None),
            }
        }
        _ => (label, None),
    }
}

/// Canonical address of a block plus an optional attribute path below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    kind: RefKind,
    type_label: String,
    name_label: String,
    key: Option<ReferenceKey>,
    remainder: Vec<String>,
}

impl Reference {
    /// Builds a reference from dotted parts, e.g. `["aws_instance", "web[0]", "id"]`
    /// or `["data", "aws_ami", "ubuntu"]`.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Result<Self, ReferenceError> {
        let parts: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
        if parts.is_empty() {
            return Err(ReferenceError::Empty);
        }
        Ok(Self::build(&parts))
    }

    /// Address of a block declared as `kind "label" ...`. The `resource`
    /// kind is implied and left out, so `resource "a" "b"` becomes `a.b`.
    pub fn for_block(kind: &str, labels: &[String]) -> Self {
        let mut parts: Vec<&str> = Vec::with_capacity(labels.len() + 1);
        if kind != "resource" {
            parts.push(kind);
        }
        parts.extend(labels.iter().map(String::as_str));
        Self::build(&parts)
    }

    fn build(parts: &[&str]) -> Self {
        let first = parts.first().copied().unwrap_or_default();
        let kind = RefKind::from_root(first);
        let (type_label, raw_name, rest) = match kind {
            RefKind::Resource => (
                first.to_string(),
                parts.get(1).copied().unwrap_or_default(),
                parts.get(2..).unwrap_or_default(),
            ),
            RefKind::Data => (
                parts.get(1).copied().unwrap_or_default().to_string(),
                parts.get(2).copied().unwrap_or_default(),
                parts.get(3..).unwrap_or_default(),
            ),
            _ => (
                String::new(),
                parts.get(1).copied().unwrap_or_default(),
                parts.get(2..).unwrap_or_default(),
            ),
        };
        let (name_label, key) = split_key(raw_name);
        Self {
            kind,
            type_label,
            name_label: name_label.to_string(),
            key,
            remainder: rest.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parses a dotted address such as `module.vpc.subnet_id`.
    pub fn parse(address: &str) -> Result<Self, ReferenceError> {
        if address.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let parts: Vec<&str> = address.split('.').collect();
        Self::from_parts(&parts)
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    pub fn name_label(&self) -> &str {
        &self.name_label
    }

    pub fn key(&self) -> Option<&ReferenceKey> {
        self.key.as_ref()
    }

    pub fn remainder(&self) -> &[String] {
        &self.remainder
    }

    /// Block identity comparison: kind, labels and key must match, the
    /// remainder is ignored.
    pub fn refers_to(&self, other: &Reference) -> bool {
        self.kind == other.kind
            && self.type_label == other.type_label
            && self.name_label == other.name_label
            && self.key == other.key
    }

    /// The address without key or remainder, e.g. `aws_instance.web`.
    pub fn base(&self) -> String {
        let mut out = Vec::new();
        if self.kind != RefKind::Resource {
            out.push(self.kind.as_str().to_string());
        }
        if !self.type_label.is_empty() {
            out.push(self.type_label.clone());
        }
        if !self.name_label.is_empty() {
            out.push(self.name_label.clone());
        }
        out.join(".")
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base())?;
        if let Some(key) = &self.key {
            write!(f, "{key}")?;
        }
        for part in &self.remainder {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_reference_omits_kind() {
        let r = Reference::parse("aws_instance.web.id").unwrap();
        assert_eq!(r.kind(), RefKind::Resource);
        assert_eq!(r.type_label(), "aws_instance");
        assert_eq!(r.name_label(), "web");
        assert_eq!(r.remainder(), ["id".to_string()]);
        assert_eq!(r.to_string(), "aws_instance.web.id");
    }

    #[test]
    fn data_reference_has_three_parts() {
        let r = Reference::parse("data.aws_ami.ubuntu.id").unwrap();
        assert_eq!(r.kind(), RefKind::Data);
        assert_eq!(r.type_label(), "aws_ami");
        assert_eq!(r.name_label(), "ubuntu");
        assert_eq!(r.to_string(), "data.aws_ami.ubuntu.id");
    }

    #[test]
    fn single_label_kinds_use_name() {
        let r = Reference::parse("module.vpc.subnet_id").unwrap();
        assert_eq!(r.kind(), RefKind::Module);
        assert_eq!(r.type_label(), "");
        assert_eq!(r.name_label(), "vpc");
        assert_eq!(r.to_string(), "module.vpc.subnet_id");

        let v = Reference::from_parts(&["variable", "region"]).unwrap();
        assert!(v.refers_to(&Reference::parse("var.region").unwrap()));
    }

    #[test]
    fn keys_are_split_from_labels() {
        let r = Reference::from_parts(&["aws_instance", "web[2]", "id"]).unwrap();
        assert_eq!(r.name_label(), "web");
        assert_eq!(r.key(), Some(&ReferenceKey::Index(2)));
        assert_eq!(r.to_string(), "aws_instance.web[2].id");

        let r = Reference::from_parts(&["aws_instance", "web[\"a\"]"]).unwrap();
        assert_eq!(r.key(), Some(&ReferenceKey::Name("a".into())));
        assert_eq!(r.to_string(), "aws_instance.web[\"a\"]");
    }

    #[test]
    fn refers_to_ignores_remainder_but_not_key() {
        let block = Reference::parse("aws_instance.web").unwrap();
        assert!(Reference::parse("aws_instance.web.id").unwrap().refers_to(&block));
        assert!(!Reference::parse("aws_instance.db").unwrap().refers_to(&block));
        let indexed = Reference::from_parts(&["aws_instance", "web[0]"]).unwrap();
        assert!(!indexed.refers_to(&block));
    }

    #[test]
    fn unknown_roots_are_resources() {
        let r = Reference::parse("each.value.name").unwrap();
        assert_eq!(r.kind(), RefKind::Resource);
        assert_eq!(r.type_label(), "each");
    }

    #[test]
    fn block_references_drop_the_resource_kind() {
        let labels = vec!["aws_instance".to_string(), "web[1]".to_string()];
        let r = Reference::for_block("resource", &labels);
        assert_eq!(r.to_string(), "aws_instance.web[1]");

        let r = Reference::for_block("data", &["aws_ami".into(), "ubuntu".into()]);
        assert_eq!(r.to_string(), "data.aws_ami.ubuntu");

        let r = Reference::for_block("variable", &["region".into()]);
        assert_eq!(r.to_string(), "var.region");
    }

    #[test]
    fn empty_reference_is_an_error() {
        assert_eq!(Reference::parse(""), Err(ReferenceError::Empty));
    }
}
