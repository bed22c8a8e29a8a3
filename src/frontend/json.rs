use std::path::Path;

use hcl::expr::{Expression, ObjectKey, TemplateExpr};
use serde_json::{Map as JsonMap, Value as Json};

use super::RawBlock;
use crate::block::AttributeNode;
use crate::error::LoadError;
use crate::range::{LineIndex, Range};

/// Number of labels a top-level block kind takes in JSON syntax.
fn label_depth(kind: &str) -> usize {
    match kind {
        "resource" | "data" => 2,
        "variable" | "output" | "module" | "provider" => 1,
        _ => 0,
    }
}

/// Converts a `.tf.json` document into raw blocks. Every block gets the
/// whole file as its range.
pub(super) fn parse_json(path: &Path, source: &str) -> Result<Vec<RawBlock>, LoadError> {
    let doc: Json = serde_json::from_str(source).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Json::Object(top) = doc else {
        return Err(LoadError::Syntax {
            path: path.to_path_buf(),
            message: "top-level JSON value must be an object".into(),
        });
    };
    let converter = Converter {
        range: Range::new(path, 1, LineIndex::new(source).line_count()),
    };
    let mut blocks = Vec::new();
    for (kind, value) in &top {
        converter.labeled(kind, value, label_depth(kind), Vec::new(), &mut blocks);
    }
    Ok(blocks)
}

struct Converter {
    range: Range,
}

impl Converter {
    /// Descends `depth` levels of label objects, then emits one block per
    /// body (a body may be an object or an array of objects).
    fn labeled(
        &self,
        kind: &str,
        value: &Json,
        depth: usize,
        labels: Vec<String>,
        out: &mut Vec<RawBlock>,
    ) {
        if depth == 0 {
            for body in bodies(value) {
                out.push(self.block(kind, labels.clone(), body));
            }
            return;
        }
        if let Json::Object(map) = value {
            for (label, inner) in map {
                let mut labels = labels.clone();
                labels.push(label.clone());
                self.labeled(kind, inner, depth - 1, labels, out);
            }
        }
    }

    fn block(&self, kind: &str, labels: Vec<String>, body: &JsonMap<String, Json>) -> RawBlock {
        let mut attributes = Vec::new();
        let mut children = Vec::new();
        for (key, value) in body {
            match key.as_str() {
                "dynamic" => self.labeled("dynamic", value, 1, Vec::new(), &mut children),
                "content" if kind == "dynamic" => {
                    for content in bodies(value) {
                        children.push(self.block("content", Vec::new(), content));
                    }
                }
                _ => attributes.push(AttributeNode {
                    name: key.clone(),
                    expr: expression(value),
                    range: self.range.clone(),
                }),
            }
        }
        RawBlock {
            kind: kind.to_string(),
            labels,
            attributes,
            children,
            range: self.range.clone(),
        }
    }
}

fn bodies(value: &Json) -> Vec<&JsonMap<String, Json>> {
    match value {
        Json::Object(map) => vec![map],
        Json::Array(items) => items.iter().filter_map(Json::as_object).collect(),
        _ => Vec::new(),
    }
}

/// Strings containing `${` are templates, everything else is a literal.
fn expression(value: &Json) -> Expression {
    match value {
        Json::Null => Expression::Null,
        Json::Bool(b) => Expression::Bool(*b),
        Json::Number(n) => {
            let number = if let Some(i) = n.as_i64() {
                Some(hcl::Number::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(hcl::Number::from(u))
            } else {
                n.as_f64().and_then(hcl::Number::from_f64)
            };
            number.map_or(Expression::Null, Expression::Number)
        }
        Json::String(s) if s.contains("${") => {
            Expression::TemplateExpr(Box::new(TemplateExpr::QuotedString(s.clone())))
        }
        Json::String(s) => Expression::String(s.clone()),
        Json::Array(items) => Expression::Array(items.iter().map(expression).collect()),
        Json::Object(map) => Expression::Object(
            map.iter()
                .map(|(k, v)| (ObjectKey::Expression(Expression::String(k.clone())), expression(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<RawBlock> {
        parse_json(Path::new("/p/main.tf.json"), source).unwrap()
    }

    #[test]
    fn labels_follow_block_kind() {
        let blocks = parse(
            r#"{
  "resource": {"aws_instance": {"web": {"ami": "x"}, "db": [{"ami": "y"}]}},
  "variable": {"region": {"default": "eu"}},
  "locals": {"a": 1}
}"#,
        );
        let summary: Vec<(String, Vec<String>)> = blocks
            .iter()
            .map(|b| (b.kind.clone(), b.labels.clone()))
            .collect();
        // object keys come back sorted
        assert_eq!(
            summary,
            vec![
                ("locals".into(), vec![]),
                ("resource".into(), vec!["aws_instance".into(), "db".into()]),
                ("resource".into(), vec!["aws_instance".into(), "web".into()]),
                ("variable".into(), vec!["region".into()]),
            ]
        );
        assert_eq!(blocks[0].attributes[0].name, "a");
        assert_eq!(blocks[0].range.start_line, 1);
        assert_eq!(blocks[0].range.end_line, 5);
    }

    #[test]
    fn interpolated_strings_become_templates() {
        let blocks = parse(r#"{"locals": {"a": "${var.x}-y", "b": "plain"}}"#);
        assert!(matches!(blocks[0].attributes[0].expr, Expression::TemplateExpr(_)));
        assert_eq!(blocks[0].attributes[1].expr, Expression::String("plain".into()));
    }

    #[test]
    fn dynamic_blocks_have_content() {
        let blocks = parse(
            r#"{"resource": {"aws_instance": {"web": {
  "dynamic": {"tag": {"for_each": "${var.tags}", "content": {"key": "${tag.key}"}}}
}}}}"#,
        );
        let dynamic = &blocks[0].children[0];
        assert_eq!(dynamic.kind, "dynamic");
        assert_eq!(dynamic.labels, vec!["tag"]);
        assert_eq!(dynamic.attributes[0].name, "for_each");
        assert_eq!(dynamic.children[0].kind, "content");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = parse_json(Path::new("/p/bad.tf.json"), "{").unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }
}
