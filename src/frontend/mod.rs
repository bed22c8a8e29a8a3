//! Turning configuration files into raw block trees.
//!
//! Native files are parsed twice: `hcl-rs` gives the expressions the
//! evaluator works with, `hcl-edit` gives byte spans for source ranges. Both
//! parsers keep structures in source order, so the two trees are walked side
//! by side.

mod json;
pub mod tfvars;

use std::path::{Path, PathBuf};

use hcl_edit::Span;
use log::{debug, warn};

use crate::block::AttributeNode;
use crate::error::LoadError;
use crate::range::{LineIndex, Range};
use crate::Loader;

/// A parsed block before it is placed in the arena.
#[derive(Debug, Clone)]
pub(crate) struct RawBlock {
    pub(crate) kind: String,
    pub(crate) labels: Vec<String>,
    pub(crate) attributes: Vec<AttributeNode>,
    pub(crate) children: Vec<RawBlock>,
    pub(crate) range: Range,
}

/// One configuration file with its top-level blocks.
#[derive(Debug)]
pub(crate) struct SourceFile {
    pub(crate) path: PathBuf,
    pub(crate) text: String,
    pub(crate) blocks: Vec<RawBlock>,
}

pub(crate) fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".tf") || name.ends_with(".tf.json"))
}

/// Parses every `.tf` and `.tf.json` file directly inside `dir`, in file
/// name order.
///
/// A file that cannot be read or parsed is skipped with a warning, unless
/// `stop_on_error` is set, in which case the first failure is returned.
pub(crate) fn load_directory(
    loader: &dyn Loader,
    dir: &Path,
    stop_on_error: bool,
) -> Result<Vec<SourceFile>, LoadError> {
    let mut paths: Vec<PathBuf> = loader
        .list(dir)
        .map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            message: format!("{e:#}"),
        })?
        .into_iter()
        .filter(|path| is_config_file(path))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match load_file(loader, &path) {
            Ok(file) => files.push(file),
            Err(err) if stop_on_error => return Err(err),
            Err(err) => warn!("skipping {}: {err}", path.display()),
        }
    }
    debug!("loaded {} files from {}", files.len(), dir.display());
    Ok(files)
}

fn load_file(loader: &dyn Loader, path: &Path) -> Result<SourceFile, LoadError> {
    let text = loader.load(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: format!("{e:#}"),
    })?;
    let blocks = if path.to_string_lossy().ends_with(".json") {
        json::parse_json(path, &text)?
    } else {
        parse_native(path, &text)?
    };
    Ok(SourceFile {
        path: path.to_path_buf(),
        text,
        blocks,
    })
}

/// Parses native syntax into raw blocks. Top-level attributes are ignored.
pub(crate) fn parse_native(path: &Path, source: &str) -> Result<Vec<RawBlock>, LoadError> {
    let body: hcl::Body = hcl::from_str(source).map_err(|e| LoadError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let spans = hcl_edit::parser::parse_body(source).ok();
    let walker = SpanWalker {
        path,
        lines: LineIndex::new(source),
    };
    let (_, blocks) = walker.body(&body, spans.as_ref());
    Ok(blocks)
}

struct SpanWalker<'p> {
    path: &'p Path,
    lines: LineIndex,
}

impl SpanWalker<'_> {
    fn range(&self, span: Option<std::ops::Range<usize>>) -> Range {
        match span {
            Some(span) => self.lines.range(self.path, span),
            None => Range::new(self.path, 1, self.lines.line_count()),
        }
    }

    fn body(
        &self,
        body: &hcl::Body,
        spans: Option<&hcl_edit::structure::Body>,
    ) -> (Vec<AttributeNode>, Vec<RawBlock>) {
        let mut edits = spans.map(|b| b.iter());
        let mut attributes = Vec::new();
        let mut blocks = Vec::new();
        for structure in body.iter() {
            let edit = edits.as_mut().and_then(Iterator::next);
            match structure {
                hcl::Structure::Attribute(attr) => {
                    let span = match edit {
                        Some(hcl_edit::structure::Structure::Attribute(e)) => e.span(),
                        _ => None,
                    };
                    attributes.push(AttributeNode {
                        name: attr.key().to_string(),
                        expr: attr.expr().clone(),
                        range: self.range(span),
                    });
                }
                hcl::Structure::Block(block) => {
                    let edit_block = match edit {
                        Some(hcl_edit::structure::Structure::Block(e)) => Some(e),
                        _ => None,
                    };
                    let (attrs, children) =
                        self.body(block.body(), edit_block.map(|b| &b.body));
                    blocks.push(RawBlock {
                        kind: block.identifier().to_string(),
                        labels: block
                            .labels()
                            .iter()
                            .map(|label| label.as_str().to_string())
                            .collect(),
                        attributes: attrs,
                        children,
                        range: self.range(edit_block.and_then(|b| b.span())),
                    });
                }
            }
        }
        (attributes, blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLoader {
        files: HashMap<PathBuf, String>,
    }

    impl Loader for MapLoader {
        fn load(&self, path: &Path) -> anyhow::Result<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing file: {}", path.display()))
        }

        fn list(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
            Ok(self
                .files
                .keys()
                .filter(|p| p.parent() == Some(dir))
                .cloned()
                .collect())
        }
    }

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn native_blocks_carry_line_ranges() {
        let source = "locals {\n  a = 1\n}\n\nresource \"aws_instance\" \"web\" {\n  ami = \"x\"\n  ebs_block_device {\n    size = 10\n  }\n}\n";
        let blocks = parse_native(&p("/p/main.tf"), source).unwrap();
        assert_eq!(blocks.len(), 2);

        let web = &blocks[1];
        assert_eq!(web.kind, "resource");
        assert_eq!(web.labels, vec!["aws_instance", "web"]);
        assert_eq!((web.range.start_line, web.range.end_line), (5, 10));
        assert_eq!(web.attributes[0].name, "ami");
        assert_eq!(web.attributes[0].range.start_line, 6);
        assert_eq!(web.children[0].kind, "ebs_block_device");
        assert_eq!(web.children[0].range.start_line, 7);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = parse_native(&p("/p/main.tf"), "resource \"a\" {").unwrap_err();
        assert!(matches!(err, LoadError::Syntax { .. }));
    }

    #[test]
    fn directory_loads_tf_files_in_name_order() {
        let mut files = HashMap::new();
        files.insert(p("/p/b.tf"), "locals {\n  b = 1\n}\n".to_string());
        files.insert(p("/p/a.tf.json"), r#"{"locals": {"a": 1}}"#.to_string());
        files.insert(p("/p/notes.txt"), "ignored".to_string());
        files.insert(p("/p/sub/c.tf"), "locals {}".to_string());
        let loader = MapLoader { files };

        let loaded = load_directory(&loader, &p("/p"), false).unwrap();
        let names: Vec<_> = loaded.iter().map(|f| f.path.clone()).collect();
        assert_eq!(names, vec![p("/p/a.tf.json"), p("/p/b.tf")]);
    }

    #[test]
    fn broken_files_are_skipped_unless_stopping() {
        let mut files = HashMap::new();
        files.insert(p("/p/bad.tf"), "resource {".to_string());
        files.insert(p("/p/good.tf"), "locals {}".to_string());
        let loader = MapLoader { files };

        let loaded = load_directory(&loader, &p("/p"), false).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(load_directory(&loader, &p("/p"), true).is_err());
    }
}
