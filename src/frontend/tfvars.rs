//! Input variable files (`*.tfvars`, `*.tfvars.json`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hcl::eval::Evaluate;
use log::debug;

use crate::eval::builtins;
use crate::value::{Map, Value};
use crate::Loader;

fn is_auto_loaded(name: &str) -> bool {
    matches!(name, "terraform.tfvars" | "terraform.tfvars.json")
        || name.ends_with(".auto.tfvars")
        || name.ends_with(".auto.tfvars.json")
}

/// Collects input variables: auto-loaded files from `root` first, then
/// `explicit` files in order. Later files override earlier ones.
pub fn load_input_vars(loader: &dyn Loader, root: &Path, explicit: &[PathBuf]) -> Result<Map> {
    let mut auto: Vec<PathBuf> = loader
        .list(root)
        .with_context(|| format!("listing {}", root.display()))?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_auto_loaded)
        })
        .collect();
    auto.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut vars = Map::new();
    for path in auto.iter().chain(explicit) {
        debug!("loading variables from {}", path.display());
        vars.extend(load_file(loader, path)?);
    }
    Ok(vars)
}

fn load_file(loader: &dyn Loader, path: &Path) -> Result<Map> {
    let content = loader
        .load(path)
        .with_context(|| format!("reading variable file {}", path.display()))?;
    if path.to_string_lossy().ends_with(".json") {
        let json: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON in {}", path.display()))?;
        return match Value::from(json) {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("{} must contain a JSON object", path.display()),
        };
    }
    parse_tfvars(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Evaluates the attributes of a native variable file. Functions are
/// available, variables are not.
pub fn parse_tfvars(content: &str) -> Result<Map> {
    let body: hcl::Body = hcl::from_str(content)?;
    let ctx = builtins::create_context();
    let mut vars = Map::new();
    for attr in body.attributes() {
        let value = attr
            .expr()
            .evaluate(&ctx)
            .with_context(|| format!("evaluating variable '{}'", attr.key()))?;
        vars.insert(attr.key().to_string(), Value::from(value));
    }
    Ok(vars)
}
