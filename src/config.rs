use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::value::{Map, Value};
use crate::ParseOptions;

pub const CONFIG_FILE: &str = "tfeval.toml";

/// Defaults applied before command line flags.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Variable files loaded after the auto-loaded ones
    #[serde(default)]
    pub var_files: Vec<String>,
    /// Input variables
    #[serde(default)]
    pub vars: BTreeMap<String, toml::Value>,
    /// Workspace name exposed as `terraform.workspace`
    pub workspace: Option<String>,
    #[serde(default)]
    pub stop_on_hcl_error: bool,
}

/// Contents of `tfeval.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    /// Builds parse options from the settings. Relative variable files are
    /// taken relative to `base`.
    pub fn parse_options(&self, base: &Path) -> ParseOptions {
        let settings = &self.settings;
        let mut options = ParseOptions {
            tfvars_paths: settings
                .var_files
                .iter()
                .map(|file| base.join(file))
                .collect::<Vec<PathBuf>>(),
            stop_on_hcl_error: settings.stop_on_hcl_error,
            ..ParseOptions::default()
        };
        if let Some(workspace) = &settings.workspace {
            options.workspace = workspace.clone();
        }
        options.input_vars = settings
            .vars
            .iter()
            .map(|(key, value)| (key.clone(), toml_to_value(value)))
            .collect::<Map>();
        options
    }
}

pub fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::from(s.as_str()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => Value::from(*f),
        toml::Value::Boolean(b) => Value::from(*b),
        toml::Value::Datetime(d) => Value::from(d.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_value(v)))
                .collect(),
        ),
    }
}

/// Load configuration from tfeval.toml in the working directory
pub fn load_config() -> Result<Option<Config>> {
    load_config_from_path(Path::new(CONFIG_FILE))
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_become_parse_options() {
        let config: Config = toml::from_str(
            r#"
[settings]
var_files = ["prod.tfvars"]
workspace = "prod"
stop_on_hcl_error = true

[settings.vars]
region = "eu-west-1"
replicas = 3
tags = { team = "infra" }
"#,
        )
        .unwrap();

        let options = config.parse_options(Path::new("/work"));
        assert_eq!(options.tfvars_paths, vec![PathBuf::from("/work/prod.tfvars")]);
        assert_eq!(options.workspace, "prod");
        assert!(options.stop_on_hcl_error);
        assert_eq!(options.input_vars["region"], Value::from("eu-west-1"));
        assert_eq!(options.input_vars["replicas"], Value::from(3i64));
        assert_eq!(
            options.input_vars["tags"].get("team"),
            Some(&Value::from("infra"))
        );
    }

    #[test]
    fn empty_config_keeps_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let options = config.parse_options(Path::new("/work"));
        assert_eq!(options.workspace, "default");
        assert!(options.tfvars_paths.is_empty());
        assert!(!options.stop_on_hcl_error);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from_path(&dir.path().join(CONFIG_FILE))
            .unwrap()
            .is_none());

        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[settings]\nworkspace = \"dev\"\n").unwrap();
        let config = load_config_from_path(&path).unwrap().unwrap();
        assert_eq!(config.settings.workspace.as_deref(), Some("dev"));
    }
}
