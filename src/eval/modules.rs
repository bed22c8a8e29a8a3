//! Locating module sources on disk.

use std::path::{Path, PathBuf};

use log::warn;
use path_absolutize::Absolutize;
use serde::Deserialize;

use crate::error::LoadError;
use crate::Loader;

/// Contents of `.terraform/modules/modules.json`, written by `terraform init`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModulesMetadata {
    #[serde(default)]
    pub modules: Vec<ModuleMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleMetadata {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dir: String,
}

impl ModulesMetadata {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(".terraform").join("modules").join("modules.json")
    }

    /// Reads the metadata file under `project_root`. A missing file is not an
    /// error; an unreadable one is reported and ignored.
    pub fn load(loader: &dyn Loader, project_root: &Path) -> Option<Self> {
        let path = Self::path(project_root);
        let content = loader.load(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("ignoring invalid module metadata {}: {e}", path.display());
                None
            }
        }
    }

    fn find(&self, source: &str) -> Option<&ModuleMetadata> {
        let registry = format!("registry.terraform.io/{source}");
        self.modules
            .iter()
            .find(|m| m.source == source || m.source == registry)
    }
}

fn normalize(path: &Path) -> Result<PathBuf, LoadError> {
    path.absolutize()
        .map(|p| p.into_owned())
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Resolves a module `source` to a directory: cached metadata first, then
/// paths relative to the calling module.
pub(crate) fn resolve_source(
    metadata: Option<&ModulesMetadata>,
    project_root: &Path,
    module_path: &Path,
    source: &str,
) -> Result<PathBuf, LoadError> {
    if let Some(cached) = metadata.and_then(|m| m.find(source)) {
        return normalize(&project_root.join(&cached.dir));
    }
    if source.starts_with("./") || source.starts_with("../") {
        return normalize(&module_path.join(source));
    }
    Err(LoadError::UnresolvedSource {
        source_addr: source.to_string(),
    })
}

/// Identity of a module instantiation already evaluated higher up the
/// module tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VisitedModule {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) definition: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModulesMetadata {
        serde_json::from_str(
            r#"{"Modules": [
                {"Key": "", "Source": "", "Dir": "."},
                {"Key": "vpc", "Source": "registry.terraform.io/terraform-aws-modules/vpc/aws", "Version": "3.0.0", "Dir": ".terraform/modules/vpc"}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn relative_sources_resolve_against_the_calling_module() {
        let path = resolve_source(None, Path::new("/p"), Path::new("/p/modules/a"), "../b").unwrap();
        assert_eq!(path, PathBuf::from("/p/modules/b"));
        let path = resolve_source(None, Path::new("/p"), Path::new("/p"), "./net").unwrap();
        assert_eq!(path, PathBuf::from("/p/net"));
    }

    #[test]
    fn registry_sources_need_metadata() {
        let err = resolve_source(None, Path::new("/p"), Path::new("/p"), "terraform-aws-modules/vpc/aws")
            .unwrap_err();
        assert!(matches!(err, LoadError::UnresolvedSource { .. }));

        let meta = metadata();
        let path = resolve_source(Some(&meta), Path::new("/p"), Path::new("/p"), "terraform-aws-modules/vpc/aws")
            .unwrap();
        assert_eq!(path, PathBuf::from("/p/.terraform/modules/vpc"));
        assert_eq!(meta.modules[1].version.as_deref(), Some("3.0.0"));
        assert_eq!(meta.modules[1].key, "vpc");
    }
}
