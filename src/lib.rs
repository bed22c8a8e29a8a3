//! Evaluation of Terraform-style HCL configuration directories.
//!
//! [`parse_directory`] reads every configuration file of a root directory,
//! follows the modules it calls, expands `count`, `for_each` and `dynamic`
//! blocks and resolves attribute expressions until the values stop changing.
//! The resulting [`Project`] hands out [`Module`] views whose blocks and
//! attributes can be queried without ever failing on unresolved values.

pub mod block;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod frontend;
pub mod module;
pub mod range;
pub mod reference;
pub mod value;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use path_absolutize::Absolutize;
use walkdir::WalkDir;

pub use block::{Arena, Attribute, Block, BlockId, BlockKind, EqualityOption};
pub use context::{ContextId, ContextTree};
pub use error::{EvalError, LoadError, ReferenceError};
pub use eval::{ModuleMetadata, ModulesMetadata};
pub use module::{Module, ModuleData};
pub use range::Range;
pub use reference::{RefKind, Reference, ReferenceKey};
pub use value::{Map, PrimitiveType, Value};

use eval::{Evaluator, Scope};

// Loader abstraction: lets callers control how files are read and listed.
pub trait Loader {
    fn load(&self, path: &Path) -> Result<String>;
    /// Files directly inside `dir`, in any order.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Reads from the local filesystem.
pub struct FsLoader;

impl Loader for FsLoader {
    fn load(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Variable files loaded after the auto-loaded ones, in order.
    pub tfvars_paths: Vec<PathBuf>,
    /// Values that override every variable file.
    pub input_vars: Map,
    pub workspace: String,
    /// Abort on the first unreadable or malformed file instead of skipping it.
    pub stop_on_hcl_error: bool,
    pub max_context_iterations: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            tfvars_paths: Vec::new(),
            input_vars: Map::new(),
            workspace: "default".to_string(),
            stop_on_hcl_error: false,
            max_context_iterations: 32,
        }
    }
}

/// Result of evaluating a root directory: the root module first, then
/// every called module depth first.
pub struct Project {
    arena: Arena,
    modules: Vec<ModuleData>,
    missing_vars: Vec<String>,
    root_context: ContextId,
}

impl Project {
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn modules(&self) -> Vec<Module<'_>> {
        self.modules
            .iter()
            .map(|data| Module::new(&self.arena, data))
            .collect()
    }

    pub fn root_module(&self) -> Option<Module<'_>> {
        self.modules.first().map(|data| Module::new(&self.arena, data))
    }

    /// Every block of every module.
    pub fn blocks(&self) -> Vec<Block<'_>> {
        self.modules().iter().flat_map(Module::blocks).collect()
    }

    /// Root variables that had neither an input value nor a default, as
    /// `variable.<name>`. Sensitive variables are left out.
    pub fn missing_vars(&self) -> &[String] {
        &self.missing_vars
    }

    /// Looks up a dotted path such as `local.proxy` in the root module's
    /// scope.
    pub fn variable(&self, path: &str) -> Option<&Value> {
        self.arena.contexts().get_by_dot(self.root_context, path)
    }
}

/// Loads and evaluates the configuration rooted at `root`.
pub fn parse_directory(root: &Path, loader: &dyn Loader, options: &ParseOptions) -> Result<Project> {
    let root = root
        .absolutize()
        .with_context(|| format!("resolving {}", root.display()))?
        .into_owned();
    let working_dir = std::env::current_dir().unwrap_or_else(|_| root.clone());

    let mut inputs = frontend::tfvars::load_input_vars(loader, &root, &options.tfvars_paths)?;
    inputs.extend(options.input_vars.clone());

    let files = frontend::load_directory(loader, &root, options.stop_on_hcl_error)?;
    let mut arena = Arena::new();
    arena.files_mut().set_base(root.clone());
    let root_context = arena.contexts_mut().new_root();
    let mut blocks = Vec::new();
    for file in files {
        for raw in file.blocks {
            blocks.push(arena.insert(raw, root_context, None));
        }
        arena.add_source(file.path, file.text);
    }

    let scope = Scope {
        loader,
        project_root: root.clone(),
        working_dir,
        workspace: options.workspace.clone(),
        stop_on_hcl_error: options.stop_on_hcl_error,
        max_iterations: options.max_context_iterations.max(1),
        metadata: ModulesMetadata::load(loader, &root),
    };
    let data = ModuleData::new(root.clone(), root.clone(), blocks, None);
    let mut evaluator = Evaluator::new(&mut arena, &scope, data, root_context, inputs, Vec::new());
    let modules = evaluator
        .evaluate_all(&mut arena)
        .with_context(|| format!("evaluating {}", root.display()))?;
    let missing_vars = evaluator.missing_vars().to_vec();
    info!("evaluated {} modules from {}", modules.len(), root.display());

    Ok(Project {
        arena,
        modules,
        missing_vars,
        root_context: evaluator.root_context(),
    })
}
