//! Iterative evaluation of one module's blocks.
//!
//! An [`Evaluator`] owns the root scope of a module. It repeatedly computes
//! the values of every block kind and writes them into that scope until a
//! pass changes nothing, loads the modules the configuration calls, expands
//! `count`/`for_each`/`dynamic` and converges once more. Each called module
//! gets its own evaluator, run once its inputs are known.

pub mod builtins;
mod expand;
mod modules;

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use hcl::Expression;
use indexmap::IndexMap;
use log::{debug, warn};
use regex::Regex;

use crate::block::{Arena, Block, BlockId, BlockKind};
use crate::context::ContextId;
use crate::error::LoadError;
use crate::frontend;
use crate::module::ModuleData;
use crate::reference::{split_key, ReferenceKey};
use crate::value::{Map, PrimitiveType, Value};
use crate::Loader;

use builtins::filesystem::mentions_file_function;
pub use modules::{ModuleMetadata, ModulesMetadata};
use modules::{resolve_source, VisitedModule};

/// Module block attributes that configure the call rather than feed the
/// module's variables.
const MODULE_META_ARGUMENTS: &[&str] = &[
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];

/// Settings shared by every evaluator of one run.
pub(crate) struct Scope<'l> {
    pub(crate) loader: &'l dyn Loader,
    pub(crate) project_root: PathBuf,
    pub(crate) working_dir: PathBuf,
    pub(crate) workspace: String,
    pub(crate) stop_on_hcl_error: bool,
    pub(crate) max_iterations: usize,
    pub(crate) metadata: Option<ModulesMetadata>,
}

/// A module block whose source has been loaded.
struct ModuleCall {
    block: BlockId,
    name: String,
    path: PathBuf,
    blocks: Vec<BlockId>,
    root: ContextId,
    result: Option<CallResult>,
}

struct CallResult {
    modules: Vec<ModuleData>,
    outputs: Value,
}

pub(crate) struct Evaluator<'s> {
    scope: &'s Scope<'s>,
    module: ModuleData,
    root: ContextId,
    inputs: Map,
    calls: Vec<ModuleCall>,
    visited: Vec<VisitedModule>,
    missing_vars: Vec<String>,
}

impl<'s> Evaluator<'s> {
    /// Seeds `root` with the `terraform` and `path` objects and gives every
    /// block of `module` a fresh scope below it.
    pub(crate) fn new(
        arena: &mut Arena,
        scope: &'s Scope<'s>,
        module: ModuleData,
        root: ContextId,
        inputs: Map,
        visited: Vec<VisitedModule>,
    ) -> Self {
        let contexts = arena.contexts_mut();
        contexts.set_by_dot(root, Value::from(scope.workspace.as_str()), "terraform.workspace");
        contexts.set_by_dot(root, path_value(&scope.project_root), "path.root");
        contexts.set_by_dot(
            root,
            path_value(&relative_path(&scope.project_root, &module.module_path)),
            "path.module",
        );
        contexts.set_by_dot(
            root,
            path_value(&scope.working_dir.join(&scope.project_root)),
            "path.cwd",
        );

        for id in &module.blocks {
            let child = arena.contexts_mut().new_child(root);
            arena.override_context(*id, child);
        }

        Self {
            scope,
            module,
            root,
            inputs,
            calls: Vec::new(),
            visited,
            missing_vars: Vec::new(),
        }
    }

    pub(crate) fn root_context(&self) -> ContextId {
        self.root
    }

    /// Variables that had neither an input value nor a default in the last
    /// pass.
    pub(crate) fn missing_vars(&self) -> &[String] {
        &self.missing_vars
    }

    /// Runs the whole pipeline and returns this module followed by every
    /// module it called, depth first.
    pub(crate) fn evaluate_all(&mut self, arena: &mut Arena) -> Result<Vec<ModuleData>, LoadError> {
        debug!("evaluating {}", self.module.module_path.display());
        self.converge(arena)?;
        self.load_modules(arena)?;
        // count and for_each may read module outputs
        self.converge(arena)?;
        self.expand_blocks(arena);
        self.converge(arena)?;

        if self.calls.iter().any(|call| call.result.is_none()) {
            debug!("evaluating module calls with unresolved inputs");
            self.evaluate_modules(arena, true)?;
            self.converge(arena)?;
        }

        let mut modules = vec![self.module.clone()];
        for call in &mut self.calls {
            if let Some(result) = call.result.as_mut() {
                modules.append(&mut result.modules);
            }
        }
        if !self.missing_vars.is_empty() {
            debug!("variables without a value: {}", self.missing_vars.join(", "));
        }
        Ok(modules)
    }

    fn converge(&mut self, arena: &mut Arena) -> Result<(), LoadError> {
        let mut previous: Option<Map> = None;
        for iteration in 1..=self.scope.max_iterations {
            self.evaluate_step(arena)?;
            let read_files = self.read_wanted_files(arena);
            let current = arena.contexts().variables(self.root).clone();
            if !read_files && previous.as_ref() == Some(&current) {
                debug!("converged after {iteration} iterations");
                return Ok(());
            }
            previous = Some(current);
        }
        debug!(
            "no fixed point after {} iterations, keeping the last values",
            self.scope.max_iterations
        );
        Ok(())
    }

    /// Reads the files `file()` and friends asked for during the last pass.
    /// Returns true when anything new was read.
    fn read_wanted_files(&self, arena: &mut Arena) -> bool {
        // nested block attributes are only evaluated on demand
        let wanted = {
            let mut stack: Vec<Block<'_>> = self.module.blocks.iter().map(|id| arena.block(*id)).collect();
            while let Some(block) = stack.pop() {
                for attr in block.attributes() {
                    if mentions_file_function(attr.expr()) {
                        let _ = attr.evaluate();
                    }
                }
                stack.extend(block.children());
            }
            arena.files().take_wanted()
        };
        for path in &wanted {
            let contents = match self.scope.loader.load(path) {
                Ok(text) => Some(text),
                Err(err) => {
                    debug!("{} is not readable: {err:#}", path.display());
                    None
                }
            };
            arena.files_mut().insert(path.clone(), contents);
        }
        !wanted.is_empty()
    }

    fn blocks_of<'a>(&self, arena: &'a Arena, kind: BlockKind) -> Vec<Block<'a>> {
        self.module
            .blocks
            .iter()
            .map(|id| arena.block(*id))
            .filter(|block| *block.kind() == kind)
            .collect()
    }

    /// One pass over every block kind, in dependency order.
    fn evaluate_step(&mut self, arena: &mut Arena) -> Result<(), LoadError> {
        let vars = self.variable_values(arena);
        arena.contexts_mut().set(self.root, Value::Object(vars), &["var"]);

        let locals = self.local_values(arena);
        arena.contexts_mut().set(self.root, Value::Object(locals), &["local"]);

        let providers = self.provider_values(arena);
        arena.contexts_mut().set(self.root, providers, &["provider"]);

        for (resource_type, instances) in self.instance_values(arena, BlockKind::Resource) {
            arena
                .contexts_mut()
                .set(self.root, instances.into_value(), &[resource_type]);
        }

        for (data_type, instances) in self.instance_values(arena, BlockKind::Data) {
            arena
                .contexts_mut()
                .set(self.root, instances.into_value(), &["data".to_string(), data_type]);
        }

        let outputs = self.output_values(arena);
        arena.contexts_mut().set(self.root, Value::Object(outputs), &["output"]);

        self.evaluate_modules(arena, false)
    }

    fn variable_values(&mut self, arena: &Arena) -> Map {
        let mut vars = Map::new();
        let mut missing = Vec::new();
        for block in self.blocks_of(arena, BlockKind::Variable) {
            let name = block.type_label();
            let value = match (self.inputs.get(name), block.get_attribute("default")) {
                (Some(input), _) => input.clone(),
                (None, Some(default)) => default.resolve(),
                (None, None) => {
                    if !is_sensitive(&block) {
                        missing.push(format!("variable.{name}"));
                    }
                    Value::Unknown
                }
            };
            vars.insert(name.to_string(), coerce(&block, value));
        }
        self.missing_vars = missing;
        vars
    }

    fn local_values(&self, arena: &Arena) -> Map {
        self.blocks_of(arena, BlockKind::Locals)
            .iter()
            .flat_map(|block| block.attributes())
            .map(|attr| (attr.name().to_string(), attr.resolve()))
            .collect()
    }

    /// `provider.<name>` for default configurations, `provider.<name>.<alias>`
    /// for aliased ones.
    fn provider_values(&self, arena: &Arena) -> Value {
        let mut providers: IndexMap<String, Map> = IndexMap::new();
        for block in self.blocks_of(arena, BlockKind::Provider) {
            let entry = providers.entry(block.type_label().to_string()).or_default();
            let alias = block
                .get_attribute("alias")
                .and_then(|attr| attr.value().as_str().map(str::to_string));
            match (alias, block.values()) {
                (Some(alias), values) => {
                    entry.insert(alias, values);
                }
                (None, Value::Object(values)) => entry.extend(values),
                (None, _) => {}
            }
        }
        Value::Object(
            providers
                .into_iter()
                .map(|(name, values)| (name, Value::Object(values)))
                .collect(),
        )
    }

    /// Resource or data values grouped by type label.
    fn instance_values(&self, arena: &Arena, kind: BlockKind) -> IndexMap<String, Instances> {
        let mut grouped: IndexMap<String, Instances> = IndexMap::new();
        for block in self.blocks_of(arena, kind) {
            if block.labels().len() < 2 {
                continue;
            }
            grouped
                .entry(block.type_label().to_string())
                .or_default()
                .insert(block.name_label(), block.values());
        }
        grouped
    }

    fn output_values(&self, arena: &Arena) -> Map {
        self.blocks_of(arena, BlockKind::Output)
            .iter()
            .map(|block| {
                let value = block
                    .get_attribute("value")
                    .map_or(Value::Null, |attr| attr.resolve());
                (block.type_label().to_string(), value)
            })
            .collect()
    }

    fn expand_blocks(&mut self, arena: &mut Arena) {
        let blocks = std::mem::take(&mut self.module.blocks);
        let blocks = expand::expand_counts(arena, self.root, blocks);
        let blocks = expand::expand_for_each(arena, self.root, blocks);
        for id in &blocks {
            expand::expand_dynamic(arena, self.root, *id);
        }
        self.module.blocks = blocks;
    }

    /// Expands module blocks and loads the source directory of each
    /// instance. Calls that cannot be resolved are skipped with a warning.
    fn load_modules(&mut self, arena: &mut Arena) -> Result<(), LoadError> {
        let (calls, mut blocks): (Vec<BlockId>, Vec<BlockId>) = std::mem::take(&mut self.module.blocks)
            .into_iter()
            .partition(|id| *arena.block(*id).kind() == BlockKind::Module);
        let calls = expand::expand_counts(arena, self.root, calls);
        let calls = expand::expand_for_each(arena, self.root, calls);
        blocks.extend(calls.iter().copied());
        self.module.blocks = blocks;

        for id in calls {
            let block = arena.block(id);
            let name = block.label();
            if name.is_empty() {
                continue;
            }
            let Some(source) = block
                .get_attribute("source")
                .and_then(|attr| attr.value().as_str().map(str::to_string))
            else {
                warn!("{}", LoadError::MissingSource { name });
                continue;
            };
            let path = match resolve_source(
                self.scope.metadata.as_ref(),
                &self.scope.project_root,
                &self.module.module_path,
                &source,
            ) {
                Ok(path) => path,
                Err(err) => {
                    warn!("skipping module {name}: {err}");
                    continue;
                }
            };
            let visit = VisitedModule {
                name: name.clone(),
                path: path.clone(),
                definition: block.local_name(),
            };
            if self.visited.contains(&visit) {
                warn!(
                    "module {name} from {} is already being evaluated, skipping",
                    path.display()
                );
                continue;
            }

            let files = match frontend::load_directory(self.scope.loader, &path, self.scope.stop_on_hcl_error) {
                Ok(files) => files,
                Err(err) if self.scope.stop_on_hcl_error => return Err(err),
                Err(err) => {
                    warn!("skipping module {name}: {err}");
                    continue;
                }
            };
            let root = arena.contexts_mut().new_root();
            let mut loaded = Vec::new();
            for file in files {
                for raw in file.blocks {
                    loaded.push(arena.insert(raw, root, Some(id)));
                }
                arena.add_source(file.path, file.text);
            }
            debug!("loaded module {name} from {} ({} blocks)", path.display(), loaded.len());
            self.calls.push(ModuleCall {
                block: id,
                name,
                path,
                blocks: loaded,
                root,
                result: None,
            });
        }
        Ok(())
    }

    /// Evaluates pending module calls whose inputs are fully known, or all
    /// of them with `force`, then exports the outputs of every finished call.
    fn evaluate_modules(&mut self, arena: &mut Arena, force: bool) -> Result<(), LoadError> {
        for index in 0..self.calls.len() {
            if self.calls[index].result.is_some() {
                continue;
            }
            let inputs = module_inputs(&arena.block(self.calls[index].block));
            if !force && !Value::Object(inputs.clone()).is_wholly_known() {
                continue;
            }
            self.evaluate_call(arena, index, inputs)?;
        }
        self.export_outputs(arena);
        Ok(())
    }

    fn evaluate_call(&mut self, arena: &mut Arena, index: usize, inputs: Map) -> Result<(), LoadError> {
        let call = &self.calls[index];
        debug!("evaluating module {} from {}", call.name, call.path.display());
        self.visited.push(VisitedModule {
            name: call.name.clone(),
            path: call.path.clone(),
            definition: arena.block(call.block).local_name(),
        });

        let data = ModuleData::new(
            self.scope.project_root.clone(),
            call.path.clone(),
            call.blocks.clone(),
            Some(call.block),
        );
        let root = call.root;
        let mut child = Evaluator::new(arena, self.scope, data, root, inputs, self.visited.clone());
        let modules = child.evaluate_all(arena)?;
        let outputs = arena
            .contexts()
            .variables(root)
            .get("output")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        self.calls[index].result = Some(CallResult { modules, outputs });
        Ok(())
    }

    /// Publishes finished calls under `module.<name>`. Instances of an
    /// expanded call are also collected under the bare name.
    fn export_outputs(&self, arena: &mut Arena) {
        let mut exported = Instances::default();
        for call in &self.calls {
            if let Some(result) = &call.result {
                exported.insert(&call.name, result.outputs.clone());
            }
        }
        if exported.is_empty() {
            return;
        }
        arena
            .contexts_mut()
            .set(self.root, exported.into_value(), &["module"]);
    }
}

/// Variable names that usually hold credentials or image references and
/// are never reported as missing.
static SENSITIVE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        "^image[_|-]|[_|-]image$|saml[_|-]role$|secrets$|aws[_|-]profile$|key[_|-]id$\
         |secret[_|-]key$|access[_|-]key$|[_|-]token$|^token[_|-]|[_|-]secret$",
    )
    .ok()
});

/// `sensitive = true`, or a name that looks like a credential.
fn is_sensitive(block: &Block<'_>) -> bool {
    let flagged = block
        .get_attribute("sensitive")
        .is_some_and(|attr| attr.value() == Value::from(true));
    flagged
        || SENSITIVE_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(&block.type_label().to_lowercase()))
}

fn path_value(path: &Path) -> Value {
    Value::from(path.display().to_string())
}

/// `path` relative to `base`, climbing with `..` where they diverge; `.`
/// when both are the same directory.
fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = path.components().collect();
    let shared = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in shared..base.len() {
        out.push("..");
    }
    for component in &target[shared..] {
        out.push(component.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Converts `value` to the primitive `type` declared on a variable block,
/// when it has one and the conversion is lossless.
fn coerce(block: &Block<'_>, value: Value) -> Value {
    let target = block.get_attribute("type").and_then(|attr| match attr.expr() {
        Expression::Variable(keyword) => PrimitiveType::from_keyword(keyword.as_str()),
        _ => None,
    });
    match target {
        Some(ty) => value.convert(ty).unwrap_or(value),
        None => value,
    }
}

fn module_inputs(block: &Block<'_>) -> Map {
    block
        .attributes()
        .into_iter()
        .filter(|attr| !MODULE_META_ARGUMENTS.contains(&attr.name()))
        .map(|attr| (attr.name().to_string(), attr.resolve()))
        .collect()
}

/// Values of blocks sharing a type label, keyed by name label. Expanded
/// instances are also gathered under their bare name: a list for `[i]`
/// keys, an object for `["k"]` keys.
#[derive(Default)]
struct Instances {
    named: Map,
    indexed: IndexMap<String, Vec<(i64, Value)>>,
    keyed: IndexMap<String, Map>,
}

impl Instances {
    fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    fn insert(&mut self, label: &str, value: Value) {
        match split_key(label) {
            (base, Some(ReferenceKey::Index(index))) => self
                .indexed
                .entry(base.to_string())
                .or_default()
                .push((index, value.clone())),
            (base, Some(ReferenceKey::Name(key))) => {
                self.keyed
                    .entry(base.to_string())
                    .or_default()
                    .insert(key, value.clone());
            }
            (_, None) => {}
        }
        self.named.insert(label.to_string(), value);
    }

    fn into_value(self) -> Value {
        let mut map = self.named;
        for (base, items) in self.indexed {
            let len = items
                .iter()
                .filter_map(|(index, _)| usize::try_from(*index).ok())
                .map(|index| index + 1)
                .max()
                .unwrap_or(0);
            let mut list = vec![Value::Null; len];
            for (index, value) in items {
                if let Some(slot) = usize::try_from(index).ok().and_then(|i| list.get_mut(i)) {
                    *slot = value;
                }
            }
            map.insert(base, Value::List(list));
        }
        for (base, keyed) in self.keyed {
            map.insert(base, Value::Object(keyed));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn instances_aggregate_by_key_kind() {
        let mut instances = Instances::default();
        instances.insert("web[1]", Value::from("b"));
        instances.insert("web[0]", Value::from("a"));
        instances.insert("db[\"x\"]", Value::from(1i64));
        instances.insert("plain", Value::from(true));
        let value = instances.into_value();

        assert_eq!(
            value.get("web"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(value.get("db").and_then(|db| db.get("x")), Some(&Value::from(1i64)));
        assert_eq!(value.get("web[0]"), Some(&Value::from("a")));
        assert_eq!(value.get("plain"), Some(&Value::from(true)));
    }

    #[test]
    fn module_paths_are_relative_to_the_root() {
        let root = Path::new("/p");
        assert_eq!(relative_path(root, Path::new("/p")), PathBuf::from("."));
        assert_eq!(
            relative_path(root, Path::new("/p/modules/net")),
            PathBuf::from("modules/net")
        );
        assert_eq!(
            relative_path(root, Path::new("/shared/vpc")),
            PathBuf::from("../shared/vpc")
        );
    }

    #[test]
    fn sparse_indexes_fill_with_null() {
        let mut instances = Instances::default();
        instances.insert("web[2]", Value::from("c"));
        let value = instances.into_value();
        assert_eq!(
            value.get("web"),
            Some(&Value::List(vec![Value::Null, Value::Null, Value::from("c")]))
        );
    }
}
