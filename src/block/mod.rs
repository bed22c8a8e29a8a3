//! Configuration blocks.
//!
//! Every block of a run lives in one [`Arena`]. Blocks refer to their
//! children, their scope and the module call that loaded them by index, so
//! the parent/child graph and the context tree never form ownership cycles.
//! [`Block`] is a cheap borrowed view used for queries; the few mutations
//! the evaluator needs (cloning, injecting, re-scoping) are arena methods.

pub mod attribute;
mod predicates;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::context::{ContextId, ContextTree};
use crate::eval::builtins::filesystem::FileTable;
use crate::frontend::RawBlock;
use crate::range::Range;
use crate::reference::{split_key, Reference, ReferenceKey};
use crate::value::{Map, Value};

pub use attribute::{Attribute, EqualityOption};

/// Block kind as written before the labels. Unrecognised identifiers
/// (nested blocks such as `ingress` or `tag`) keep their name in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Resource,
    Data,
    Module,
    Variable,
    Output,
    Locals,
    Provider,
    Terraform,
    Dynamic,
    Other(String),
}

impl BlockKind {
    pub fn from_identifier(ident: &str) -> Self {
        match ident {
            "resource" => BlockKind::Resource,
            "data" => BlockKind::Data,
            "module" => BlockKind::Module,
            "variable" => BlockKind::Variable,
            "output" => BlockKind::Output,
            "locals" => BlockKind::Locals,
            "provider" => BlockKind::Provider,
            "terraform" => BlockKind::Terraform,
            "dynamic" => BlockKind::Dynamic,
            other => BlockKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Resource => "resource",
            BlockKind::Data => "data",
            BlockKind::Module => "module",
            BlockKind::Variable => "variable",
            BlockKind::Output => "output",
            BlockKind::Locals => "locals",
            BlockKind::Provider => "provider",
            BlockKind::Terraform => "terraform",
            BlockKind::Dynamic => "dynamic",
            BlockKind::Other(name) => name,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

#[derive(Debug, Clone)]
pub(crate) struct AttributeNode {
    pub(crate) name: String,
    pub(crate) expr: hcl::Expression,
    pub(crate) range: Range,
}

#[derive(Debug, Clone)]
pub(crate) struct BlockNode {
    kind: BlockKind,
    labels: Vec<String>,
    attributes: Vec<AttributeNode>,
    children: Vec<BlockId>,
    context: ContextId,
    module_block: Option<BlockId>,
    range: Range,
    expanded: bool,
    clone_index: usize,
    expansion: Option<ReferenceKey>,
}

/// Storage for every block, scope and source file of one evaluation run.
#[derive(Default)]
pub struct Arena {
    contexts: ContextTree,
    blocks: Vec<BlockNode>,
    sources: HashMap<PathBuf, String>,
    files: FileTable,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contexts(&self) -> &ContextTree {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut ContextTree {
        &mut self.contexts
    }

    /// Files readable by `file()` and friends.
    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    pub fn block(&self, id: BlockId) -> Block<'_> {
        Block { arena: self, id }
    }

    pub(crate) fn add_source(&mut self, path: PathBuf, text: String) {
        self.sources.insert(path, text);
    }

    pub fn source(&self, path: &Path) -> Option<&str> {
        self.sources.get(path).map(String::as_str)
    }

    pub(crate) fn node(&self, id: BlockId) -> &BlockNode {
        &self.blocks[id.0]
    }

    fn node_mut(&mut self, id: BlockId) -> &mut BlockNode {
        &mut self.blocks[id.0]
    }

    /// Adds a parsed block and its nested blocks. The whole subtree shares
    /// `context` until the evaluator re-scopes it.
    pub(crate) fn insert(
        &mut self,
        raw: RawBlock,
        context: ContextId,
        module_block: Option<BlockId>,
    ) -> BlockId {
        let children = raw
            .children
            .into_iter()
            .map(|child| self.insert(child, context, module_block))
            .collect();
        self.push(BlockNode {
            kind: BlockKind::from_identifier(&raw.kind),
            labels: raw.labels,
            attributes: raw.attributes,
            children,
            context,
            module_block,
            range: raw.range,
            expanded: false,
            clone_index: 0,
            expansion: None,
        })
    }

    fn push(&mut self, node: BlockNode) -> BlockId {
        self.blocks.push(node);
        BlockId(self.blocks.len() - 1)
    }

    fn copy_subtree(&mut self, id: BlockId, context: ContextId) -> BlockId {
        let source = self.node(id).clone();
        let children = source
            .children
            .iter()
            .map(|child| self.copy_subtree(*child, context))
            .collect();
        self.push(BlockNode {
            children,
            context,
            expanded: false,
            clone_index: 0,
            expansion: None,
            ..source
        })
    }

    /// Duplicates `id` as one instance of a `count`/`for_each` expansion.
    ///
    /// The clone and its whole subtree get a fresh child of the original's
    /// scope. The last label is rewritten to `name[index]` (or the block's
    /// clone counter when the index is not a usable key), a numeric index is
    /// bound as `count.index`, and the clone is marked expanded.
    pub fn clone_block(&mut self, id: BlockId, index: &Value) -> BlockId {
        let context = self.contexts.new_child(self.node(id).context);
        let clone = self.copy_subtree(id, context);

        let key = ReferenceKey::from_value(index)
            .unwrap_or(ReferenceKey::Index(self.node(id).clone_index as i64));
        let node = self.node_mut(clone);
        if let Some(last) = node.labels.last_mut() {
            *last = format!("{last}{key}");
        }
        node.expanded = true;
        node.expansion = Some(key);

        if matches!(index, Value::Number(_)) {
            self.contexts
                .set_by_dot(context, index.clone(), "count.index");
        }
        self.node_mut(id).clone_index += 1;
        debug!("cloned {} as {}", self.block(id).reference(), self.block(clone).reference());
        clone
    }

    /// Re-parents `block` under `parent` as a child of kind `as_kind`,
    /// clearing its labels, and publishes its attribute values in the root
    /// scope under `<parent reference>.<as_kind>.<attribute>`.
    pub fn inject_block(&mut self, parent: BlockId, block: BlockId, as_kind: &str) {
        {
            let node = self.node_mut(block);
            node.kind = BlockKind::from_identifier(as_kind);
            node.labels.clear();
        }
        let prefix = format!("{}.{}", self.block(parent).reference(), as_kind);
        let values: Vec<(String, Value)> = self
            .block(block)
            .attributes()
            .into_iter()
            .map(|attr| (attr.name().to_string(), attr.value()))
            .collect();
        let root = self.contexts.root(self.node(parent).context);
        for (name, value) in values {
            self.contexts
                .set_by_dot(root, value, &format!("{prefix}.{name}"));
        }
        self.node_mut(parent).children.push(block);
    }

    /// Moves `id` into scope `context`; every descendant gets its own fresh
    /// child scope of its parent's.
    pub fn override_context(&mut self, id: BlockId, context: ContextId) {
        self.node_mut(id).context = context;
        let children = self.node(id).children.clone();
        for child in children {
            let child_context = self.contexts.new_child(context);
            self.override_context(child, child_context);
        }
    }

    /// Detaches `child` from `parent`. The node stays in the arena.
    pub(crate) fn remove_child(&mut self, parent: BlockId, child: BlockId) {
        self.node_mut(parent).children.retain(|id| *id != child);
    }
}

/// Borrowed view of a block.
#[derive(Clone, Copy)]
pub struct Block<'a> {
    arena: &'a Arena,
    id: BlockId,
}

impl PartialEq for Block<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena) && self.id == other.id
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("reference", &self.reference().to_string())
            .finish()
    }
}

impl<'a> Block<'a> {
    fn node(&self) -> &'a BlockNode {
        self.arena.node(self.id)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn kind(&self) -> &'a BlockKind {
        &self.node().kind
    }

    /// The identifier before the labels, e.g. `resource` or `ingress`.
    pub fn identifier(&self) -> &'a str {
        self.node().kind.as_str()
    }

    pub fn labels(&self) -> &'a [String] {
        &self.node().labels
    }

    pub fn type_label(&self) -> &'a str {
        self.labels().first().map(String::as_str).unwrap_or_default()
    }

    pub fn name_label(&self) -> &'a str {
        self.labels().get(1).map(String::as_str).unwrap_or_default()
    }

    /// All labels joined with dots.
    pub fn label(&self) -> String {
        self.labels().join(".")
    }

    pub fn range(&self) -> &'a Range {
        &self.node().range
    }

    pub fn context(&self) -> ContextId {
        self.node().context
    }

    pub fn is_expanded(&self) -> bool {
        self.node().expanded
    }

    /// Instance key this block was cloned with by `count`/`for_each`.
    pub fn expansion_key(&self) -> Option<&'a ReferenceKey> {
        self.node().expansion.as_ref()
    }

    pub fn attributes(&self) -> Vec<Attribute<'a>> {
        (0..self.node().attributes.len())
            .map(|index| Attribute::new(self.arena, self.id, index))
            .collect()
    }

    pub fn get_attribute(&self, name: &str) -> Option<Attribute<'a>> {
        self.node()
            .attributes
            .iter()
            .position(|attr| attr.name == name)
            .map(|index| Attribute::new(self.arena, self.id, index))
    }

    pub fn children(&self) -> Vec<Block<'a>> {
        self.node()
            .children
            .iter()
            .map(|id| self.arena.block(*id))
            .collect()
    }

    /// First direct child block of the given kind.
    pub fn get_block(&self, name: &str) -> Option<Block<'a>> {
        self.children()
            .into_iter()
            .find(|child| child.identifier() == name)
    }

    pub fn get_blocks(&self, name: &str) -> Vec<Block<'a>> {
        self.children()
            .into_iter()
            .filter(|child| child.identifier() == name)
            .collect()
    }

    pub fn get_first_matching_block(&self, names: &[&str]) -> Option<Block<'a>> {
        names.iter().find_map(|name| self.get_block(name))
    }

    /// Walks `a.b.attr` through child blocks `a` then `b` and returns `attr`.
    pub fn get_nested_attribute(&self, path: &str) -> Option<Attribute<'a>> {
        let (working, last) = self.walk_nested(path)?;
        working.get_attribute(last)
    }

    fn walk_nested<'p>(&self, path: &'p str) -> Option<(Block<'a>, &'p str)> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let last = parts.pop()?;
        let mut working = *self;
        for part in parts {
            working = working.get_block(part)?;
        }
        Some((working, last))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.get_attribute(name).is_some() || self.get_block(name).is_some()
    }

    pub fn missing_child(&self, name: &str) -> bool {
        !self.has_child(name)
    }

    pub fn missing_nested_child(&self, path: &str) -> bool {
        match self.walk_nested(path) {
            Some((working, last)) => working.missing_child(last),
            None => true,
        }
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.get_block(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.node().children.is_empty() && self.node().attributes.is_empty()
    }

    pub fn is_resource_type(&self, resource_type: &str) -> bool {
        self.type_label() == resource_type
    }

    pub fn in_module(&self) -> bool {
        self.node().module_block.is_some()
    }

    /// The `module` block whose call loaded this block.
    pub fn module_block(&self) -> Option<Block<'a>> {
        self.node().module_block.map(|id| self.arena.block(id))
    }

    pub fn reference(&self) -> Reference {
        Reference::for_block(self.identifier(), self.labels())
    }

    /// Name relative to the module the block is declared in.
    pub fn local_name(&self) -> String {
        self.reference().to_string()
    }

    /// Name including every enclosing module call, e.g.
    /// `module.net.module.subnets.aws_subnet.private`.
    pub fn full_name(&self) -> String {
        match self.module_block() {
            Some(module) => format!("{}.{}", module.full_name(), self.local_name()),
            None => self.local_name(),
        }
    }

    /// Full name plus the defining file, and the calling module's unique
    /// name for blocks inside modules.
    pub fn unique_name(&self) -> String {
        let filename = self.range().filename().display();
        match self.module_block() {
            Some(module) => format!("{}:{}:{}", self.full_name(), filename, module.unique_name()),
            None => format!("{}:{}", self.full_name(), filename),
        }
    }

    /// Every attribute resolved in the block's scope, unresolved ones as
    /// [`Value::Unknown`].
    pub fn values(&self) -> Value {
        let mut map = Map::new();
        for attr in self.attributes() {
            map.insert(attr.name().to_string(), attr.resolve());
        }
        Value::Object(map)
    }

    /// Source lines of the block and the comment lines directly above it.
    pub fn read_lines(&self) -> (Vec<String>, Vec<String>) {
        match self.arena.source(self.range().filename()) {
            Some(source) => self.range().read_lines(source),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Name label with any instance key removed: `web[0]` becomes `web`.
    pub fn base_name(&self) -> &'a str {
        split_key(self.name_label()).0
    }
}
