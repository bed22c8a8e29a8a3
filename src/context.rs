//! Lexical scopes for attribute evaluation.
//!
//! Contexts form a tree stored in a single arena. Each node owns its own
//! bindings and knows its parent by index, so lookups walk towards the root
//! and the nearest binding wins.

use crate::eval::builtins;
use crate::value::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

#[derive(Debug, Default)]
struct ContextNode {
    parent: Option<ContextId>,
    vars: Map,
}

pub struct ContextTree {
    nodes: Vec<ContextNode>,
    functions: hcl::eval::Context<'static>,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            functions: builtins::create_context(),
        }
    }

    pub fn new_root(&mut self) -> ContextId {
        self.push(None)
    }

    pub fn new_child(&mut self, parent: ContextId) -> ContextId {
        self.push(Some(parent))
    }

    fn push(&mut self, parent: Option<ContextId>) -> ContextId {
        self.nodes.push(ContextNode {
            parent,
            vars: Map::new(),
        });
        ContextId(self.nodes.len() - 1)
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.nodes[id.0].parent
    }

    pub fn root(&self, id: ContextId) -> ContextId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Bindings owned by this node only.
    pub fn variables(&self, id: ContextId) -> &Map {
        &self.nodes[id.0].vars
    }

    /// Looks `path` up starting at `id` and walking towards the root.
    pub fn get<S: AsRef<str>>(&self, id: ContextId, path: &[S]) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(ctx) = current {
            if let Some(value) = lookup(&self.nodes[ctx.0].vars, path) {
                return Some(value);
            }
            current = self.parent(ctx);
        }
        None
    }

    pub fn get_by_dot(&self, id: ContextId, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        self.get(id, &parts)
    }

    /// Writes `value` at `path` in the node `id`, creating intermediate
    /// objects as needed. Writing an object over an existing object merges
    /// the top-level keys, new keys winning.
    pub fn set<S: AsRef<str>>(&mut self, id: ContextId, value: Value, path: &[S]) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut target = &mut self.nodes[id.0].vars;
        for segment in parents {
            let entry = target
                .entry(segment.as_ref().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_map_like() {
                *entry = Value::Object(Map::new());
            }
            let (Value::Object(map) | Value::Map(map)) = entry else {
                return;
            };
            target = map;
        }
        match target.get_mut(last.as_ref()) {
            Some(existing) => merge_into(existing, value),
            None => {
                target.insert(last.as_ref().to_string(), value);
            }
        }
    }

    pub fn set_by_dot(&mut self, id: ContextId, value: Value, path: &str) {
        let parts: Vec<&str> = path.split('.').collect();
        self.set(id, value, &parts);
    }

    /// Deep merge of every binding visible from `id`, root first.
    pub fn merged(&self, id: ContextId) -> Map {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        let mut out = Map::new();
        for ctx in chain.into_iter().rev() {
            for (k, v) in &self.nodes[ctx.0].vars {
                match out.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        out
    }

    /// Materialises the scope of `id` into an HCL evaluation context with
    /// every builtin function declared.
    pub fn eval_context(&self, id: ContextId) -> hcl::eval::Context<'_> {
        let mut ctx = self.functions.clone();
        for (name, value) in self.merged(id) {
            if let Some(value) = value.to_hcl() {
                ctx.declare_var(name, value);
            }
        }
        ctx
    }
}

fn lookup<'a, S: AsRef<str>>(vars: &'a Map, path: &[S]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = vars.get(first.as_ref())?;
    for segment in rest {
        current = current.get(segment.as_ref())?;
    }
    Some(current)
}

fn merge_into(existing: &mut Value, value: Value) {
    match (existing, value) {
        (Value::Object(old) | Value::Map(old), Value::Object(new) | Value::Map(new))
            if !old.is_empty() && !new.is_empty() =>
        {
            for (k, v) in new {
                old.insert(k, v);
            }
        }
        (slot, value) => *slot = value,
    }
}

fn deep_merge(existing: &mut Value, value: &Value) {
    match (existing, value) {
        (Value::Object(old) | Value::Map(old), Value::Object(new) | Value::Map(new)) => {
            for (k, v) in new {
                match old.get_mut(k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        old.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
