//! `count`, `for_each` and `dynamic` expansion.
//!
//! Each pass takes the current top-level block list and returns the new
//! one: templates are replaced by their instances, everything else is kept
//! in place. Instances come back marked expanded, so running a pass again
//! leaves them alone.

use hcl::Expression;
use log::debug;

use crate::block::{Arena, Block, BlockId, BlockKind};
use crate::context::ContextId;
use crate::value::{Map, PrimitiveType, Value};

pub(crate) fn expand_counts(arena: &mut Arena, root: ContextId, blocks: Vec<BlockId>) -> Vec<BlockId> {
    let mut out = Vec::with_capacity(blocks.len());
    for id in blocks {
        let count = {
            let block = arena.block(id);
            match block.get_attribute("count") {
                // an unresolved or out of range count keeps a single instance
                Some(attr) if is_expandable(&block) => Some(
                    attr.value()
                        .convert(PrimitiveType::Number)
                        .and_then(|count| count.as_i64())
                        .filter(|n| (0..=i64::from(i32::MAX)).contains(n))
                        .unwrap_or(1),
                ),
                _ => None,
            }
        };
        let Some(count) = count else {
            out.push(id);
            continue;
        };
        debug!("expanding {} into {count} instances", arena.block(id).reference());
        let mut instances = Vec::new();
        for index in 0..count {
            let clone = arena.clone_block(id, &Value::from(index));
            copy_variables(arena, root, id, clone);
            instances.push(arena.block(clone).values());
            out.push(clone);
        }
        let slot = address(&arena.block(id));
        if let Some(slot) = slot {
            arena.contexts_mut().set(root, Value::List(instances), &slot);
        }
    }
    out
}

pub(crate) fn expand_for_each(
    arena: &mut Arena,
    root: ContextId,
    blocks: Vec<BlockId>,
) -> Vec<BlockId> {
    let mut out = Vec::with_capacity(blocks.len());
    for id in blocks {
        let plan = {
            let block = arena.block(id);
            let expandable = is_expandable(&block)
                || (*block.kind() == BlockKind::Dynamic && !block.is_expanded());
            match block.get_attribute("for_each") {
                Some(attr) if expandable => Some((
                    attr.value(),
                    iterator_name(&block),
                    *block.kind() == BlockKind::Dynamic,
                )),
                _ => None,
            }
        };
        let Some((collection, binding, dynamic)) = plan else {
            out.push(id);
            continue;
        };
        if !collection.is_iterable() {
            debug!(
                "keeping {} unexpanded: for_each is {}, not a collection",
                arena.block(id).reference(),
                collection.type_name()
            );
            out.push(id);
            continue;
        }

        // evaluated sets arrive as lists; resources and modules key string
        // elements by themselves like `toset` would
        let by_value = !dynamic
            && collection
                .as_list()
                .is_some_and(|items| items.iter().all(|item| item.as_str().is_some()));
        for (key, value) in collection.elements() {
            let key = if by_value { value.clone() } else { key };
            let clone = arena.clone_block(id, &key);
            let scope = arena.block(clone).context();
            let contexts = arena.contexts_mut();
            contexts.set(scope, key.clone(), &["each", "key"]);
            contexts.set(scope, value.clone(), &["each", "value"]);
            contexts.set(scope, key.clone(), &[binding.as_str(), "key"]);
            contexts.set(scope, value.clone(), &[binding.as_str(), "value"]);
            if dynamic {
                contexts.set(scope, key, &["dynamic", "key"]);
                contexts.set(scope, value, &["dynamic", "value"]);
            }
            copy_variables(arena, root, id, clone);
            out.push(clone);
        }
        // instances are published by the next pass; the template's own
        // values must not linger at the address
        let slot = address(&arena.block(id));
        if let Some(slot) = slot {
            arena.contexts_mut().set(root, Value::Object(Map::new()), &slot);
        }
    }
    out
}

fn is_expandable(block: &Block<'_>) -> bool {
    matches!(
        block.kind(),
        BlockKind::Resource | BlockKind::Data | BlockKind::Module
    ) && !block.is_expanded()
}

/// Root scope path holding the values of `block`: `type.name`,
/// `data.type.name` or `module.name`.
fn address(block: &Block<'_>) -> Option<Vec<String>> {
    let (type_label, name_label) = (block.type_label().to_string(), block.name_label().to_string());
    match block.kind() {
        BlockKind::Resource => Some(vec![type_label, name_label]),
        BlockKind::Data => Some(vec!["data".to_string(), type_label, name_label]),
        BlockKind::Module => Some(vec!["module".to_string(), type_label]),
        _ => None,
    }
}

/// Name the per-element binding of `block` is published under: the
/// `iterator` attribute of a dynamic block, else the block's first label.
fn iterator_name(block: &Block<'_>) -> String {
    block
        .get_attribute("iterator")
        .and_then(|attr| match attr.expr() {
            Expression::Variable(name) => Some(name.as_str().to_string()),
            _ => None,
        })
        .unwrap_or_else(|| block.type_label().to_string())
}

/// Copies whatever the root scope holds for the template `from` to the
/// address of its instance `to`, so self references written before
/// expansion keep resolving.
fn copy_variables(arena: &mut Arena, root: ContextId, from: BlockId, to: BlockId) {
    let (source, target) = (address(&arena.block(from)), address(&arena.block(to)));
    let (Some(source), Some(target)) = (source, target) else {
        return;
    };
    let Some(value) = arena.contexts().get(root, &source).cloned() else {
        return;
    };
    arena.contexts_mut().set(root, value, &target);
}

/// Replaces every `dynamic` child of `id` (and of its descendants) by the
/// rendered `content` blocks, one per element of its `for_each`.
pub(crate) fn expand_dynamic(arena: &mut Arena, root: ContextId, id: BlockId) {
    let children: Vec<BlockId> = arena.block(id).children().iter().map(Block::id).collect();
    let (dynamics, plain): (Vec<BlockId>, Vec<BlockId>) = children
        .into_iter()
        .partition(|child| *arena.block(*child).kind() == BlockKind::Dynamic);

    for child in plain {
        expand_dynamic(arena, root, child);
    }

    for dynamic in dynamics {
        if arena.block(dynamic).is_expanded() {
            continue;
        }
        let label = arena.block(dynamic).type_label().to_string();
        arena.remove_child(id, dynamic);
        for instance in expand_for_each(arena, root, vec![dynamic]) {
            if instance == dynamic {
                debug!("dynamic block {label} was not expanded, injecting its content once");
            }
            let Some(content) = arena.block(instance).get_block("content").map(|b| b.id()) else {
                continue;
            };
            expand_dynamic(arena, root, content);
            arena.inject_block(id, content, &label);
        }
    }
}
