//! Patch to operation translation for patches coming from collaborators.
//!
//! Block- and child-level inserts and unsets map directly onto node
//! operations. Everything else is resolved by applying the patch to a copy of
//! the one block it touches and diffing the old block against the new one,
//! which yields the smallest set of operations that gets the editor there.
//!
//! Patches that do not resolve are reported as errors; the caller decides to
//! skip them. Removing something that is already gone is not an error.

use std::collections::HashSet;

use log::debug;
use serde_json::Value;

use super::{KeyGenerator, Operation, Properties};
use crate::models::{
    Block, Child, ModelError, PathSegment, Schema, blocks_from_value,
    path::{Path, display_path},
};
use crate::patch::{InsertPosition, PatchApplyError, PatchOp, apply_patch, dmp};
use crate::tree::{
    Node, Snapshot, TreeError,
    convert::{block_to_node, child_to_node, node_to_block},
    is_empty_document, placeholder_block,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemotePatchError {
    #[error("Path {0} does not resolve in the editor")]
    Unresolved(String),
    #[error("Cannot apply {kind} at {path}")]
    Unsupported { kind: &'static str, path: String },
    #[error("Invalid value at {path}: {source}")]
    InvalidValue {
        path: String,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Apply(#[from] PatchApplyError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

fn unresolved(path: &Path) -> RemotePatchError {
    RemotePatchError::Unresolved(display_path(path))
}

fn invalid(path: &Path) -> impl FnOnce(ModelError) -> RemotePatchError + '_ {
    move |source| RemotePatchError::InvalidValue {
        path: display_path(path),
        source,
    }
}

/// Index of a block addressed by a key or index segment
pub(super) fn locate_block(tree: &[Node], segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key(key) => tree.iter().position(|n| n.key() == key.key),
        PathSegment::Index(_) => segment.resolve_index(tree.len()).filter(|i| *i < tree.len()),
        PathSegment::Field(_) => None,
    }
}

/// `(block, child)` addressed by a `[block, "children", child, ...]` path
pub(super) fn locate_child(tree: &[Node], path: &Path) -> Option<(usize, usize)> {
    let [block, children, child, ..] = path.as_slice() else {
        return None;
    };
    if !children.is_field("children") {
        return None;
    }
    let b = locate_block(tree, block)?;
    let siblings = tree.get(b)?.children()?;
    let c = match child {
        PathSegment::Key(key) => siblings.iter().position(|n| n.key() == key.key)?,
        PathSegment::Index(_) => child
            .resolve_index(siblings.len())
            .filter(|i| *i < siblings.len())?,
        PathSegment::Field(_) => return None,
    };
    Some((b, c))
}

/// Where items land when inserted relative to `segment`
fn insertion_index(siblings: &[Node], segment: &PathSegment, position: InsertPosition) -> Option<usize> {
    if siblings.is_empty() && matches!(segment, PathSegment::Index(_)) {
        return Some(0);
    }
    let reference = match segment {
        PathSegment::Key(key) => siblings.iter().position(|n| n.key() == key.key)?,
        PathSegment::Index(_) => segment.resolve_index(siblings.len())?,
        PathSegment::Field(_) => return None,
    };
    Some(match position {
        InsertPosition::Before => reference,
        InsertPosition::After => (reference + 1).min(siblings.len()),
    })
}

fn child_at(parent: &[usize], index: usize) -> Vec<usize> {
    let mut path = parent.to_vec();
    path.push(index);
    path
}

fn placeholder(schema: &Schema, keys: &mut dyn KeyGenerator) -> Node {
    let block_key = keys.next_key();
    let span_key = keys.next_key();
    block_to_node(&placeholder_block(schema, &block_key, &span_key), schema)
}

fn text_ops(path: &[usize], old: &str, new: &str, ops: &mut Vec<Operation>) {
    let mut offset = 0;
    for diff in dmp::diff(old, new) {
        let length = diff.text.chars().count();
        match diff.op {
            dmp::DiffOp::Equal => offset += length,
            dmp::DiffOp::Delete => ops.push(Operation::RemoveText {
                path: path.to_vec(),
                offset,
                text: diff.text,
            }),
            dmp::DiffOp::Insert => {
                ops.push(Operation::InsertText {
                    path: path.to_vec(),
                    offset,
                    text: diff.text,
                });
                offset += length;
            }
        }
    }
}

fn set_node_op(path: &[usize], old: &Node, new: &Node) -> Option<Operation> {
    let before = old.properties();
    let after = new.properties();
    let mut properties = Properties::new();
    let mut new_properties = Properties::new();
    for (name, value) in &before {
        if after.get(name) != Some(value) {
            properties.insert(name.clone(), value.clone());
            if let Some(changed) = after.get(name) {
                new_properties.insert(name.clone(), changed.clone());
            }
        }
    }
    for (name, value) in &after {
        if !before.contains_key(name) {
            new_properties.insert(name.clone(), value.clone());
        }
    }
    if properties.is_empty() && new_properties.is_empty() {
        return None;
    }
    Some(Operation::SetNode {
        path: path.to_vec(),
        properties,
        new_properties,
    })
}

/// Operations turning `old` (at `path`) into `new`
fn diff_node(path: &[usize], old: &Node, new: &Node, ops: &mut Vec<Operation>) {
    match (old, new) {
        (Node::Text(before), Node::Text(after)) => {
            ops.extend(set_node_op(path, old, new));
            text_ops(path, &before.text, &after.text, ops);
        }
        (Node::Element(before), Node::Element(after)) if before.role == after.role => {
            ops.extend(set_node_op(path, old, new));
            if !before.is_void() {
                diff_children(path, &before.children, &after.children, ops);
            }
        }
        _ => {
            ops.push(Operation::RemoveNode {
                path: path.to_vec(),
                node: old.clone(),
            });
            ops.push(Operation::InsertNode {
                path: path.to_vec(),
                node: new.clone(),
            });
        }
    }
}

fn has_unique_keys(nodes: &[Node]) -> bool {
    let mut seen = HashSet::new();
    nodes.iter().all(|n| seen.insert(n.key()))
}

/// Operations turning the child list `old` of `parent` into `new`, matching children by key
fn diff_children(parent: &[usize], old: &[Node], new: &[Node], ops: &mut Vec<Operation>) {
    if !has_unique_keys(old) || !has_unique_keys(new) {
        // Keys cannot be matched up; rebuild the list
        for (index, node) in old.iter().enumerate().rev() {
            ops.push(Operation::RemoveNode {
                path: child_at(parent, index),
                node: node.clone(),
            });
        }
        for (index, node) in new.iter().enumerate() {
            ops.push(Operation::InsertNode {
                path: child_at(parent, index),
                node: node.clone(),
            });
        }
        return;
    }

    let wanted: HashSet<&str> = new.iter().map(Node::key).collect();
    let mut current = old.to_vec();
    for index in (0..current.len()).rev() {
        if !wanted.contains(current[index].key()) {
            let node = current.remove(index);
            ops.push(Operation::RemoveNode {
                path: child_at(parent, index),
                node,
            });
        }
    }

    for (index, target) in new.iter().enumerate() {
        match current.iter().position(|n| n.key() == target.key()) {
            Some(found) => {
                if found != index {
                    let node = current.remove(found);
                    current.insert(index, node);
                    ops.push(Operation::MoveNode {
                        path: child_at(parent, found),
                        new_path: child_at(parent, index),
                    });
                }
                diff_node(&child_at(parent, index), &current[index], target, ops);
                current[index] = target.clone();
            }
            None => {
                current.insert(index, target.clone());
                ops.push(Operation::InsertNode {
                    path: child_at(parent, index),
                    node: target.clone(),
                });
            }
        }
    }
}

/// Replace the whole document, keeping blocks whose keys survive
fn replace_document(
    tree: &Snapshot,
    value: &Value,
    schema: &Schema,
    keys: &mut dyn KeyGenerator,
) -> Result<Vec<Operation>, RemotePatchError> {
    let blocks = blocks_from_value(value, schema).map_err(invalid(&Vec::new()))?;
    if blocks.is_empty() && is_empty_document(tree, schema) && !tree.is_empty() {
        return Ok(Vec::new());
    }
    let mut nodes: Vec<Node> = blocks.iter().map(|b| block_to_node(b, schema)).collect();
    if nodes.is_empty() {
        nodes.push(placeholder(schema, keys));
    }
    let mut ops = Vec::new();
    diff_children(&[], tree, &nodes, &mut ops);
    Ok(ops)
}

fn insert_blocks(
    tree: &Snapshot,
    schema: &Schema,
    path: &Path,
    position: InsertPosition,
    items: &[Value],
) -> Result<Vec<Operation>, RemotePatchError> {
    let segment = &path[0];
    let anchored_on_placeholder = segment
        .as_key()
        .is_some_and(|key| tree.keys().block(key).is_some());
    // An empty editor only shows a placeholder; the stored value has no blocks
    let replaces_placeholder = is_empty_document(tree, schema) && !anchored_on_placeholder;
    let at = if replaces_placeholder {
        0
    } else {
        insertion_index(tree, segment, position).ok_or_else(|| unresolved(path))?
    };

    let mut seen = HashSet::new();
    let mut ops = Vec::new();
    for item in items {
        let block = Block::from_value(item, schema).map_err(invalid(path))?;
        if tree.keys().block(&block.key).is_some() || !seen.insert(block.key.clone()) {
            debug!("Skipping insert of existing block {}", block.key);
            continue;
        }
        ops.push(Operation::InsertNode {
            path: vec![at + ops.len()],
            node: block_to_node(&block, schema),
        });
    }

    if replaces_placeholder
        && !ops.is_empty()
        && let Some(existing) = tree.first()
    {
        ops.push(Operation::RemoveNode {
            path: vec![ops.len()],
            node: existing.clone(),
        });
    }
    Ok(ops)
}

fn insert_children(
    tree: &Snapshot,
    schema: &Schema,
    path: &Path,
    position: InsertPosition,
    items: &[Value],
) -> Result<Vec<Operation>, RemotePatchError> {
    let b = locate_block(tree, &path[0]).ok_or_else(|| unresolved(path))?;
    let block = &tree[b];
    if block.is_void() {
        return Err(RemotePatchError::Unsupported {
            kind: "insert",
            path: display_path(path),
        });
    }
    let siblings = block.children().unwrap_or_default();
    let at = insertion_index(siblings, &path[2], position).ok_or_else(|| unresolved(path))?;

    let mut seen = HashSet::new();
    let mut ops = Vec::new();
    for item in items {
        let child = Child::from_value(item, schema).map_err(invalid(path))?;
        if tree.keys().child(block.key(), &child.key).is_some() || !seen.insert(child.key.clone()) {
            debug!("Skipping insert of existing child {}", child.key);
            continue;
        }
        ops.push(Operation::InsertNode {
            path: vec![b, at + ops.len()],
            node: child_to_node(&child, schema),
        });
    }
    Ok(ops)
}

/// Apply the patch to a copy of the block it addresses and diff the result
fn rebase_block(tree: &Snapshot, schema: &Schema, op: &PatchOp) -> Result<Vec<Operation>, RemotePatchError> {
    let path = op.path();
    let b = locate_block(tree, &path[0]).ok_or_else(|| unresolved(path))?;
    let old = &tree[b];

    let mut document = Value::Array(vec![node_to_block(old)?.to_value()]);
    let mut local_path = path.clone();
    local_path[0] = PathSegment::Index(0);
    apply_patch(&mut document, &op.with_path(local_path))?;

    let value = document.get(0).ok_or_else(|| unresolved(path))?;
    let block = Block::from_value(value, schema).map_err(invalid(path))?;
    let mut ops = Vec::new();
    diff_node(&[b], old, &block_to_node(&block, schema), &mut ops);
    Ok(ops)
}

/// Translate a remote patch into operations for `tree`.
///
/// The operations apply in order, each to the tree the previous one left.
pub fn patch_to_operations(
    op: &PatchOp,
    tree: &Snapshot,
    schema: &Schema,
    keys: &mut dyn KeyGenerator,
) -> Result<Vec<Operation>, RemotePatchError> {
    let path = op.path();
    let is_child_path = path.len() == 3 && path[1].is_field("children");

    let ops = match op {
        PatchOp::Unset { path } if path.is_empty() => {
            if tree.len() == 1 && is_empty_document(tree, schema) {
                Vec::new()
            } else {
                let mut ops = Vec::new();
                diff_children(&[], tree, &[placeholder(schema, keys)], &mut ops);
                ops
            }
        }
        PatchOp::Set { value, .. } if path.is_empty() => replace_document(tree, value, schema, keys)?,
        PatchOp::SetIfMissing { value, .. } if path.is_empty() => {
            if is_empty_document(tree, schema) {
                replace_document(tree, value, schema, keys)?
            } else {
                Vec::new()
            }
        }
        _ if path.is_empty() => {
            return Err(RemotePatchError::Unsupported {
                kind: op.kind(),
                path: display_path(path),
            });
        }

        PatchOp::Insert {
            path,
            position,
            items,
        } if path.len() == 1 => insert_blocks(tree, schema, path, *position, items)?,
        PatchOp::Insert {
            path,
            position,
            items,
        } if is_child_path => insert_children(tree, schema, path, *position, items)?,

        PatchOp::Unset { path } if path.len() == 1 => match locate_block(tree, &path[0]) {
            Some(b) => {
                let mut ops = vec![Operation::RemoveNode {
                    path: vec![b],
                    node: tree[b].clone(),
                }];
                if tree.len() == 1 {
                    ops.push(Operation::InsertNode {
                        path: vec![0],
                        node: placeholder(schema, keys),
                    });
                }
                ops
            }
            None => Vec::new(),
        },
        PatchOp::Unset { path } if is_child_path => match locate_child(tree, path) {
            Some((b, c)) if !tree[b].is_void() => vec![Operation::RemoveNode {
                path: vec![b, c],
                node: tree[b].children().unwrap_or_default()[c].clone(),
            }],
            _ => Vec::new(),
        },

        PatchOp::SetIfMissing { path, .. } if path.len() == 1 => {
            if locate_block(tree, &path[0]).is_some() {
                Vec::new()
            } else {
                return Err(unresolved(path));
            }
        }
        PatchOp::DiffMatchPatch { path, .. } if path.len() == 1 => {
            return Err(RemotePatchError::Unsupported {
                kind: op.kind(),
                path: display_path(path),
            });
        }

        _ => rebase_block(tree, schema, op)?,
    };

    debug!("Remote {} became {} operation(s)", op.kind(), ops.len());
    Ok(ops)
}
