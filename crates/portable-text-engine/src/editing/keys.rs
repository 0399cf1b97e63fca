//! Keys for nodes created by local edits.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use super::Operation;
use crate::tree::{Node, Snapshot, VOID_CHILD_KEY, path};

pub trait KeyGenerator {
    fn next_key(&mut self) -> String;
}

/// 12 hex characters of a random v4 UUID
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKeys;

impl KeyGenerator for RandomKeys {
    fn next_key(&mut self) -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }
}

impl<F: FnMut() -> String> KeyGenerator for F {
    fn next_key(&mut self) -> String {
        self()
    }
}

fn sibling_keys(tree: &Snapshot, at: &[usize]) -> HashSet<String> {
    let parent = path::parent(at);
    let siblings: &[Node] = if parent.is_empty() {
        tree.nodes()
    } else {
        tree.node(parent).and_then(Node::children).unwrap_or_default()
    };
    siblings.iter().map(|n| n.key().to_string()).collect()
}

fn set_key(node: &mut Node, key: String) {
    match node {
        Node::Element(element) => element.key = key,
        Node::Text(text) => text.key = key,
    }
}

/// Give `node` and its descendants keys that are non-empty and unique among siblings
fn rekey(node: &mut Node, taken: &HashSet<String>, keys: &mut dyn KeyGenerator) {
    if node.key().is_empty() || taken.contains(node.key()) {
        set_key(node, keys.next_key());
    }
    if node.is_void() {
        return;
    }
    if let Some(children) = node.children_mut() {
        let mut seen = HashSet::new();
        for child in children.iter_mut() {
            if child.key() == VOID_CHILD_KEY {
                continue;
            }
            rekey(child, &seen, keys);
            seen.insert(child.key().to_string());
        }
    }
}

/// Fill in keys on an operation about to be applied to `tree`.
///
/// Inserted nodes keep their key unless it is missing or already used by a
/// sibling; a split always gives the new node a fresh key.
pub fn assign_keys(op: Operation, tree: &Snapshot, keys: &mut dyn KeyGenerator) -> Operation {
    match op {
        Operation::InsertNode { path, mut node } => {
            rekey(&mut node, &sibling_keys(tree, &path), keys);
            Operation::InsertNode { path, node }
        }
        Operation::SplitNode {
            path,
            position,
            mut properties,
        } => {
            properties.insert("_key".to_string(), Value::String(keys.next_key()));
            Operation::SplitNode {
                path,
                position,
                properties,
            }
        }
        other => other,
    }
}
