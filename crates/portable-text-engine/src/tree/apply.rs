//! Apply one operation to the tree.

use serde_json::{Map, Value};

use super::{Element, Node, Text, TreeError, node_at, node_at_mut, path, siblings_mut};
use crate::editing::Operation;

/// Byte index of the `offset`th character, `None` past the end
pub(crate) fn byte_index(text: &str, offset: usize) -> Option<usize> {
    text.char_indices()
        .map(|(index, _)| index)
        .chain(std::iter::once(text.len()))
        .nth(offset)
}

fn text_mut<'a>(nodes: &'a mut [Node], at: &[usize]) -> Result<&'a mut String, TreeError> {
    match node_at_mut(nodes, at) {
        Some(Node::Text(text)) => Ok(&mut text.text),
        Some(Node::Element(_)) => Err(TreeError::NotText(at.to_vec())),
        None => Err(TreeError::NoNode(at.to_vec())),
    }
}

fn split_index(at: &[usize], op: &'static str) -> Result<usize, TreeError> {
    at.last().copied().ok_or(TreeError::RootPath { op })
}

fn offset_error(at: &[usize], offset: usize) -> TreeError {
    TreeError::OffsetOutOfRange {
        path: at.to_vec(),
        offset,
    }
}

pub fn apply_operation(nodes: &mut Vec<Node>, op: &Operation) -> Result<(), TreeError> {
    match op {
        Operation::InsertText {
            path: at,
            offset,
            text,
        } => {
            let target = text_mut(nodes, at)?;
            let index = byte_index(target, *offset).ok_or_else(|| offset_error(at, *offset))?;
            target.insert_str(index, text);
        }

        Operation::RemoveText {
            path: at,
            offset,
            text,
        } => {
            let target = text_mut(nodes, at)?;
            let start = byte_index(target, *offset).ok_or_else(|| offset_error(at, *offset))?;
            let end = byte_index(target, offset + text.chars().count())
                .ok_or_else(|| offset_error(at, offset + text.chars().count()))?;
            if target[start..end] != *text {
                return Err(TreeError::TextMismatch {
                    path: at.clone(),
                    offset: *offset,
                    expected: text.clone(),
                });
            }
            target.replace_range(start..end, "");
        }

        Operation::InsertNode { path: at, node } => {
            let index = split_index(at, "insert a node")?;
            let siblings = siblings_mut(nodes, at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            if index > siblings.len() {
                return Err(TreeError::NoNode(at.to_vec()));
            }
            siblings.insert(index, node.clone());
        }

        Operation::RemoveNode { path: at, .. } => {
            let index = split_index(at, "remove a node")?;
            let siblings = siblings_mut(nodes, at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            if index >= siblings.len() {
                return Err(TreeError::NoNode(at.to_vec()));
            }
            siblings.remove(index);
        }

        Operation::MergeNode { path: at, .. } => {
            let index = split_index(at, "merge a node")?;
            let previous = path::previous(at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            let absorbed = node_at(nodes, at)
                .cloned()
                .ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            let target = node_at_mut(nodes, &previous).ok_or(TreeError::NoNode(previous))?;
            match (target, absorbed) {
                (Node::Text(target), Node::Text(absorbed)) => target.text.push_str(&absorbed.text),
                (Node::Element(target), Node::Element(absorbed)) => {
                    target.children.extend(absorbed.children)
                }
                _ => return Err(TreeError::MergeMismatch(at.to_vec())),
            }
            if let Some(siblings) = siblings_mut(nodes, at) {
                siblings.remove(index);
            }
        }

        Operation::SplitNode {
            path: at,
            position,
            properties,
        } => {
            let index = split_index(at, "split a node")?;
            let original = node_at_mut(nodes, at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            let mut created = match original {
                Node::Text(text) => {
                    let split = byte_index(&text.text, *position)
                        .ok_or_else(|| offset_error(at, *position))?;
                    let rest = text.text.split_off(split);
                    Node::Text(Text {
                        text: rest,
                        ..text.clone()
                    })
                }
                Node::Element(element) => {
                    if *position > element.children.len() {
                        return Err(offset_error(at, *position));
                    }
                    let rest = element.children.split_off(*position);
                    Node::Element(Element {
                        children: rest,
                        ..element.clone()
                    })
                }
            };
            created.apply_properties(properties)?;
            let siblings = siblings_mut(nodes, at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            siblings.insert(index + 1, created);
        }

        Operation::MoveNode { path: at, new_path } => {
            if path::is_ancestor(at, new_path) {
                return Err(TreeError::MoveIntoSelf {
                    from: at.to_vec(),
                    to: new_path.clone(),
                });
            }
            let index = split_index(at, "move a node")?;
            let landing = path::transform(at, op).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            let siblings = siblings_mut(nodes, at).ok_or_else(|| TreeError::NoNode(at.to_vec()))?;
            if index >= siblings.len() {
                return Err(TreeError::NoNode(at.to_vec()));
            }
            let node = siblings.remove(index);
            let new_index = split_index(&landing, "move a node")?;
            let siblings =
                siblings_mut(nodes, &landing).ok_or_else(|| TreeError::NoNode(landing.clone()))?;
            if new_index > siblings.len() {
                return Err(TreeError::NoNode(landing));
            }
            siblings.insert(new_index, node);
        }

        Operation::SetNode {
            path: at,
            properties,
            new_properties,
        } => {
            if at.is_empty() {
                return Err(TreeError::RootPath { op: "set properties" });
            }
            let mut overlay: Map<String, Value> = properties
                .keys()
                .filter(|name| !new_properties.contains_key(*name))
                .map(|name| (name.clone(), Value::Null))
                .collect();
            overlay.extend(new_properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            node_at_mut(nodes, at)
                .ok_or_else(|| TreeError::NoNode(at.to_vec()))?
                .apply_properties(&overlay)?;
        }

        Operation::SetSelection { .. } => {}
    }
    Ok(())
}
