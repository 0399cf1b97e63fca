use serde::{Deserialize, Serialize};
use serde_json::Map;
use serde_json::Value;

use crate::tree::{Node, Point, Range, path};

/// Properties map carried by `set_node`, `split_node` and `merge_node`
pub type Properties = Map<String, Value>;

/// One atomic edit of the editor tree.
///
/// Paths are index paths into the tree version the operation is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    InsertText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    InsertNode {
        path: Vec<usize>,
        node: Node,
    },
    RemoveNode {
        path: Vec<usize>,
        node: Node,
    },
    /// Merge the node at `path` into its previous sibling, which had
    /// `position` characters (or children) before the merge
    MergeNode {
        path: Vec<usize>,
        position: usize,
        properties: Properties,
    },
    /// Split the node at `path` at `position`; the new sibling gets `properties`
    SplitNode {
        path: Vec<usize>,
        position: usize,
        properties: Properties,
    },
    MoveNode {
        path: Vec<usize>,
        new_path: Vec<usize>,
    },
    SetNode {
        path: Vec<usize>,
        properties: Properties,
        new_properties: Properties,
    },
    SetSelection {
        properties: Option<Range>,
        new_properties: Option<Range>,
    },
}

fn previous_or_same(at: &[usize]) -> Vec<usize> {
    path::previous(at).unwrap_or_else(|| at.to_vec())
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::InsertText { .. } => "insert_text",
            Operation::RemoveText { .. } => "remove_text",
            Operation::InsertNode { .. } => "insert_node",
            Operation::RemoveNode { .. } => "remove_node",
            Operation::MergeNode { .. } => "merge_node",
            Operation::SplitNode { .. } => "split_node",
            Operation::MoveNode { .. } => "move_node",
            Operation::SetNode { .. } => "set_node",
            Operation::SetSelection { .. } => "set_selection",
        }
    }

    pub fn path(&self) -> Option<&[usize]> {
        match self {
            Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path, .. }
            | Operation::MergeNode { path, .. }
            | Operation::SplitNode { path, .. }
            | Operation::MoveNode { path, .. }
            | Operation::SetNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, Operation::SetSelection { .. })
    }

    /// The operation that undoes this one
    pub fn inverse(&self) -> Operation {
        match self.clone() {
            Operation::InsertText { path, offset, text } => {
                Operation::RemoveText { path, offset, text }
            }
            Operation::RemoveText { path, offset, text } => {
                Operation::InsertText { path, offset, text }
            }
            Operation::InsertNode { path, node } => Operation::RemoveNode { path, node },
            Operation::RemoveNode { path, node } => Operation::InsertNode { path, node },
            Operation::MergeNode {
                path,
                position,
                properties,
            } => Operation::SplitNode {
                path: previous_or_same(&path),
                position,
                properties,
            },
            Operation::SplitNode {
                path,
                position,
                properties,
            } => Operation::MergeNode {
                path: path::next(&path),
                position,
                properties,
            },
            Operation::MoveNode {
                path: from,
                new_path,
            } => {
                if from == new_path {
                    return self.clone();
                }
                if path::is_sibling(&from, &new_path) {
                    return Operation::MoveNode {
                        path: new_path,
                        new_path: from,
                    };
                }
                // Where the node landed, and where the slot after its old position went
                let landed = path::transform(&from, self).unwrap_or_else(|| new_path.clone());
                let back = path::transform(&path::next(&from), self).unwrap_or(from);
                Operation::MoveNode {
                    path: landed,
                    new_path: back,
                }
            }
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Operation::SetNode {
                path,
                properties: new_properties,
                new_properties: properties,
            },
            Operation::SetSelection {
                properties,
                new_properties,
            } => Operation::SetSelection {
                properties: new_properties,
                new_properties: properties,
            },
        }
    }

    /// This operation as it applies after `over` has been applied first;
    /// `None` if its target no longer exists
    pub fn rebase(&self, over: &Operation) -> Option<Operation> {
        let moved = |at: &[usize]| path::transform(at, over);
        let text_point = |at: &[usize], offset: usize| Point::new(at.to_vec(), offset).transform(over);

        Some(match self.clone() {
            Operation::InsertText { path, offset, text } => {
                let point = text_point(&path, offset)?;
                Operation::InsertText {
                    path: point.path,
                    offset: point.offset,
                    text,
                }
            }
            Operation::RemoveText { path, offset, text } => {
                let point = text_point(&path, offset)?;
                Operation::RemoveText {
                    path: point.path,
                    offset: point.offset,
                    text,
                }
            }
            Operation::InsertNode { path, node } => {
                // Removing the node at the insertion index leaves the gap where it was
                let path = match over {
                    Operation::RemoveNode { path: removed, .. } if *removed == path => path,
                    _ => moved(&path)?,
                };
                Operation::InsertNode { path, node }
            }
            Operation::RemoveNode { path, node } => Operation::RemoveNode {
                path: moved(&path)?,
                node,
            },
            Operation::MergeNode {
                path,
                position,
                properties,
            } => {
                // The merge target may have gained or lost text
                let target = text_point(&previous_or_same(&path), position)?;
                Operation::MergeNode {
                    path: moved(&path)?,
                    position: target.offset,
                    properties,
                }
            }
            Operation::SplitNode {
                path,
                position,
                properties,
            } => {
                let point = text_point(&path, position)?;
                Operation::SplitNode {
                    path: moved(&path)?,
                    position: point.offset,
                    properties,
                }
            }
            Operation::MoveNode { path, new_path } => Operation::MoveNode {
                path: moved(&path)?,
                new_path: moved(&new_path)?,
            },
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Operation::SetNode {
                path: moved(&path)?,
                properties,
                new_properties,
            },
            Operation::SetSelection { .. } => return None,
        })
    }
}
