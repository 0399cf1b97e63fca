use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::{Node, path, texts};
use crate::editing::Operation;

/// A caret position: a text node path and a character offset into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub path: Vec<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub anchor: Point,
    pub focus: Point,
}

impl Point {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self { path, offset }
    }

    pub fn compare(&self, other: &Point) -> Ordering {
        match path::compare(&self.path, &other.path) {
            Ordering::Equal => self.offset.cmp(&other.offset),
            ordering => ordering,
        }
    }

    /// Follow `op`; points inside inserted text or at a split move forward.
    /// `None` when the point's node was removed.
    pub fn transform(&self, op: &Operation) -> Option<Point> {
        let mut p = self.clone();
        match op {
            Operation::InsertText {
                path,
                offset,
                text,
            } => {
                if *path == p.path && *offset <= p.offset {
                    p.offset += text.chars().count();
                }
            }
            Operation::RemoveText {
                path,
                offset,
                text,
            } => {
                if *path == p.path && *offset <= p.offset {
                    p.offset -= (p.offset - offset).min(text.chars().count());
                }
            }
            Operation::MergeNode {
                path: op_path,
                position,
                ..
            } => {
                if *op_path == p.path {
                    p.offset += position;
                }
                p.path = path::transform(&p.path, op)?;
            }
            Operation::SplitNode {
                path: op_path,
                position,
                ..
            } => {
                if *op_path == p.path {
                    if *position <= p.offset {
                        p.offset -= position;
                        p.path = path::next(&p.path);
                    }
                } else {
                    p.path = path::transform(&p.path, op)?;
                }
            }
            _ => p.path = path::transform(&p.path, op)?,
        }
        Some(p)
    }
}

impl Range {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Follow `op` applied to produce `tree`; endpoints whose node was
    /// removed fall back to the nearest remaining text
    pub fn transform(&self, op: &Operation, tree: &[Node]) -> Option<Range> {
        let endpoint = |point: &Point| {
            point.transform(op).or_else(|| match op {
                Operation::RemoveNode { path, .. } => nearest_text(tree, path),
                _ => None,
            })
        };
        Some(Range {
            anchor: endpoint(&self.anchor)?,
            focus: endpoint(&self.focus)?,
        })
    }
}

fn common_len(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Closest text to where a removed node used to be, preferring the end of
/// the previous text unless the next one shares more ancestry
pub fn nearest_text(tree: &[Node], removed: &[usize]) -> Option<Point> {
    let all = texts(tree);
    let split = all
        .iter()
        .position(|(p, _)| path::compare(p, removed) != Ordering::Less)
        .unwrap_or(all.len());
    let prev = split.checked_sub(1).map(|i| &all[i]);
    let next = all.get(split);

    let prefer_next = match (prev, next) {
        (Some((prev_path, _)), Some((next_path, _))) => {
            if path::is_sibling(prev_path, removed) {
                false
            } else if next_path.as_slice() == removed {
                true
            } else {
                common_len(prev_path, removed) < common_len(next_path, removed)
            }
        }
        _ => false,
    };

    match (prev, next) {
        (Some((path, text)), _) if !prefer_next => Some(Point::new(path.clone(), text.len())),
        (_, Some((path, _))) => Some(Point::new(path.clone(), 0)),
        _ => None,
    }
}
