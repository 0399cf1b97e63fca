//! Index-path arithmetic: comparisons and how a path moves when an
//! operation is applied elsewhere in the tree.

use std::cmp::Ordering;

use crate::editing::Operation;

pub fn parent(path: &[usize]) -> &[usize] {
    path.split_last().map_or(&[], |(_, parent)| parent)
}

pub fn next(path: &[usize]) -> Vec<usize> {
    let mut next = path.to_vec();
    if let Some(last) = next.last_mut() {
        *last += 1;
    }
    next
}

/// `None` for a first child or the root
pub fn previous(path: &[usize]) -> Option<Vec<usize>> {
    let mut previous = path.to_vec();
    let last = previous.last_mut()?;
    *last = last.checked_sub(1)?;
    Some(previous)
}

/// Document order, ancestors sorting equal to their descendants
pub fn compare(a: &[usize], b: &[usize]) -> Ordering {
    let len = a.len().min(b.len());
    a[..len].cmp(&b[..len])
}

pub fn is_ancestor(ancestor: &[usize], path: &[usize]) -> bool {
    ancestor.len() < path.len() && path.starts_with(ancestor)
}

pub fn is_sibling(a: &[usize], b: &[usize]) -> bool {
    !a.is_empty() && a.len() == b.len() && parent(a) == parent(b) && a != b
}

/// `a` ends before `b` at `a`'s depth: same parent, smaller last index
pub fn ends_before(a: &[usize], b: &[usize]) -> bool {
    let Some((last, parent)) = a.split_last() else {
        return false;
    };
    b.len() > parent.len() && b.starts_with(parent) && *last < b[parent.len()]
}

/// Is `path` strictly after `other` in document order, ancestors excluded
pub fn is_after(path: &[usize], other: &[usize]) -> bool {
    compare(path, other) == Ordering::Greater
}

/// Where `path` ends up once `op` has been applied; `None` if its node was removed
pub fn transform(path: &[usize], op: &Operation) -> Option<Vec<usize>> {
    let mut p = path.to_vec();
    if p.is_empty() {
        return Some(p);
    }

    match op {
        Operation::InsertNode { path: op, .. } => {
            if op == &p || ends_before(op, &p) || is_ancestor(op, &p) {
                p[op.len() - 1] += 1;
            }
        }
        Operation::RemoveNode { path: op, .. } => {
            if op == &p || is_ancestor(op, &p) {
                return None;
            }
            if ends_before(op, &p) {
                p[op.len() - 1] -= 1;
            }
        }
        Operation::MergeNode {
            path: op, position, ..
        } => {
            if op == &p || ends_before(op, &p) {
                p[op.len() - 1] -= 1;
            } else if is_ancestor(op, &p) {
                p[op.len() - 1] -= 1;
                p[op.len()] += position;
            }
        }
        Operation::SplitNode {
            path: op, position, ..
        } => {
            if op == &p {
                // The node itself stays where it is
            } else if ends_before(op, &p) {
                p[op.len() - 1] += 1;
            } else if is_ancestor(op, &p) && path[op.len()] >= *position {
                p[op.len() - 1] += 1;
                p[op.len()] -= position;
            }
        }
        Operation::MoveNode { path: op, new_path } => {
            if op == new_path {
                return Some(p);
            }
            if op == &p || is_ancestor(op, &p) {
                let mut copy = new_path.clone();
                if ends_before(op, new_path) && op.len() < new_path.len() {
                    copy[op.len() - 1] -= 1;
                }
                copy.extend_from_slice(&p[op.len()..]);
                return Some(copy);
            }
            if is_sibling(op, new_path) && (is_ancestor(new_path, &p) || new_path == &p) {
                if ends_before(op, &p) {
                    p[op.len() - 1] -= 1;
                } else {
                    p[op.len() - 1] += 1;
                }
            } else if ends_before(new_path, &p) || new_path == &p || is_ancestor(new_path, &p) {
                if ends_before(op, &p) {
                    p[op.len() - 1] -= 1;
                }
                p[new_path.len() - 1] += 1;
            } else if ends_before(op, &p) {
                if new_path == &p {
                    p[new_path.len() - 1] += 1;
                }
                p[op.len() - 1] -= 1;
            }
        }
        Operation::InsertText { .. }
        | Operation::RemoveText { .. }
        | Operation::SetNode { .. }
        | Operation::SetSelection { .. } => {}
    }
    Some(p)
}
