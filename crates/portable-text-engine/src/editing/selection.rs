//! Selection adjustment for remote patches.
//!
//! Remote operations are applied without transforming the selection, so the
//! caret would otherwise keep pointing at whatever index it had before. After
//! each remote patch the selection is adjusted here, endpoint by endpoint,
//! looking at the patch itself and the trees before and after it. Once the
//! whole batch is in, [`resolve_selection`] clamps the result onto a node
//! that exists.

use log::debug;

use super::from_patches::{locate_block, locate_child};
use crate::patch::{InsertPosition, PatchOp, dmp};
use crate::tree::{Node, Point, Range, Snapshot};

fn text_len(tree: &Snapshot, path: &[usize]) -> usize {
    tree.text(path).map_or(0, |t| t.len())
}

/// Shift an offset past every hunk that ends at or before it
fn shift_for_text_patch(offset: usize, patch_text: &str) -> Option<usize> {
    let hunks = match dmp::from_text(patch_text) {
        Ok(hunks) => hunks,
        Err(error) => {
            debug!("Not adjusting selection for malformed text patch: {error}");
            return None;
        }
    };
    let mut offset = offset as isize;
    for hunk in &hunks {
        let region = hunk.edit_range();
        if region.end as isize <= offset {
            offset = (offset + hunk.delta()).max(region.start as isize);
        }
    }
    Some(offset.max(0) as usize)
}

fn adjust_point(point: &Point, patch: &PatchOp, previous: &Snapshot, current: &Snapshot) -> Point {
    let mut p = point.clone();
    match patch {
        PatchOp::DiffMatchPatch { path, value } => {
            if let Some((b, c)) = locate_child(previous, path)
                && p.path.starts_with(&[b, c])
                && p.path.len() == 2
                && let Some(offset) = shift_for_text_patch(p.offset, value)
            {
                p.offset = offset;
            }
        }

        PatchOp::Unset { path } if path.is_empty() => {
            p = Point::new(vec![0, 0], 0);
        }

        PatchOp::Unset { path } if path.len() == 1 => {
            if let Some(b) = locate_block(previous, &path[0])
                && p.path.first().is_some_and(|pb| *pb > b)
            {
                p.path[0] -= 1;
            }
        }

        PatchOp::Unset { path } if path.len() == 3 => {
            let Some((b, c)) = locate_child(previous, path) else {
                return p;
            };
            if p.path.first() != Some(&b) || p.path.len() < 2 {
                return p;
            }
            let removed_key = path[2].as_key().unwrap_or_default();
            if p.path[1] == c {
                if let Some((nb, nc)) = current.keys().find_child_anywhere(removed_key)
                    && !removed_key.is_empty()
                {
                    // The child lives on elsewhere, e.g. in the second half of a split block
                    p.path[0] = nb;
                    p.path[1] = nc;
                } else if c > 0 {
                    p.path = vec![b, c - 1];
                    p.offset = text_len(current, &p.path);
                } else if current
                    .get(b)
                    .and_then(Node::children)
                    .is_some_and(|children| !children.is_empty())
                {
                    p = Point::new(vec![b, 0], 0);
                } else {
                    p = Point::new(vec![b], 0);
                }
            } else if p.path[1] > c {
                // Later children keep their node and offset, only the index moves
                p.path[1] -= 1;
            }
        }

        PatchOp::Insert {
            path,
            position,
            items,
        } if path.len() == 1 => {
            let Some(reference) = locate_block(previous, &path[0]).or_else(|| {
                // Inserting before index 0 of an empty list
                previous.is_empty().then_some(0)
            }) else {
                return p;
            };
            let at = reference + usize::from(*position == InsertPosition::After && !previous.is_empty());
            let inserted = items
                .iter()
                .filter_map(|item| item.get("_key").and_then(|k| k.as_str()))
                .filter(|key| previous.keys().block(key).is_none() && current.keys().block(key).is_some())
                .count();
            let placeholder_gone = previous.len() == 1
                && current.keys().block(previous[0].key()).is_none()
                && inserted > 0;
            if placeholder_gone {
                p = Point::new(vec![0, 0], 0);
            } else if p.path.first().is_some_and(|pb| *pb >= at) {
                p.path[0] += inserted;
            }
        }

        PatchOp::Insert {
            path,
            position,
            items,
        } if path.len() == 3 => {
            let Some((b, c)) = locate_child(previous, path) else {
                return p;
            };
            let at = c + usize::from(*position == InsertPosition::After);
            let known = |key: &str| previous.keys().child(previous[b].key(), key).is_some();
            let inserted = items
                .iter()
                .filter_map(|item| item.get("_key").and_then(|k| k.as_str()))
                .filter(|key| !known(*key))
                .count();
            if inserted == 0 || p.path.first() != Some(&b) || p.path.len() < 2 {
                return p;
            }

            let length = text_len(current, &[b, c]);
            let new_is_text = current.text(&[b, at]).is_some();
            if *position == InsertPosition::After
                && p.path.len() == 2
                && p.path[1] == c
                && new_is_text
                && p.offset >= length
            {
                // The text past the old end now lives in the inserted span
                p.path[1] = at;
                p.offset -= length;
            } else if p.path[1] >= at {
                p.path[1] += inserted;
            }
        }

        _ => {}
    }
    p
}

/// Adjust `selection` for a remote patch that turned `previous` into
/// `current`; `None` when nothing needs to change
pub fn adjust_selection(
    selection: &Range,
    patch: &PatchOp,
    previous: &Snapshot,
    current: &Snapshot,
) -> Option<Range> {
    let adjusted = Range {
        anchor: adjust_point(&selection.anchor, patch, previous, current),
        focus: adjust_point(&selection.focus, patch, previous, current),
    };
    if &adjusted == selection {
        return None;
    }
    debug!(
        "Adjusted selection for remote {} from {:?} to {:?}",
        patch.kind(),
        selection,
        adjusted
    );
    Some(adjusted)
}

fn start_of(tree: &[Node], mut path: Vec<usize>) -> Point {
    while let Some(children) = crate::tree::node_at(tree, &path).and_then(Node::children) {
        if children.is_empty() {
            break;
        }
        path.push(0);
    }
    Point::new(path, 0)
}

fn end_of(tree: &[Node], mut path: Vec<usize>) -> Point {
    loop {
        match crate::tree::node_at(tree, &path) {
            Some(Node::Text(text)) => return Point::new(path, text.len()),
            Some(Node::Element(element)) if !element.children.is_empty() => {
                path.push(element.children.len() - 1);
            }
            _ => return Point::new(path, 0),
        }
    }
}

fn resolve_point(point: &Point, tree: &[Node]) -> Option<Point> {
    let last_block = tree.len().checked_sub(1)?;
    let b = point.path.first().copied().unwrap_or(0);
    if b > last_block {
        return Some(end_of(tree, vec![last_block]));
    }

    let mut path = vec![b];
    let mut node = &tree[b];
    for index in point.path.iter().skip(1) {
        let Node::Element(element) = node else {
            break;
        };
        if element.children.is_empty() {
            break;
        }
        if *index >= element.children.len() {
            path.push(element.children.len() - 1);
            return Some(end_of(tree, path));
        }
        path.push(*index);
        node = &element.children[*index];
    }

    Some(match node {
        Node::Text(text) => Point::new(path, point.offset.min(text.len())),
        Node::Element(_) => start_of(tree, path),
    })
}

/// Clamp a selection onto nodes that exist in `tree`
pub fn resolve_selection(selection: &Range, tree: &[Node]) -> Option<Range> {
    Some(Range {
        anchor: resolve_point(&selection.anchor, tree)?,
        focus: resolve_point(&selection.focus, tree)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::path::{block_path, child_path, text_path};
    use crate::tree::test_support::{block, image, span};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(path: &[usize], offset: usize) -> Range {
        Range::collapsed(Point::new(path.to_vec(), offset))
    }

    fn blocks(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| block(&format!("b{i}"), vec![span(&format!("s{i}"), "text")]))
            .collect()
    }

    #[test]
    fn test_block_insert_shifts_later_blocks() {
        let previous = Snapshot::new(blocks(7));
        let mut nodes = blocks(7);
        nodes.insert(3, block("new", vec![span("n", "")]));
        let current = Snapshot::new(nodes);
        let patch = PatchOp::Insert {
            path: block_path("b2"),
            position: InsertPosition::After,
            items: vec![json!({"_key": "new", "_type": "block"})],
        };

        assert_eq!(
            adjust_selection(&at(&[5, 0], 2), &patch, &previous, &current),
            Some(at(&[6, 0], 2))
        );
        assert_eq!(adjust_selection(&at(&[1, 0], 2), &patch, &previous, &current), None);
    }

    #[test]
    fn test_text_patch_before_caret_shifts_offset() {
        let tree = Snapshot::new(vec![block("b", vec![span("s", "hello world")])]);
        let patch = PatchOp::DiffMatchPatch {
            path: text_path("b", "s"),
            value: dmp::make_patch_text("hello world", "heXYZllo world"),
        };

        assert_eq!(
            adjust_selection(&at(&[0, 0], 8), &patch, &tree, &tree),
            Some(at(&[0, 0], 11))
        );
        assert_eq!(adjust_selection(&at(&[0, 0], 1), &patch, &tree, &tree), None);
    }

    #[test]
    fn test_text_patch_overlapping_caret_leaves_it() {
        let tree = Snapshot::new(vec![block("b", vec![span("s", "hello world")])]);
        let patch = PatchOp::DiffMatchPatch {
            path: text_path("b", "s"),
            value: dmp::make_patch_text("hello world", "help world"),
        };

        assert_eq!(adjust_selection(&at(&[0, 0], 3), &patch, &tree, &tree), None);
        assert_eq!(
            adjust_selection(&at(&[0, 0], 9), &patch, &tree, &tree),
            Some(at(&[0, 0], 8))
        );
    }

    #[test]
    fn test_malformed_text_patch_changes_nothing() {
        let tree = Snapshot::new(vec![block("b", vec![span("s", "hello")])]);
        let patch = PatchOp::DiffMatchPatch {
            path: text_path("b", "s"),
            value: "not a patch".to_string(),
        };

        assert_eq!(adjust_selection(&at(&[0, 0], 3), &patch, &tree, &tree), None);
    }

    #[test]
    fn test_removing_only_child_falls_back_to_block_start() {
        let previous = Snapshot::new(vec![block("b", vec![span("s", "hello")])]);
        let current = Snapshot::new(vec![block("b", vec![])]);
        let patch = PatchOp::Unset {
            path: child_path("b", "s"),
        };

        assert_eq!(
            adjust_selection(&at(&[0, 0], 3), &patch, &previous, &current),
            Some(at(&[0], 0))
        );
    }

    #[test]
    fn test_removing_child_retargets_previous_sibling() {
        let previous = Snapshot::new(vec![block(
            "b",
            vec![span("s1", "ab"), span("s2", "cd"), span("s3", "ef")],
        )]);
        let current = Snapshot::new(vec![block("b", vec![span("s1", "ab"), span("s3", "ef")])]);
        let patch = PatchOp::Unset {
            path: child_path("b", "s2"),
        };

        assert_eq!(
            adjust_selection(&at(&[0, 1], 1), &patch, &previous, &current),
            Some(at(&[0, 0], 2))
        );
        assert_eq!(
            adjust_selection(&at(&[0, 2], 1), &patch, &previous, &current),
            Some(at(&[0, 1], 1))
        );
    }

    #[test]
    fn test_block_unset_decrements_later_blocks() {
        let previous = Snapshot::new(blocks(3));
        let mut nodes = blocks(3);
        nodes.remove(0);
        let current = Snapshot::new(nodes);
        let patch = PatchOp::Unset {
            path: block_path("b0"),
        };

        assert_eq!(
            adjust_selection(&at(&[2, 0], 1), &patch, &previous, &current),
            Some(at(&[1, 0], 1))
        );
    }

    #[test]
    fn test_split_insert_moves_caret_into_new_span() {
        let previous = Snapshot::new(vec![block("b", vec![span("s", "he")])]);
        let current = Snapshot::new(vec![block("b", vec![span("s", "he"), span("t", "llo")])]);
        let patch = PatchOp::Insert {
            path: child_path("b", "s"),
            position: InsertPosition::After,
            items: vec![json!({"_key": "t", "_type": "span", "text": "llo"})],
        };

        assert_eq!(
            adjust_selection(&at(&[0, 0], 4), &patch, &previous, &current),
            Some(at(&[0, 1], 2))
        );
        assert_eq!(adjust_selection(&at(&[0, 0], 1), &patch, &previous, &current), None);
    }

    #[test]
    fn test_resolve_selection() {
        let tree = vec![
            block("a", vec![span("a1", "abc")]),
            image("img"),
            block("e", vec![]),
        ];

        assert_eq!(resolve_selection(&at(&[0, 0], 9), &tree), Some(at(&[0, 0], 3)));
        assert_eq!(resolve_selection(&at(&[0, 4], 0), &tree), Some(at(&[0, 0], 3)));
        assert_eq!(resolve_selection(&at(&[1], 0), &tree), Some(at(&[1, 0], 0)));
        assert_eq!(resolve_selection(&at(&[2, 0], 5), &tree), Some(at(&[2], 0)));
        assert_eq!(resolve_selection(&at(&[7, 0], 5), &tree), Some(at(&[2], 0)));
        assert_eq!(resolve_selection(&at(&[0, 0], 0), &[]), None);
    }
}
