//! Selections as collaborators see them: keyed paths instead of indexes.

use serde::{Deserialize, Serialize};

use crate::models::{
    Path, PathSegment,
    path::{block_path, child_path},
};
use crate::tree::{Node, Point, Range};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSelectionPoint {
    pub path: Path,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSelection {
    pub anchor: EditorSelectionPoint,
    pub focus: EditorSelectionPoint,
    #[serde(default)]
    pub backward: bool,
}

fn to_editor_point(point: &Point, tree: &[Node]) -> Option<EditorSelectionPoint> {
    let (&b, rest) = point.path.split_first()?;
    let block = tree.get(b)?;
    let path = match rest.first() {
        Some(&c) if !block.is_void() => child_path(block.key(), block.children()?.get(c)?.key()),
        _ => block_path(block.key()),
    };
    Some(EditorSelectionPoint {
        path,
        offset: point.offset,
    })
}

fn from_editor_point(point: &EditorSelectionPoint, tree: &[Node]) -> Option<Point> {
    let block_key = point.path.first()?.as_key()?;
    let b = tree.iter().position(|n| n.key() == block_key)?;
    let block = &tree[b];

    let child_key = match point.path.as_slice() {
        [_] => None,
        [_, children, child, ..] if children.is_field("children") => Some(child.as_key()?),
        _ => return None,
    };
    let path = match child_key {
        Some(key) => {
            let c = block.children()?.iter().position(|n| n.key() == key)?;
            let child = &block.children()?[c];
            // Points inside an inline object sit on its empty text child
            if child.is_void() { vec![b, c, 0] } else { vec![b, c] }
        }
        None if block.is_void() => vec![b, 0],
        None => vec![b],
    };
    Some(Point::new(path, point.offset))
}

impl EditorSelection {
    pub fn from_range(range: &Range, tree: &[Node]) -> Option<Self> {
        Some(Self {
            anchor: to_editor_point(&range.anchor, tree)?,
            focus: to_editor_point(&range.focus, tree)?,
            backward: range.focus.compare(&range.anchor).is_lt(),
        })
    }

    /// `None` when either endpoint names something the tree does not have
    pub fn to_range(&self, tree: &[Node]) -> Option<Range> {
        Some(Range {
            anchor: from_editor_point(&self.anchor, tree)?,
            focus: from_editor_point(&self.focus, tree)?,
        })
    }

    pub fn collapsed(path: Path, offset: usize) -> Self {
        let point = EditorSelectionPoint { path, offset };
        Self {
            anchor: point.clone(),
            focus: point,
            backward: false,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

impl EditorSelectionPoint {
    pub fn block_key(&self) -> Option<&str> {
        self.path.first().and_then(PathSegment::as_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::{block, image, mention, span};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree() -> Vec<Node> {
        vec![
            block("a", vec![span("a1", "hi "), mention("m"), span("a2", "there")]),
            image("img"),
            block("e", vec![]),
        ]
    }

    #[test]
    fn test_keyed_paths() {
        let range = Range {
            anchor: Point::new(vec![0, 2], 3),
            focus: Point::new(vec![0, 0], 1),
        };

        let selection = EditorSelection::from_range(&range, &tree()).unwrap();
        assert_eq!(
            serde_json::to_value(&selection).unwrap(),
            json!({
                "anchor": {"path": [{"_key": "a"}, "children", {"_key": "a2"}], "offset": 3},
                "focus": {"path": [{"_key": "a"}, "children", {"_key": "a1"}], "offset": 1},
                "backward": true
            })
        );
        assert_eq!(selection.to_range(&tree()), Some(range));
    }

    #[test]
    fn test_void_points() {
        let nodes = tree();
        let on_image = Range::collapsed(Point::new(vec![1, 0], 0));
        let on_mention = Range::collapsed(Point::new(vec![0, 1, 0], 0));

        let selection = EditorSelection::from_range(&on_image, &nodes).unwrap();
        assert_eq!(selection.anchor.path, block_path("img"));
        assert_eq!(selection.to_range(&nodes), Some(on_image));

        let selection = EditorSelection::from_range(&on_mention, &nodes).unwrap();
        assert_eq!(selection.anchor.path, child_path("a", "m"));
        assert_eq!(selection.to_range(&nodes), Some(on_mention));
    }

    #[test]
    fn test_block_level_point() {
        let nodes = tree();
        let range = Range::collapsed(Point::new(vec![2], 0));

        let selection = EditorSelection::from_range(&range, &nodes).unwrap();
        assert_eq!(selection, EditorSelection::collapsed(block_path("e"), 0));
        assert_eq!(selection.anchor.block_key(), Some("e"));
        assert_eq!(selection.to_range(&nodes), Some(range));
    }

    #[test]
    fn test_unknown_keys_do_not_resolve() {
        let selection = EditorSelection::collapsed(child_path("a", "gone"), 0);

        assert_eq!(selection.to_range(&tree()), None);
    }
}
