use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in the document value, as exchanged with collaborators
pub type Path = Vec<PathSegment>;

/// One step of a document path
///
/// Keyed segments are preferred over indexes when addressing array members:
/// a key keeps pointing at the same member when siblings are inserted or
/// removed concurrently, an index does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array position; negative values count from the end (`-1` is the last item)
    Index(isize),
    /// Array member addressed by its `_key`
    Key(KeySegment),
    /// Object field name
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySegment {
    #[serde(rename = "_key")]
    pub key: String,
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment::Key(KeySegment { key: key.into() })
    }

    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(segment) => Some(&segment.key),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            PathSegment::Field(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.as_field() == Some(name)
    }

    /// Resolve an index segment against an array of `len` items.
    ///
    /// Negative indexes count from the end. The result may equal `len`,
    /// which is only meaningful as an insertion point.
    pub fn resolve_index(&self, len: usize) -> Option<usize> {
        match *self {
            PathSegment::Index(index) if index >= 0 => {
                let index = index as usize;
                (index <= len).then_some(index)
            }
            PathSegment::Index(index) => {
                let from_end = index.unsigned_abs();
                (from_end <= len).then(|| len - from_end)
            }
            _ => None,
        }
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index as isize)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "[{index}]"),
            PathSegment::Key(segment) => write!(f, "[_key==\"{}\"]", segment.key),
            PathSegment::Field(name) => write!(f, ".{name}"),
        }
    }
}

/// Render a path the way it reads in logs, e.g. `[_key=="a"].children[_key=="b"].text`
pub fn display_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().map(ToString::to_string).collect()
}

/// `[{_key: block}]`
pub fn block_path(block_key: &str) -> Path {
    vec![PathSegment::key(block_key)]
}

/// `[{_key: block}, "children", {_key: child}]`
pub fn child_path(block_key: &str, child_key: &str) -> Path {
    vec![
        PathSegment::key(block_key),
        PathSegment::field("children"),
        PathSegment::key(child_key),
    ]
}

/// `[{_key: block}, "children", {_key: span}, "text"]`
pub fn text_path(block_key: &str, span_key: &str) -> Path {
    let mut path = child_path(block_key, span_key);
    path.push(PathSegment::field("text"));
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_segments_deserialize_by_shape() {
        let path: Path = serde_json::from_value(json!([{"_key": "b1"}, "children", 0, -1])).unwrap();

        assert_eq!(
            path,
            vec![
                PathSegment::key("b1"),
                PathSegment::field("children"),
                PathSegment::Index(0),
                PathSegment::Index(-1),
            ]
        );
    }

    #[test]
    fn test_segments_serialize_to_wire_shape() {
        let value = serde_json::to_value(text_path("b1", "s1")).unwrap();

        assert_eq!(value, json!([{"_key": "b1"}, "children", {"_key": "s1"}, "text"]));
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(PathSegment::Index(0).resolve_index(0), Some(0));
        assert_eq!(PathSegment::Index(2).resolve_index(3), Some(2));
        assert_eq!(PathSegment::Index(4).resolve_index(3), None);
        assert_eq!(PathSegment::Index(-1).resolve_index(3), Some(2));
        assert_eq!(PathSegment::Index(-4).resolve_index(3), None);
        assert_eq!(PathSegment::key("a").resolve_index(3), None);
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(&[]), "<root>");
        assert_eq!(
            display_path(&text_path("b1", "s1")),
            "[_key==\"b1\"].children[_key==\"s1\"].text"
        );
    }
}
