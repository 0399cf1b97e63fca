//! Wire patches exchanged with the collaborative store.
//!
//! A patch is a small, path-addressed mutation of the document value:
//!
//! ```json
//! {"type": "insert", "path": [{"_key": "b1"}], "position": "after", "items": [...], "origin": "local"}
//! ```
//!
//! `origin` tells the receiving side whether the patch was produced by this
//! editor (`local`) or by a collaborator (`remote`); echoes of local patches
//! coming back from the transport are dropped on that basis.

pub mod apply;
pub mod dmp;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Path, path::display_path};

pub use apply::{PatchApplyError, apply_patch, apply_patches};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    /// Patches without an origin are treated as coming from elsewhere
    #[default]
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PatchOp {
    Set {
        path: Path,
        value: Value,
    },
    SetIfMissing {
        path: Path,
        value: Value,
    },
    Unset {
        path: Path,
    },
    Insert {
        path: Path,
        position: InsertPosition,
        items: Vec<Value>,
    },
    /// `value` is a diff-match-patch patch text applied to the string at `path`
    DiffMatchPatch {
        path: Path,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(flatten)]
    pub op: PatchOp,
    #[serde(default)]
    pub origin: Origin,
}

impl PatchOp {
    pub fn path(&self) -> &Path {
        match self {
            PatchOp::Set { path, .. }
            | PatchOp::SetIfMissing { path, .. }
            | PatchOp::Unset { path }
            | PatchOp::Insert { path, .. }
            | PatchOp::DiffMatchPatch { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PatchOp::Set { .. } => "set",
            PatchOp::SetIfMissing { .. } => "setIfMissing",
            PatchOp::Unset { .. } => "unset",
            PatchOp::Insert { .. } => "insert",
            PatchOp::DiffMatchPatch { .. } => "diffMatchPatch",
        }
    }

    /// Same operation with a different path
    pub fn with_path(&self, path: Path) -> PatchOp {
        match self.clone() {
            PatchOp::Set { value, .. } => PatchOp::Set { path, value },
            PatchOp::SetIfMissing { value, .. } => PatchOp::SetIfMissing { path, value },
            PatchOp::Unset { .. } => PatchOp::Unset { path },
            PatchOp::Insert {
                position, items, ..
            } => PatchOp::Insert {
                path,
                position,
                items,
            },
            PatchOp::DiffMatchPatch { value, .. } => PatchOp::DiffMatchPatch { path, value },
        }
    }
}

impl Patch {
    pub fn path(&self) -> &Path {
        self.op.path()
    }

    pub fn remote(op: PatchOp) -> Self {
        Self {
            op,
            origin: Origin::Remote,
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

impl std::fmt::Display for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op.kind(), display_path(self.op.path()))
    }
}

fn local(op: PatchOp) -> Patch {
    Patch {
        op,
        origin: Origin::Local,
    }
}

pub fn set(value: Value, path: Path) -> Patch {
    local(PatchOp::Set { path, value })
}

pub fn set_if_missing(value: Value, path: Path) -> Patch {
    local(PatchOp::SetIfMissing { path, value })
}

pub fn unset(path: Path) -> Patch {
    local(PatchOp::Unset { path })
}

pub fn insert(items: Vec<Value>, position: InsertPosition, path: Path) -> Patch {
    local(PatchOp::Insert {
        path,
        position,
        items,
    })
}

pub fn diff_match_patch(value: String, path: Path) -> Patch {
    local(PatchOp::DiffMatchPatch { path, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PathSegment, path::block_path};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_insert_patch_wire_format() {
        let patch = insert(
            vec![json!({"_key": "b2", "_type": "block", "children": []})],
            InsertPosition::After,
            block_path("b1"),
        );

        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({
                "type": "insert",
                "path": [{"_key": "b1"}],
                "position": "after",
                "items": [{"_key": "b2", "_type": "block", "children": []}],
                "origin": "local"
            })
        );
    }

    #[test]
    fn test_parse_remote_patch_defaults_origin() {
        let patch: Patch = serde_json::from_value(json!({
            "type": "diffMatchPatch",
            "path": [{"_key": "b1"}, "children", {"_key": "s1"}, "text"],
            "value": "@@ -1,3 +1,4 @@\n abc\n+d\n"
        }))
        .unwrap();

        assert_eq!(patch.origin, Origin::Remote);
        assert_eq!(patch.path()[1], PathSegment::field("children"));
        assert!(matches!(patch.op, PatchOp::DiffMatchPatch { .. }));
    }

    #[test]
    fn test_set_if_missing_and_unset_wire_format() {
        assert_eq!(
            serde_json::to_value(set_if_missing(json!([]), vec![])).unwrap(),
            json!({"type": "setIfMissing", "path": [], "value": [], "origin": "local"})
        );
        assert_eq!(
            serde_json::to_value(unset(vec![])).unwrap(),
            json!({"type": "unset", "path": [], "origin": "local"})
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(unset(block_path("b1")).to_string(), "unset [_key==\"b1\"]");
    }
}
