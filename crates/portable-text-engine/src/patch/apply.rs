//! Apply wire patches to a plain JSON document value.
//!
//! This is what the store does with the patches an editor emits, and it is
//! what the editor uses to rebase a single block when a remote patch touches
//! something the operation level has no direct counterpart for.

use serde_json::Value;

use super::{InsertPosition, Patch, PatchOp, dmp};
use crate::models::{Path, PathSegment, path::display_path};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchApplyError {
    #[error("Path {0} does not resolve in the document")]
    Unresolved(String),
    #[error("Cannot {kind} at the document root")]
    RootNotSupported { kind: &'static str },
    #[error("Insert target {0} is not an array member")]
    NotAnArrayMember(String),
    #[error("diffMatchPatch target {0} is not a string")]
    NotAString(String),
    #[error("Invalid diffMatchPatch value at {path}: {source}")]
    InvalidDiff {
        path: String,
        #[source]
        source: dmp::DmpError,
    },
}

/// Position of a segment inside an array, keys resolved by `_key`
fn locate(items: &[Value], segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key(key) => items
            .iter()
            .position(|item| item.get("_key").and_then(Value::as_str) == Some(&key.key)),
        PathSegment::Index(_) => segment
            .resolve_index(items.len())
            .filter(|index| *index < items.len()),
        PathSegment::Field(_) => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (value, segment) {
        (Value::Object(object), PathSegment::Field(name)) => object.get_mut(name),
        (Value::Array(items), _) => {
            let index = locate(items, segment)?;
            items.get_mut(index)
        }
        _ => None,
    }
}

fn resolve_mut<'a>(value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(value, |current, segment| child_mut(current, segment))
}

/// Container that `path`'s last segment lives in
fn parent_mut<'a>(value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let (_, parent) = path.split_last()?;
    resolve_mut(value, parent)
}

fn write(
    value: &mut Value,
    path: &Path,
    new: Value,
    only_if_missing: bool,
) -> Result<(), PatchApplyError> {
    let Some(last) = path.last() else {
        if !only_if_missing || value.is_null() {
            *value = new;
        }
        return Ok(());
    };
    let unresolved = || PatchApplyError::Unresolved(display_path(path));
    let parent = parent_mut(value, path).ok_or_else(unresolved)?;
    match (parent, last) {
        (Value::Object(object), PathSegment::Field(name)) => {
            let missing = object.get(name).is_none_or(Value::is_null);
            if !only_if_missing || missing {
                object.insert(name.clone(), new);
            }
            Ok(())
        }
        (Value::Array(items), segment) => {
            let index = locate(items, segment).ok_or_else(unresolved)?;
            if !only_if_missing || items[index].is_null() {
                items[index] = new;
            }
            Ok(())
        }
        _ => Err(unresolved()),
    }
}

fn remove(value: &mut Value, path: &Path) {
    let Some(last) = path.last() else {
        *value = Value::Null;
        return;
    };
    match (parent_mut(value, path), last) {
        (Some(Value::Object(object)), PathSegment::Field(name)) => {
            object.remove(name);
        }
        (Some(Value::Array(items)), segment) => {
            if let Some(index) = locate(items, segment) {
                items.remove(index);
            }
        }
        _ => {}
    }
}

fn insert_items(
    value: &mut Value,
    path: &Path,
    position: InsertPosition,
    new_items: &[Value],
) -> Result<(), PatchApplyError> {
    let Some(last) = path.last() else {
        return Err(PatchApplyError::RootNotSupported { kind: "insert" });
    };
    let Some(Value::Array(items)) = parent_mut(value, path) else {
        return Err(PatchApplyError::NotAnArrayMember(display_path(path)));
    };

    let at = match (last, position) {
        // `-1` on an empty array names the (missing) last item
        (PathSegment::Index(-1), InsertPosition::After) if items.is_empty() => 0,
        (PathSegment::Index(_), _) => {
            let len = items.len();
            let index = last
                .resolve_index(len)
                .ok_or_else(|| PatchApplyError::Unresolved(display_path(path)))?;
            match position {
                InsertPosition::Before => index,
                InsertPosition::After => (index + 1).min(len),
            }
        }
        (segment, position) => {
            let index = locate(items, segment)
                .ok_or_else(|| PatchApplyError::Unresolved(display_path(path)))?;
            match position {
                InsertPosition::Before => index,
                InsertPosition::After => index + 1,
            }
        }
    };
    items.splice(at..at, new_items.iter().cloned());
    Ok(())
}

fn diff_match_patch(value: &mut Value, path: &Path, patch_text: &str) -> Result<(), PatchApplyError> {
    let target = resolve_mut(value, path)
        .ok_or_else(|| PatchApplyError::Unresolved(display_path(path)))?;
    let Value::String(text) = target else {
        return Err(PatchApplyError::NotAString(display_path(path)));
    };
    let (patched, _) =
        dmp::apply_patch_text(patch_text, text).map_err(|source| PatchApplyError::InvalidDiff {
            path: display_path(path),
            source,
        })?;
    *text = patched;
    Ok(())
}

/// Apply one patch in place
pub fn apply_patch(value: &mut Value, op: &PatchOp) -> Result<(), PatchApplyError> {
    match op {
        PatchOp::Set { path, value: new } => write(value, path, new.clone(), false),
        PatchOp::SetIfMissing { path, value: new } => write(value, path, new.clone(), true),
        PatchOp::Unset { path } => {
            remove(value, path);
            Ok(())
        }
        PatchOp::Insert {
            path,
            position,
            items,
        } => insert_items(value, path, *position, items),
        PatchOp::DiffMatchPatch { path, value: text } => diff_match_patch(value, path, text),
    }
}

/// Apply patches in order to a copy of `value`
pub fn apply_patches(value: &Value, patches: &[Patch]) -> Result<Value, PatchApplyError> {
    let mut value = value.clone();
    for patch in patches {
        apply_patch(&mut value, &patch.op)?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::path::{block_path, child_path, text_path};
    use crate::patch::{diff_match_patch as dmp_patch, insert, set, set_if_missing, unset};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn doc() -> Value {
        json!([
            {"_key": "a", "_type": "block", "style": "normal", "children": [
                {"_key": "a1", "_type": "span", "text": "hello world", "marks": []}
            ]},
            {"_key": "b", "_type": "block", "children": []}
        ])
    }

    #[test]
    fn test_root_set_if_missing_and_unset() {
        let value = apply_patches(&Value::Null, &[set_if_missing(json!([]), vec![])]).unwrap();
        assert_eq!(value, json!([]));

        let value = apply_patches(&doc(), &[set_if_missing(json!([]), vec![])]).unwrap();
        assert_eq!(value, doc());

        let value = apply_patches(&doc(), &[unset(vec![])]).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[rstest]
    #[case(InsertPosition::Before, block_path("a"), vec!["x", "a", "b"])]
    #[case(InsertPosition::After, block_path("a"), vec!["a", "x", "b"])]
    #[case(InsertPosition::After, vec![PathSegment::Index(-1)], vec!["a", "b", "x"])]
    #[case(InsertPosition::Before, vec![PathSegment::Index(0)], vec!["x", "a", "b"])]
    fn test_insert_block(
        #[case] position: InsertPosition,
        #[case] path: Path,
        #[case] expected: Vec<&str>,
    ) {
        let block = json!({"_key": "x", "_type": "block", "children": []});
        let value = apply_patches(&doc(), &[insert(vec![block], position, path)]).unwrap();

        let keys: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["_key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_insert_after_last_of_empty_array() {
        let span = json!({"_key": "b1", "_type": "span", "text": "", "marks": []});
        let path = vec![
            PathSegment::key("b"),
            PathSegment::field("children"),
            PathSegment::Index(-1),
        ];
        let value = apply_patches(&doc(), &[insert(vec![span.clone()], InsertPosition::After, path)])
            .unwrap();

        assert_eq!(value[1]["children"], json!([span]));
    }

    #[test]
    fn test_set_and_unset_fields() {
        let value = apply_patches(
            &doc(),
            &[
                set(json!("h1"), vec![PathSegment::key("a"), PathSegment::field("style")]),
                unset(vec![PathSegment::key("b"), PathSegment::field("children")]),
                set_if_missing(json!([]), vec![PathSegment::key("a"), PathSegment::field("markDefs")]),
            ],
        )
        .unwrap();

        assert_eq!(value[0]["style"], json!("h1"));
        assert_eq!(value[0]["markDefs"], json!([]));
        assert_eq!(value[1].get("children"), None);
    }

    #[test]
    fn test_unset_missing_path_is_noop() {
        let value = apply_patches(&doc(), &[unset(child_path("zz", "q"))]).unwrap();

        assert_eq!(value, doc());
    }

    #[test]
    fn test_diff_match_patch_on_text() {
        let patch = dmp::make_patch_text("hello world", "hello brave world");
        let value = apply_patches(&doc(), &[dmp_patch(patch, text_path("a", "a1"))]).unwrap();

        assert_eq!(value[0]["children"][0]["text"], json!("hello brave world"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            apply_patches(&doc(), &[set(json!(1), vec![PathSegment::key("nope"), PathSegment::field("x")])]),
            Err(PatchApplyError::Unresolved("[_key==\"nope\"].x".to_string()))
        );
        assert!(matches!(
            apply_patches(&doc(), &[dmp_patch("garbage".to_string(), text_path("a", "a1"))]),
            Err(PatchApplyError::InvalidDiff { .. })
        ));
        assert!(matches!(
            apply_patches(&doc(), &[dmp_patch(String::new(), vec![PathSegment::key("a")])]),
            Err(PatchApplyError::NotAString(_))
        ));
        assert!(matches!(
            apply_patches(&doc(), &[insert(vec![], InsertPosition::After, vec![])]),
            Err(PatchApplyError::RootNotSupported { .. })
        ));
    }
}
