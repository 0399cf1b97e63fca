//! Operation to patch translation.
//!
//! Each operation is translated by comparing the tree before it (`previous`)
//! with the tree after it (`next`). Patches address blocks and children by
//! `_key` so they stay valid when collaborators insert or remove siblings
//! concurrently; numeric indexes are only used where no key exists yet (the
//! first item of an empty list) or where the key itself is being changed.

use log::{debug, warn};
use serde_json::{Value, json};

use super::Operation;
use crate::models::{
    Block, Path, PathSegment, Schema,
    path::{block_path, child_path, text_path},
};
use crate::patch::{
    InsertPosition, Patch, diff_match_patch, dmp, insert, set, set_if_missing, unset,
};
use crate::tree::{
    Node, Snapshot, TreeError,
    convert::{node_to_block, node_to_child},
    from_tree, is_empty_document, path,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("No node at {path:?} in the {tree} tree")]
    MissingNode { path: Vec<usize>, tree: &'static str },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// The patches for one operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translated {
    pub patches: Vec<Patch>,
    /// Set when the operation emptied the document: the value before it
    pub unset_value: Option<Vec<Block>>,
}

struct Trees<'a> {
    previous: &'a Snapshot,
    next: &'a Snapshot,
}

fn missing(path: &[usize], tree: &'static str) -> TranslateError {
    TranslateError::MissingNode {
        path: path.to_vec(),
        tree,
    }
}

impl Trees<'_> {
    fn before(&self, at: &[usize]) -> Result<&Node, TranslateError> {
        self.previous.node(at).ok_or_else(|| missing(at, "previous"))
    }

    fn after(&self, at: &[usize]) -> Result<&Node, TranslateError> {
        self.next.node(at).ok_or_else(|| missing(at, "next"))
    }
}

fn block_value(node: &Node) -> Result<Value, TranslateError> {
    Ok(node_to_block(node)?.to_value())
}

fn child_value(node: &Node) -> Value {
    node_to_child(node).to_value()
}

fn is_text_block(node: &Node) -> bool {
    node.children().is_some() && !node.is_void()
}

fn child_container(block_key: &str) -> Path {
    vec![PathSegment::key(block_key), PathSegment::field("children")]
}

fn within(container: &Path, segment: PathSegment) -> Path {
    let mut path = container.clone();
    path.push(segment);
    path
}

/// Insert `item` at `index` of `siblings` (the list after the insert),
/// anchored on a neighbour's key
fn anchored_insert(item: Value, siblings: &[Node], index: usize, container: Path) -> Vec<Patch> {
    if let Some(previous) = index.checked_sub(1).and_then(|i| siblings.get(i)) {
        return vec![insert(
            vec![item],
            InsertPosition::After,
            within(&container, PathSegment::key(previous.key())),
        )];
    }
    if let Some(next) = siblings.get(index + 1) {
        return vec![insert(
            vec![item],
            InsertPosition::Before,
            within(&container, PathSegment::key(next.key())),
        )];
    }
    let mut patches = Vec::new();
    if container.is_empty() {
        patches.push(set_if_missing(json!([]), vec![]));
    }
    patches.push(insert(
        vec![item],
        InsertPosition::Before,
        within(&container, PathSegment::Index(0)),
    ));
    patches
}

fn text_patches(trees: &Trees, at: &[usize]) -> Result<Vec<Patch>, TranslateError> {
    let [b, _] = at else {
        return Ok(Vec::new());
    };
    let block = trees.after(&[*b])?;
    if !is_text_block(block) {
        return Ok(Vec::new());
    }
    let Some(span) = trees.after(at)?.as_text() else {
        return Ok(Vec::new());
    };
    let before = trees
        .previous
        .text(at)
        .map(|t| t.text.as_str())
        .unwrap_or_default();
    let patch_text = dmp::make_patch_text(before, &span.text);
    if patch_text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![diff_match_patch(
        patch_text,
        text_path(block.key(), &span.key),
    )])
}

fn insert_node_patches(trees: &Trees, at: &[usize], node: &Node) -> Result<Vec<Patch>, TranslateError> {
    match at {
        [b] => Ok(anchored_insert(block_value(node)?, trees.next, *b, Vec::new())),
        [b, c] => {
            let block = trees.after(&[*b])?;
            if !is_text_block(block) {
                return Ok(Vec::new());
            }
            let siblings = block.children().unwrap_or_default();
            Ok(anchored_insert(
                child_value(node),
                siblings,
                *c,
                child_container(block.key()),
            ))
        }
        _ => Ok(Vec::new()),
    }
}

fn remove_node_patches(trees: &Trees, at: &[usize]) -> Result<Vec<Patch>, TranslateError> {
    match at {
        [_] => Ok(vec![unset(block_path(trees.before(at)?.key()))]),
        [b, _] => {
            let block = trees.before(&[*b])?;
            if !is_text_block(block) {
                return Ok(Vec::new());
            }
            let child = trees.before(at)?;
            let same_key = trees.previous.keys().child_count(block.key(), child.key());
            if same_key > 1 {
                warn!(
                    "Child key '{}' occurs {} times in block '{}', not removing it",
                    child.key(),
                    same_key,
                    block.key()
                );
                return Ok(Vec::new());
            }
            Ok(vec![unset(child_path(block.key(), child.key()))])
        }
        _ => Ok(Vec::new()),
    }
}

fn split_node_patches(trees: &Trees, at: &[usize], position: usize) -> Result<Vec<Patch>, TranslateError> {
    match at {
        [b] => {
            let old = trees.before(at)?;
            if !is_text_block(old) {
                return Ok(Vec::new());
            }
            let created = trees.after(&[b + 1])?;
            let mut patches = vec![insert(
                vec![block_value(created)?],
                InsertPosition::After,
                block_path(old.key()),
            )];
            for moved in old.children().unwrap_or_default().iter().skip(position) {
                patches.push(unset(child_path(old.key(), moved.key())));
            }
            Ok(patches)
        }
        [b, c] => {
            let block = trees.after(&[*b])?;
            if !is_text_block(block) {
                return Ok(Vec::new());
            }
            let mut patches = text_patches(trees, at)?;
            let created = trees.after(&[*b, c + 1])?;
            let original = trees.after(at)?;
            patches.push(insert(
                vec![child_value(created)],
                InsertPosition::After,
                child_path(block.key(), original.key()),
            ));
            Ok(patches)
        }
        _ => Ok(Vec::new()),
    }
}

fn merge_node_patches(trees: &Trees, at: &[usize]) -> Result<Vec<Patch>, TranslateError> {
    let target_path = path::previous(at).ok_or_else(|| missing(at, "previous"))?;
    match at {
        [_] => {
            let absorbed = trees.before(at)?;
            let target = trees.before(&target_path)?;
            let mut patches = Vec::new();
            if is_text_block(absorbed) && is_text_block(target) {
                let moved: Vec<Value> = absorbed
                    .children()
                    .unwrap_or_default()
                    .iter()
                    .map(child_value)
                    .collect();
                if !moved.is_empty() {
                    let container = child_container(target.key());
                    let (position, anchor) = match target.children().unwrap_or_default().last() {
                        Some(last) => (InsertPosition::After, PathSegment::key(last.key())),
                        None => (InsertPosition::Before, PathSegment::Index(0)),
                    };
                    patches.push(insert(moved, position, within(&container, anchor)));
                }
            } else {
                let merged = trees.after(&target_path)?;
                patches.push(set(block_value(merged)?, block_path(target.key())));
            }
            patches.push(unset(block_path(absorbed.key())));
            Ok(patches)
        }
        [b, _] => {
            let block = trees.before(&[*b])?;
            if !is_text_block(block) {
                return Ok(Vec::new());
            }
            let absorbed = trees.before(at)?;
            let mut patches = if trees.after(&target_path)?.as_text().is_some() {
                text_patches(trees, &target_path)?
            } else {
                Vec::new()
            };
            patches.push(unset(child_path(block.key(), absorbed.key())));
            Ok(patches)
        }
        _ => Ok(Vec::new()),
    }
}

fn move_node_patches(trees: &Trees, op: &Operation, from: &[usize]) -> Result<Vec<Patch>, TranslateError> {
    let Some(landing) = path::transform(from, op) else {
        return Ok(Vec::new());
    };
    if landing.as_slice() == from {
        return Ok(Vec::new());
    }
    let node = trees.after(&landing)?;
    match (from, landing.as_slice()) {
        ([_], [to]) => {
            let mut patches = vec![unset(block_path(trees.before(from)?.key()))];
            patches.extend(anchored_insert(block_value(node)?, trees.next, *to, Vec::new()));
            Ok(patches)
        }
        ([b, _], [to_b, to_c]) => {
            let old_block = trees.before(&[*b])?;
            let new_block = trees.after(&[*to_b])?;
            if !is_text_block(old_block) || !is_text_block(new_block) {
                return Ok(Vec::new());
            }
            let mut patches = vec![unset(child_path(old_block.key(), node.key()))];
            patches.extend(anchored_insert(
                child_value(node),
                new_block.children().unwrap_or_default(),
                *to_c,
                child_container(new_block.key()),
            ));
            Ok(patches)
        }
        _ => Ok(Vec::new()),
    }
}

fn set_node_patches(trees: &Trees, at: &[usize]) -> Result<Vec<Patch>, TranslateError> {
    let (base, key_path) = match at {
        [b] => {
            let old = trees.before(at)?;
            (block_path(old.key()), vec![PathSegment::from(*b)])
        }
        [b, c] => {
            let block = trees.before(&[*b])?;
            if !is_text_block(block) {
                return Ok(Vec::new());
            }
            let child = trees.before(at)?;
            let container = child_container(block.key());
            (
                within(&container, PathSegment::key(child.key())),
                within(&container, PathSegment::from(*c)),
            )
        }
        _ => return Ok(Vec::new()),
    };
    let old = trees.before(at)?.properties();
    let new = trees.after(at)?.properties();

    let mut patches = Vec::new();
    for (name, value) in &new {
        if name != "_key" && old.get(name) != Some(value) {
            patches.push(set(value.clone(), within(&base, PathSegment::field(name))));
        }
    }
    for name in old.keys().filter(|name| !new.contains_key(*name)) {
        patches.push(unset(within(&base, PathSegment::field(name))));
    }
    // Key changes go last and by index, the old key no longer resolves after them
    if let Some(new_key) = new.get("_key")
        && old.get("_key") != Some(new_key)
    {
        patches.push(set(new_key.clone(), within(&key_path, PathSegment::field("_key"))));
    }
    Ok(patches)
}

/// Translate one applied operation into patches.
///
/// `previous` is the tree before the operation and `next` the tree after it.
pub fn operation_to_patches(
    op: &Operation,
    previous: &Snapshot,
    next: &Snapshot,
    schema: &Schema,
) -> Result<Translated, TranslateError> {
    let trees = Trees { previous, next };
    let mut patches = Vec::new();

    // An empty editor is a placeholder, not a stored value; make it real first
    if !op.is_selection() && is_empty_document(previous, schema) {
        patches.push(set_if_missing(json!([]), vec![]));
        if let Some(placeholder) = previous.first() {
            patches.push(insert(
                vec![block_value(placeholder)?],
                InsertPosition::Before,
                vec![PathSegment::Index(0)],
            ));
        }
    }

    let translated = match op {
        Operation::InsertText { path: at, .. } | Operation::RemoveText { path: at, .. } => {
            text_patches(&trees, at)?
        }
        Operation::InsertNode { path: at, node } => insert_node_patches(&trees, at, node)?,
        Operation::RemoveNode { path: at, .. } => remove_node_patches(&trees, at)?,
        Operation::SplitNode {
            path: at, position, ..
        } => split_node_patches(&trees, at, *position)?,
        Operation::MergeNode { path: at, .. } => merge_node_patches(&trees, at)?,
        Operation::MoveNode { path: at, .. } => move_node_patches(&trees, op, at)?,
        Operation::SetNode { path: at, .. } => set_node_patches(&trees, at)?,
        Operation::SetSelection { .. } => Vec::new(),
    };
    patches.extend(translated);

    let mut unset_value = None;
    if matches!(
        op,
        Operation::RemoveText { .. } | Operation::RemoveNode { .. }
    ) && is_empty_document(next, schema)
    {
        patches.push(unset(vec![]));
        unset_value = Some(from_tree(previous)?);
    }

    debug!("{} produced {} patch(es)", op.kind(), patches.len());
    Ok(Translated {
        patches,
        unset_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blocks_to_value;
    use crate::patch::{Origin, PatchOp, apply_patches};
    use crate::tree::apply_operation;
    use crate::tree::test_support::{block, image, marked, mention, span};
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    fn tree() -> Vec<Node> {
        vec![
            block("a", vec![span("a1", "hello"), marked("a2", " world", &["strong"])]),
            image("img"),
            block("b", vec![span("b1", "second"), mention("m1"), span("b2", "")]),
        ]
    }

    fn value_of(nodes: &[Node]) -> Value {
        if is_empty_document(nodes, &Schema::default()) {
            return Value::Null;
        }
        blocks_to_value(&from_tree(nodes).unwrap())
    }

    /// Apply `op`, translate it, and check the patches reproduce the new value
    fn translate(nodes: &[Node], op: Operation) -> (Vec<Node>, Translated) {
        let previous = Snapshot::new(nodes.to_vec());
        let mut next_nodes = nodes.to_vec();
        apply_operation(&mut next_nodes, &op).unwrap();
        let next = Snapshot::new(next_nodes.clone());

        let translated = operation_to_patches(&op, &previous, &next, &Schema::default()).unwrap();
        let patched = apply_patches(&value_of(nodes), &translated.patches).unwrap();
        assert_eq!(patched, value_of(&next_nodes), "patches for {op:?}");
        (next_nodes, translated)
    }

    fn ops(translated: &Translated) -> Vec<PatchOp> {
        translated.patches.iter().map(|p| p.op.clone()).collect()
    }

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_insert_text_is_a_text_patch() {
        let (_, translated) = translate(
            &tree(),
            Operation::InsertText {
                path: vec![0, 0],
                offset: 5,
                text: ",".to_string(),
            },
        );

        assert_eq!(
            ops(&translated),
            vec![PatchOp::DiffMatchPatch {
                path: text_path("a", "a1"),
                value: dmp::make_patch_text("hello", "hello,"),
            }]
        );
        assert!(translated.patches.iter().all(|p| p.origin == Origin::Local));
    }

    #[test]
    fn test_remove_text() {
        let (_, translated) = translate(
            &tree(),
            Operation::RemoveText {
                path: vec![0, 1],
                offset: 0,
                text: " wor".to_string(),
            },
        );

        assert_eq!(translated.patches.len(), 1);
        assert_eq!(translated.patches[0].path(), &text_path("a", "a2"));
    }

    #[test]
    fn test_insert_block_anchors_on_previous_sibling() {
        let (_, translated) = translate(
            &tree(),
            Operation::InsertNode {
                path: vec![1],
                node: block("new", vec![span("n1", "")]),
            },
        );

        let ops = ops(&translated);
        let [PatchOp::Insert { path, position, .. }] = ops.as_slice() else {
            panic!("expected a single insert");
        };
        assert_eq!(path, &block_path("a"));
        assert_eq!(*position, InsertPosition::After);
    }

    #[test]
    fn test_insert_first_block_anchors_on_next_sibling() {
        let (_, translated) = translate(
            &tree(),
            Operation::InsertNode {
                path: vec![0],
                node: block("new", vec![]),
            },
        );

        let ops = ops(&translated);
        let [PatchOp::Insert { path, position, .. }] = ops.as_slice() else {
            panic!("expected a single insert");
        };
        assert_eq!(path, &block_path("a"));
        assert_eq!(*position, InsertPosition::Before);
    }

    #[test]
    fn test_insert_child_into_empty_block() {
        let nodes = vec![block("a", vec![span("a1", "x")]), block("e", vec![])];
        let (_, translated) = translate(
            &nodes,
            Operation::InsertNode {
                path: vec![1, 0],
                node: span("s", "hi"),
            },
        );

        assert_eq!(
            translated.patches[0].path(),
            &vec![
                PathSegment::key("e"),
                PathSegment::field("children"),
                PathSegment::Index(0)
            ]
        );
    }

    #[test]
    fn test_insert_into_void_produces_nothing() {
        let (_, translated) = translate(
            &tree(),
            Operation::InsertNode {
                path: vec![1, 1],
                node: span("s", ""),
            },
        );

        assert!(translated.patches.is_empty());
    }

    #[test]
    fn test_remove_nodes() {
        let (_, translated) = translate(
            &tree(),
            Operation::RemoveNode {
                path: vec![2, 1],
                node: mention("m1"),
            },
        );
        assert_eq!(ops(&translated), vec![PatchOp::Unset { path: child_path("b", "m1") }]);

        let (_, translated) = translate(
            &tree(),
            Operation::RemoveNode {
                path: vec![1],
                node: image("img"),
            },
        );
        assert_eq!(ops(&translated), vec![PatchOp::Unset { path: block_path("img") }]);
    }

    #[test]
    fn test_remove_duplicate_child_key_is_skipped() {
        let nodes = vec![block("a", vec![span("s", "x"), span("s", "y")])];
        let previous = Snapshot::new(nodes.clone());
        let op = Operation::RemoveNode {
            path: vec![0, 1],
            node: span("s", "y"),
        };
        let mut next = nodes;
        apply_operation(&mut next, &op).unwrap();

        let translated =
            operation_to_patches(&op, &previous, &Snapshot::new(next), &Schema::default()).unwrap();
        assert!(translated.patches.is_empty());
    }

    #[test]
    fn test_split_span() {
        let (next, translated) = translate(
            &tree(),
            Operation::SplitNode {
                path: vec![0, 0],
                position: 2,
                properties: props(json!({"_key": "a3"})),
            },
        );

        assert_eq!(next[0].children().unwrap()[1], span("a3", "llo"));
        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["diffMatchPatch", "insert"]);
        assert_eq!(translated.patches[1].path(), &child_path("a", "a1"));
    }

    #[test]
    fn test_split_block() {
        let (_, translated) = translate(
            &tree(),
            Operation::SplitNode {
                path: vec![2],
                position: 1,
                properties: props(json!({"_key": "c"})),
            },
        );

        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["insert", "unset", "unset"]);
        assert_eq!(translated.patches[1].path(), &child_path("b", "m1"));
    }

    #[test]
    fn test_merge_spans() {
        let (_, translated) = translate(
            &tree(),
            Operation::MergeNode {
                path: vec![0, 1],
                position: 5,
                properties: props(json!({"_key": "a2"})),
            },
        );

        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["diffMatchPatch", "unset"]);
    }

    #[test]
    fn test_merge_blocks() {
        let nodes = vec![
            block("a", vec![span("a1", "one")]),
            block("b", vec![span("b1", "two"), span("b2", "three")]),
        ];
        let (_, translated) = translate(
            &nodes,
            Operation::MergeNode {
                path: vec![1],
                position: 1,
                properties: props(json!({"_key": "b"})),
            },
        );

        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["insert", "unset"]);
        assert_eq!(translated.patches[0].path(), &child_path("a", "a1"));
    }

    #[test]
    fn test_move_nodes() {
        let (_, translated) = translate(
            &tree(),
            Operation::MoveNode {
                path: vec![0],
                new_path: vec![2],
            },
        );
        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["unset", "insert"]);

        translate(
            &tree(),
            Operation::MoveNode {
                path: vec![0, 1],
                new_path: vec![2, 3],
            },
        );
        translate(
            &tree(),
            Operation::MoveNode {
                path: vec![2, 0],
                new_path: vec![0, 0],
            },
        );
    }

    #[test]
    fn test_set_node_sets_changed_fields_only() {
        let (_, translated) = translate(
            &tree(),
            Operation::SetNode {
                path: vec![0],
                properties: props(json!({"style": "normal", "markDefs": []})),
                new_properties: props(json!({"style": "h1", "listItem": "bullet"})),
            },
        );

        let mut paths: Vec<String> = translated.patches.iter().map(|p| p.to_string()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "set [_key==\"a\"].listItem",
                "set [_key==\"a\"].style",
                "unset [_key==\"a\"].markDefs",
            ]
        );
    }

    #[test]
    fn test_set_child_key_targets_index() {
        let (_, translated) = translate(
            &tree(),
            Operation::SetNode {
                path: vec![0, 1],
                properties: props(json!({"_key": "a2", "marks": ["strong"]})),
                new_properties: props(json!({"_key": "renamed", "marks": []})),
            },
        );

        assert_eq!(
            ops(&translated),
            vec![
                PatchOp::Set {
                    path: within(&child_path("a", "a2"), PathSegment::field("marks")),
                    value: json!([]),
                },
                PatchOp::Set {
                    path: vec![
                        PathSegment::key("a"),
                        PathSegment::field("children"),
                        PathSegment::Index(1),
                        PathSegment::field("_key"),
                    ],
                    value: json!("renamed"),
                },
            ]
        );
    }

    #[test]
    fn test_selection_produces_nothing() {
        let (_, translated) = translate(
            &tree(),
            Operation::SetSelection {
                properties: None,
                new_properties: None,
            },
        );

        assert!(translated.patches.is_empty());
    }

    #[test]
    fn test_typing_into_empty_editor_materialises_placeholder() {
        let nodes = vec![block("p", vec![span("p1", "")])];
        let (_, translated) = translate(
            &nodes,
            Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "a".to_string(),
            },
        );

        let kinds: Vec<&str> = translated.patches.iter().map(|p| p.op.kind()).collect();
        assert_eq!(kinds, vec!["setIfMissing", "insert", "diffMatchPatch"]);
        assert_eq!(translated.unset_value, None);
    }

    #[test]
    fn test_emptying_the_document_unsets_it() {
        let nodes = vec![block("p", vec![span("p1", "abc")])];
        let (_, translated) = translate(
            &nodes,
            Operation::RemoveText {
                path: vec![0, 0],
                offset: 0,
                text: "abc".to_string(),
            },
        );

        assert_eq!(
            translated.patches.last().map(|p| p.op.clone()),
            Some(PatchOp::Unset { path: vec![] })
        );
        assert_eq!(translated.unset_value, Some(from_tree(&nodes).unwrap()));
    }
}
