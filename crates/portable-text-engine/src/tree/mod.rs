/*!
 * # Editor Tree
 *
 * The editable tree the text-editing surface works on. Operations address
 * nodes by index paths (`[block, child]`), which is what makes them cheap to
 * apply and also why they must never leave this crate: an index path is only
 * meaningful against one exact version of the tree.
 *
 * ## Shape
 *
 * - Depth 1: one `Element` per block. Text blocks have span/inline children;
 *   block objects are void and carry a single empty text child.
 * - Depth 2: `Text` nodes for spans, void `Element`s for inline objects.
 *
 * ## Versions
 *
 * Every edit produces a new [`Snapshot`]; translation always compares the
 * previous snapshot with the next one. Lookups by key go through a
 * [`KeyIndex`] built lazily per snapshot, so nothing holds references into a
 * tree that may be replaced.
 */

pub mod apply;
pub mod convert;
pub mod path;
pub mod point;

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use apply::apply_operation;
pub use convert::{from_tree, is_empty_document, placeholder_block, to_tree};
pub use point::{Point, Range};

/// Key of the empty text child every void element carries
pub const VOID_CHILD_KEY: &str = "void-child";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("No node at path {0:?}")]
    NoNode(Vec<usize>),
    #[error("Node at {0:?} is not a text node")]
    NotText(Vec<usize>),
    #[error("Node at {0:?} is not an element")]
    NotElement(Vec<usize>),
    #[error("Offset {offset} is outside the text at {path:?}")]
    OffsetOutOfRange { path: Vec<usize>, offset: usize },
    #[error("Text at {path:?} offset {offset} is not {expected:?}")]
    TextMismatch {
        path: Vec<usize>,
        offset: usize,
        expected: String,
    },
    #[error("Cannot {op} at the root path")]
    RootPath { op: &'static str },
    #[error("Cannot merge {0:?} into a sibling of a different kind")]
    MergeMismatch(Vec<usize>),
    #[error("Cannot move {from:?} inside itself to {to:?}")]
    MoveIntoSelf { from: Vec<usize>, to: Vec<usize> },
    #[error("Property '{0}' cannot be set on a node")]
    InvalidProperty(String),
    #[error("Text node found at block level: {0}")]
    TextAtBlockLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementRole {
    TextBlock,
    BlockObject,
    InlineObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub role: ElementRole,
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub text: String,
    #[serde(default)]
    pub marks: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Text(Text),
}

impl Element {
    pub fn is_void(&self) -> bool {
        self.role != ElementRole::TextBlock
    }
}

impl Text {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Node {
    pub fn key(&self) -> &str {
        match self {
            Node::Element(element) => &element.key,
            Node::Text(text) => &text.key,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Node::Element(element) => &element.type_name,
            Node::Text(text) => &text.type_name,
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Element(element) => Some(&element.children),
            Node::Text(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element(element) => Some(&mut element.children),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.as_element().is_some_and(Element::is_void)
    }

    /// Everything except text and children, as `set_node` sees it
    pub fn properties(&self) -> Map<String, Value> {
        let (key, type_name, props) = match self {
            Node::Element(element) => (&element.key, &element.type_name, &element.props),
            Node::Text(text) => (&text.key, &text.type_name, &text.props),
        };
        let mut properties = Map::new();
        properties.insert("_key".to_string(), Value::String(key.clone()));
        properties.insert("_type".to_string(), Value::String(type_name.clone()));
        if let Node::Text(text) = self {
            properties.insert(
                "marks".to_string(),
                Value::Array(text.marks.iter().cloned().map(Value::String).collect()),
            );
        }
        properties.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
        properties
    }

    /// Overlay a property map; `null` removes a property
    pub fn apply_properties(&mut self, properties: &Map<String, Value>) -> Result<(), TreeError> {
        for (name, value) in properties {
            let invalid = || TreeError::InvalidProperty(name.clone());
            match (name.as_str(), &mut *self) {
                ("text" | "children", _) => return Err(invalid()),
                ("_key", node) => {
                    let key = value.as_str().ok_or_else(invalid)?.to_string();
                    match node {
                        Node::Element(element) => element.key = key,
                        Node::Text(text) => text.key = key,
                    }
                }
                ("_type", node) => {
                    let type_name = value.as_str().ok_or_else(invalid)?.to_string();
                    match node {
                        Node::Element(element) => element.type_name = type_name,
                        Node::Text(text) => text.type_name = type_name,
                    }
                }
                ("marks", Node::Text(text)) => {
                    text.marks = match value {
                        Value::Null => Vec::new(),
                        Value::Array(marks) => marks
                            .iter()
                            .map(|mark| mark.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                            .ok_or_else(invalid)?,
                        _ => return Err(invalid()),
                    };
                }
                (_, node) => {
                    let props = match node {
                        Node::Element(element) => &mut element.props,
                        Node::Text(text) => &mut text.props,
                    };
                    if value.is_null() {
                        props.remove(name);
                    } else {
                        props.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Find the node at an index path
pub fn node_at<'a>(nodes: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(nodes.get(*first)?, |node, index| node.children()?.get(*index))
}

pub fn node_at_mut<'a>(nodes: &'a mut [Node], path: &[usize]) -> Option<&'a mut Node> {
    let (first, rest) = path.split_first()?;
    rest.iter().try_fold(nodes.get_mut(*first)?, |node, index| {
        node.children_mut()?.get_mut(*index)
    })
}

/// The sibling list a path points into
pub fn siblings_mut<'a>(nodes: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    let (_, parent) = path.split_last()?;
    if parent.is_empty() {
        return Some(nodes);
    }
    node_at_mut(nodes, parent)?.children_mut()
}

/// Every text node with its path, in document order
pub fn texts(nodes: &[Node]) -> Vec<(Vec<usize>, &Text)> {
    fn walk<'a>(nodes: &'a [Node], prefix: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Text)>) {
        for (index, node) in nodes.iter().enumerate() {
            prefix.push(index);
            match node {
                Node::Text(text) => out.push((prefix.clone(), text)),
                Node::Element(element) => walk(&element.children, prefix, out),
            }
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(nodes, &mut Vec::new(), &mut out);
    out
}

/// Key lookups for one snapshot
#[derive(Debug, Default)]
pub struct KeyIndex {
    blocks: HashMap<String, usize>,
    children: HashMap<String, Vec<(usize, usize)>>,
}

impl KeyIndex {
    fn build(nodes: &[Node]) -> Self {
        let mut index = KeyIndex::default();
        for (b, block) in nodes.iter().enumerate() {
            index.blocks.entry(block.key().to_string()).or_insert(b);
            if block.is_void() {
                continue;
            }
            for (c, child) in block.children().unwrap_or_default().iter().enumerate() {
                index
                    .children
                    .entry(child.key().to_string())
                    .or_default()
                    .push((b, c));
            }
        }
        index
    }

    pub fn block(&self, key: &str) -> Option<usize> {
        self.blocks.get(key).copied()
    }

    /// Child index of `child_key` inside the block `block_key`
    pub fn child(&self, block_key: &str, child_key: &str) -> Option<(usize, usize)> {
        let block = self.block(block_key)?;
        self.children
            .get(child_key)?
            .iter()
            .find(|(b, _)| *b == block)
            .copied()
    }

    /// How many children of `block_key` share `child_key`
    pub fn child_count(&self, block_key: &str, child_key: &str) -> usize {
        let Some(block) = self.block(block_key) else {
            return 0;
        };
        self.children
            .get(child_key)
            .map_or(0, |found| found.iter().filter(|(b, _)| *b == block).count())
    }

    /// First location of a child key in any block
    pub fn find_child_anywhere(&self, child_key: &str) -> Option<(usize, usize)> {
        self.children.get(child_key)?.first().copied()
    }
}

/// One immutable version of the tree
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: Arc<Vec<Node>>,
    index: Arc<OnceLock<KeyIndex>>,
}

impl Snapshot {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Arc::new(nodes),
            index: Arc::new(OnceLock::new()),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.nodes.as_ref().clone()
    }

    pub fn keys(&self) -> &KeyIndex {
        self.index.get_or_init(|| KeyIndex::build(&self.nodes))
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_at(&self.nodes, path)
    }

    pub fn text(&self, path: &[usize]) -> Option<&Text> {
        self.node(path)?.as_text()
    }

    /// Same version, not just equal content
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }
}

impl Deref for Snapshot {
    type Target = [Node];

    fn deref(&self) -> &[Node] {
        &self.nodes
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.nodes == other.nodes
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn span(key: &str, text: &str) -> Node {
        Node::Text(Text {
            key: key.to_string(),
            type_name: "span".to_string(),
            text: text.to_string(),
            marks: Vec::new(),
            props: Map::new(),
        })
    }

    pub fn marked(key: &str, text: &str, marks: &[&str]) -> Node {
        Node::Text(Text {
            key: key.to_string(),
            type_name: "span".to_string(),
            text: text.to_string(),
            marks: marks.iter().map(|m| m.to_string()).collect(),
            props: Map::new(),
        })
    }

    pub fn block(key: &str, children: Vec<Node>) -> Node {
        let mut props = Map::new();
        props.insert("style".to_string(), Value::String("normal".to_string()));
        props.insert("markDefs".to_string(), Value::Array(Vec::new()));
        Node::Element(Element {
            key: key.to_string(),
            type_name: "block".to_string(),
            role: ElementRole::TextBlock,
            children,
            props,
        })
    }

    pub fn void_child() -> Node {
        span(VOID_CHILD_KEY, "")
    }

    pub fn image(key: &str) -> Node {
        Node::Element(Element {
            key: key.to_string(),
            type_name: "image".to_string(),
            role: ElementRole::BlockObject,
            children: vec![void_child()],
            props: Map::new(),
        })
    }

    pub fn mention(key: &str) -> Node {
        Node::Element(Element {
            key: key.to_string(),
            type_name: "mention".to_string(),
            role: ElementRole::InlineObject,
            children: vec![void_child()],
            props: Map::new(),
        })
    }
}
