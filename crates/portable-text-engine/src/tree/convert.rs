//! Document model adapter: blocks to editor tree and back.

use serde_json::{Map, Value};

use super::{Element, ElementRole, Node, Text, TreeError, VOID_CHILD_KEY};
use crate::models::{Block, BlockContent, Child, ChildContent, Schema};

fn void_child(schema: &Schema) -> Node {
    Node::Text(Text {
        key: VOID_CHILD_KEY.to_string(),
        type_name: schema.span_type.clone(),
        text: String::new(),
        marks: Vec::new(),
        props: Map::new(),
    })
}

pub fn child_to_node(child: &Child, schema: &Schema) -> Node {
    match &child.content {
        ChildContent::Span {
            text,
            marks,
            fields,
        } => Node::Text(Text {
            key: child.key.clone(),
            type_name: child.type_name.clone(),
            text: text.clone(),
            marks: marks.clone(),
            props: fields.clone(),
        }),
        ChildContent::Object { fields } => Node::Element(Element {
            key: child.key.clone(),
            type_name: child.type_name.clone(),
            role: ElementRole::InlineObject,
            children: vec![void_child(schema)],
            props: fields.clone(),
        }),
    }
}

pub fn block_to_node(block: &Block, schema: &Schema) -> Node {
    match &block.content {
        BlockContent::Text { children, fields } => Node::Element(Element {
            key: block.key.clone(),
            type_name: block.type_name.clone(),
            role: ElementRole::TextBlock,
            children: children.iter().map(|c| child_to_node(c, schema)).collect(),
            props: fields.clone(),
        }),
        BlockContent::Object { fields } => Node::Element(Element {
            key: block.key.clone(),
            type_name: block.type_name.clone(),
            role: ElementRole::BlockObject,
            children: vec![void_child(schema)],
            props: fields.clone(),
        }),
    }
}

pub fn node_to_child(node: &Node) -> Child {
    match node {
        Node::Text(text) => Child {
            key: text.key.clone(),
            type_name: text.type_name.clone(),
            content: ChildContent::Span {
                text: text.text.clone(),
                marks: text.marks.clone(),
                fields: text.props.clone(),
            },
        },
        Node::Element(element) => Child {
            key: element.key.clone(),
            type_name: element.type_name.clone(),
            content: ChildContent::Object {
                fields: element.props.clone(),
            },
        },
    }
}

pub fn node_to_block(node: &Node) -> Result<Block, TreeError> {
    let Node::Element(element) = node else {
        return Err(TreeError::TextAtBlockLevel(node.key().to_string()));
    };
    let content = match element.role {
        ElementRole::TextBlock => BlockContent::Text {
            children: element.children.iter().map(node_to_child).collect(),
            fields: element.props.clone(),
        },
        ElementRole::BlockObject | ElementRole::InlineObject => BlockContent::Object {
            fields: element.props.clone(),
        },
    };
    Ok(Block {
        key: element.key.clone(),
        type_name: element.type_name.clone(),
        content,
    })
}

pub fn to_tree(blocks: &[Block], schema: &Schema) -> Vec<Node> {
    blocks.iter().map(|b| block_to_node(b, schema)).collect()
}

pub fn from_tree(nodes: &[Node]) -> Result<Vec<Block>, TreeError> {
    nodes.iter().map(node_to_block).collect()
}

/// The block an empty editor shows: default style, one empty span
pub fn placeholder_block(schema: &Schema, block_key: &str, span_key: &str) -> Block {
    let mut fields = Map::new();
    fields.insert(
        "style".to_string(),
        Value::String(schema.default_style.clone()),
    );
    fields.insert("markDefs".to_string(), Value::Array(Vec::new()));
    Block {
        key: block_key.to_string(),
        type_name: schema.block_type.clone(),
        content: BlockContent::Text {
            children: vec![Child {
                key: span_key.to_string(),
                type_name: schema.span_type.clone(),
                content: ChildContent::Span {
                    text: String::new(),
                    marks: Vec::new(),
                    fields: Map::new(),
                },
            }],
            fields,
        },
    }
}

/// Does the tree hold nothing but a placeholder-like block
pub fn is_empty_document(nodes: &[Node], schema: &Schema) -> bool {
    let [Node::Element(block)] = nodes else {
        return nodes.is_empty();
    };
    if block.role != ElementRole::TextBlock || block.props.contains_key("listItem") {
        return false;
    }
    let default_style = match block.props.get("style") {
        None | Some(Value::Null) => true,
        Some(style) => style.as_str() == Some(schema.default_style.as_str()),
    };
    let empty_children = match block.children.as_slice() {
        [] => true,
        [Node::Text(span)] => span.text.is_empty() && span.marks.is_empty(),
        _ => false,
    };
    default_style && empty_children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blocks_from_value;
    use crate::tree::test_support::{block, span};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn value() -> Value {
        json!([
            {"_key": "a", "_type": "block", "style": "normal", "markDefs": [], "children": [
                {"_key": "a1", "_type": "span", "text": "Hi ", "marks": []},
                {"_key": "m", "_type": "mention", "user": "ada"},
                {"_key": "a2", "_type": "span", "text": "there", "marks": ["em"]}
            ]},
            {"_key": "img", "_type": "image", "asset": {"_ref": "image-1"}}
        ])
    }

    #[test]
    fn test_tree_shape() {
        let schema = Schema::default();
        let blocks = blocks_from_value(&value(), &schema).unwrap();
        let nodes = to_tree(&blocks, &schema);

        assert_eq!(nodes.len(), 2);
        let children = nodes[0].children().unwrap();
        assert_eq!(children.len(), 3);
        assert!(children[1].is_void());
        assert_eq!(children[1].children().unwrap()[0].key(), VOID_CHILD_KEY);
        assert!(nodes[1].is_void());
        assert_eq!(nodes[1].children().unwrap().len(), 1);
    }

    #[test]
    fn test_roundtrip_through_tree() {
        let schema = Schema::default();
        let blocks = blocks_from_value(&value(), &schema).unwrap();

        assert_eq!(from_tree(&to_tree(&blocks, &schema)).unwrap(), blocks);
    }

    #[test]
    fn test_text_at_block_level_is_rejected() {
        assert_eq!(
            from_tree(&[span("s", "x")]),
            Err(TreeError::TextAtBlockLevel("s".to_string()))
        );
    }

    #[test]
    fn test_empty_document_detection() {
        let schema = Schema::default();
        let placeholder = to_tree(&[placeholder_block(&schema, "b", "s")], &schema);

        assert!(is_empty_document(&placeholder, &schema));
        assert!(is_empty_document(&[], &schema));
        assert!(is_empty_document(&[block("b", vec![])], &schema));
        assert!(!is_empty_document(&[block("b", vec![span("s", "x")])], &schema));
        assert!(!is_empty_document(
            &[block("b", vec![]), block("c", vec![])],
            &schema
        ));

        let mut heading = block("b", vec![]);
        heading
            .apply_properties(json!({"style": "h1"}).as_object().unwrap())
            .unwrap();
        assert!(!is_empty_document(&[heading], &schema));
    }

    #[test]
    fn test_placeholder_value() {
        let block = placeholder_block(&Schema::default(), "b", "s");

        assert_eq!(
            block.to_value(),
            json!({
                "_key": "b", "_type": "block", "style": "normal", "markDefs": [],
                "children": [{"_key": "s", "_type": "span", "text": "", "marks": []}]
            })
        );
    }
}
