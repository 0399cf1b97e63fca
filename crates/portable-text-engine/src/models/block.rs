//! Typed view of the external portable text value.
//!
//! The document exchanged with collaborators is a JSON array of blocks. Text
//! blocks (`_type` equal to the schema's block type) carry a `children` array
//! of spans and inline objects; every other block is an opaque object. Fields
//! the editor does not interpret (`style`, `markDefs`, `listItem`, object
//! payloads, ...) are kept verbatim in `fields`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::Schema;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Expected a JSON object, found: {0}")]
    NotAnObject(Value),
    #[error("Expected an array of blocks, found: {0}")]
    NotAnArray(Value),
    #[error("Item of type '{type_name}' has no string _key")]
    MissingKey { type_name: String },
    #[error("Item with _key '{key}' has no string _type")]
    MissingType { key: String },
    #[error("Field '{field}' of '{key}' is invalid: expected {expected}")]
    InvalidField {
        key: String,
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub key: String,
    pub type_name: String,
    pub content: BlockContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    /// A text block: ordered children plus block fields (`style`, `markDefs`, ...)
    Text {
        children: Vec<Child>,
        fields: Map<String, Value>,
    },
    /// Any other block type; the fields are its payload
    Object { fields: Map<String, Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub key: String,
    pub type_name: String,
    pub content: ChildContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildContent {
    Span {
        text: String,
        marks: Vec<String>,
        fields: Map<String, Value>,
    },
    Object { fields: Map<String, Value> },
}

/// Pull `_key` and `_type` out of an object, returning the remaining fields
fn split_identity(value: &Value) -> Result<(String, String, Map<String, Value>), ModelError> {
    let Value::Object(object) = value else {
        return Err(ModelError::NotAnObject(value.clone()));
    };
    let mut fields = object.clone();
    let type_name = fields.remove("_type");
    let key = match fields.remove("_key") {
        Some(Value::String(key)) => key,
        _ => {
            return Err(ModelError::MissingKey {
                type_name: type_name
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or("<untyped>")
                    .to_string(),
            });
        }
    };
    let type_name = match type_name {
        Some(Value::String(type_name)) => type_name,
        _ => return Err(ModelError::MissingType { key }),
    };
    Ok((key, type_name, fields))
}

fn with_identity(key: &str, type_name: &str, fields: &Map<String, Value>) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("_key".to_string(), Value::String(key.to_string()));
    object.insert("_type".to_string(), Value::String(type_name.to_string()));
    object.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    object
}

impl Block {
    pub fn from_value(value: &Value, schema: &Schema) -> Result<Self, ModelError> {
        let (key, type_name, mut fields) = split_identity(value)?;
        if !schema.is_text_block(&type_name) {
            return Ok(Self {
                key,
                type_name,
                content: BlockContent::Object { fields },
            });
        }

        let children = match fields.remove("children") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| Child::from_value(item, schema))
                .collect::<Result<Vec<_>, _>>()?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(ModelError::InvalidField {
                    key,
                    field: "children",
                    expected: "an array",
                });
            }
        };

        Ok(Self {
            key,
            type_name,
            content: BlockContent::Text { children, fields },
        })
    }

    pub fn to_value(&self) -> Value {
        match &self.content {
            BlockContent::Text { children, fields } => {
                let mut object = with_identity(&self.key, &self.type_name, fields);
                object.insert(
                    "children".to_string(),
                    Value::Array(children.iter().map(Child::to_value).collect()),
                );
                Value::Object(object)
            }
            BlockContent::Object { fields } => {
                Value::Object(with_identity(&self.key, &self.type_name, fields))
            }
        }
    }

    pub fn children(&self) -> Option<&[Child]> {
        match &self.content {
            BlockContent::Text { children, .. } => Some(children),
            BlockContent::Object { .. } => None,
        }
    }

    pub fn is_text_block(&self) -> bool {
        matches!(self.content, BlockContent::Text { .. })
    }
}

impl Child {
    pub fn from_value(value: &Value, schema: &Schema) -> Result<Self, ModelError> {
        let (key, type_name, mut fields) = split_identity(value)?;
        if !schema.is_span(&type_name) {
            return Ok(Self {
                key,
                type_name,
                content: ChildContent::Object { fields },
            });
        }

        let text = match fields.remove("text") {
            Some(Value::String(text)) => text,
            None | Some(Value::Null) => String::new(),
            Some(_) => {
                return Err(ModelError::InvalidField {
                    key,
                    field: "text",
                    expected: "a string",
                });
            }
        };
        let marks = match fields.remove("marks") {
            Some(Value::Array(marks)) => marks
                .iter()
                .map(|mark| mark.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ModelError::InvalidField {
                    key: key.clone(),
                    field: "marks",
                    expected: "an array of strings",
                })?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(ModelError::InvalidField {
                    key,
                    field: "marks",
                    expected: "an array of strings",
                });
            }
        };

        Ok(Self {
            key,
            type_name,
            content: ChildContent::Span {
                text,
                marks,
                fields,
            },
        })
    }

    pub fn to_value(&self) -> Value {
        match &self.content {
            ChildContent::Span {
                text,
                marks,
                fields,
            } => {
                let mut object = with_identity(&self.key, &self.type_name, fields);
                object.insert("text".to_string(), Value::String(text.clone()));
                object.insert(
                    "marks".to_string(),
                    Value::Array(marks.iter().cloned().map(Value::String).collect()),
                );
                Value::Object(object)
            }
            ChildContent::Object { fields } => {
                Value::Object(with_identity(&self.key, &self.type_name, fields))
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            ChildContent::Span { text, .. } => Some(text),
            ChildContent::Object { .. } => None,
        }
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Serialize for Child {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Parse a whole document value; `null` is the empty document
pub fn blocks_from_value(value: &Value, schema: &Schema) -> Result<Vec<Block>, ModelError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| Block::from_value(item, schema))
            .collect(),
        other => Err(ModelError::NotAnArray(other.clone())),
    }
}

pub fn blocks_to_value(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(Block::to_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {
                "_key": "b1",
                "_type": "block",
                "style": "normal",
                "markDefs": [{"_key": "m1", "_type": "link", "href": "https://example.com"}],
                "children": [
                    {"_key": "s1", "_type": "span", "text": "Hello ", "marks": []},
                    {"_key": "s2", "_type": "span", "text": "world", "marks": ["strong", "m1"]},
                    {"_key": "i1", "_type": "mention", "user": "ada"}
                ]
            },
            {"_key": "img", "_type": "image", "asset": {"_ref": "image-abc"}}
        ])
    }

    #[test]
    fn test_parse_text_and_object_blocks() {
        let blocks = blocks_from_value(&sample(), &Schema::default()).unwrap();

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_text_block());
        assert!(!blocks[1].is_text_block());

        let children = blocks[0].children().unwrap();
        assert_eq!(children[0].text(), Some("Hello "));
        assert_eq!(
            children[1].content,
            ChildContent::Span {
                text: "world".to_string(),
                marks: vec!["strong".to_string(), "m1".to_string()],
                fields: Map::new(),
            }
        );
        assert_eq!(children[2].text(), None);
    }

    #[test]
    fn test_value_roundtrip_is_lossless() {
        let value = sample();
        let blocks = blocks_from_value(&value, &Schema::default()).unwrap();

        assert_eq!(blocks_to_value(&blocks), value);
    }

    #[test]
    fn test_span_defaults_missing_text_and_marks() {
        let child = Child::from_value(
            &json!({"_key": "s", "_type": "span"}),
            &Schema::default(),
        )
        .unwrap();

        assert_eq!(
            child.to_value(),
            json!({"_key": "s", "_type": "span", "text": "", "marks": []})
        );
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = Block::from_value(&json!({"_type": "block", "children": []}), &Schema::default());

        assert_eq!(
            result,
            Err(ModelError::MissingKey {
                type_name: "block".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_marks_are_rejected() {
        let result = Child::from_value(
            &json!({"_key": "s", "_type": "span", "text": "x", "marks": [1]}),
            &Schema::default(),
        );

        assert!(matches!(
            result,
            Err(ModelError::InvalidField { field: "marks", .. })
        ));
    }

    #[test]
    fn test_null_document_is_empty() {
        assert_eq!(blocks_from_value(&Value::Null, &Schema::default()).unwrap(), vec![]);
        assert!(blocks_from_value(&json!({}), &Schema::default()).is_err());
    }
}
