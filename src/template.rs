//! Block templates
//!
//! The server describes every block type with a template:
//!
//! ```json
//! {
//!   "name": "SimulatorFast",
//!   "properties": {
//!     "name":     { "type": "str", "title": "Name" },
//!     "interval": { "days": { "type": "int", "default": 0 } },
//!     "level":    { "type": "enum", "options": ["low", "high"] }
//!   }
//! }
//! ```
//!
//! An entry with a `type` is a leaf; an entry without one is a group of
//! nested entries (`type: dict` with `properties` is accepted too). Loading a
//! template produces a [`Properties`] tree whose leaves start at their
//! `default`, or at the type's zero value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::container::{Node, Properties};
use crate::types::ValueKind;
use crate::value::{Property, PropertyError, ValueType};

/// Schema of one block type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaNode>,
}

/// Schema entry: a typed leaf or a group of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Leaf(LeafSchema),
    Group(BTreeMap<String, SchemaNode>),
}

/// Schema of a single typed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Legal symbols of an enum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Item type name of a list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    /// Nested entries of a `dict` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaNode>>,
}

impl Template {
    /// Parse a template from the JSON the server returns
    pub fn from_value(value: &Value) -> Result<Self, PropertyError> {
        Self::deserialize(value).map_err(|e| PropertyError::schema(format!("invalid template: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self, PropertyError> {
        serde_json::from_str(text).map_err(|e| PropertyError::schema(format!("invalid template: {}", e)))
    }

    /// Instantiate a fresh property tree for this block type
    pub fn build(&self) -> Result<Properties, PropertyError> {
        build_group("", &self.properties)
    }
}

/// Parse a template and build its property tree in one step
pub fn load_block(template: &Value) -> Result<Properties, PropertyError> {
    Template::from_value(template)?.build()
}

fn build_group(prefix: &str, entries: &BTreeMap<String, SchemaNode>) -> Result<Properties, PropertyError> {
    let mut fields = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        fields.push((name.clone(), build_node(&path, entry)?));
    }
    Ok(Properties::new(fields))
}

fn build_node(path: &str, entry: &SchemaNode) -> Result<Node, PropertyError> {
    match entry {
        SchemaNode::Group(entries) => build_group(path, entries).map(Node::Group),
        SchemaNode::Leaf(leaf) => match (&leaf.properties, leaf.value_kind(path)?) {
            (Some(entries), ValueKind::Dict) => build_group(path, entries).map(Node::Group),
            _ => leaf.build(path).map(Node::Leaf),
        },
    }
}

impl LeafSchema {
    fn value_kind(&self, path: &str) -> Result<ValueKind, PropertyError> {
        self.kind.parse().map_err(|_| {
            PropertyError::schema(format!("field '{}' has unknown type '{}'", path, self.kind))
        })
    }

    fn value_type(&self, path: &str) -> Result<ValueType, PropertyError> {
        Ok(match self.value_kind(path)? {
            ValueKind::Str => ValueType::Str,
            ValueKind::Int => ValueType::Int,
            ValueKind::Float => ValueType::Float,
            ValueKind::Bool => ValueType::Bool,
            ValueKind::Dict => ValueType::Dict,
            ValueKind::Enum => match &self.options {
                Some(options) if !options.is_empty() => ValueType::Enum(options.clone()),
                _ => {
                    return Err(PropertyError::schema(format!(
                        "enum field '{}' declares no options",
                        path
                    )));
                }
            },
            ValueKind::List => {
                let item = match &self.items {
                    None => ValueType::Str,
                    Some(name) => match name.parse::<ValueKind>() {
                        Ok(ValueKind::Str) => ValueType::Str,
                        Ok(ValueKind::Int) => ValueType::Int,
                        Ok(ValueKind::Float) => ValueType::Float,
                        Ok(ValueKind::Bool) => ValueType::Bool,
                        Ok(ValueKind::Dict) => ValueType::Dict,
                        _ => {
                            return Err(PropertyError::schema(format!(
                                "list field '{}' has unsupported item type '{}'",
                                path, name
                            )));
                        }
                    },
                };
                ValueType::list(item)
            }
        })
    }

    fn build(&self, path: &str) -> Result<Property, PropertyError> {
        let mut property = Property::new(self.value_type(path)?);
        if let Some(default) = &self.default {
            property = property.with_default(default.clone()).map_err(|e| {
                PropertyError::schema(format!("field '{}' has an invalid default: {}", path, e))
            })?;
        }
        if let Some(title) = &self.title {
            property = property.with_title(title.clone());
        }
        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn basic() -> Value {
        json!({
            "name": "template",
            "properties": {
                "name": { "type": "str", "title": null },
                "type": { "type": "str", "title": null },
                "value": { "type": "int", "title": "Value", "default": 0 }
            }
        })
    }

    #[test]
    fn test_basic_template() {
        let props = load_block(&basic()).expect("loads");
        assert_eq!(
            Value::Object(props.to_mapping()),
            json!({"name": "", "type": "", "value": 0})
        );
        assert_eq!(props.property("value").map(|p| p.title()), Ok(Some("Value")));
    }

    #[test]
    fn test_groups_and_zero_values() {
        let template = json!({
            "name": "Nested",
            "properties": {
                "attribute": {
                    "name": { "type": "string" },
                    "value": {
                        "end": { "type": "float", "default": 1 },
                        "start": { "type": "float" }
                    }
                },
                "flag": { "type": "bool" },
                "level": { "type": "select", "options": ["low", "high"] },
                "tags": { "type": "list", "items": "int" },
                "extra": { "type": "dict" },
                "interval": {
                    "type": "object",
                    "properties": { "days": { "type": "int" } }
                }
            }
        });
        let mut props = load_block(&template).expect("loads");
        assert_eq!(props.get_path("attribute.value.end"), Ok(json!(1.0)));
        assert_eq!(props.get_path("attribute.value.start"), Ok(json!(0.0)));
        assert_eq!(props.get_field("flag"), Ok(json!(false)));
        assert_eq!(props.get_field("level"), Ok(json!("low")));
        assert_eq!(props.get_field("tags"), Ok(json!([])));
        assert_eq!(props.get_field("extra"), Ok(json!({})));
        assert_eq!(props.get_path("interval.days"), Ok(json!(0)));

        props.set_path("attribute.name", "newsim").expect("str");
        props.set_path("attribute.value.end", 5.8).expect("float");
        props.set_path("interval.days", 100).expect("int");
        assert!(props.set_path("attribute.value.end", "bad").is_err());
        assert!(props.set_path("interval.days", "bad").is_err());
        assert_eq!(props.get_path("attribute.value.end"), Ok(json!(5.8)));
    }

    #[test]
    fn test_unknown_type_is_schema_error() {
        let template = json!({
            "name": "Broken",
            "properties": { "delay": { "type": "timedelta" } }
        });
        let err = load_block(&template).unwrap_err();
        assert!(matches!(err, PropertyError::Schema(msg) if msg.contains("delay")));
    }

    #[test]
    fn test_enum_without_options_is_schema_error() {
        let template = json!({
            "properties": { "mode": { "type": "enum" } }
        });
        assert!(matches!(load_block(&template), Err(PropertyError::Schema(_))));
    }

    #[test]
    fn test_bad_default_is_schema_error() {
        let template = json!({
            "properties": { "count": { "type": "int", "default": "many" } }
        });
        assert!(matches!(load_block(&template), Err(PropertyError::Schema(_))));
    }

    #[test]
    fn test_malformed_entry_is_schema_error() {
        let template = json!({
            "properties": { "count": { "title": "Count", "default": 1 } }
        });
        assert!(matches!(load_block(&template), Err(PropertyError::Schema(_))));
    }

    #[test]
    fn test_each_build_is_fresh() {
        let template = Template::from_value(&basic()).expect("parses");
        let mut first = template.build().expect("builds");
        let second = template.build().expect("builds");
        first.set_field("value", 7).expect("int");
        assert_eq!(second.get_field("value"), Ok(json!(0)));
    }
}
