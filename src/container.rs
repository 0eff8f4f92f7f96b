//! Typed property containers
//!
//! [`Properties`] is a closed mapping from field name to either a leaf
//! [`Property`] or a nested `Properties` group. The field set is fixed when the
//! container is built (usually from a block template) and never changes.
//!
//! Fields can be reached by name (`get_field`) or by dotted path
//! (`get_path("attribute.value.end")`); both resolve to the same cell.
//! `Clone` is a deep copy: mutating a clone never touches the original.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::types::ValueKind;
use crate::value::{Property, PropertyError, ValueType};

/// One entry of a container
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Property),
    Group(Properties),
}

impl Node {
    /// Groups report `Dict` so that freezing mappings also freezes groups
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Leaf(property) => property.kind(),
            Self::Group(_) => ValueKind::Dict,
        }
    }

    /// Plain JSON view of the current value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(property) => property.get().clone(),
            Self::Group(group) => Value::Object(group.to_mapping()),
        }
    }
}

impl From<Property> for Node {
    fn from(property: Property) -> Self {
        Self::Leaf(property)
    }
}

impl From<Properties> for Node {
    fn from(group: Properties) -> Self {
        Self::Group(group)
    }
}

/// Closed, typed mapping of configuration fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
    fields: BTreeMap<String, Node>,
    frozen: BTreeSet<ValueKind>,
}

impl Properties {
    /// Build a container from its complete field set
    pub fn new<I, K, N>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<String>,
        N: Into<Node>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, node)| (name.into(), node.into()))
                .collect(),
            frozen: BTreeSet::new(),
        }
    }

    /// Build a container from plain data, inferring each field's type.
    ///
    /// Nested objects become nested groups.
    pub fn infer(values: &Map<String, Value>) -> Result<Self, PropertyError> {
        let mut fields = BTreeMap::new();
        for (name, value) in values {
            let node = match value {
                Value::Object(nested) => Node::Group(Self::infer(nested)?),
                Value::Null => Node::Leaf(Property::new(ValueType::Str)),
                other => Node::Leaf(Property::with_value(ValueType::infer(other), other.clone())?),
            };
            fields.insert(name.clone(), node);
        }
        Ok(Self {
            fields,
            frozen: BTreeSet::new(),
        })
    }

    /// Freeze the given kinds here and in every nested group.
    ///
    /// A field of a frozen kind can no longer be reassigned; fields inside a
    /// frozen group can still be set through the group.
    pub fn with_frozen(mut self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        let kinds: BTreeSet<ValueKind> = kinds.into_iter().collect();
        self.freeze(&kinds);
        self
    }

    fn freeze(&mut self, kinds: &BTreeSet<ValueKind>) {
        self.frozen.extend(kinds.iter().copied());
        for node in self.fields.values_mut() {
            if let Node::Group(group) = node {
                group.freeze(kinds);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn node(&self, name: &str) -> Result<&Node, PropertyError> {
        self.fields
            .get(name)
            .ok_or_else(|| PropertyError::FieldNotFound(name.to_string()))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node, PropertyError> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| PropertyError::FieldNotFound(name.to_string()))
    }

    /// Leaf property by name
    pub fn property(&self, name: &str) -> Result<&Property, PropertyError> {
        match self.node(name)? {
            Node::Leaf(property) => Ok(property),
            Node::Group(_) => Err(group_is_not_leaf(name)),
        }
    }

    /// Nested group by name
    pub fn group(&self, name: &str) -> Result<&Properties, PropertyError> {
        match self.node(name)? {
            Node::Group(group) => Ok(group),
            Node::Leaf(property) => Err(leaf_is_not_group(property)),
        }
    }

    /// Nested group by name, for setting fields inside it
    pub fn group_mut(&mut self, name: &str) -> Result<&mut Properties, PropertyError> {
        match self.node_mut(name)? {
            Node::Group(group) => Ok(group),
            Node::Leaf(property) => Err(leaf_is_not_group(property)),
        }
    }

    /// Current value of a field; groups are returned as mappings
    pub fn get_field(&self, name: &str) -> Result<Value, PropertyError> {
        self.node(name).map(Node::to_value)
    }

    /// Assign a field through its validator.
    ///
    /// Groups accept an object whose keys are applied to the nested container;
    /// the whole assignment fails if any key fails.
    ///
    /// # Errors
    ///
    /// - `FieldNotFound` for an unknown name
    /// - `Immutable` if the field's kind is frozen
    /// - `TypeMismatch` if the value cannot be coerced
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        let kind = self.node(name)?.kind();
        if self.frozen.contains(&kind) {
            return Err(PropertyError::Immutable {
                field: name.to_string(),
                kind,
            });
        }
        let value = value.into();
        match self.node_mut(name)? {
            Node::Leaf(property) => {
                property.set(value)?;
            }
            Node::Group(group) => {
                let Value::Object(values) = &value else {
                    return Err(PropertyError::mismatch(ValueKind::Dict, &value));
                };
                group.apply(values)?;
            }
        }
        debug!(field = name, "Property updated");
        Ok(())
    }

    /// Assign an enum variant by its display name
    pub fn set_variant<E: fmt::Display>(&mut self, name: &str, variant: &E) -> Result<(), PropertyError> {
        self.set_field(name, variant.to_string())
    }

    /// Append to a list field
    pub fn append(&mut self, name: &str, item: impl Into<Value>) -> Result<(), PropertyError> {
        let frozen = self.frozen.contains(&ValueKind::List);
        match self.node_mut(name)? {
            Node::Leaf(property) if frozen && property.kind() == ValueKind::List => Err(PropertyError::Immutable {
                field: name.to_string(),
                kind: ValueKind::List,
            }),
            Node::Leaf(property) => property.append(item),
            Node::Group(_) => Err(group_is_not_leaf(name)),
        }
    }

    /// Value at a dotted path such as `"attribute.value.end"`
    pub fn get_path(&self, path: &str) -> Result<Value, PropertyError> {
        let (parents, last) = split_path(path)?;
        let mut current = self;
        for segment in parents {
            current = current.group(segment)?;
        }
        current.get_field(last)
    }

    /// Assign the field at a dotted path
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        let (parents, last) = split_path(path)?;
        let mut current = self;
        for segment in parents {
            current = current.group_mut(segment)?;
        }
        current.set_field(last, value)
    }

    /// Assign several fields at once; nothing changes if any assignment fails
    pub fn apply(&mut self, values: &Map<String, Value>) -> Result<(), PropertyError> {
        let mut staged = self.clone();
        for (name, value) in values {
            staged.set_field(name, value.clone())?;
        }
        *self = staged;
        Ok(())
    }

    /// Like [`apply`](Self::apply), but skips keys the schema does not know.
    ///
    /// Returns the skipped keys.
    pub fn apply_known(&mut self, values: &Map<String, Value>) -> Result<Vec<String>, PropertyError> {
        let (known, unknown): (Map<String, Value>, Map<String, Value>) = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(k, _)| self.contains(k));
        self.apply(&known)?;
        let skipped: Vec<String> = unknown.into_iter().map(|(k, _)| k).collect();
        if !skipped.is_empty() {
            debug!(?skipped, "Ignoring fields missing from schema");
        }
        Ok(skipped)
    }

    /// Flatten into a plain JSON object of current values
    pub fn to_mapping(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, node)| (name.clone(), node.to_value()))
            .collect()
    }
}

fn split_path(path: &str) -> Result<(Vec<&str>, &str), PropertyError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    match segments.pop() {
        Some(last) if !last.is_empty() && segments.iter().all(|s| !s.is_empty()) => {
            Ok((segments, last))
        }
        _ => Err(PropertyError::FieldNotFound(path.to_string())),
    }
}

fn group_is_not_leaf(name: &str) -> PropertyError {
    PropertyError::TypeMismatch {
        expected: "property".to_string(),
        found: format!("group '{}'", name),
    }
}

fn leaf_is_not_group(property: &Property) -> PropertyError {
    PropertyError::TypeMismatch {
        expected: ValueKind::Dict.to_string(),
        found: property.value_type().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Map<String, Value> {
        let mut data = Map::new();
        for (i, c) in "abcdefg".chars().enumerate() {
            data.insert(c.to_string(), json!(i));
        }
        let own = data.clone();
        data.insert("own".to_string(), Value::Object(own));
        data
    }

    #[test]
    fn test_infer_builds_groups() {
        let props = Properties::infer(&sample()).expect("infers");
        assert!(matches!(props.node("own"), Ok(Node::Group(_))));
        assert_eq!(props.to_mapping(), sample());
    }

    #[test]
    fn test_set_and_coerce() {
        let mut props = Properties::infer(&sample()).expect("infers");
        props.set_field("a", 8).expect("int");
        assert_eq!(props.get_field("a"), Ok(json!(8)));
        props.set_field("b", 9.3).expect("float truncates");
        assert_eq!(props.get_field("b"), Ok(json!(9)));
    }

    #[test]
    fn test_set_rejects_bad_type() {
        let mut props = Properties::infer(&sample()).expect("infers");
        let err = props.set_field("c", "hello").unwrap_err();
        assert!(matches!(err, PropertyError::TypeMismatch { .. }));
        assert_eq!(props.get_field("c"), Ok(json!(2)));
    }

    #[test]
    fn test_unknown_field() {
        let mut props = Properties::infer(&sample()).expect("infers");
        assert_eq!(
            props.set_field("dne", 1),
            Err(PropertyError::FieldNotFound("dne".into()))
        );
        assert!(props.get_field("dne").is_err());
        assert!(!props.contains("dne"));
    }

    #[test]
    fn test_frozen_groups() {
        let mut props = Properties::infer(&sample())
            .expect("infers")
            .with_frozen([ValueKind::Dict]);
        props.set_field("a", 5).expect("ints are not frozen");
        assert_eq!(props.get_field("a"), Ok(json!(5)));

        let err = props.set_field("own", json!({})).unwrap_err();
        assert!(matches!(err, PropertyError::Immutable { kind: ValueKind::Dict, .. }));

        // fields inside the frozen group stay writable
        props.set_path("own.a", 42).expect("leaf inside group");
        assert_eq!(props.get_path("own.a"), Ok(json!(42)));
    }

    #[test]
    fn test_group_assignment_is_atomic() {
        let mut props = Properties::infer(&sample()).expect("infers");
        let err = props.set_field("own", json!({"a": 10, "b": "bad"}));
        assert!(err.is_err());
        assert_eq!(props.get_path("own.a"), Ok(json!(0)));

        props.set_field("own", json!({"a": 10, "b": 11})).expect("valid");
        assert_eq!(props.get_path("own.b"), Ok(json!(11)));
    }

    #[test]
    fn test_path_and_key_access_agree() {
        let mut props = Properties::infer(&sample()).expect("infers");
        props.group_mut("own").expect("group").set_field("g", 60).expect("int");
        assert_eq!(props.get_path("own.g"), Ok(json!(60)));
        assert_eq!(props.group("own").and_then(|g| g.get_field("g")), Ok(json!(60)));
        assert!(props.get_path("own.").is_err());
        assert!(props.get_path("a.b").is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Properties::infer(&sample()).expect("infers");
        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.set_field("a", 100).expect("int");
        copy.set_path("own.a", 100).expect("int");
        assert_eq!(original.get_field("a"), Ok(json!(0)));
        assert_eq!(original.get_path("own.a"), Ok(json!(0)));
        assert_ne!(copy, original);
    }

    #[test]
    fn test_apply_known_skips_unknown() {
        let mut props = Properties::infer(&sample()).expect("infers");
        let values = json!({"a": 3, "zzz": 1});
        let skipped = props
            .apply_known(values.as_object().expect("object"))
            .expect("known fields valid");
        assert_eq!(skipped, vec!["zzz".to_string()]);
        assert_eq!(props.get_field("a"), Ok(json!(3)));
    }

    #[test]
    fn test_enum_field() {
        let mut props = Properties::new([(
            "enum",
            Property::new(ValueType::enumeration(["a", "b", "c"])),
        )]);
        props.set_field("enum", 1).expect("ordinal");
        assert_eq!(props.get_field("enum"), Ok(json!("b")));
        assert!(props.set_field("enum", "z").is_err());
        assert_eq!(props.get_field("enum"), Ok(json!("b")));
    }
}
