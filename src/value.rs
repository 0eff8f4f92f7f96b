//! Typed property values
//!
//! A [`Property`] wraps one JSON value together with its declared
//! [`ValueType`]. Every assignment goes through [`ValueType::coerce`], so the
//! stored value always conforms to the declared type. Rejected assignments
//! leave the previous value untouched.
//!
//! Coercion follows the server's loose typing:
//!
//! - integers accept floats (truncated toward zero), booleans and numeric strings
//! - floats accept integers (`3` becomes `3.0`), booleans and float strings
//! - strings accept anything and stringify it
//! - enums accept an ordinal, a symbol name or an enum variant, and always
//!   store the symbol name

use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

use crate::types::ValueKind;

/// Errors raised by typed properties and the template loader
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// Value cannot be coerced into the declared type
    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    /// Assignment to a field whose kind is frozen by its container
    #[error("Field '{field}' has frozen type {kind} and cannot be reassigned")]
    Immutable { field: String, kind: ValueKind },

    /// Unknown field name
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Template could not be turned into properties
    #[error("Schema error: {0}")]
    Schema(String),
}

impl PropertyError {
    pub(crate) fn mismatch(expected: impl fmt::Display, found: &Value) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }
}

/// Declared type of a property
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Str,
    Int,
    Float,
    Bool,
    /// Ordered set of legal symbol names
    Enum(Vec<String>),
    /// Homogeneous list of the inner type
    List(Box<ValueType>),
    /// Untyped JSON mapping
    Dict,
}

impl ValueType {
    /// Build an enum type from its ordered symbols
    pub fn enumeration<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(symbols.into_iter().map(Into::into).collect())
    }

    /// Build a list type over `item`
    pub fn list(item: ValueType) -> Self {
        Self::List(Box::new(item))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Str => ValueKind::Str,
            Self::Int => ValueKind::Int,
            Self::Float => ValueKind::Float,
            Self::Bool => ValueKind::Bool,
            Self::Enum(_) => ValueKind::Enum,
            Self::List(_) => ValueKind::List,
            Self::Dict => ValueKind::Dict,
        }
    }

    /// Type-appropriate zero value.
    ///
    /// Enums with no symbols have no zero value and yield `Null`; the template
    /// loader rejects them before that can be stored.
    pub fn zero(&self) -> Value {
        match self {
            Self::Str => Value::String(String::new()),
            Self::Int => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Bool => Value::Bool(false),
            Self::Enum(symbols) => symbols
                .first()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
            Self::List(_) => Value::Array(Vec::new()),
            Self::Dict => Value::Object(Map::new()),
        }
    }

    /// Coerce `value` into this type, or explain why it cannot be.
    pub fn coerce(&self, value: &Value) -> Result<Value, PropertyError> {
        let coerced = match self {
            Self::Str => Some(match value {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            }),
            Self::Int => coerce_int(value).map(Value::from),
            Self::Float => coerce_float(value).and_then(Number::from_f64).map(Value::Number),
            Self::Bool => coerce_bool(value).map(Value::Bool),
            Self::Enum(symbols) => coerce_symbol(symbols, value).map(Value::String),
            Self::List(item) => match value {
                Value::Array(items) => Some(Value::Array(
                    items
                        .iter()
                        .map(|v| item.coerce(v))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                _ => None,
            },
            Self::Dict => value.is_object().then(|| value.clone()),
        };
        coerced.ok_or_else(|| PropertyError::mismatch(self, value))
    }

    /// Infer a type from a plain JSON value.
    ///
    /// Lists take the type of their first element, widened to float when any
    /// element is a non-integer number. Empty lists become lists of strings.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null | Value::String(_) => Self::Str,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Int,
            Value::Array(items) => {
                let item = match items.first() {
                    None => Self::Str,
                    Some(first) => {
                        let inferred = Self::infer(first);
                        let widen = inferred == Self::Int
                            && items.iter().any(|v| v.as_number().is_some_and(Number::is_f64));
                        if widen { Self::Float } else { inferred }
                    }
                };
                Self::list(item)
            }
            Value::Object(_) => Self::Dict,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enum(symbols) => write!(f, "enum[{}]", symbols.join(", ")),
            Self::List(item) => write!(f, "list[{}]", item),
            other => write!(f, "{}", other.kind()),
        }
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate_to_i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truncate_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX is not representable as f64; the bound is exclusive
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_symbol(symbols: &[String], value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| symbols.get(i))
            .cloned(),
        Value::String(s) => symbols.iter().find(|sym| *sym == s).cloned(),
        _ => None,
    }
}

/// A single typed value cell
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    value_type: ValueType,
    value: Value,
    default: Option<Value>,
    title: Option<String>,
}

impl Property {
    /// Create a property holding the zero value of `value_type`
    pub fn new(value_type: ValueType) -> Self {
        let value = value_type.zero();
        Self {
            value_type,
            value,
            default: None,
            title: None,
        }
    }

    /// Create a property with an initial value, coerced to `value_type`
    pub fn with_value(value_type: ValueType, initial: impl Into<Value>) -> Result<Self, PropertyError> {
        let mut property = Self::new(value_type);
        property.set(initial)?;
        Ok(property)
    }

    /// Set the default (coerced) and make it the current value
    pub fn with_default(mut self, default: impl Into<Value>) -> Result<Self, PropertyError> {
        let default = self.value_type.coerce(&default.into())?;
        self.value = default.clone();
        self.default = Some(default);
        Ok(self)
    }

    /// Attach a display label
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn kind(&self) -> ValueKind {
        self.value_type.kind()
    }

    /// Current, already coerced value
    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Assign a new value.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the value cannot be coerced; the old value is kept.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<&Value, PropertyError> {
        self.value = self.value_type.coerce(&value.into())?;
        Ok(&self.value)
    }

    /// Assign an enum variant by its display name
    pub fn set_variant<E: fmt::Display>(&mut self, variant: &E) -> Result<&Value, PropertyError> {
        self.set(variant.to_string())
    }

    /// Append one item to a list property, coercing it to the item type
    pub fn append(&mut self, item: impl Into<Value>) -> Result<(), PropertyError> {
        let ValueType::List(item_type) = &self.value_type else {
            return Err(PropertyError::TypeMismatch {
                expected: ValueKind::List.to_string(),
                found: self.value_type.to_string(),
            });
        };
        let item = item_type.coerce(&item.into())?;
        match &mut self.value {
            Value::Array(items) => items.push(item),
            other => *other = Value::Array(vec![item]),
        }
        Ok(())
    }

    /// Restore the default, or the zero value when there is none
    pub fn reset(&mut self) {
        self.value = self
            .default
            .clone()
            .unwrap_or_else(|| self.value_type.zero());
    }
}
