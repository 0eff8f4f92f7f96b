//! Block mirror
//!
//! A `Block` is the local copy of one block configuration. Typed blocks carry
//! a [`Properties`] tree built from their template; blocks listed by the
//! server without a template keep their raw JSON config. Either way `config()`
//! is what gets sent to the server, always carrying `name` and `type`.

use serde_json::{Map, Value};
use std::rc::{Rc, Weak};
use tracing::info;

use crate::container::Properties;
use crate::error::{NioError, Result};
use crate::transport::Rest;
use crate::types::ValueKind;
use crate::value::PropertyError;

/// Non-owning link from an entity to the transport of its instance
#[derive(Debug, Clone, Default)]
pub(crate) struct Link(Option<Weak<Rest>>);

impl Link {
    pub(crate) fn attach(&mut self, rest: &Rc<Rest>) {
        self.0 = Some(Rc::downgrade(rest));
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    fn upgrade(&self) -> Option<Rc<Rest>> {
        self.0.as_ref().and_then(Weak::upgrade)
    }

    /// The live transport, or `NotAttached` naming `entity`
    pub(crate) fn rest(&self, entity: impl FnOnce() -> String) -> Result<Rc<Rest>> {
        self.upgrade().ok_or_else(|| NioError::not_attached(entity()))
    }
}

pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(NioError::invalid_name(format!("{} name must not be empty", kind)));
    }
    Ok(())
}

/// Local mirror of a remote block
#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    block_type: String,
    config: Map<String, Value>,
    properties: Option<Properties>,
    link: Link,
}

impl Block {
    pub fn new(name: impl Into<String>, block_type: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name("block", &name)?;
        Ok(Self {
            name,
            block_type: block_type.into(),
            config: Map::new(),
            properties: None,
            link: Link::default(),
        })
    }

    /// Typed block backed by a property tree built from its template
    pub fn from_properties(
        name: impl Into<String>,
        block_type: impl Into<String>,
        properties: Properties,
    ) -> Result<Self> {
        let mut block = Self::new(name, block_type)?;
        block.properties = Some(properties);
        Ok(block)
    }

    /// Block from a config as listed by the server
    pub fn from_config(config: Map<String, Value>) -> Result<Self> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        let block_type = config.get("type").and_then(Value::as_str).unwrap_or_default();
        Self::new(name, block_type)?.with_config(config)
    }

    /// Load config values; typed fields are coerced, everything else is kept raw
    pub fn with_config(mut self, config: Map<String, Value>) -> Result<Self> {
        if let Some(properties) = &mut self.properties {
            properties.apply_known(&config)?;
        }
        self.config = config;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref()
    }

    pub fn properties_mut(&mut self) -> Option<&mut Properties> {
        self.properties.as_mut()
    }

    /// Read a field by dotted path
    pub fn get(&self, path: &str) -> Result<Value> {
        if let Some(properties) = &self.properties {
            return Ok(properties.get_path(path)?);
        }
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut current = self.config.get(first);
        for part in parts {
            current = current.and_then(|v| v.get(part));
        }
        current
            .cloned()
            .ok_or_else(|| PropertyError::FieldNotFound(path.to_string()).into())
    }

    /// Assign a field by dotted path
    ///
    /// Typed blocks validate against their template. Untyped blocks accept
    /// any path, creating missing intermediate objects. `name` and `type` are
    /// fixed; use [`copy`](Self::copy) to rename.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        if path == "name" || path == "type" {
            return Err(PropertyError::Immutable {
                field: path.to_string(),
                kind: ValueKind::Str,
            }
            .into());
        }
        match &mut self.properties {
            Some(properties) => properties.set_path(path, value)?,
            None => set_raw(&mut self.config, path, value.into())?,
        }
        Ok(())
    }

    /// Config as sent to the server
    pub fn config(&self) -> Map<String, Value> {
        let mut config = self.config.clone();
        if let Some(properties) = &self.properties {
            config.extend(properties.to_mapping());
        }
        config.insert("name".into(), Value::String(self.name.clone()));
        config.insert("type".into(), Value::String(self.block_type.clone()));
        config
    }

    pub(crate) fn attach(&mut self, rest: &Rc<Rest>) {
        self.link.attach(rest);
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_attached()
    }

    fn rest(&self) -> Result<Rc<Rest>> {
        self.link.rest(|| format!("block '{}'", self.name))
    }

    /// PUT the config to `blocks/{name}`
    pub fn save(&self) -> Result<()> {
        let rest = self.rest()?;
        rest.put(&format!("blocks/{}", self.name), &Value::Object(self.config()))?;
        info!("Saved block '{}'", self.name);
        Ok(())
    }

    /// Same config under a new name; the copy shares the transport link
    pub fn copy(&self, new_name: impl Into<String>) -> Result<Self> {
        let new_name = new_name.into();
        check_name("block", &new_name)?;
        let mut copy = self.clone();
        copy.config.insert("name".into(), Value::String(new_name.clone()));
        copy.name = new_name;
        Ok(copy)
    }

    /// DELETE `blocks/{name}`
    pub fn delete(self) -> Result<()> {
        let rest = self.rest()?;
        rest.delete(&format!("blocks/{}", self.name))?;
        info!("Deleted block '{}'", self.name);
        Ok(())
    }
}

/// Walk `path` through nested objects and store `value` at its last segment
fn set_raw(config: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(PropertyError::FieldNotFound(path.to_string()).into());
    };
    if parts.iter().any(|part| part.is_empty()) {
        return Err(PropertyError::FieldNotFound(path.to_string()).into());
    }

    let mut current = config;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            other => return Err(PropertyError::mismatch(ValueKind::Dict, other).into()),
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}
