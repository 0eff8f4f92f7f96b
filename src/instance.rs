//! Instance: one server connection plus its local mirror
//!
//! The instance owns the transport (`Rc<Rest>`); every block and service it
//! mirrors holds a weak link to it. Templates are fetched from
//! `blocks_types` on first use and cached for the life of the instance.

use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, info};

use crate::block::Block;
use crate::config::ClientConfig;
use crate::error::{NioError, Result};
use crate::service::Service;
use crate::template::Template;
use crate::transport::Rest;

/// A connection to one nio server and the blocks and services on it
#[derive(Debug)]
pub struct Instance {
    config: ClientConfig,
    rest: Rc<Rest>,
    blocks: BTreeMap<String, Block>,
    services: BTreeMap<String, Service>,
    templates: BTreeMap<String, Template>,
}

impl Instance {
    /// Connect over HTTP and load the current blocks and services
    pub fn connect(config: ClientConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| NioError::config(format!("{:#}", e)))?;
        let rest = Rest::from_config(&config)?;
        Self::from_rest(config, rest)
    }

    /// Build on an existing transport and load the current blocks and services
    pub fn from_rest(config: ClientConfig, rest: Rest) -> Result<Self> {
        let mut instance = Self {
            config,
            rest: Rc::new(rest),
            blocks: BTreeMap::new(),
            services: BTreeMap::new(),
            templates: BTreeMap::new(),
        };
        instance.reset()?;
        Ok(instance)
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &Rc<Rest> {
        &self.rest
    }

    /// Replace the mirror with what the server currently lists
    pub fn reset(&mut self) -> Result<()> {
        let mut blocks = BTreeMap::new();
        for config in self.list("blocks")? {
            let mut block = Block::from_config(config)?;
            block.attach(&self.rest);
            blocks.insert(block.name().to_string(), block);
        }

        let mut services = BTreeMap::new();
        for config in self.list("services")? {
            let mut service = Service::from_config(config)?;
            service.attach(&self.rest);
            services.insert(service.name().to_string(), service);
        }

        debug!("Loaded {} block(s), {} service(s)", blocks.len(), services.len());
        self.blocks = blocks;
        self.services = services;
        Ok(())
    }

    /// Listing as a sequence of configs; names come from the keys when the
    /// server answers with an object
    fn list(&self, endpoint: &str) -> Result<Vec<Map<String, Value>>> {
        let listing = self.rest.get(endpoint)?;
        let entries: Vec<(Option<String>, Value)> = match listing {
            Value::Null => Vec::new(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
            Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
            other => {
                return Err(NioError::unexpected_response(
                    endpoint,
                    format!("expected an object or array, got {}", other),
                ));
            }
        };

        entries
            .into_iter()
            .map(|(key, value)| match value {
                Value::Object(mut config) => {
                    if let Some(key) = key {
                        config.entry("name").or_insert(Value::String(key));
                    }
                    Ok(config)
                }
                Value::String(name) => {
                    let mut config = Map::new();
                    config.insert("name".into(), Value::String(name));
                    Ok(config)
                }
                other => Err(NioError::unexpected_response(
                    endpoint,
                    format!("unexpected entry {}", other),
                )),
            })
            .collect()
    }

    /// Names in a listing, without building entities
    fn list_names(&self, endpoint: &str) -> Result<Vec<String>> {
        Ok(match self.rest.get(endpoint)? {
            Value::Object(map) => map.into_iter().map(|(k, _)| k).collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name.clone()),
                    other => other.get("name").and_then(Value::as_str).map(str::to_string),
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Version information from `nio`
    pub fn nio(&self) -> Result<Value> {
        Ok(self.rest.get("nio")?)
    }

    pub fn blocks(&self) -> &BTreeMap<String, Block> {
        &self.blocks
    }

    pub fn services(&self) -> &BTreeMap<String, Service> {
        &self.services
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut Block> {
        self.blocks.get_mut(name)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    /// Attach, save and mirror a block, replacing any block of the same name
    pub fn add_block(&mut self, mut block: Block) -> Result<&mut Block> {
        block.attach(&self.rest);
        block.save()?;
        Ok(match self.blocks.entry(block.name().to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(block);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(block),
        })
    }

    /// Attach, save and mirror a service, replacing any service of the same name
    pub fn add_service(&mut self, mut service: Service) -> Result<&mut Service> {
        service.attach(&self.rest);
        service.save()?;
        Ok(match self.services.entry(service.name().to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(service);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(service),
        })
    }

    /// Block type names advertised by the server
    pub fn block_types(&mut self) -> Result<Vec<String>> {
        if self.templates.is_empty() {
            self.fetch_templates()?;
        }
        Ok(self.templates.keys().cloned().collect())
    }

    /// Template of a block type, refetching once if it is not cached
    pub fn template(&mut self, block_type: &str) -> Result<&Template> {
        if !self.templates.contains_key(block_type) {
            self.fetch_templates()?;
        }
        self.templates
            .get(block_type)
            .ok_or_else(|| NioError::UnknownBlockType(block_type.to_string()))
    }

    fn fetch_templates(&mut self) -> Result<()> {
        let mut templates = BTreeMap::new();
        for config in self.list("blocks_types")? {
            let key = config.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let template = Template::from_value(&Value::Object(config))?;
            templates.insert(key, template);
        }
        debug!("Cached {} block template(s)", templates.len());
        self.templates = templates;
        Ok(())
    }

    /// Build a block of `block_type` from its template, save and mirror it
    pub fn create_block(&mut self, name: &str, block_type: &str) -> Result<&mut Block> {
        let properties = self.template(block_type)?.build()?;
        let block = Block::from_properties(name, block_type, properties)?;
        self.add_block(block)
    }

    /// Create an empty service, save and mirror it
    pub fn create_service(&mut self, name: &str) -> Result<&mut Service> {
        self.add_service(Service::new(name)?)
    }

    /// Start services one after another, waiting for each to report `started`
    pub fn start<'a>(&self, services: impl IntoIterator<Item = &'a Service>) -> Result<()> {
        let services: Vec<&Service> = services.into_iter().collect();
        let total = services.len();
        for (i, service) in services.into_iter().enumerate() {
            info!("Starting [{}/{}] {}", i + 1, total, service.name());
            service.start()?;
        }
        Ok(())
    }

    /// Stop services one after another
    pub fn stop<'a>(&self, services: impl IntoIterator<Item = &'a Service>) -> Result<()> {
        let services: Vec<&Service> = services.into_iter().collect();
        let total = services.len();
        for (i, service) in services.into_iter().enumerate() {
            info!("Stopping [{}/{}] {}", i + 1, total, service.name());
            service.stop()?;
        }
        Ok(())
    }

    /// Delete every block and service on the server, including ones the
    /// mirror could not load, then clear the mirror
    pub fn delete_all(&mut self) -> Result<()> {
        let blocks = self.list_names("blocks")?;
        let services = self.list_names("services")?;

        for name in &blocks {
            self.rest.delete(&format!("blocks/{}", name))?;
        }
        for name in &services {
            if let Err(e) = self.rest.get(&format!("services/{}/stop", name)) {
                if !e.is_status() {
                    return Err(e.into());
                }
                debug!("Service '{}' not stopped: {}", name, e);
            }
            self.rest.delete(&format!("services/{}", name))?;
        }

        info!("Deleted {} block(s) and {} service(s)", blocks.len(), services.len());
        self.blocks.clear();
        self.services.clear();
        Ok(())
    }

    /// Delete blocks that no service execution graph refers to
    ///
    /// Returns the names of the deleted blocks.
    pub fn clean(&mut self) -> Result<Vec<String>> {
        let used: BTreeSet<String> = self
            .services
            .values()
            .flat_map(|s| s.block_names())
            .map(str::to_string)
            .collect();
        let unused: Vec<String> = self
            .blocks
            .keys()
            .filter(|name| !used.contains(*name))
            .cloned()
            .collect();

        for name in &unused {
            if let Some(block) = self.blocks.get(name) {
                block.clone().delete()?;
                self.blocks.remove(name);
            }
        }
        if !unused.is_empty() {
            info!("Removed {} unused block(s)", unused.len());
        }
        Ok(unused)
    }
}
