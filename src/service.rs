//! Service mirror
//!
//! A service owns an execution graph: an ordered list of blocks, each with
//! the blocks it sends signals to. Starting a service issues the action and
//! then drives a [`TransitionPoller`] until the server reports `started`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::{info, warn};

use crate::block::{Block, Link, check_name};
use crate::error::{NioError, Result};
use crate::poller::{CancelToken, PollOutcome, StatusSource, TransitionPoller};
use crate::transport::{Rest, TransportError};
use crate::types::Status;

pub const DEFAULT_SERVICE_TYPE: &str = "Service";
pub const DEFAULT_LOG_LEVEL: &str = "ERROR";

/// Retries for the start/stop action request
const ACTION_RETRY: u32 = 5;

/// One block of the execution graph and its receivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub name: String,
    #[serde(default)]
    pub receivers: Vec<String>,
}

/// Local mirror of a remote service
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    service_type: String,
    execution: Vec<ExecutionEntry>,
    config: Map<String, Value>,
    link: Link,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name("service", &name)?;
        Ok(Self {
            name,
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            execution: Vec::new(),
            config: default_config(),
            link: Link::default(),
        })
    }

    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Service from a config as listed by the server
    pub fn from_config(mut config: Map<String, Value>) -> Result<Self> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        let mut service = Self::new(name)?;
        if let Some(service_type) = config.get("type").and_then(Value::as_str) {
            service = service.with_type(service_type);
        }
        if let Some(execution) = config.remove("execution") {
            service.execution = serde_json::from_value(execution)?;
        }
        for (key, value) in default_config() {
            config.entry(key).or_insert(value);
        }
        service.config = config;
        Ok(service)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn auto_start(&self) -> bool {
        self.config
            .get("auto_start")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_auto_start(&mut self, auto_start: bool) {
        self.config.insert("auto_start".into(), Value::Bool(auto_start));
    }

    pub fn log_level(&self) -> &str {
        self.config
            .get("log_level")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn set_log_level(&mut self, level: impl Into<String>) {
        self.config.insert("log_level".into(), Value::String(level.into()));
    }

    pub fn execution(&self) -> &[ExecutionEntry] {
        &self.execution
    }

    /// Route signals from `source` to `dest`
    pub fn connect(&mut self, source: &Block, dest: &Block) {
        self.connect_names(source.name(), dest.name());
    }

    /// Same as [`connect`](Self::connect), by block name
    ///
    /// Appends `dest` to the receivers of `source`'s entry, creating the entry
    /// at the end on first use. Connecting the same pair twice is a no-op.
    pub fn connect_names(&mut self, source: &str, dest: &str) {
        match self.execution.iter_mut().find(|e| e.name == source) {
            Some(entry) => {
                if !entry.receivers.iter().any(|r| r == dest) {
                    entry.receivers.push(dest.to_string());
                }
            }
            None => self.execution.push(ExecutionEntry {
                name: source.to_string(),
                receivers: vec![dest.to_string()],
            }),
        }
    }

    /// Every block named in the execution graph
    pub fn block_names(&self) -> BTreeSet<&str> {
        self.execution
            .iter()
            .flat_map(|e| std::iter::once(e.name.as_str()).chain(e.receivers.iter().map(String::as_str)))
            .collect()
    }

    /// Config as sent to the server
    pub fn config(&self) -> Map<String, Value> {
        let mut config = self.config.clone();
        config.insert("name".into(), Value::String(self.name.clone()));
        config.insert("type".into(), Value::String(self.service_type.clone()));
        config.insert(
            "execution".into(),
            Value::Array(
                self.execution
                    .iter()
                    .map(|e| {
                        serde_json::json!({ "name": e.name, "receivers": e.receivers })
                    })
                    .collect(),
            ),
        );
        config
    }

    pub(crate) fn attach(&mut self, rest: &Rc<Rest>) {
        self.link.attach(rest);
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_attached()
    }

    fn rest(&self) -> Result<Rc<Rest>> {
        self.link.rest(|| format!("service '{}'", self.name))
    }

    /// PUT the config to `services/{name}`
    pub fn save(&self) -> Result<()> {
        let rest = self.rest()?;
        rest.put(&format!("services/{}", self.name), &Value::Object(self.config()))?;
        info!("Saved service '{}'", self.name);
        Ok(())
    }

    /// DELETE `services/{name}`
    pub fn delete(self) -> Result<()> {
        let rest = self.rest()?;
        rest.delete(&format!("services/{}", self.name))?;
        info!("Deleted service '{}'", self.name);
        Ok(())
    }

    /// Start the service and wait until the server reports `started`
    pub fn start(&self) -> Result<PollOutcome> {
        self.action("start")?;
        self.await_status(Status::Started)
    }

    /// Issue the stop action without waiting for the service to settle
    pub fn stop(&self) -> Result<()> {
        self.action("stop")
    }

    /// Current status as reported by the server, `None` when unreported
    pub fn status(&self) -> Result<Option<Status>> {
        let rest = self.rest()?;
        let endpoint = self.status_endpoint();
        match parse_status(&rest.get(&endpoint)?) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| NioError::unexpected_response(endpoint, format!("unknown status '{}'", raw))),
        }
    }

    /// Poll until the server reports `target`
    pub fn await_status(&self, target: Status) -> Result<PollOutcome> {
        self.await_status_with(target, CancelToken::default())
    }

    /// Poll until the server reports `target` or `cancel` is triggered
    pub fn await_status_with(&self, target: Status, cancel: CancelToken) -> Result<PollOutcome> {
        let rest = self.rest()?;
        let query = StatusQuery {
            rest: &rest,
            endpoint: self.status_endpoint(),
        };
        let outcome = TransitionPoller::new(&query, rest.sleeper(), rest.poll_policy().clone())
            .with_cancel(cancel)
            .complete(target)?;
        info!(
            "Service '{}' is {} after {} poll(s)",
            self.name,
            target,
            outcome.polls
        );
        Ok(outcome)
    }

    fn status_endpoint(&self) -> String {
        format!("services/{}/status", self.name)
    }

    /// The server may answer an action with an error or time out while it is
    /// still processing; the status poll decides the outcome.
    fn action(&self, action: &str) -> Result<()> {
        let rest = self.rest()?;
        let endpoint = format!("services/{}/{}", self.name, action);
        match rest.get_with(&endpoint, None, ACTION_RETRY) {
            Ok(_) => {}
            Err(e) if e.is_status() || e.is_timeout() => {
                warn!("Ignoring {} response: {}", action, e);
            }
            Err(e) => return Err(e.into()),
        }
        info!("Requested {} of service '{}'", action, self.name);
        Ok(())
    }
}

fn default_config() -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("auto_start".into(), Value::Bool(false));
    config.insert("log_level".into(), Value::String(DEFAULT_LOG_LEVEL.into()));
    config
}

/// Accepts `"started"`, `{"status": "started"}` or `null`
fn parse_status(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("status").and_then(parse_status),
        other => Some(other.to_string()),
    }
}

struct StatusQuery<'a> {
    rest: &'a Rest,
    endpoint: String,
}

impl StatusSource for StatusQuery<'_> {
    fn fetch_status(&self) -> std::result::Result<Option<String>, TransportError> {
        self.rest
            .get_with(&self.endpoint, None, 0)
            .map(|value| parse_status(&value))
    }
}
