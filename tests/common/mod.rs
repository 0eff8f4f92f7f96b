//! Shared fixtures: a scripted in-memory transport and a counting sleeper

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use nio_client::{ClientConfig, Instance, Rest, Sleeper, Transport, TransportError};
use serde_json::Value;

/// A recorded request
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(String),
    Put(String, Value),
    Delete(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    queued: HashMap<String, VecDeque<Result<Value, TransportError>>>,
    sticky: HashMap<String, Result<Value, TransportError>>,
    failing_deletes: HashMap<String, TransportError>,
}

/// Transport answering from per-endpoint scripts
///
/// Queued results are consumed first, then the sticky result for the
/// endpoint, then `null`. Clones share state, so a test can keep a handle
/// after moving one into a `Rest`.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every GET of `endpoint` with `value`
    pub fn on_get(&self, endpoint: &str, value: Value) -> &Self {
        self.state
            .borrow_mut()
            .sticky
            .insert(endpoint.to_string(), Ok(value));
        self
    }

    /// Answer the next GET of `endpoint` with `result`
    pub fn queue(&self, endpoint: &str, result: Result<Value, TransportError>) -> &Self {
        self.state
            .borrow_mut()
            .queued
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Fail every GET of `endpoint`
    pub fn fail_get(&self, endpoint: &str, error: TransportError) -> &Self {
        self.state
            .borrow_mut()
            .sticky
            .insert(endpoint.to_string(), Err(error));
        self
    }

    pub fn fail_delete(&self, endpoint: &str, error: TransportError) -> &Self {
        self.state
            .borrow_mut()
            .failing_deletes
            .insert(endpoint.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn gets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Get(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn puts(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Put(e, v) => Some((e, v)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    fn get(&self, endpoint: &str, _body: Option<&Value>) -> Result<Value, TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Get(endpoint.to_string()));
        if let Some(result) = state.queued.get_mut(endpoint).and_then(VecDeque::pop_front) {
            return result;
        }
        state
            .sticky
            .get(endpoint)
            .cloned()
            .unwrap_or(Ok(Value::Null))
    }

    fn put(&self, endpoint: &str, body: &Value) -> Result<(), TransportError> {
        self.state
            .borrow_mut()
            .calls
            .push(Call::Put(endpoint.to_string(), body.clone()));
        Ok(())
    }

    fn delete(&self, endpoint: &str) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Delete(endpoint.to_string()));
        match state.failing_deletes.get(endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Sleeper that only counts
#[derive(Clone, Default)]
pub struct CountingSleeper(Rc<Cell<u32>>);

impl CountingSleeper {
    pub fn count(&self) -> u32 {
        self.0.get()
    }
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.0.set(self.0.get() + 1);
    }
}

pub fn rest(mock: &MockTransport, sleeper: &CountingSleeper) -> Rest {
    Rest::new(mock.clone()).with_sleeper(sleeper.clone())
}

/// Instance over the mock; the initial listing calls are cleared
pub fn instance(mock: &MockTransport, sleeper: &CountingSleeper) -> Instance {
    let instance = Instance::from_rest(ClientConfig::default(), rest(mock, sleeper))
        .expect("mock instance loads");
    mock.clear_calls();
    instance
}
