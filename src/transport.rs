//! HTTP transport for the nio control API
//!
//! [`Transport`] is the raw GET/PUT/DELETE seam; [`HttpTransport`] implements
//! it over a blocking reqwest client with basic auth. [`Rest`] wraps any
//! transport with the fixed-interval retry policy and the timing settings the
//! entity mirrors use.

use serde_json::Value;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::poller::PollPolicy;

/// Errors raised by a transport request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to '{endpoint}' failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Request to '{endpoint}' timed out")]
    Timeout { endpoint: String },

    #[error("Request to '{endpoint}' returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Could not decode response from '{endpoint}': {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl TransportError {
    pub fn connection(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(endpoint: impl Into<String>) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
        }
    }

    pub fn status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
        }
    }

    pub fn decode(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Only connection failures are retried
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Raw request seam
///
/// Endpoints are relative paths such as `blocks/sim`. Implementations map
/// non-2xx responses to [`TransportError::Status`] and an empty body to
/// `Value::Null`.
pub trait Transport {
    fn get(&self, endpoint: &str, body: Option<&Value>) -> Result<Value, TransportError>;
    fn put(&self, endpoint: &str, body: &Value) -> Result<(), TransportError>;
    fn delete(&self, endpoint: &str) -> Result<(), TransportError>;
}

/// Blocking HTTP transport with basic auth
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn send(
        &self,
        endpoint: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, TransportError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|e| request_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(endpoint, status.as_u16()));
        }
        Ok(response)
    }
}

fn request_error(endpoint: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(endpoint)
    } else if err.is_connect() {
        TransportError::connection(endpoint, err.to_string())
    } else if err.is_decode() {
        TransportError::decode(endpoint, err.to_string())
    } else {
        TransportError::Client(err.to_string())
    }
}

impl Transport for HttpTransport {
    fn get(&self, endpoint: &str, body: Option<&Value>) -> Result<Value, TransportError> {
        let mut request = self.client.get(self.url(endpoint));
        if let Some(body) = body {
            request = request.json(body);
        }
        let text = self
            .send(endpoint, request)?
            .text()
            .map_err(|e| request_error(endpoint, e))?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TransportError::decode(endpoint, e.to_string()))
    }

    fn put(&self, endpoint: &str, body: &Value) -> Result<(), TransportError> {
        self.send(endpoint, self.client.put(self.url(endpoint)).json(body))?;
        Ok(())
    }

    fn delete(&self, endpoint: &str) -> Result<(), TransportError> {
        self.send(endpoint, self.client.delete(self.url(endpoint)))?;
        Ok(())
    }
}

/// Injectable sleep, so retries and polling can be tested without waiting
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Fixed-interval retry on connection failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            interval: Duration::from_secs(1),
        }
    }
}

/// Transport plus the retry and polling policy shared by one instance
pub struct Rest {
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl Rest {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            sleeper: Box::new(ThreadSleeper),
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
        }
    }

    /// Build an HTTP-backed client from configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::new(HttpTransport::new(config)?)
            .with_retry(config.retry_policy())
            .with_poll_policy(config.poll_policy()))
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// GET with the default retry count
    pub fn get(&self, endpoint: &str) -> Result<Value, TransportError> {
        self.get_with(endpoint, None, self.retry.attempts)
    }

    /// GET, retrying up to `retry` extra times on connection failures
    ///
    /// Sleeps one interval after each failed attempt that will be retried.
    /// Any other error is returned at once.
    pub fn get_with(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        retry: u32,
    ) -> Result<Value, TransportError> {
        let mut failures = 0;
        loop {
            debug!("GET {}", endpoint);
            match self.transport.get(endpoint, body) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection() && failures < retry => {
                    failures += 1;
                    warn!("{} (attempt {}/{}), retrying", e, failures, retry + 1);
                    self.sleeper.sleep(self.retry.interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn put(&self, endpoint: &str, body: &Value) -> Result<(), TransportError> {
        debug!("PUT {}", endpoint);
        self.transport.put(endpoint, body)
    }

    pub fn delete(&self, endpoint: &str) -> Result<(), TransportError> {
        debug!("DELETE {}", endpoint);
        self.transport.delete(endpoint)
    }
}

impl std::fmt::Debug for Rest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rest")
            .field("retry", &self.retry)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Flaky {
        results: RefCell<VecDeque<Result<Value, TransportError>>>,
        calls: Rc<Cell<u32>>,
    }

    impl Transport for Flaky {
        fn get(&self, _: &str, _: Option<&Value>) -> Result<Value, TransportError> {
            self.calls.set(self.calls.get() + 1);
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
        fn put(&self, _: &str, _: &Value) -> Result<(), TransportError> {
            Ok(())
        }
        fn delete(&self, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Counter(Rc<Cell<u32>>);

    impl Sleeper for Counter {
        fn sleep(&self, _: Duration) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn rest(results: Vec<Result<Value, TransportError>>) -> (Rest, Rc<Cell<u32>>, Counter) {
        let calls = Rc::new(Cell::new(0));
        let sleeps = Counter::default();
        let rest = Rest::new(Flaky {
            results: RefCell::new(results.into()),
            calls: calls.clone(),
        })
        .with_sleeper(sleeps.clone());
        (rest, calls, sleeps)
    }

    #[test]
    fn test_status_error_is_not_retried() {
        let (rest, calls, sleeps) = rest(vec![Err(TransportError::status("nio", 404))]);
        let err = rest.get_with("nio", None, 3).unwrap_err();
        assert!(err.is_status());
        assert_eq!(calls.get(), 1);
        assert_eq!(sleeps.0.get(), 0);
    }

    #[test]
    fn test_no_sleep_on_success() {
        let (rest, calls, sleeps) = rest(vec![Ok(Value::Bool(true))]);
        assert_eq!(rest.get("nio"), Ok(Value::Bool(true)));
        assert_eq!(calls.get(), 1);
        assert_eq!(sleeps.0.get(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::status("blocks/sim", 404);
        assert_eq!(err.to_string(), "Request to 'blocks/sim' returned HTTP 404");
    }
}
