//! Client configuration
//!
//! Connection settings for one server plus retry and polling timings. Loaded
//! from a JSON file, then overridden by `NIO_*` environment variables and
//! command line flags. Every client owns its own copy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::poller::PollPolicy;
use crate::transport::RetryPolicy;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8181;
pub const DEFAULT_USER: &str = "User";

/// Connection settings for a nio server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
    pub retry: RetrySettings,
    pub poll: PollSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USER.to_string(),
            password: DEFAULT_USER.to_string(),
            timeout_secs: 10,
            retry: RetrySettings::default(),
            poll: PollSettings::default(),
        }
    }
}

/// Retry on connection failures for ordinary GET requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 0,
            interval_ms: 1000,
        }
    }
}

/// Status polling after start/stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub attempts_per_poll: u32,
    /// `null` waits without bound
    pub max_wait_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            attempts_per_poll: 5,
            max_wait_secs: Some(300),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("Host must be specified");
        }
        if self.host.contains("://") || self.host.contains('/') {
            anyhow::bail!("Host must be a bare hostname or address, got '{}'", self.host);
        }
        if self.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("Request timeout must be at least one second");
        }
        if self.poll.interval_ms == 0 {
            anyhow::bail!("Poll interval must be at least 1 ms");
        }
        if self.poll.attempts_per_poll == 0 {
            anyhow::bail!("Poll attempts must be at least 1");
        }
        if self.poll.max_wait_secs == Some(0) {
            anyhow::bail!("Poll max wait must be positive (use null for no limit)");
        }
        Ok(())
    }

    /// Apply `NIO_HOST`, `NIO_PORT`, `NIO_USER` and `NIO_PASSWORD` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("NIO_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("NIO_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("NIO_PORT is not a valid port: '{}'", port))?;
        }
        if let Some(user) = lookup("NIO_USER") {
            self.username = user;
        }
        if let Some(password) = lookup("NIO_PASSWORD") {
            self.password = password;
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            interval: Duration::from_millis(self.retry.interval_ms),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll.interval_ms),
            attempts_per_poll: self.poll.attempts_per_poll,
            max_wait: self.poll.max_wait_secs.map(Duration::from_secs),
            ..PollPolicy::default()
        }
    }
}
