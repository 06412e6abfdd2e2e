//! Executor configuration.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_types::VERSION_HEADER;
use std::time::Duration;

/// Statuses that schedule another attempt while budget remains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryPredicate {
    statuses: Vec<u16>,
}

impl RetryPredicate {
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Never retry on a status (transport failures still retry).
    pub fn none() -> Self {
        Self::new([])
    }

    pub fn matches(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    pub fn statuses(&self) -> &[u16] {
        &self.statuses
    }
}

impl Default for RetryPredicate {
    fn default() -> Self {
        Self::new([429, 502, 503, 504])
    }
}

/// Per-call options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Retries after the first attempt (default: 3)
    pub retries: u32,
    /// Backoff base (default: 1000ms)
    #[serde(with = "shared_types::humantime_serde")]
    pub retry_delay: Duration,
    /// Backoff cap (default: 30s)
    #[serde(with = "shared_types::humantime_serde")]
    pub max_delay: Duration,
    /// Deadline of a single attempt (default: 30s)
    #[serde(with = "shared_types::humantime_serde")]
    pub timeout: Duration,
    /// Upper bound on an honored `Retry-After` (default: 30s)
    #[serde(with = "shared_types::humantime_serde")]
    pub max_retry_after: Duration,
    /// Statuses that are retried (default: 429, 502, 503, 504)
    pub retry_on: RetryPredicate,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(30),
            retry_on: RetryPredicate::default(),
        }
    }
}

impl RequestOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("timeout cannot be 0".into()));
        }
        if self.max_delay < self.retry_delay {
            return Err(ConfigError::InvalidBackoff(
                "max_delay must be at least retry_delay".into(),
            ));
        }
        Ok(())
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_retry_on(mut self, retry_on: RetryPredicate) -> Self {
        self.retry_on = retry_on;
        self
    }
}

/// Executor-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Header carrying the build identifier, both directions
    pub version_header: String,
    /// Options used when a call does not bring its own
    pub defaults: RequestOptions,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            version_header: VERSION_HEADER.to_string(),
            defaults: RequestOptions::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let header = self.version_header.as_str();
        if header.is_empty()
            || !header
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigError::InvalidHeader(self.version_header.clone()));
        }
        self.defaults.validate()
    }
}
