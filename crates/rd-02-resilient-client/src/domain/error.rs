//! Classified request errors.
//!
//! Every terminal failure of [`execute`](crate::ResilientRequestExecutor::execute)
//! is a [`RequestError`] carrying enough context for the caller to decide
//! between reauthentication, a transient-failure message, or giving up.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401/403, never retried
    Auth,
    /// 5xx except 501
    Server,
    /// Transport failure (DNS, refused, reset)
    Network,
    /// Attempt exceeded its deadline
    Timeout,
    /// Other 4xx, 501, and any other non-2xx
    Client,
    /// 2xx whose body could not be decoded
    InvalidResponse,
    /// Request options rejected before any network call
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Client => "client",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of one logical call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error after {attempts} attempt(s): {message}")]
pub struct RequestError {
    pub kind: ErrorKind,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Network calls made, including the failing one
    pub attempts: u32,
    pub message: String,
    /// Server-requested delay from a `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            attempts: 0,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether trying the same call again later may succeed.
    ///
    /// Server errors other than 501, network failures, timeouts and 429 are
    /// transient. Everything else needs a different request or credentials.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Server => self.status != Some(501),
            ErrorKind::Network | ErrorKind::Timeout => true,
            ErrorKind::Client => self.status == Some(429),
            ErrorKind::Auth | ErrorKind::InvalidResponse | ErrorKind::Config => false,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    pub fn is_server_error(&self) -> bool {
        self.kind == ErrorKind::Server
    }

    pub fn is_network_error(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_client_error(&self) -> bool {
        self.kind == ErrorKind::Client
    }

    pub fn is_invalid_response(&self) -> bool {
        self.kind == ErrorKind::InvalidResponse
    }

    pub fn is_config_error(&self) -> bool {
        self.kind == ErrorKind::Config
    }
}

impl From<ConfigError> for RequestError {
    fn from(error: ConfigError) -> Self {
        RequestError::new(ErrorKind::Config, error.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),

    #[error("invalid version header: {0}")]
    InvalidHeader(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_by_kind() {
        let server = RequestError::new(ErrorKind::Server, "bad gateway").with_status(502);
        assert!(server.is_retryable());
        assert!(server.is_server_error());

        let auth = RequestError::new(ErrorKind::Auth, "forbidden").with_status(403);
        assert!(!auth.is_retryable());
        assert!(auth.is_auth_error());

        assert!(RequestError::new(ErrorKind::Network, "refused").is_retryable());
        assert!(RequestError::new(ErrorKind::Timeout, "deadline").is_retryable());
        assert!(!RequestError::new(ErrorKind::InvalidResponse, "eof").is_retryable());
    }

    #[test]
    fn test_config_error_is_its_own_kind() {
        let err = RequestError::from(ConfigError::InvalidTimeout("timeout cannot be 0".into()));
        assert!(err.is_config_error());
        assert!(!err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(err.status, None);
        assert_eq!(err.attempts, 0);
    }

    #[test]
    fn test_client_errors() {
        let not_found = RequestError::new(ErrorKind::Client, "missing").with_status(404);
        assert!(!not_found.is_retryable());
        assert!(not_found.is_client_error());

        let throttled = RequestError::new(ErrorKind::Client, "slow down").with_status(429);
        assert!(throttled.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RequestError::new(ErrorKind::Server, "HTTP 503")
            .with_status(503)
            .with_attempts(4);
        assert_eq!(err.to_string(), "server error after 4 attempt(s): HTTP 503");
    }
}
