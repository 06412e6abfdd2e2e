//! Push gateway error types.
//!
//! Admission rejections are not errors (see [`Admission`](super::types::Admission))
//! and fan-out write failures never leave the connection manager. What is
//! left here are sink-level failures and process-level failures.

use std::time::Duration;

/// Failure reported by an [`EventSink`](crate::ports::EventSink).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Peer is gone or the sink was already closed
    #[error("sink closed")]
    Closed,

    /// Write did not complete within its deadline
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl SinkError {
    /// `true` for errors that just mean "already closed", which a graceful
    /// close swallows.
    pub fn is_closed(&self) -> bool {
        matches!(self, SinkError::Closed)
    }
}

/// Gateway-level errors (startup, binding, shutdown)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(#[source] std::io::Error),

    /// HTTP server terminated with an error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ConfigError;

    #[test]
    fn test_sink_error_closed() {
        assert!(SinkError::Closed.is_closed());
        assert!(!SinkError::Timeout(Duration::from_millis(5)).is_closed());
        assert!(!SinkError::Transport("reset".into()).is_closed());
    }

    #[test]
    fn test_gateway_error_from_config() {
        let err: GatewayError = ConfigError::InvalidLimit("zero".into()).into();
        assert!(err.to_string().contains("zero"));
    }
}
