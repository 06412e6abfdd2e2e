//! Domain layer for the resilient client.
//!
//! Pure policy: backoff, classification, configuration and errors. No I/O.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;

pub use backoff::{BackoffPolicy, MAX_BACKOFF};
pub use classify::ErrorClassifier;
pub use config::{ExecutorConfig, RequestOptions, RetryPredicate};
pub use error::{ConfigError, ErrorKind, RequestError};
