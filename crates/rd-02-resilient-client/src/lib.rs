//! RD-02 Resilient Client - outbound HTTP calls with failure-classified
//! retries, bounded backoff and version-skew detection.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 RESILIENT CLIENT (rd-02)                     │
//! ├────────────────────────────────────────────────────────────┤
//! │   ResilientRequestExecutor                                  │
//! │     attaches version header · per-attempt deadline          │
//! │     classify → retry or fail · Retry-After · backoff        │
//! │        │                                      │             │
//! │   HttpTransport port                  VersionObserver port  │
//! │        │                                                    │
//! │   ReqwestTransport (feature "reqwest")                      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rd_02_resilient_client::{
//!     HttpRequest, ReqwestTransport, RequestOptions, ResilientRequestExecutor,
//! };
//! use shared_types::BuildVersion;
//! use std::sync::Arc;
//!
//! let executor = ResilientRequestExecutor::new(
//!     Arc::new(ReqwestTransport::new()?),
//!     BuildVersion::from_pkg(),
//! );
//! let invoice: Invoice = executor
//!     .execute_json(HttpRequest::get(url), &RequestOptions::default())
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod executor;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for public API
#[cfg(feature = "reqwest")]
pub use adapters::ReqwestTransport;
pub use domain::{
    BackoffPolicy, ConfigError, ErrorClassifier, ErrorKind, ExecutorConfig, RequestError,
    RequestOptions, RetryPredicate, MAX_BACKOFF,
};
pub use executor::ResilientRequestExecutor;
pub use ports::{
    Headers, HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError, VersionObserver,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
