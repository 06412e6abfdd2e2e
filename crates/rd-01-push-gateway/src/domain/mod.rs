//! Domain layer for the push gateway.
//!
//! Pure types and encoders with no knowledge of the HTTP surface.

pub mod cache_control;
pub mod config;
pub mod error;
pub mod types;
pub mod wire;

pub use cache_control::CacheStrategy;
pub use config::{CleanupConfig, ConfigError, ConnectionConfig, GatewayConfig, HttpConfig, UserCapacityPolicy};
pub use error::{GatewayError, SinkError};
pub use types::*;
pub use wire::{encode_event, WireError};
