// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! RD-01 Push Gateway - admission control, fan-out and liveness for
//! long-lived event streams.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      PUSH GATEWAY (rd-01)                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   GET /events      POST /events/:id/heartbeat      GET /health    │
//! │         │                     │                         │         │
//! │  ┌──────┴─────────────────────┴─────────────────────────┴──────┐  │
//! │  │               Middleware: Tracing → Version                 │  │
//! │  └──────────────────────────────┬──────────────────────────────┘  │
//! │                                 │                                  │
//! │  ┌──────────────────────────────┴──────────────────────────────┐  │
//! │  │                     ConnectionManager                       │  │
//! │  │   admission · eviction · heartbeats · fan-out · presence    │  │
//! │  ├───────────────────────────┬─────────────────────────────────┤  │
//! │  │   ConnectionRegistry      │    ConnectionRateLimiter        │  │
//! │  │   id / user / ip maps     │    sliding windows              │  │
//! │  └───────────────────────────┴─────────────────────────────────┘  │
//! │                                 │                                  │
//! │             EventSink port  ←  ChannelSink → response body        │
//! │                                                                    │
//! │   Maintenance: cleanup sweep (stale connections, rate windows)    │
//! │                server heartbeat pings                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state is in-process. Several gateway instances hold disjoint
//! connection sets; an event sent on one instance does not reach
//! connections held by another.
//!
//! # Usage
//!
//! ```ignore
//! use rd_01_push_gateway::{GatewayConfig, PushGatewayService};
//! use shared_types::BuildVersion;
//!
//! let service = PushGatewayService::new(GatewayConfig::default(), BuildVersion::from_pkg())?;
//! let manager = service.manager();
//! let listener = service.bind().await?;
//! tokio::spawn(service.run_until(listener, shutdown_signal()));
//!
//! manager.send_to_user(&user_id, "invoice_paid", &payload).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod connections;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for public API
pub use adapters::{channel_sink, ChannelSink};
pub use connections::{ConnectionManager, Maintenance};
pub use domain::cache_control::CacheStrategy;
pub use domain::config::{ConnectionConfig, GatewayConfig, UserCapacityPolicy};
pub use domain::error::{GatewayError, SinkError};
pub use domain::types::*;
pub use domain::wire::{encode_event, WireError};
pub use middleware::GatewayMetrics;
pub use ports::EventSink;
pub use service::PushGatewayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
