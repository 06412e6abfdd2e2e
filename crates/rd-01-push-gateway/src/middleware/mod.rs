//! Middleware stack for the push gateway.
//!
//! Layer order: Request → Tracing → Version → Handler
//!
//! Client address resolution and the metrics counters live here too; the
//! handlers and the connection manager use them directly.

pub mod client_ip;
pub mod metrics;
pub mod tracing;
pub mod version;

pub use client_ip::{client_ip, user_agent};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use tracing::TracingLayer;
pub use version::VersionLayer;
