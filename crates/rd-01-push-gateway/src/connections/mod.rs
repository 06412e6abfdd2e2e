//! Connection lifecycle: registry, admission limits, manager and the
//! background loops that keep it clean.

pub mod maintenance;
pub mod manager;
pub mod rate_limit;
pub mod registry;

pub use maintenance::{cleanup_task, heartbeat_task, Maintenance};
pub use manager::ConnectionManager;
pub use rate_limit::ConnectionRateLimiter;
pub use registry::{ConnectionEntry, ConnectionRegistry};
