//! # Shared Types Crate
//!
//! Types that both halves of the delivery layer agree on: the push gateway
//! (server) and the resilient request executor (client).
//!
//! ## Contents
//!
//! - **Version contract**: the header name and the build identifier threaded
//!   through every request/response for version-skew detection.
//! - **Identifiers**: `UserId`, the fan-out key.
//! - **Config helpers**: a human-readable `Duration` serde format.

pub mod humantime_serde;
pub mod ids;
pub mod version;

pub use ids::UserId;
pub use version::{detect_skew, BuildVersion, VersionError, VersionSkew, VERSION_HEADER};
