//! # Realtime Delivery Test Suite
//!
//! Cross-crate flows: a live push gateway on a loopback port, driven by raw
//! stream readers and by the resilient request executor.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs      # Gateway + executor against a real socket
//!     └── support.rs    # Gateway harness and stream reader
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rd-tests
//! cargo test -p rd-tests integration::flows::
//! ```

#![allow(dead_code)]

pub mod integration;
