//! End-to-end flows across the push gateway and the resilient client.

pub mod flows;
pub mod support;
