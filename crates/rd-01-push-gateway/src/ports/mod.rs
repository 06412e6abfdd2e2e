//! Ports (traits at the transport seam).

pub mod outbound;

pub use outbound::{unix_millis, EventSink};
