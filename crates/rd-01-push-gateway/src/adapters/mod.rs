//! Adapters for the push gateway.
//!
//! Concrete sinks behind the [`EventSink`](crate::ports::EventSink) port.

pub mod channel;

pub use channel::{channel_sink, ChannelSink};
