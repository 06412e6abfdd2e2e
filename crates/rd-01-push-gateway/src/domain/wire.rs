//! Push event wire format.
//!
//! One record per write:
//!
//! ```text
//! event: <name>\n
//! data: <json>\n
//! \n
//! ```
//!
//! UTF-8, with the payload serialized as compact JSON so it never carries an
//! embedded newline.

use bytes::Bytes;
use serde::Serialize;

/// Event names used by the gateway itself.
pub mod events {
    /// First record on every accepted stream, carries the connection id
    pub const CONNECTED: &str = "connected";
    /// Periodic server-side keep-alive
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Maximum length of an event name.
pub const MAX_EVENT_NAME_LEN: usize = 128;

/// Encode a single push record.
///
/// The event name must be non-empty, at most [`MAX_EVENT_NAME_LEN`] bytes and
/// free of CR/LF, otherwise it could inject extra fields into the stream.
pub fn encode_event<T>(event: &str, payload: &T) -> Result<Bytes, WireError>
where
    T: Serialize + ?Sized,
{
    validate_event_name(event)?;
    let json = serde_json::to_string(payload)?;

    let mut record = String::with_capacity(event.len() + json.len() + 16);
    record.push_str("event: ");
    record.push_str(event);
    record.push_str("\ndata: ");
    record.push_str(&json);
    record.push_str("\n\n");
    Ok(Bytes::from(record))
}

fn validate_event_name(event: &str) -> Result<(), WireError> {
    if event.is_empty() {
        return Err(WireError::InvalidEventName("empty".into()));
    }
    if event.len() > MAX_EVENT_NAME_LEN {
        return Err(WireError::InvalidEventName(format!(
            "{} bytes (max {})",
            event.len(),
            MAX_EVENT_NAME_LEN
        )));
    }
    if event.contains(['\n', '\r']) {
        return Err(WireError::InvalidEventName("contains line break".into()));
    }
    Ok(())
}

/// Errors raised while encoding a record.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid event name: {0}")]
    InvalidEventName(String),

    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}
