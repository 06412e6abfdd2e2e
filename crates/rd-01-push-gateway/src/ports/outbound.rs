//! Outbound ports for the push gateway.

use crate::domain::error::SinkError;
use async_trait::async_trait;
use bytes::Bytes;

/// Write capability for one long-lived push connection.
///
/// The connection manager only ever writes complete, already-encoded records
/// and closes; it never knows which transport sits behind the sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one encoded record.
    async fn write(&self, record: Bytes) -> Result<(), SinkError>;

    /// Close the sink. Closing an already-closed sink returns
    /// [`SinkError::Closed`].
    async fn close(&self) -> Result<(), SinkError>;
}

/// Milliseconds since the Unix epoch, for payload timestamps.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        // Clock before Unix epoch - return 0 rather than panic
        .unwrap_or(0)
}
