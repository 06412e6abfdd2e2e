//! Channel-backed sink.
//!
//! The writer half is registered with the connection manager; the reader
//! half becomes the body of the HTTP response. Dropping the reader (client
//! went away) makes every following write fail with [`SinkError::Closed`],
//! which is how dead connections get pruned on the next fan-out.

use crate::domain::error::SinkError;
use crate::ports::EventSink;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Sink that forwards records into a bounded channel.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

/// Create a sink and the receiver that drains it.
pub fn channel_sink(capacity: usize) -> (ChannelSink, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            tx: Mutex::new(Some(tx)),
        },
        rx,
    )
}

impl ChannelSink {
    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write(&self, record: Bytes) -> Result<(), SinkError> {
        // Clone the sender so the lock is not held across the await
        let tx = self.tx.lock().clone().ok_or(SinkError::Closed)?;
        tx.send(record).await.map_err(|_| SinkError::Closed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        // Dropping the last sender ends the receiving stream
        match self.tx.lock().take() {
            Some(_) => Ok(()),
            None => Err(SinkError::Closed),
        }
    }
}
