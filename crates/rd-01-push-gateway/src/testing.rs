//! Centralized Testing Utilities
//!
//! In-memory sinks for exercising the connection manager without a
//! transport. Available with the `test-utils` feature flag.

use crate::domain::error::SinkError;
use crate::ports::EventSink;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Sink that keeps every record it receives.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records received so far, decoded as UTF-8.
    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Event names received so far, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|r| {
                r.lines()
                    .next()
                    .and_then(|line| line.strip_prefix("event: "))
                    .map(str::to_string)
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn write(&self, record: Bytes) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.records.lock().push(record);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Sink whose writes always fail, as if the peer reset the stream.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for FailingSink {
    async fn write(&self, _record: Bytes) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Transport("connection reset by peer".into()))
    }

    async fn close(&self) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

/// Sink whose writes never complete, as if the peer stopped reading.
#[derive(Default)]
pub struct StallingSink;

impl StallingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl EventSink for StallingSink {
    async fn write(&self, _record: Bytes) -> Result<(), SinkError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
