//! Centralized Testing Utilities
//!
//! Scripted transport and recording observer for exercising the executor
//! without a network. Available with the `test-utils` feature flag.

use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError, VersionObserver};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::VersionSkew;
use std::collections::VecDeque;
use tokio::time::Instant;

/// One scripted attempt outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never completes; only the per-attempt deadline ends it
    Hang,
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Scripted::Respond(HttpResponse::new(status))
    }
}

/// Transport that replays outcomes in order and repeats the last one once
/// the script runs out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script of bare status codes.
    pub fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::new(statuses.into_iter().map(Scripted::status))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Instants at which each attempt was sent.
    pub fn call_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(t, _)| *t).collect()
    }

    fn next(&self) -> Option<Scripted> {
        let mut last = self.last.lock();
        match self.script.lock().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                Some(step)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push((Instant::now(), request.clone()));
        match self.next() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout)
            }
            None => Err(TransportError::Network("empty script".into())),
        }
    }
}

/// Observer that keeps every reported skew.
#[derive(Default)]
pub struct RecordingObserver {
    skews: Mutex<Vec<VersionSkew>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skews(&self) -> Vec<VersionSkew> {
        self.skews.lock().clone()
    }
}

impl VersionObserver for RecordingObserver {
    fn on_version_mismatch(&self, skew: &VersionSkew) {
        self.skews.lock().push(skew.clone());
    }
}
