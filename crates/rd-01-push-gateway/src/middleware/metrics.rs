//! Gateway counters.
//!
//! Exposed as JSON on the health endpoint, and in Prometheus text format
//! with the `metrics` feature.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Push gateway metrics
#[derive(Default)]
pub struct GatewayMetrics {
    // Admission
    pub connections_accepted: AtomicU64,
    pub connections_rejected: AtomicU64,

    // Removal, by cause
    pub connections_evicted: AtomicU64,
    pub connections_timed_out: AtomicU64,
    pub connections_closed: AtomicU64,

    // Fan-out
    pub records_delivered: AtomicU64,
    pub write_failures: AtomicU64,

    // Maintenance
    pub sweeps: AtomicU64,
}

/// Plain-value copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_evicted: u64,
    pub connections_timed_out: u64,
    pub connections_closed: u64,
    pub records_delivered: u64,
    pub write_failures: u64,
    pub sweeps: u64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.connections_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Every removal, whatever the cause
    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, count: usize) {
        self.records_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            connections_timed_out: self.connections_timed_out.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self, live_connections: usize) -> String {
        let s = self.snapshot();
        let counters = [
            ("push_gateway_connections_accepted_total", "Accepted connections", s.connections_accepted),
            ("push_gateway_connections_rejected_total", "Rejected admission attempts", s.connections_rejected),
            ("push_gateway_connections_evicted_total", "Connections replaced by a newer one", s.connections_evicted),
            ("push_gateway_connections_timed_out_total", "Connections closed for missing heartbeats", s.connections_timed_out),
            ("push_gateway_connections_closed_total", "Connections removed for any reason", s.connections_closed),
            ("push_gateway_records_delivered_total", "Records written to sinks", s.records_delivered),
            ("push_gateway_write_failures_total", "Failed sink writes", s.write_failures),
            ("push_gateway_sweeps_total", "Cleanup sweeps run", s.sweeps),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        output.push_str(&format!(
            "# HELP push_gateway_connections Live connections\n\
             # TYPE push_gateway_connections gauge\n\
             push_gateway_connections {live_connections}\n"
        ));
        output
    }
}
