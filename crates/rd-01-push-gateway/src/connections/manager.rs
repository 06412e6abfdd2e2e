//! Connection manager: admission, eviction, liveness and fan-out.
//!
//! The registry sits behind a single lock so its three maps always change
//! together. Sink I/O never happens while the lock is held: fan-out takes a
//! snapshot of its targets, releases the lock, then writes to every target
//! concurrently with a per-write deadline. A failed or late write prunes that
//! one connection and nothing else.

use super::rate_limit::ConnectionRateLimiter;
use super::registry::{ConnectionEntry, ConnectionRegistry, Target};
use crate::domain::config::{ConnectionConfig, UserCapacityPolicy};
use crate::domain::error::SinkError;
use crate::domain::types::{
    Admission, CloseReason, ConnectionId, ConnectionInfo, ConnectionMeta, ConnectionStats,
    DeliveryReport, PresenceEvent, PresenceStatus, RejectReason, SweepReport,
};
use crate::domain::wire::{encode_event, events, WireError};
use crate::middleware::GatewayMetrics;
use crate::ports::{unix_millis, EventSink};
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use shared_types::UserId;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Connection removed from the registry whose sink still has to be closed.
struct Detached {
    entry: ConnectionEntry,
    reason: CloseReason,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    registry: Mutex<ConnectionRegistry>,
    limiter: ConnectionRateLimiter,
    presence_tx: broadcast::Sender<PresenceEvent>,
    metrics: Arc<GatewayMetrics>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_metrics(config, Arc::new(GatewayMetrics::new()))
    }

    pub fn with_metrics(config: ConnectionConfig, metrics: Arc<GatewayMetrics>) -> Self {
        let limiter = ConnectionRateLimiter::new(
            config.rate_limit_window,
            config.max_new_connections_per_window,
            config.max_new_connections_per_ip_window,
        );
        let (presence_tx, _) = broadcast::channel(config.presence_buffer.max(1));

        Self {
            config,
            registry: Mutex::new(ConnectionRegistry::new()),
            limiter,
            presence_tx,
            metrics,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Check whether `user_id` may open a connection from `ip` right now.
    ///
    /// Pure check: nothing is recorded. [`try_add_connection`](Self::try_add_connection)
    /// runs the same check and records the attempt either way.
    pub fn can_connect(&self, user_id: &UserId, ip: Option<IpAddr>) -> Admission {
        let registry = self.registry.lock();
        self.check(&registry, user_id, ip, Instant::now())
    }

    fn check(
        &self,
        registry: &ConnectionRegistry,
        user_id: &UserId,
        ip: Option<IpAddr>,
        now: Instant,
    ) -> Admission {
        let at_capacity =
            registry.user_connection_count(user_id) >= self.config.max_connections_per_user;

        if at_capacity && self.config.user_capacity_policy == UserCapacityPolicy::Reject {
            return Admission::reject(RejectReason::UserCapacity);
        }

        if let Some(ip) = ip {
            let mut ip_count = registry.ip_connection_count(&ip);
            // The connection about to be evicted frees its IP slot
            if at_capacity
                && registry
                    .oldest_for_user(user_id)
                    .is_some_and(|oldest| oldest.ip == Some(ip))
            {
                ip_count = ip_count.saturating_sub(1);
            }
            if ip_count >= self.config.max_connections_per_ip {
                return Admission::reject(RejectReason::IpCapacity);
            }
        }

        if self.limiter.user_limited(user_id, now) {
            return Admission::reject(RejectReason::UserRateLimited);
        }
        if let Some(ip) = ip {
            if self.limiter.ip_limited(&ip, now) {
                return Admission::reject(RejectReason::IpRateLimited);
            }
        }

        Admission::allow()
    }

    /// Admit and register a connection.
    ///
    /// If the user is at capacity, their oldest connection is closed with
    /// [`CloseReason::Replaced`] to make room.
    pub async fn try_add_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        sink: Arc<dyn EventSink>,
        meta: ConnectionMeta,
    ) -> Admission {
        let now = Instant::now();
        let mut evicted = Vec::new();

        let admission = {
            let mut registry = self.registry.lock();

            let admission = if registry.contains(&connection_id) {
                Admission::reject(RejectReason::DuplicateConnection)
            } else {
                self.check(&registry, &user_id, meta.ip, now)
            };
            self.limiter.record_attempt(&user_id, meta.ip, now);

            if admission.allowed {
                while registry.user_connection_count(&user_id)
                    >= self.config.max_connections_per_user
                {
                    let Some(oldest) = registry.oldest_for_user(&user_id).map(|e| e.id) else {
                        break;
                    };
                    // The user never drops to zero: no Offline for a replacement
                    if let Some(entry) = registry.remove(&oldest) {
                        evicted.push(Detached {
                            entry,
                            reason: CloseReason::Replaced,
                        });
                    }
                }

                let entry = ConnectionEntry {
                    id: connection_id,
                    user_id: user_id.clone(),
                    sink,
                    created_at: now,
                    last_heartbeat: now,
                    ip: meta.ip,
                    user_agent: meta.user_agent,
                };
                match registry.insert(entry) {
                    Ok(()) => {
                        self.emit(PresenceEvent {
                            user_id: user_id.clone(),
                            status: PresenceStatus::Online,
                            connections: registry.user_connection_count(&user_id),
                        });
                        admission
                    }
                    Err(_) => {
                        if !evicted.is_empty() && registry.user_connection_count(&user_id) == 0 {
                            self.emit(PresenceEvent {
                                user_id: user_id.clone(),
                                status: PresenceStatus::Offline,
                                connections: 0,
                            });
                        }
                        Admission::reject(RejectReason::DuplicateConnection)
                    }
                }
            } else {
                admission
            }
        };

        for detached in evicted {
            self.metrics.record_evicted();
            self.finish_close(detached).await;
        }

        match admission.reason {
            None => {
                self.metrics.record_accepted();
                info!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    ip = ?meta.ip,
                    "Connection accepted"
                );
            }
            Some(reason) => {
                self.metrics.record_rejected();
                info!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    ip = ?meta.ip,
                    reason = ?reason,
                    "Connection rejected"
                );
            }
        }

        admission
    }

    /// Boolean form of [`try_add_connection`](Self::try_add_connection).
    pub async fn add_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        sink: Arc<dyn EventSink>,
        meta: ConnectionMeta,
    ) -> bool {
        self.try_add_connection(user_id, connection_id, sink, meta)
            .await
            .allowed
    }

    /// Close one connection. No-op if it is already gone or belongs to
    /// another user. Returns `true` if this call removed it.
    pub async fn close_connection(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        reason: CloseReason,
    ) -> bool {
        let detached = {
            let mut registry = self.registry.lock();
            let owned = registry
                .get(&connection_id)
                .map(|entry| &entry.user_id == user_id);
            match owned {
                Some(true) => self.detach(&mut registry, &connection_id, reason),
                Some(false) => {
                    warn!(
                        user_id = %user_id,
                        connection_id = %connection_id,
                        "Close requested for a connection owned by another user"
                    );
                    None
                }
                None => None,
            }
        };

        match detached {
            Some(detached) => {
                self.finish_close(detached).await;
                true
            }
            None => false,
        }
    }

    /// Record a client heartbeat. Returns `false` if the connection is gone.
    pub fn update_heartbeat(&self, connection_id: ConnectionId) -> bool {
        let found = self.registry.lock().touch(&connection_id, Instant::now());
        if !found {
            debug!(connection_id = %connection_id, "Heartbeat for unknown connection");
        }
        found
    }

    /// Deliver one event to every connection of `user_id`.
    ///
    /// Only an unencodable event is an error. A user without connections
    /// yields an empty report.
    pub async fn send_to_user<T>(
        &self,
        user_id: &UserId,
        event: &str,
        payload: &T,
    ) -> Result<DeliveryReport, WireError>
    where
        T: Serialize + ?Sized,
    {
        let record = encode_event(event, payload)?;
        let targets = self.registry.lock().targets_for_user(user_id);
        Ok(self.deliver(record, targets).await)
    }

    /// Deliver one event to every connection of every listed user.
    /// Duplicate ids are delivered to once.
    pub async fn send_to_users<T>(
        &self,
        user_ids: &[UserId],
        event: &str,
        payload: &T,
    ) -> Result<DeliveryReport, WireError>
    where
        T: Serialize + ?Sized,
    {
        let record = encode_event(event, payload)?;
        let targets = {
            let registry = self.registry.lock();
            let mut seen = HashSet::new();
            user_ids
                .iter()
                .filter(|user_id| seen.insert(*user_id))
                .flat_map(|user_id| registry.targets_for_user(user_id))
                .collect()
        };
        Ok(self.deliver(record, targets).await)
    }

    /// Deliver one event to every live connection.
    pub async fn broadcast<T>(&self, event: &str, payload: &T) -> Result<DeliveryReport, WireError>
    where
        T: Serialize + ?Sized,
    {
        let record = encode_event(event, payload)?;
        let targets = self.registry.lock().all_targets();
        Ok(self.deliver(record, targets).await)
    }

    /// Server keep-alive to every connection.
    ///
    /// Does not count as a client heartbeat; connections that fail the write
    /// are pruned like any other fan-out.
    pub async fn send_heartbeat_pings(&self) -> DeliveryReport {
        let payload = serde_json::json!({ "timestamp": unix_millis() });
        match self.broadcast(events::HEARTBEAT, &payload).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to encode heartbeat");
                DeliveryReport::default()
            }
        }
    }

    async fn deliver(&self, record: Bytes, targets: Vec<Target>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if targets.is_empty() {
            return report;
        }

        let write_timeout = self.config.write_timeout;
        let writes = targets.into_iter().map(|target| {
            let record = record.clone();
            async move {
                let result = match timeout(write_timeout, target.sink.write(record)).await {
                    Ok(result) => result,
                    Err(_) => Err(SinkError::Timeout(write_timeout)),
                };
                (target, result)
            }
        });

        for (target, result) in join_all(writes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.metrics.record_write_failure();
                    warn!(
                        user_id = %target.user_id,
                        connection_id = %target.id,
                        error = %e,
                        "Write failed, pruning connection"
                    );
                    if self
                        .close_connection(&target.user_id, target.id, CloseReason::WriteFailed)
                        .await
                    {
                        report.pruned += 1;
                    }
                }
            }
        }

        self.metrics.record_delivered(report.delivered);
        report
    }

    /// Close connections that missed their heartbeat and drop aged-out
    /// rate-limit windows.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let timeout = self.config.connection_timeout;

        let stale: Vec<Detached> = {
            let mut registry = self.registry.lock();
            registry
                .stale(now, timeout)
                .into_iter()
                .filter_map(|(id, _)| self.detach(&mut registry, &id, CloseReason::Timeout))
                .collect()
        };

        let timed_out = stale.len();
        for detached in stale {
            self.metrics.record_timed_out();
            self.finish_close(detached).await;
        }

        let rate_windows_pruned = self.limiter.cleanup(now);
        self.metrics.record_sweep();

        if timed_out > 0 || rate_windows_pruned > 0 {
            info!(timed_out, rate_windows_pruned, "Cleanup sweep");
        }

        SweepReport {
            timed_out,
            rate_windows_pruned,
        }
    }

    /// Close every connection. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Detached> = {
            let mut registry = self.registry.lock();
            registry
                .connection_ids()
                .into_iter()
                .filter_map(|(id, _)| self.detach(&mut registry, &id, CloseReason::Shutdown))
                .collect()
        };

        let closed = drained.len();
        join_all(drained.into_iter().map(|d| self.finish_close(d))).await;
        info!(closed, "Closed all connections");
        closed
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceEvent> {
        self.presence_tx.subscribe()
    }

    pub fn stats(&self) -> ConnectionStats {
        let registry = self.registry.lock();
        ConnectionStats {
            connections: registry.len(),
            users: registry.user_count(),
            ips: registry.ip_count(),
            rate_windows: self.limiter.window_count(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.registry.lock().user_connection_count(user_id)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.user_connection_count(user_id) > 0
    }

    /// Users with at least one live connection, sorted.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users = self.registry.lock().users();
        users.sort();
        users
    }

    pub fn connection_info(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let now = Instant::now();
        self.registry
            .lock()
            .get(&connection_id)
            .map(|entry| entry.info(now))
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn assert_consistent(&self) {
        let registry = self.registry.lock();
        registry.assert_consistent();
        for user in registry.users() {
            assert!(registry.user_connection_count(&user) <= self.config.max_connections_per_user);
        }
    }

    /// Remove from the registry and publish `Offline` if this was the user's
    /// last connection. Runs under the registry lock so presence events are
    /// emitted in registry order.
    fn detach(
        &self,
        registry: &mut ConnectionRegistry,
        connection_id: &ConnectionId,
        reason: CloseReason,
    ) -> Option<Detached> {
        let entry = registry.remove(connection_id)?;
        if registry.user_connection_count(&entry.user_id) == 0 {
            self.emit(PresenceEvent {
                user_id: entry.user_id.clone(),
                status: PresenceStatus::Offline,
                connections: 0,
            });
        }
        Some(Detached { entry, reason })
    }

    async fn finish_close(&self, detached: Detached) {
        let Detached { entry, reason } = detached;
        self.metrics.record_closed();

        match timeout(self.config.write_timeout, entry.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_closed() => {}
            Ok(Err(e)) => {
                debug!(connection_id = %entry.id, error = %e, "Sink close failed");
            }
            Err(_) => {
                debug!(connection_id = %entry.id, "Sink close timed out");
            }
        }

        info!(
            user_id = %entry.user_id,
            connection_id = %entry.id,
            reason = %reason,
            "Connection closed"
        );
    }

    fn emit(&self, event: PresenceEvent) {
        // No subscribers is fine
        let _ = self.presence_tx.send(event);
    }
}
