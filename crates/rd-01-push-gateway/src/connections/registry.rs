//! In-memory connection registry.
//!
//! Three maps that always move together:
//!
//! - connection id → entry
//! - user id → set of connection ids
//! - IP → set of connection ids
//!
//! Every mutation goes through [`ConnectionRegistry::insert`] or
//! [`ConnectionRegistry::remove`], which update all three and drop empty
//! sets. The registry itself is not synchronized; the connection manager
//! guards it with a single lock.

use crate::domain::types::{ConnectionId, ConnectionInfo};
use crate::ports::EventSink;
use shared_types::UserId;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::Instant;

/// One registered connection.
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub sink: Arc<dyn EventSink>,
    pub created_at: Instant,
    pub last_heartbeat: Instant,
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ConnectionEntry {
    pub fn info(&self, now: Instant) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.id,
            user_id: self.user_id.clone(),
            ip: self.ip,
            user_agent: self.user_agent.clone(),
            age_ms: now.saturating_duration_since(self.created_at).as_millis() as u64,
            idle_ms: now.saturating_duration_since(self.last_heartbeat).as_millis() as u64,
        }
    }
}

/// Fan-out target: everything needed to write and, on failure, prune.
#[derive(Clone)]
pub struct Target {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub sink: Arc<dyn EventSink>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    by_ip: HashMap<IpAddr, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    /// Insert a new entry. Returns the entry back if the id is taken.
    pub fn insert(&mut self, entry: ConnectionEntry) -> Result<(), ConnectionEntry> {
        if self.connections.contains_key(&entry.id) {
            return Err(entry);
        }
        self.by_user
            .entry(entry.user_id.clone())
            .or_default()
            .insert(entry.id);
        if let Some(ip) = entry.ip {
            self.by_ip.entry(ip).or_default().insert(entry.id);
        }
        self.connections.insert(entry.id, entry);
        Ok(())
    }

    /// Remove an entry from all three maps.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(id)?;

        if let Some(set) = self.by_user.get_mut(&entry.user_id) {
            set.remove(id);
            if set.is_empty() {
                self.by_user.remove(&entry.user_id);
            }
        }
        if let Some(ip) = entry.ip {
            if let Some(set) = self.by_ip.get_mut(&ip) {
                set.remove(id);
                if set.is_empty() {
                    self.by_ip.remove(&ip);
                }
            }
        }

        Some(entry)
    }

    /// Refresh `last_heartbeat`. Returns `false` if the connection is gone.
    pub fn touch(&mut self, id: &ConnectionId, now: Instant) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.by_user.get(user_id).map_or(0, HashSet::len)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.by_ip.get(ip).map_or(0, HashSet::len)
    }

    /// The user's connection with the smallest `created_at`.
    ///
    /// Ties (same instant) fall back to the connection id so the choice is
    /// deterministic.
    pub fn oldest_for_user(&self, user_id: &UserId) -> Option<&ConnectionEntry> {
        self.by_user
            .get(user_id)?
            .iter()
            .filter_map(|id| self.connections.get(id))
            .min_by_key(|entry| (entry.created_at, entry.id))
    }

    pub fn targets_for_user(&self, user_id: &UserId) -> Vec<Target> {
        self.by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id))
                    .map(Self::target)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_targets(&self) -> Vec<Target> {
        self.connections.values().map(Self::target).collect()
    }

    /// Connections whose last heartbeat is strictly older than `timeout`.
    pub fn stale(&self, now: Instant, timeout: std::time::Duration) -> Vec<(ConnectionId, UserId)> {
        self.connections
            .values()
            .filter(|entry| now.saturating_duration_since(entry.last_heartbeat) > timeout)
            .map(|entry| (entry.id, entry.user_id.clone()))
            .collect()
    }

    pub fn connection_ids(&self) -> Vec<(ConnectionId, UserId)> {
        self.connections
            .values()
            .map(|entry| (entry.id, entry.user_id.clone()))
            .collect()
    }

    pub fn users(&self) -> Vec<UserId> {
        self.by_user.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn ip_count(&self) -> usize {
        self.by_ip.len()
    }

    fn target(entry: &ConnectionEntry) -> Target {
        Target {
            id: entry.id,
            user_id: entry.user_id.clone(),
            sink: Arc::clone(&entry.sink),
        }
    }

    /// Panics if the three maps disagree.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn assert_consistent(&self) {
        let user_total: usize = self.by_user.values().map(HashSet::len).sum();
        assert_eq!(user_total, self.connections.len(), "user index out of sync");

        let with_ip = self.connections.values().filter(|e| e.ip.is_some()).count();
        let ip_total: usize = self.by_ip.values().map(HashSet::len).sum();
        assert_eq!(ip_total, with_ip, "ip index out of sync");

        for entry in self.connections.values() {
            assert!(
                self.by_user
                    .get(&entry.user_id)
                    .is_some_and(|set| set.contains(&entry.id)),
                "connection {} missing from its user set",
                entry.id
            );
            if let Some(ip) = entry.ip {
                assert!(
                    self.by_ip.get(&ip).is_some_and(|set| set.contains(&entry.id)),
                    "connection {} missing from its ip set",
                    entry.id
                );
            }
        }
        assert!(self.by_user.values().all(|set| !set.is_empty()));
        assert!(self.by_ip.values().all(|set| !set.is_empty()));
    }
}
