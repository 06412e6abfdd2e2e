//! Sliding-window limiter for connection attempts.
//!
//! Keeps the timestamps of recent attempts per user and per IP. An attempt
//! counts while `now - t < window`; older entries are dropped lazily on every
//! check and in bulk by [`ConnectionRateLimiter::cleanup`].

use dashmap::DashMap;
use shared_types::UserId;
use std::collections::VecDeque;
use std::hash::Hash;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Attempt timestamps of one key, oldest first.
#[derive(Debug, Default)]
struct AttemptWindow {
    attempts: VecDeque<Instant>,
}

impl AttemptWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.attempts.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn newest(&self) -> Option<Instant> {
        self.attempts.back().copied()
    }
}

/// Per-user and per-IP attempt windows shared by admission and the sweep.
pub struct ConnectionRateLimiter {
    window: Duration,
    max_per_user: u32,
    max_per_ip: Option<u32>,
    users: DashMap<UserId, AttemptWindow>,
    ips: DashMap<IpAddr, AttemptWindow>,
}

impl ConnectionRateLimiter {
    pub fn new(window: Duration, max_per_user: u32, max_per_ip: Option<u32>) -> Self {
        Self {
            window,
            max_per_user,
            max_per_ip,
            users: DashMap::new(),
            ips: DashMap::new(),
        }
    }

    /// `true` if the user has used up the window.
    pub fn user_limited(&self, user_id: &UserId, now: Instant) -> bool {
        Self::count(&self.users, user_id, now, self.window) >= self.max_per_user as usize
    }

    /// `true` if per-IP limiting is enabled and the IP has used up the window.
    pub fn ip_limited(&self, ip: &IpAddr, now: Instant) -> bool {
        match self.max_per_ip {
            Some(max) => Self::count(&self.ips, ip, now, self.window) >= max as usize,
            None => false,
        }
    }

    /// Attempts by this user still inside the window.
    pub fn user_attempts(&self, user_id: &UserId, now: Instant) -> usize {
        Self::count(&self.users, user_id, now, self.window)
    }

    /// Record an admission attempt, accepted or not.
    pub fn record_attempt(&self, user_id: &UserId, ip: Option<IpAddr>, now: Instant) {
        Self::push(&self.users, user_id.clone(), now, self.window);
        // IP windows are only kept when they are enforced
        if let (Some(ip), Some(_)) = (ip, self.max_per_ip) {
            Self::push(&self.ips, ip, now, self.window);
        }
    }

    /// Drop every window whose newest attempt has aged out and trim the rest.
    ///
    /// Returns the number of windows removed.
    pub fn cleanup(&self, now: Instant) -> usize {
        let before = self.window_count();
        let window = self.window;

        let keep = |w: &mut AttemptWindow| match w.newest() {
            Some(newest) if now.saturating_duration_since(newest) < window => {
                w.prune(now, window);
                true
            }
            _ => false,
        };
        self.users.retain(|_, w| keep(w));
        self.ips.retain(|_, w| keep(w));

        let removed = before.saturating_sub(self.window_count());
        if removed > 0 {
            debug!(removed, remaining = self.window_count(), "Pruned stale rate-limit windows");
        }
        removed
    }

    /// Number of tracked windows (users plus IPs).
    pub fn window_count(&self) -> usize {
        self.users.len() + self.ips.len()
    }

    fn count<K>(map: &DashMap<K, AttemptWindow>, key: &K, now: Instant, window: Duration) -> usize
    where
        K: Eq + Hash,
    {
        match map.get_mut(key) {
            Some(mut w) => {
                w.prune(now, window);
                w.attempts.len()
            }
            None => 0,
        }
    }

    fn push<K>(map: &DashMap<K, AttemptWindow>, key: K, now: Instant, window: Duration)
    where
        K: Eq + Hash,
    {
        let mut w = map.entry(key).or_default();
        w.prune(now, window);
        w.attempts.push_back(now);
    }
}
