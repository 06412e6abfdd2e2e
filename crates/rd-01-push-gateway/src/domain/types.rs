//! Domain types for the push gateway.

use serde::{Deserialize, Serialize};
use shared_types::UserId;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Identifier of one long-lived push connection.
///
/// Uses UUID v7, so ids minted by the gateway are time-ordered and unique
/// across the process. Callers that bring their own id must keep it unique;
/// the registry rejects duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new connection ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Optional transport metadata supplied when a connection is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ConnectionMeta {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// Why an admission attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// User already holds `max_connections_per_user` (reject policy only)
    UserCapacity,
    /// IP already holds `max_connections_per_ip`
    IpCapacity,
    /// Too many attempts by this user inside the rate-limit window
    UserRateLimited,
    /// Too many attempts from this IP inside the rate-limit window
    IpRateLimited,
    /// Connection id is already registered
    DuplicateConnection,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UserCapacity => "too many connections for user",
            RejectReason::IpCapacity => "too many connections from this IP",
            RejectReason::UserRateLimited => "too many connection attempts, try again later",
            RejectReason::IpRateLimited => "too many connection attempts from this IP",
            RejectReason::DuplicateConnection => "connection id already in use",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an admission check. Rejection is a routine outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl Admission {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn reject(reason: RejectReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Closed on request of the application
    Requested,
    /// Transport reported the peer went away
    ClientDisconnected,
    /// Evicted to make room for a newer connection of the same user
    Replaced,
    /// A write to the sink failed or missed its deadline
    WriteFailed,
    /// No heartbeat within `connection_timeout`
    Timeout,
    /// Gateway is shutting down
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Requested => "requested",
            CloseReason::ClientDisconnected => "client_disconnected",
            CloseReason::Replaced => "replaced",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::Timeout => "timeout",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence transition of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Emitted when a connection is accepted (`Online`) and when a user's last
/// connection goes away (`Offline`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub status: PresenceStatus,
    /// Live connections the user holds after the transition
    pub connections: usize,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Connections the record was written to
    pub delivered: usize,
    /// Connections that failed and were pruned
    pub pruned: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.pruned += other.pruned;
    }
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub timed_out: usize,
    pub rate_windows_pruned: usize,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub connections: usize,
    pub users: usize,
    pub ips: usize,
    pub rate_windows: usize,
}

/// Snapshot of one registered connection, without its sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    /// Milliseconds since the connection was accepted
    pub age_ms: u64,
    /// Milliseconds since the last client heartbeat
    pub idle_ms: u64,
}
