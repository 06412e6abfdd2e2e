//! Gateway configuration with validation.
//!
//! Every knob has a documented default; a JSON file only needs to name the
//! values it overrides.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Admission, rate limiting and liveness
    pub connections: ConnectionConfig,
    /// Background maintenance
    pub cleanup: CleanupConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.connections.validate()?;
        self.cleanup.validate()?;
        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Load from a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8547)
    pub port: u16,
    /// Records buffered per connection before writes start to wait
    pub stream_buffer: usize,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`. Enable only
    /// behind a proxy that overwrites them (default: false)
    pub trust_forwarded_headers: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8547,
            stream_buffer: 64,
            trust_forwarded_headers: false,
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_buffer == 0 {
            return Err(ConfigError::InvalidLimit("stream_buffer cannot be 0".into()));
        }
        Ok(())
    }
}

/// What happens when a user opens a connection while already at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCapacityPolicy {
    /// Close the user's oldest connection to make room
    #[default]
    EvictOldest,
    /// Turn the new connection away
    Reject,
}

/// Admission and liveness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Live connections allowed per user (default: 3)
    pub max_connections_per_user: usize,
    /// Live connections allowed per IP (default: 10)
    pub max_connections_per_ip: usize,
    /// Sliding window for connection attempts (default: 60s)
    #[serde(with = "shared_types::humantime_serde")]
    pub rate_limit_window: Duration,
    /// Attempts allowed per user inside the window (default: 10)
    pub max_new_connections_per_window: u32,
    /// Attempts allowed per IP inside the window (default: unlimited)
    pub max_new_connections_per_ip_window: Option<u32>,
    /// Server keep-alive period (default: 30s)
    #[serde(with = "shared_types::humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Connection is stale after this long without a client heartbeat (default: 120s)
    #[serde(with = "shared_types::humantime_serde")]
    pub connection_timeout: Duration,
    /// Deadline for a single write to a sink (default: 5s)
    #[serde(with = "shared_types::humantime_serde")]
    pub write_timeout: Duration,
    /// Behaviour when a user is at capacity
    pub user_capacity_policy: UserCapacityPolicy,
    /// Presence events buffered for slow subscribers
    pub presence_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 3,
            max_connections_per_ip: 10,
            rate_limit_window: Duration::from_secs(60),
            max_new_connections_per_window: 10,
            max_new_connections_per_ip_window: None,
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(5),
            user_capacity_policy: UserCapacityPolicy::EvictOldest,
            presence_buffer: 256,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections_per_user == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_connections_per_user cannot be 0".into(),
            ));
        }
        if self.max_connections_per_ip == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_connections_per_ip cannot be 0".into(),
            ));
        }
        if self.max_new_connections_per_window == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_new_connections_per_window cannot be 0".into(),
            ));
        }
        if self.max_new_connections_per_ip_window == Some(0) {
            return Err(ConfigError::InvalidRateLimit(
                "max_new_connections_per_ip_window cannot be 0".into(),
            ));
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::InvalidRateLimit(
                "rate_limit_window cannot be 0".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "heartbeat_interval cannot be 0".into(),
            ));
        }
        if self.connection_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connection_timeout cannot be 0".into(),
            ));
        }
        if self.connection_timeout <= self.heartbeat_interval {
            return Err(ConfigError::InvalidTimeout(
                "connection_timeout must exceed heartbeat_interval".into(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("write_timeout cannot be 0".into()));
        }
        if self.presence_buffer == 0 {
            return Err(ConfigError::InvalidLimit("presence_buffer cannot be 0".into()));
        }
        Ok(())
    }
}

/// Background maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Period of the stale-connection and rate-window sweep (default: 30s)
    #[serde(with = "shared_types::humantime_serde")]
    pub interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl CleanupConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup interval cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
