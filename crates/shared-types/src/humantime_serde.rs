//! Human-readable `Duration` serde format.
//!
//! Accepts `"1500ns"`, `"250us"`, `"250ms"`, `"30s"`, `"2m"` or a bare
//! number of seconds. Writes the coarsest unit that keeps the value exact:
//! `"Ns"`, then `"Nms"`, then `"Nns"`.
//!
//! ```ignore
//! #[serde(with = "shared_types::humantime_serde")]
//! pub timeout: Duration,
//! ```

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    } else if nanos % 1_000_000 == 0 {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    } else {
        serializer.serialize_str(&format!("{}ns", duration.as_nanos()))
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let s = s.trim();
    // Two-letter units must be tried before "s" and "m"
    if let Some(ns) = s.strip_suffix("ns") {
        ns.trim()
            .parse::<u64>()
            .map(Duration::from_nanos)
            .map_err(|_| "invalid nanoseconds")
    } else if let Some(us) = s.strip_suffix("us") {
        us.trim()
            .parse::<u64>()
            .map(Duration::from_micros)
            .map_err(|_| "invalid microseconds")
    } else if let Some(ms) = s.strip_suffix("ms") {
        ms.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| "invalid milliseconds")
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| "invalid seconds")
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
            .map_err(|_| "invalid minutes")
    } else {
        // Plain number: seconds
        s.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| "invalid duration format")
    }
}
