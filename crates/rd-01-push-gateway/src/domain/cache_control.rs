//! Cache-Control response variants.
//!
//! A fixed lookup table keyed by a named strategy; values are never built at
//! runtime.

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Dynamic or per-user data, including event streams
    NoCache,
    /// Data that may be a minute stale
    Short,
    /// Data that may be five minutes stale
    Medium,
    /// Data that may be an hour stale
    Long,
    /// Fingerprinted assets
    Static,
    /// Per-user data that must not hit shared caches
    Private,
}

impl CacheStrategy {
    pub const ALL: [CacheStrategy; 6] = [
        CacheStrategy::NoCache,
        CacheStrategy::Short,
        CacheStrategy::Medium,
        CacheStrategy::Long,
        CacheStrategy::Static,
        CacheStrategy::Private,
    ];

    /// The `Cache-Control` header value for this strategy.
    pub const fn header_value(self) -> &'static str {
        match self {
            CacheStrategy::NoCache => "no-store, no-cache, must-revalidate, max-age=0",
            CacheStrategy::Short => "public, max-age=60, s-maxage=60, stale-while-revalidate=30",
            CacheStrategy::Medium => {
                "public, max-age=300, s-maxage=300, stale-while-revalidate=60"
            }
            CacheStrategy::Long => {
                "public, max-age=3600, s-maxage=3600, stale-while-revalidate=300"
            }
            CacheStrategy::Static => "public, max-age=31536000, immutable",
            CacheStrategy::Private => "private, no-cache, max-age=0",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            CacheStrategy::NoCache => "no-cache",
            CacheStrategy::Short => "short",
            CacheStrategy::Medium => "medium",
            CacheStrategy::Long => "long",
            CacheStrategy::Static => "static",
            CacheStrategy::Private => "private",
        }
    }

    /// Set `Cache-Control` on a header map, replacing any previous value.
    pub fn apply(self, headers: &mut HeaderMap) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(self.header_value()),
        );
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheStrategy {
    type Err = UnknownCacheStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| UnknownCacheStrategy(s.to_string()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown cache strategy: {0}")]
pub struct UnknownCacheStrategy(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_values() {
        assert_eq!(
            CacheStrategy::Static.header_value(),
            "public, max-age=31536000, immutable"
        );
        assert!(CacheStrategy::NoCache.header_value().contains("no-store"));
        assert!(CacheStrategy::Private.header_value().starts_with("private"));
    }

    #[test]
    fn test_every_value_is_a_valid_header() {
        for strategy in CacheStrategy::ALL {
            assert!(HeaderValue::from_str(strategy.header_value()).is_ok());
        }
    }

    #[test]
    fn test_name_round_trip() {
        for strategy in CacheStrategy::ALL {
            assert_eq!(strategy.name().parse::<CacheStrategy>().unwrap(), strategy);
        }
        assert!("forever".parse::<CacheStrategy>().is_err());
    }

    #[test]
    fn test_apply_replaces_existing() {
        let mut headers = HeaderMap::new();
        CacheStrategy::Long.apply(&mut headers);
        CacheStrategy::NoCache.apply(&mut headers);
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            CacheStrategy::NoCache.header_value()
        );
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }
}
