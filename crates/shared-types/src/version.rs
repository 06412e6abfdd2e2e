//! # Version Contract
//!
//! Every request and every response on the delivery layer carries the build
//! identifier of its sender in [`VERSION_HEADER`]. A client that sees a
//! different identifier echoed back is running against a different build of
//! the server (version skew).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Header carrying the sender's build identifier.
pub const VERSION_HEADER: &str = "x-app-version";

/// Maximum accepted length of a build identifier.
pub const MAX_VERSION_LEN: usize = 128;

/// Build identifier of one side of the connection.
///
/// Opaque: two versions are compatible exactly when they are equal. No
/// ordering or semver interpretation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildVersion(String);

impl BuildVersion {
    /// Parse a header value into a version.
    ///
    /// Surrounding whitespace is trimmed. Empty values, oversized values and
    /// values with control characters are rejected so they never end up in a
    /// header of our own.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        if trimmed.len() > MAX_VERSION_LEN {
            return Err(VersionError::TooLong {
                len: trimmed.len(),
                max: MAX_VERSION_LEN,
            });
        }
        if trimmed.chars().any(|c| c.is_control()) {
            return Err(VersionError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Version of the crate that is linked into the running binary.
    pub fn from_pkg() -> Self {
        Self(env!("CARGO_PKG_VERSION").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detected mismatch between the local build and the remote one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSkew {
    pub local: BuildVersion,
    pub remote: BuildVersion,
}

impl fmt::Display for VersionSkew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local build {} != remote build {}", self.local, self.remote)
    }
}

/// Compare the local build with the identifier echoed by the remote side.
///
/// A missing or unparsable remote header is not skew: older servers and
/// intermediaries that strip headers must not trigger reloads.
pub fn detect_skew(local: &BuildVersion, remote: Option<&str>) -> Option<VersionSkew> {
    let remote = BuildVersion::parse(remote?).ok()?;
    if &remote == local {
        None
    } else {
        Some(VersionSkew {
            local: local.clone(),
            remote,
        })
    }
}

/// Errors produced when parsing a build identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version identifier is empty")]
    Empty,

    #[error("version identifier too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("version identifier contains control characters")]
    InvalidCharacter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let v = BuildVersion::parse("  1.4.2 ").unwrap();
        assert_eq!(v.as_str(), "1.4.2");
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert_eq!(BuildVersion::parse("   "), Err(VersionError::Empty));
        assert_eq!(
            BuildVersion::parse("a\nb"),
            Err(VersionError::InvalidCharacter)
        );
        let long = "x".repeat(MAX_VERSION_LEN + 1);
        assert!(matches!(
            BuildVersion::parse(&long),
            Err(VersionError::TooLong { .. })
        ));
    }

    #[test]
    fn test_detect_skew() {
        let local = BuildVersion::parse("2024.10.1").unwrap();

        assert!(detect_skew(&local, Some("2024.10.1")).is_none());
        assert!(detect_skew(&local, None).is_none());
        assert!(detect_skew(&local, Some("")).is_none());

        let skew = detect_skew(&local, Some("2024.11.0")).unwrap();
        assert_eq!(skew.remote.as_str(), "2024.11.0");
        assert_eq!(skew.local, local);
    }

    #[test]
    fn test_from_pkg_is_valid() {
        let v = BuildVersion::from_pkg();
        assert!(BuildVersion::parse(v.as_str()).is_ok());
    }
}
