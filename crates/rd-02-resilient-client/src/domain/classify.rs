//! Outcome classification.

use super::error::ErrorKind;
use crate::ports::TransportError;

/// Maps a non-success HTTP status or a transport failure to an [`ErrorKind`].
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-2xx status.
    pub fn status(status: u16) -> ErrorKind {
        match status {
            401 | 403 => ErrorKind::Auth,
            501 => ErrorKind::Client,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Client,
        }
    }

    /// Classify a failure that produced no response.
    pub fn transport(error: &TransportError) -> ErrorKind {
        match error {
            TransportError::Timeout => ErrorKind::Timeout,
            TransportError::Network(_) => ErrorKind::Network,
        }
    }

    pub fn is_success(status: u16) -> bool {
        (200..300).contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(ErrorClassifier::status(401), ErrorKind::Auth);
        assert_eq!(ErrorClassifier::status(403), ErrorKind::Auth);
        assert_eq!(ErrorClassifier::status(500), ErrorKind::Server);
        assert_eq!(ErrorClassifier::status(503), ErrorKind::Server);
        assert_eq!(ErrorClassifier::status(501), ErrorKind::Client);
        assert_eq!(ErrorClassifier::status(404), ErrorKind::Client);
        assert_eq!(ErrorClassifier::status(429), ErrorKind::Client);
        assert_eq!(ErrorClassifier::status(304), ErrorKind::Client);
    }

    #[test]
    fn test_transport_taxonomy() {
        assert_eq!(
            ErrorClassifier::transport(&TransportError::Timeout),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorClassifier::transport(&TransportError::Network("connection refused".into())),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_success_range() {
        assert!(ErrorClassifier::is_success(200));
        assert!(ErrorClassifier::is_success(204));
        assert!(!ErrorClassifier::is_success(199));
        assert!(!ErrorClassifier::is_success(300));
    }
}
