//! Error types for the monitoring core
//!
//! Each concern owns its error enum (fetch, persistence, notification,
//! configuration, certificate, backup). `MonitorError` wraps them for callers
//! that only need a single type.

use thiserror::Error;

pub use crate::backup::BackupError;
pub use crate::config::ConfigError;
pub use crate::fetcher::FetchError;
pub use crate::notify::NotificationError;
pub use crate::store::PersistenceError;
pub use crate::tls::CertificateError;

/// Umbrella error for monitoring operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Outbound fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Persisted state could not be read or written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Notification channel failed
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// Certificate probe failed
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Backup or restore failed
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// A cycle was requested while another one is still running
    #[error("A monitoring cycle is already running")]
    CycleInProgress,

    /// Unexpected local fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        MonitorError::Internal(msg.into())
    }

    /// Whether the error is an expected, recoverable condition
    ///
    /// Expected conditions are reported as incidents or degraded state and
    /// must never stop a scheduler.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            MonitorError::Fetch(_)
                | MonitorError::Persistence(_)
                | MonitorError::Notification(_)
                | MonitorError::Certificate(_)
                | MonitorError::CycleInProgress
        )
    }
}

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MonitorError::internal("lock poisoned");
        assert_eq!(err.to_string(), "Internal error: lock poisoned");

        let err = MonitorError::from(FetchError::Timeout);
        assert_eq!(err.to_string(), "Request timed out");
    }

    #[test]
    fn test_is_expected() {
        assert!(MonitorError::from(FetchError::Timeout).is_expected());
        assert!(MonitorError::CycleInProgress.is_expected());
        assert!(MonitorError::from(NotificationError::NotConfigured).is_expected());
        assert!(!MonitorError::internal("boom").is_expected());
        assert!(!MonitorError::from(ConfigError::invalid("bad")).is_expected());
    }
}
