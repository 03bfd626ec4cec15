//! Error types for the sitewatch agent

use sitewatch_core::error::{BackupError, ConfigError};
use sitewatch_core::MonitorError;
use thiserror::Error;

use crate::cli::ExitCode;
use crate::telemetry::TelemetryError;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Monitoring cycle or monitor construction failed
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be rendered
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Invalid arguments or bind address
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AgentError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AgentError::InvalidInput(msg.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AgentError::Config(_) | AgentError::InvalidInput(_) => ExitCode::ConfigError,
            AgentError::Monitor(MonitorError::Config(_)) => ExitCode::ConfigError,
            AgentError::Monitor(e) if e.is_expected() => ExitCode::OperationFailed,
            AgentError::Backup(_) | AgentError::Io(_) => ExitCode::OperationFailed,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(err: serde_yaml::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = AgentError::from(ConfigError::invalid("site_url is required"));
        assert_eq!(err.exit_code(), ExitCode::ConfigError);

        let err = AgentError::from(MonitorError::CycleInProgress);
        assert_eq!(err.exit_code(), ExitCode::OperationFailed);

        let err = AgentError::from(BackupError::NoBackups("backups".into()));
        assert_eq!(err.exit_code(), ExitCode::OperationFailed);

        let err = AgentError::from(MonitorError::internal("boom"));
        assert_eq!(err.exit_code(), ExitCode::InternalError);
    }

    #[test]
    fn test_display() {
        let err = AgentError::invalid_input("bad address");
        assert_eq!(err.to_string(), "Invalid input: bad address");
    }
}
