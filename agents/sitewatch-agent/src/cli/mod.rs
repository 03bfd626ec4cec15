//! CLI module for the sitewatch agent
//!
//! Maps subcommands to the monitor, scheduler, backup and report operations
//! and turns their outcome into a process exit code.

pub mod commands;
pub mod output;

pub use commands::{SitewatchCli, SitewatchCommands};
pub use output::{OutputFormat, Render};

use sitewatch_core::MonitorConfig;
use std::sync::Arc;

use crate::error::AgentError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command succeeded, nothing abnormal observed
    Success = 0,
    /// The cycle recorded at least one incident
    Incidents = 1,
    /// Backup, restore or a runtime operation failed
    OperationFailed = 2,
    /// Invalid configuration or arguments
    ConfigError = 3,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn from_incidents(has_incidents: bool) -> Self {
        if has_incidents {
            ExitCode::Incidents
        } else {
            ExitCode::Success
        }
    }
}

/// Run the CLI and return the exit code
pub async fn run(cli: SitewatchCli) -> Result<ExitCode, AgentError> {
    let config = Arc::new(MonitorConfig::load(cli.config.as_deref())?);
    tracing::debug!(site = %config.site_url, "Configuration loaded");

    match cli.command {
        SitewatchCommands::Check { backup, format } => {
            commands::execute_check(config, backup, format).await
        }
        SitewatchCommands::Run { interval_secs } => {
            commands::execute_run(config, interval_secs).await
        }
        SitewatchCommands::Serve {
            host,
            port,
            schedule,
        } => commands::execute_serve(config, host, port, schedule).await,
        SitewatchCommands::Incidents { limit, format } => {
            commands::execute_incidents(&config, limit, format)
        }
        SitewatchCommands::Report { days, save, format } => {
            commands::execute_report(&config, days, save, format)
        }
        SitewatchCommands::Backup { format } => commands::execute_backup(&config, format).await,
        SitewatchCommands::Restore { resource, format } => {
            commands::execute_restore(&config, resource, format)
        }
        SitewatchCommands::Prune => commands::execute_prune(&config),
    }
}
