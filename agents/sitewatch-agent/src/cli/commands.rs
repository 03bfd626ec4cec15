//! CLI command definitions for the sitewatch agent

use chrono::Utc;
use clap::{Parser, Subcommand};
use sitewatch_core::report::prune_reports;
use sitewatch_core::store::KvStore;
use sitewatch_core::{
    monitor::load_history, BackupManager, FileStore, HttpFetcher, IncidentLog, IncidentReport,
    Monitor, MonitorConfig, MonitorError,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::output::{IncidentList, OutputFormat, Render, RestoreList};
use super::ExitCode;
use crate::error::AgentError;
use crate::handler::{create_router, AppState};
use crate::scheduler::Scheduler;
use crate::telemetry::{LogFormat, SitewatchMetrics};

/// Sitewatch CLI
///
/// Watch a website for outages, unexpected content changes, injected code
/// and certificate problems.
#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(about = "Sitewatch - website integrity monitoring", long_about = None)]
#[command(version)]
pub struct SitewatchCli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "SITEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "json", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: SitewatchCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum SitewatchCommands {
    /// Run one monitoring cycle
    ///
    /// Exits with 1 when the cycle recorded incidents.
    Check {
        /// Also snapshot every resource after the cycle
        #[arg(long)]
        backup: bool,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Run cycles on a fixed interval until interrupted
    Run {
        /// Seconds between cycle starts (defaults to the configured interval)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Start the HTTP status server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "PORT")]
        port: u16,

        /// Also run scheduled cycles in the background
        #[arg(long)]
        schedule: bool,
    },

    /// Show the most recent incidents
    Incidents {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Summarize incidents and availability over a window
    Report {
        /// Window length in days
        #[arg(short, long, default_value = "7")]
        days: i64,

        /// Save the text report under the data directory
        #[arg(long)]
        save: bool,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Snapshot every resource into the backup directory
    Backup {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Copy backups into the restore directory and verify them
    Restore {
        /// Restore only the newest backup of this resource
        #[arg(short, long)]
        resource: Option<String>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete saved reports older than the retention window
    Prune,
}

fn fetch_timeout(config: &MonitorConfig) -> Duration {
    Duration::from_millis(config.fetch.timeout_ms)
}

fn open_store(config: &MonitorConfig) -> Result<Arc<dyn KvStore>, AgentError> {
    let store = FileStore::open(&config.data_dir).map_err(MonitorError::from)?;
    Ok(Arc::new(store))
}

/// Execute one cycle, optionally followed by a backup
pub async fn execute_check(
    config: Arc<MonitorConfig>,
    backup: bool,
    format: OutputFormat,
) -> Result<ExitCode, AgentError> {
    let monitor = Monitor::from_config(config.clone())?;
    let summary = match monitor.run_cycle().await {
        Ok(summary) => summary,
        Err(e) => {
            monitor.report_failure(&e).await;
            return Err(e.into());
        }
    };
    summary.render(format)?;

    if backup {
        let manager = BackupManager::from_config(&config);
        let report = manager
            .backup_all(monitor.fetcher().as_ref(), monitor.resources(), fetch_timeout(&config))
            .await?;
        report.render(format)?;
    }

    Ok(ExitCode::from_incidents(summary.has_incidents()))
}

/// Run the scheduler until Ctrl-C
pub async fn execute_run(
    config: Arc<MonitorConfig>,
    interval_secs: Option<u64>,
) -> Result<ExitCode, AgentError> {
    let monitor = Arc::new(Monitor::from_config(config)?);
    let mut scheduler = Scheduler::new(monitor);
    if let Some(secs) = interval_secs {
        scheduler = scheduler.with_interval(Duration::from_secs(secs.max(1)));
    }

    scheduler.run(shutdown_signal()).await;
    Ok(ExitCode::Success)
}

/// Serve the HTTP surface until Ctrl-C
pub async fn execute_serve(
    config: Arc<MonitorConfig>,
    host: String,
    port: u16,
    schedule: bool,
) -> Result<ExitCode, AgentError> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| AgentError::invalid_input(format!("bad listen address: {}", e)))?;

    let monitor = Arc::new(Monitor::from_config(config)?);
    let metrics = Arc::new(SitewatchMetrics::new()?);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let background = if schedule {
        let scheduler = Scheduler::new(monitor.clone()).with_metrics(metrics.clone());
        Some(tokio::spawn(async move {
            scheduler
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        }))
    } else {
        None
    };

    let router = create_router(Arc::new(AppState::new(monitor, metrics)));
    tracing::info!(%addr, schedule, "Starting sitewatch agent");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    if let Some(handle) = background {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Scheduler task aborted");
        }
    }

    Ok(ExitCode::Success)
}

pub fn execute_incidents(
    config: &MonitorConfig,
    limit: usize,
    format: OutputFormat,
) -> Result<ExitCode, AgentError> {
    let log = IncidentLog::new(open_store(config)?, config.incidents.retention_cap);
    IncidentList::new(log.load_recent(limit)).render(format)?;
    Ok(ExitCode::Success)
}

pub fn execute_report(
    config: &MonitorConfig,
    days: i64,
    save: bool,
    format: OutputFormat,
) -> Result<ExitCode, AgentError> {
    if days <= 0 {
        return Err(AgentError::invalid_input("--days must be positive"));
    }

    let store = open_store(config)?;
    let history = load_history(store.as_ref());
    let log = IncidentLog::new(store, config.incidents.retention_cap);
    let report = IncidentReport::generate(&log.load_all(), &history, days, Utc::now());
    report.render(format)?;

    if save {
        let path = report.save_report(&config.reports_dir())?;
        eprintln!("Report saved to {}", path.display());
    }

    Ok(ExitCode::Success)
}

pub async fn execute_backup(
    config: &MonitorConfig,
    format: OutputFormat,
) -> Result<ExitCode, AgentError> {
    let fetcher = HttpFetcher::from_settings(&config.fetch).map_err(MonitorError::from)?;
    let manager = BackupManager::from_config(config);
    let report = manager
        .backup_all(&fetcher, &config.effective_resources(), fetch_timeout(config))
        .await?;
    report.render(format)?;

    Ok(if report.successful_backups == 0 {
        ExitCode::OperationFailed
    } else {
        ExitCode::Success
    })
}

pub fn execute_restore(
    config: &MonitorConfig,
    resource: Option<String>,
    format: OutputFormat,
) -> Result<ExitCode, AgentError> {
    let manager = BackupManager::from_config(config);
    let restored = match resource {
        Some(name) => vec![manager.restore_latest(&name)?],
        None => manager.restore_all()?,
    };

    let list = RestoreList { restored };
    list.render(format)?;

    Ok(if list.has_mismatch() {
        ExitCode::OperationFailed
    } else {
        ExitCode::Success
    })
}

pub fn execute_prune(config: &MonitorConfig) -> Result<ExitCode, AgentError> {
    let dir = config.reports_dir();
    let removed = prune_reports(&dir, config.schedule.report_retention_days, Utc::now())?;
    println!("Removed {} report(s) from {}", removed, dir.display());
    Ok(ExitCode::Success)
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
