//! Fixed-interval cycle loop
//!
//! Cycles never overlap: the loop awaits each cycle before waiting for the
//! next tick, and ticks missed while a cycle ran are skipped. A failed cycle
//! is logged and counted; it never stops the loop. Unexpected failures are
//! also alerted, at most once per cooldown period.

use chrono::Utc;
use sitewatch_core::report::prune_reports;
use sitewatch_core::{CycleSummary, Monitor, MonitorError};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::telemetry::SitewatchMetrics;

const PRUNE_EVERY: Duration = Duration::from_secs(24 * 3600);

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub reports_pruned: usize,
}

pub struct Scheduler {
    monitor: Arc<Monitor>,
    metrics: Option<Arc<SitewatchMetrics>>,
    interval: Duration,
    retention_days: i64,
    reports_dir: PathBuf,
}

impl Scheduler {
    /// Scheduler using the monitor's configured interval and report retention
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let config = monitor.config();
        let interval = Duration::from_secs(config.schedule.interval_secs.max(1));
        let retention_days = config.schedule.report_retention_days;
        let reports_dir = config.reports_dir();
        Self {
            monitor,
            metrics: None,
            interval,
            retention_days,
            reports_dir,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SitewatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` resolves; the first cycle starts immediately
    pub async fn run<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = SchedulerStats::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_prune: Option<Instant> = None;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            resources = self.monitor.resources().len(),
            "Scheduler started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            self.run_once(&mut stats).await;

            if last_prune.map_or(true, |at| at.elapsed() >= PRUNE_EVERY) {
                stats.reports_pruned += self.prune();
                last_prune = Some(Instant::now());
            }
        }

        tracing::info!(
            completed = stats.cycles_completed,
            failed = stats.cycles_failed,
            skipped = stats.cycles_skipped,
            "Scheduler stopped"
        );
        stats
    }

    async fn run_once(&self, stats: &mut SchedulerStats) {
        let result = self.monitor.run_cycle().await;
        self.record(result, stats).await;
    }

    async fn record(&self, result: sitewatch_core::Result<CycleSummary>, stats: &mut SchedulerStats) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(&result);
        }

        match result {
            Ok(summary) => {
                stats.cycles_completed += 1;
                tracing::info!(
                    incidents = summary.incident_count(),
                    unavailable = summary.resources_unavailable,
                    alert_sent = summary.alert_sent,
                    duration_ms = summary.duration_ms,
                    "Cycle finished"
                );
            }
            Err(MonitorError::CycleInProgress) => {
                stats.cycles_skipped += 1;
                tracing::warn!("Previous cycle still running, tick skipped");
            }
            Err(e) => {
                stats.cycles_failed += 1;
                tracing::error!(error = %e, "Cycle failed");
                if self.monitor.report_failure(&e).await {
                    tracing::info!("Failure alert sent");
                }
            }
        }
    }

    fn prune(&self) -> usize {
        match prune_reports(&self.reports_dir, self.retention_days, Utc::now()) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.reports_dir.display(), "Report pruning failed");
                0
            }
        }
    }
}
