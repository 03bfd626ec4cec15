//! Cycle orchestrator
//!
//! A [`Monitor`] runs one complete check pass per [`Monitor::run_cycle`]
//! call: fetch every resource, detect changes, scan for suspicious code,
//! probe the certificate, record incidents, then send one consolidated
//! alert. It owns no timer; scheduling belongs to the caller.
//!
//! Expected conditions (unreachable site, changed content, storage hiccups)
//! never make `run_cycle` fail. Only a concurrent call or an internal fault
//! does.

mod history;
pub mod message;

pub use history::{append_history, load_history, CycleRecord, HISTORY_CAP, HISTORY_KEY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::AlertDispatcher;
use crate::config::{MonitorConfig, ResourceConfig};
use crate::detector::{ChangeDetector, ChangeResult, PatternScanner};
use crate::error::{MonitorError, Result};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::incident::{Incident, IncidentLog, IncidentType};
use crate::notify::{MultiNotifier, Notifier};
use crate::store::{FileStore, KvStore};
use crate::tls::{self, CertificateProbe, TlsCertificateProbe};

const HTTPS_PORT: u16 = 443;

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub resources_checked: usize,
    pub resources_unavailable: usize,

    /// Incidents produced this cycle, by type
    pub counts: BTreeMap<IncidentType, usize>,

    /// Representative type used for the alert, `None` when all clear
    pub primary: Option<IncidentType>,

    /// Whether a notification actually went out
    pub alert_sent: bool,

    /// Store reads/writes that failed and were skipped
    pub persistence_errors: usize,
}

impl CycleSummary {
    pub fn incident_count(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn has_incidents(&self) -> bool {
        self.incident_count() > 0
    }
}

#[derive(Default)]
struct CycleOutcome {
    incidents: Vec<Incident>,
    unavailable: usize,
    persistence_errors: usize,
}

impl CycleOutcome {
    fn merge(&mut self, other: CycleOutcome) {
        self.incidents.extend(other.incidents);
        self.unavailable += other.unavailable;
        self.persistence_errors += other.persistence_errors;
    }
}

/// Clears the running flag when a cycle ends, even by panic
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Monitor {
    config: Arc<MonitorConfig>,
    resources: Vec<ResourceConfig>,
    store: Arc<dyn KvStore>,
    fetcher: Arc<dyn Fetcher>,
    detector: ChangeDetector,
    scanner: PatternScanner,
    incidents: IncidentLog,
    dispatcher: AlertDispatcher,
    certificates: Option<Arc<dyn CertificateProbe>>,
    running: AtomicBool,
}

impl Monitor {
    /// Monitor over explicit collaborators, without a certificate probe
    pub fn new(
        config: Arc<MonitorConfig>,
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let detector = ChangeDetector::new(store.clone(), config.detection.max_diff_chars);
        let incidents = IncidentLog::new(store.clone(), config.incidents.retention_cap);
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            notifier,
            Duration::from_secs(config.alerts.cooldown_secs),
        );

        Self {
            resources: config.effective_resources(),
            config,
            store,
            fetcher,
            detector,
            scanner: PatternScanner::default(),
            incidents,
            dispatcher,
            certificates: None,
            running: AtomicBool::new(false),
        }
    }

    /// Production wiring: file store under `data_dir`, HTTP fetcher, every
    /// configured notification channel and, for https sites, the TLS probe
    pub fn from_config(config: Arc<MonitorConfig>) -> Result<Self> {
        let store: Arc<dyn KvStore> = Arc::new(FileStore::open(&config.data_dir)?);
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_settings(&config.fetch)?);

        let notifier = MultiNotifier::from_settings(&config.notifications)?;
        if notifier.is_empty() {
            tracing::warn!("No notification channel configured; alerts will not be delivered");
        }

        let probe = if config.certificate.enabled && config.is_https() {
            let probe = TlsCertificateProbe::new(Duration::from_millis(config.certificate.timeout_ms))?;
            Some(Arc::new(probe) as Arc<dyn CertificateProbe>)
        } else {
            None
        };

        let mut monitor = Self::new(config, store, fetcher, Arc::new(notifier));
        monitor.certificates = probe;
        Ok(monitor)
    }

    pub fn with_certificate_probe(mut self, probe: Arc<dyn CertificateProbe>) -> Self {
        self.certificates = Some(probe);
        self
    }

    pub fn with_scanner(mut self, scanner: PatternScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    pub fn incident_log(&self) -> &IncidentLog {
        &self.incidents
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Recorded cycles, oldest first
    pub fn history(&self) -> Vec<CycleRecord> {
        load_history(self.store.as_ref())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one full check pass
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MonitorError::CycleInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            site = %self.config.site_url,
            resources = self.resources.len(),
            "Cycle started"
        );

        let mut outcome = CycleOutcome::default();

        if self.config.parallel {
            let checks = self.resources.iter().map(|r| self.check_resource(r));
            for result in futures::future::join_all(checks).await {
                outcome.merge(result);
            }
        } else {
            for resource in &self.resources {
                outcome.merge(self.check_resource(resource).await);
            }
        }

        outcome.merge(self.check_certificate().await);

        let primary = IncidentType::most_severe(outcome.incidents.iter().map(|i| i.incident_type()));
        let alert_sent = self.dispatch(primary, started_at, &outcome.incidents).await;

        let mut counts = BTreeMap::new();
        for incident in &outcome.incidents {
            *counts.entry(incident.incident_type()).or_insert(0) += 1;
        }

        let record = CycleRecord {
            at: started_at,
            resources_checked: self.resources.len(),
            resources_unavailable: outcome.unavailable,
            incidents: outcome.incidents.len(),
        };
        if let Err(e) = append_history(self.store.as_ref(), record) {
            tracing::warn!(error = %e, "Failed to record cycle history");
            outcome.persistence_errors += 1;
        }

        let summary = CycleSummary {
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            resources_checked: self.resources.len(),
            resources_unavailable: outcome.unavailable,
            counts,
            primary,
            alert_sent,
            persistence_errors: outcome.persistence_errors,
        };

        tracing::info!(
            incidents = summary.incident_count(),
            primary = ?summary.primary,
            alert_sent,
            duration_ms = summary.duration_ms,
            "Cycle finished"
        );

        Ok(summary)
    }

    async fn check_resource(&self, resource: &ResourceConfig) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        let timeout = Duration::from_millis(self.config.fetch.timeout_ms);

        let response = match self.fetcher.fetch(&resource.url, timeout).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(resource = %resource.name, error = %e, "Fetch failed");
                outcome.unavailable += 1;
                let incident = Incident::site_unavailable(
                    &resource.name,
                    &resource.url,
                    None,
                    Some(e.to_string()),
                );
                self.record(&mut outcome, incident);
                return outcome;
            }
        };

        if !response.is_success() {
            tracing::warn!(
                resource = %resource.name,
                status = response.status_code,
                "Non-success status"
            );
            outcome.unavailable += 1;
            let incident = Incident::site_unavailable(
                &resource.name,
                &resource.url,
                Some(response.status_code),
                None,
            );
            self.record(&mut outcome, incident);
            return outcome;
        }

        match self.detector.check(&resource.name, &response.body) {
            Ok(ChangeResult::Changed(change)) => {
                let incident = Incident::content_changed(&resource.name, &resource.url, &change);
                self.record(&mut outcome, incident);
            }
            Ok(ChangeResult::Baseline) | Ok(ChangeResult::Unchanged) => {}
            Err(e) => {
                tracing::warn!(resource = %resource.name, error = %e, "Change detection skipped");
                outcome.persistence_errors += 1;
            }
        }

        if self.config.detection.scan_patterns {
            for found in self.scanner.scan(&response.body) {
                tracing::warn!(
                    resource = %resource.name,
                    pattern = %found.description,
                    occurrences = found.occurrences,
                    "Suspicious pattern"
                );
                self.record(&mut outcome, Incident::suspicious_code(&resource.name, &found));
            }
        }

        outcome
    }

    async fn check_certificate(&self) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        let (probe, host) = match (&self.certificates, self.config.site_host()) {
            (Some(probe), Some(host)) => (probe, host),
            _ => return outcome,
        };

        let result = probe.probe(&host, HTTPS_PORT).await;
        if let Ok(info) = &result {
            tracing::debug!(host = %host, days_remaining = info.days_remaining, "Certificate checked");
        }

        if let Some(incident) = tls::evaluate(&host, result, self.config.certificate.expiry_warning_days) {
            self.record(&mut outcome, incident);
        }
        outcome
    }

    fn record(&self, outcome: &mut CycleOutcome, incident: Incident) {
        match self.incidents.append(incident.clone()) {
            Ok(stored) => outcome.incidents.push(stored),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist incident");
                outcome.persistence_errors += 1;
                outcome.incidents.push(incident);
            }
        }
    }

    /// Alert about a cycle that failed with an unexpected error
    ///
    /// Expected failures are ignored. Repeats share one cooldown, so a fault
    /// that persists across cycles is reported once per cooldown period.
    pub async fn report_failure(&self, error: &MonitorError) -> bool {
        if error.is_expected() {
            return false;
        }

        let subject = message::subject(Some(IncidentType::SystemError), &self.config.site_url);
        let body = message::failure_body(&self.config.site_url, Utc::now(), &error.to_string());
        self.dispatcher
            .maybe_send(IncidentType::SystemError, &subject, &body)
            .await
    }

    async fn dispatch(
        &self,
        primary: Option<IncidentType>,
        at: DateTime<Utc>,
        incidents: &[Incident],
    ) -> bool {
        let alert_type = match primary {
            Some(t) => t,
            None if self.config.alerts.send_all_clear => IncidentType::Info,
            None => return false,
        };

        let subject = message::subject(primary, &self.config.site_url);
        let body = message::body(&self.config.site_url, at, self.resources.len(), incidents);
        self.dispatcher.maybe_send(alert_type, &subject, &body).await
    }
}
