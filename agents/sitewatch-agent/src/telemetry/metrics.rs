//! Prometheus metrics for the sitewatch agent
//!
//! - `sitewatch_cycles_total` (counter) - cycles by result
//! - `sitewatch_cycle_duration_seconds` (histogram) - cycle duration
//! - `sitewatch_incidents_total` (counter) - incidents by type
//! - `sitewatch_alerts_total` (counter) - alert decisions by outcome
//! - `sitewatch_resources_unavailable` (gauge) - unavailable resources in the last cycle
//! - `sitewatch_persistence_errors_total` (counter) - skipped store operations

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use sitewatch_core::{CycleSummary, MonitorError};

use super::{Result, TelemetryError};

const NAMESPACE: &str = "sitewatch";

pub struct SitewatchMetrics {
    registry: Registry,
    cycles_total: CounterVec,
    cycle_duration_seconds: Histogram,
    incidents_total: CounterVec,
    alerts_total: CounterVec,
    resources_unavailable: Gauge,
    persistence_errors_total: Counter,
}

impl SitewatchMetrics {
    /// Create the metrics and register them with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cycles_total = CounterVec::new(
            Opts::new("cycles_total", "Total number of monitoring cycles by result")
                .namespace(NAMESPACE),
            &["result"],
        )?;

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("cycle_duration_seconds", "Monitoring cycle duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        let incidents_total = CounterVec::new(
            Opts::new("incidents_total", "Total number of incidents recorded by type")
                .namespace(NAMESPACE),
            &["type"],
        )?;

        let alerts_total = CounterVec::new(
            Opts::new("alerts_total", "Alert decisions by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;

        let resources_unavailable = Gauge::with_opts(
            Opts::new(
                "resources_unavailable",
                "Resources found unavailable in the last completed cycle",
            )
            .namespace(NAMESPACE),
        )?;

        let persistence_errors_total = Counter::with_opts(
            Opts::new(
                "persistence_errors_total",
                "Store reads or writes skipped during cycles",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(incidents_total.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(resources_unavailable.clone()))?;
        registry.register(Box::new(persistence_errors_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            cycles_total,
            cycle_duration_seconds,
            incidents_total,
            alerts_total,
            resources_unavailable,
            persistence_errors_total,
        })
    }

    /// Record the outcome of one `run_cycle` call
    pub fn observe_cycle(&self, result: &std::result::Result<CycleSummary, MonitorError>) {
        match result {
            Ok(summary) => {
                self.cycles_total.with_label_values(&["completed"]).inc();
                self.cycle_duration_seconds
                    .observe(summary.duration_ms as f64 / 1000.0);
                for (incident_type, count) in &summary.counts {
                    self.incidents_total
                        .with_label_values(&[incident_type.as_str()])
                        .inc_by(*count as f64);
                }
                let outcome = if summary.alert_sent { "sent" } else { "not_sent" };
                self.alerts_total.with_label_values(&[outcome]).inc();
                self.resources_unavailable
                    .set(summary.resources_unavailable as f64);
                self.persistence_errors_total
                    .inc_by(summary.persistence_errors as f64);
            }
            Err(MonitorError::CycleInProgress) => {
                self.cycles_total.with_label_values(&["skipped"]).inc();
            }
            Err(_) => {
                self.cycles_total.with_label_values(&["failed"]).inc();
            }
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitewatch_core::IncidentType;
    use std::collections::BTreeMap;

    fn summary() -> CycleSummary {
        let mut counts = BTreeMap::new();
        counts.insert(IncidentType::SiteUnavailable, 2);
        counts.insert(IncidentType::ContentChanged, 1);
        CycleSummary {
            started_at: Utc::now(),
            duration_ms: 1500,
            resources_checked: 3,
            resources_unavailable: 2,
            counts,
            primary: Some(IncidentType::SiteUnavailable),
            alert_sent: true,
            persistence_errors: 1,
        }
    }

    #[test]
    fn test_observe_completed_cycle() {
        let metrics = SitewatchMetrics::new().unwrap();
        metrics.observe_cycle(&Ok(summary()));

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("sitewatch_cycles_total{result=\"completed\"} 1"));
        assert!(text.contains("sitewatch_incidents_total{type=\"site_unavailable\"} 2"));
        assert!(text.contains("sitewatch_incidents_total{type=\"content_changed\"} 1"));
        assert!(text.contains("sitewatch_alerts_total{outcome=\"sent\"} 1"));
        assert!(text.contains("sitewatch_resources_unavailable 2"));
        assert!(text.contains("sitewatch_persistence_errors_total 1"));
        assert!(text.contains("sitewatch_cycle_duration_seconds_count 1"));
    }

    #[test]
    fn test_observe_failed_cycles() {
        let metrics = SitewatchMetrics::new().unwrap();
        metrics.observe_cycle(&Err(MonitorError::CycleInProgress));
        metrics.observe_cycle(&Err(MonitorError::internal("boom")));

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("sitewatch_cycles_total{result=\"skipped\"} 1"));
        assert!(text.contains("sitewatch_cycles_total{result=\"failed\"} 1"));
        assert!(!text.contains("sitewatch_alerts_total{"));
    }
}
