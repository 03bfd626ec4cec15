//! Incident reporting over a time window

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use crate::incident::{Incident, IncidentType, Severity};
use crate::monitor::CycleRecord;

const REPORT_PREFIX: &str = "comprehensive_report_";
const REPORT_EXTENSION: &str = ".txt";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Incidents listed individually in a report
const RECENT_LIMIT: usize = 5;

/// Above this many incidents in the window the configuration is flagged
const BUSY_THRESHOLD: usize = 10;

/// Aggregated view of incidents and availability over `days`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub generated_at: DateTime<Utc>,
    pub days: i64,
    pub total_incidents: usize,
    pub counts: BTreeMap<IncidentType, usize>,

    /// Newest first
    pub recent: Vec<Incident>,

    pub cycles: usize,
    pub available_cycles: usize,
    pub unavailable_cycles: usize,

    /// Percentage of fully available cycles, `None` without history
    pub availability_rate: Option<f64>,

    pub recommendations: Vec<String>,
}

impl IncidentReport {
    pub fn generate(
        incidents: &[Incident],
        history: &[CycleRecord],
        days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let cutoff = window_start(now, days);
        let in_window: Vec<&Incident> = incidents.iter().filter(|i| i.timestamp >= cutoff).collect();

        let mut counts = BTreeMap::new();
        for incident in &in_window {
            *counts.entry(incident.incident_type()).or_insert(0) += 1;
        }

        let recent: Vec<Incident> = in_window
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .map(|i| (*i).clone())
            .collect();

        let cycles: Vec<&CycleRecord> = history.iter().filter(|c| c.at >= cutoff).collect();
        let available_cycles = cycles.iter().filter(|c| c.fully_available()).count();
        let unavailable_cycles = cycles.len() - available_cycles;
        let availability_rate = if cycles.is_empty() {
            None
        } else {
            Some(available_cycles as f64 / cycles.len() as f64 * 100.0)
        };

        let mut recommendations = Vec::new();
        if unavailable_cycles > 0 {
            recommendations.push("Investigate the causes of site unavailability".to_string());
        }
        if in_window.iter().any(|i| i.severity == Severity::High) {
            recommendations.push("Handle high-severity security incidents first".to_string());
        }
        if in_window.len() > BUSY_THRESHOLD {
            recommendations.push("Review the site configuration".to_string());
        } else {
            recommendations.push("Overall configuration looks satisfactory".to_string());
        }

        Self {
            generated_at: now,
            days,
            total_incidents: in_window.len(),
            counts,
            recent,
            cycles: cycles.len(),
            available_cycles,
            unavailable_cycles,
            availability_rate,
            recommendations,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SITE MONITORING REPORT");
        let _ = writeln!(out, "Period: last {} day(s)", self.days);
        let _ = writeln!(out, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out);

        let _ = writeln!(out, "INCIDENT SUMMARY:");
        if self.counts.is_empty() {
            let _ = writeln!(out, "   No recent incidents");
        }
        for (incident_type, count) in &self.counts {
            let _ = writeln!(out, "   - {}: {} incident(s)", incident_type, count);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "LATEST INCIDENTS ({} max):", RECENT_LIMIT);
        for incident in &self.recent {
            let _ = writeln!(
                out,
                "   - [{}] {} ({}): {}",
                incident.timestamp.to_rfc3339(),
                incident.incident_type(),
                incident.severity,
                incident.details.summary()
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "AVAILABILITY:");
        let _ = writeln!(out, "   - Available: {} cycle(s)", self.available_cycles);
        let _ = writeln!(out, "   - Unavailable: {} cycle(s)", self.unavailable_cycles);
        if let Some(rate) = self.availability_rate {
            let _ = writeln!(out, "   - Availability rate: {:.2}%", rate);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "RECOMMENDATIONS:");
        for recommendation in &self.recommendations {
            let _ = writeln!(out, "   - {}", recommendation);
        }

        out
    }

    /// Write the text rendering to `dir/comprehensive_report_<ts>.txt`
    pub fn save_report(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{}{}{}",
            REPORT_PREFIX,
            self.generated_at.format(STAMP_FORMAT),
            REPORT_EXTENSION
        ));
        fs::write(&path, self.render_text())?;
        tracing::info!(path = %path.display(), "Report saved");
        Ok(path)
    }
}

/// Start of a window reaching `days` back from `now`; windows past the
/// representable range start at the earliest instant
fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete saved reports older than `retention_days`; returns how many went
pub fn prune_reports(dir: &Path, retention_days: i64, now: DateTime<Utc>) -> std::io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let cutoff = window_start(now, retention_days);
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let stamp = match name
            .strip_prefix(REPORT_PREFIX)
            .and_then(|rest| rest.strip_suffix(REPORT_EXTENSION))
        {
            Some(stamp) => stamp,
            None => continue,
        };

        let written_at = match NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT) {
            Ok(naive) => Utc.from_utc_datetime(&naive),
            // Unrecognised stamp: fall back to the file's modification time.
            Err(_) => match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(_) => continue,
            },
        };

        if written_at < cutoff {
            fs::remove_file(entry.path())?;
            tracing::info!(file = %name, "Old report removed");
            removed += 1;
        }
    }

    Ok(removed)
}
