//! Output formatting for the sitewatch CLI
//!
//! JSON and YAML come straight from serde; the table format is a colored,
//! human-readable rendering written to any `io::Write`.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use sitewatch_core::backup::BackupStatus;
use sitewatch_core::{
    BackupReport, CycleSummary, Incident, IncidentReport, RestoreOutcome, Severity, Verification,
};
use std::io::{self, Write};

use crate::error::AgentError;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Anything the CLI prints
pub trait Render: Serialize {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Render to stdout in the specified format
    fn render(&self, format: OutputFormat) -> Result<(), AgentError> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(self)?);
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(self)?);
            }
            OutputFormat::Table => {
                let mut stdout = io::stdout();
                self.render_table(&mut stdout)?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

fn header(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => "HIGH".red().bold(),
        Severity::Medium => "MEDIUM".yellow().bold(),
        Severity::Low => "LOW".blue(),
    }
}

fn incident_row(out: &mut dyn Write, incident: &Incident) -> io::Result<()> {
    writeln!(
        out,
        "  {} {} [{}] {}",
        incident.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        severity_label(incident.severity),
        incident.incident_type(),
        incident.details.summary()
    )
}

impl Render for CycleSummary {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Monitoring Cycle")?;

        let status = if self.has_incidents() {
            format!("x {} incident(s)", self.incident_count()).red()
        } else {
            "+ All clear".green()
        };
        writeln!(out, "{}", status)?;
        writeln!(out)?;

        writeln!(out, "  Resources checked:     {}", self.resources_checked)?;
        writeln!(out, "  Resources unavailable: {}", self.resources_unavailable)?;
        for (incident_type, count) in &self.counts {
            writeln!(out, "  {:<22} {}", format!("{}:", incident_type), count)?;
        }
        if let Some(primary) = self.primary {
            writeln!(out, "  Alert type:            {}", primary)?;
        }
        writeln!(
            out,
            "  Alert sent:            {}",
            if self.alert_sent { "yes".green() } else { "no".dimmed() }
        )?;
        if self.persistence_errors > 0 {
            writeln!(
                out,
                "  {} {} store operation(s) skipped",
                "!".yellow(),
                self.persistence_errors
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Completed in {} ms", self.duration_ms.to_string().dimmed())
    }
}

/// Incident listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentList {
    pub count: usize,
    pub incidents: Vec<Incident>,
}

impl IncidentList {
    pub fn new(incidents: Vec<Incident>) -> Self {
        Self {
            count: incidents.len(),
            incidents,
        }
    }
}

impl Render for IncidentList {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Incidents")?;
        if self.incidents.is_empty() {
            return writeln!(out, "{}", "No incidents recorded".green());
        }
        for incident in &self.incidents {
            incident_row(out, incident)?;
        }
        writeln!(out)?;
        writeln!(out, "{} incident(s)", self.count)
    }
}

impl Render for IncidentReport {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, &format!("Report - last {} day(s)", self.days))?;

        writeln!(out, "{}", "Incidents:".cyan().bold())?;
        if self.counts.is_empty() {
            writeln!(out, "  {}", "none".green())?;
        }
        for (incident_type, count) in &self.counts {
            writeln!(out, "  {:<22} {}", format!("{}:", incident_type), count)?;
        }
        writeln!(out)?;

        if !self.recent.is_empty() {
            writeln!(out, "{}", "Latest:".cyan().bold())?;
            for incident in &self.recent {
                incident_row(out, incident)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "{}", "Availability:".cyan().bold())?;
        writeln!(out, "  Available cycles:   {}", self.available_cycles)?;
        writeln!(out, "  Unavailable cycles: {}", self.unavailable_cycles)?;
        match self.availability_rate {
            Some(rate) => writeln!(out, "  Rate:               {:.2}%", rate)?,
            None => writeln!(out, "  Rate:               {}", "n/a".dimmed())?,
        }
        writeln!(out)?;

        writeln!(out, "{}", "Recommendations:".cyan().bold())?;
        for recommendation in &self.recommendations {
            writeln!(out, "  - {}", recommendation)?;
        }
        Ok(())
    }
}

impl Render for BackupReport {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Backup")?;
        let status = match self.status {
            BackupStatus::Completed => "+ completed".green(),
            BackupStatus::Failed => "x failed".red(),
        };
        writeln!(
            out,
            "{} ({}/{} resources)",
            status, self.successful_backups, self.total_endpoints
        )?;
        for file in &self.files {
            writeln!(out, "  {}", file)?;
        }
        Ok(())
    }
}

/// Restore results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreList {
    pub restored: Vec<RestoreOutcome>,
}

impl RestoreList {
    /// Whether any restored file failed its integrity check
    pub fn has_mismatch(&self) -> bool {
        self.restored
            .iter()
            .any(|r| matches!(r.verification, Verification::Mismatch { .. }))
    }
}

impl Render for RestoreList {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Restore")?;
        for outcome in &self.restored {
            let check = match &outcome.verification {
                Verification::Verified => "verified".green(),
                Verification::Mismatch { .. } => "HASH MISMATCH".red().bold(),
                Verification::Unverified => "unverified".yellow(),
            };
            writeln!(
                out,
                "  {} -> {} ({})",
                outcome.file,
                outcome.destination.display(),
                check
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitewatch_core::IncidentType;
    use std::collections::BTreeMap;

    fn table<R: Render>(value: &R) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        value.render_table(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_summary_table() {
        let mut counts = BTreeMap::new();
        counts.insert(IncidentType::SiteUnavailable, 1);
        let summary = CycleSummary {
            started_at: Utc::now(),
            duration_ms: 42,
            resources_checked: 3,
            resources_unavailable: 1,
            counts,
            primary: Some(IncidentType::SiteUnavailable),
            alert_sent: false,
            persistence_errors: 2,
        };

        let text = table(&summary);
        assert!(text.contains("x 1 incident(s)"));
        assert!(text.contains("site_unavailable:"));
        assert!(text.contains("Alert sent:            no"));
        assert!(text.contains("2 store operation(s) skipped"));
    }

    #[test]
    fn test_incident_list_table() {
        let list = IncidentList::new(vec![Incident::ssl_error("example.org", "handshake failed")]);
        let text = table(&list);
        assert!(text.contains("HIGH [ssl_error]"));
        assert!(text.contains("1 incident(s)"));

        let empty = table(&IncidentList::new(Vec::new()));
        assert!(empty.contains("No incidents recorded"));
    }

    #[test]
    fn test_restore_mismatch() {
        let list = RestoreList {
            restored: vec![RestoreOutcome {
                file: "homepage_20240101_000000.html".into(),
                destination: "restored/homepage_20240101_000000.html".into(),
                verification: Verification::Mismatch {
                    expected: "a".into(),
                    actual: "b".into(),
                },
            }],
        };
        assert!(list.has_mismatch());
        assert!(table(&list).contains("HASH MISMATCH"));
    }
}
