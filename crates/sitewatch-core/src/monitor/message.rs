//! Consolidated alert text for one cycle

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::incident::{Incident, IncidentDetails, IncidentType};

const RULE: &str = "========================================";

/// Subject line for the representative type of a cycle (`None` = all clear)
pub fn subject(primary: Option<IncidentType>, site_url: &str) -> String {
    let headline = match primary {
        Some(IncidentType::SiteUnavailable) => "Site unavailable",
        Some(IncidentType::SuspiciousCode) => "Suspicious code detected",
        Some(IncidentType::ContentChanged) => "Content changed",
        Some(IncidentType::SslExpiring) | Some(IncidentType::SslError) => "Certificate problem",
        Some(IncidentType::SystemError) => "Internal error",
        Some(IncidentType::Info) | None => "All clear",
    };
    format!("[sitewatch] {}: {}", headline, site_url)
}

/// Body of an alert about the monitor itself failing
pub fn failure_body(site_url: &str, at: DateTime<Utc>, error: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Monitoring run for {} failed", site_url);
    let _ = writeln!(out, "Time: {}", at.to_rfc3339());
    let _ = writeln!(out);
    let _ = writeln!(out, "Error: {}", error);
    let _ = writeln!(out);
    let _ = writeln!(out, "Checks may be incomplete until the monitor is repaired.");
    out
}

/// Full report body: one section per check, then suggested actions
pub fn body(
    site_url: &str,
    at: DateTime<Utc>,
    resources_checked: usize,
    incidents: &[Incident],
) -> String {
    let of_type = |t: IncidentType| -> Vec<&Incident> {
        incidents.iter().filter(|i| i.incident_type() == t).collect()
    };
    let unavailable = of_type(IncidentType::SiteUnavailable);
    let changed = of_type(IncidentType::ContentChanged);
    let suspicious = of_type(IncidentType::SuspiciousCode);
    let certificate: Vec<&Incident> = incidents
        .iter()
        .filter(|i| {
            matches!(
                i.incident_type(),
                IncidentType::SslExpiring | IncidentType::SslError
            )
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "SITE MONITORING REPORT");
    let _ = writeln!(out, "Site: {}", site_url);
    let _ = writeln!(out, "Time: {}", at.to_rfc3339());
    let _ = writeln!(out, "Resources checked: {}", resources_checked);
    let _ = writeln!(out, "{}", RULE);

    section(&mut out, "AVAILABILITY", &unavailable, |_| None);
    section(&mut out, "INTEGRITY", &changed, |i| match &i.details {
        IncidentDetails::ContentChanged { diff, truncated, .. } => {
            let mut text = indent(diff);
            if *truncated {
                text.push_str("      (diff truncated)\n");
            }
            Some(text)
        }
        _ => None,
    });
    section(&mut out, "SECURITY", &suspicious, |_| None);
    section(&mut out, "CERTIFICATE", &certificate, |_| None);

    let actions = remediations(
        !unavailable.is_empty(),
        !changed.is_empty(),
        !suspicious.is_empty(),
        !certificate.is_empty(),
    );
    if !actions.is_empty() {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "SUGGESTED ACTIONS:");
        for action in actions {
            let _ = writeln!(out, " - {}", action);
        }
    }

    out
}

fn section<F>(out: &mut String, title: &str, incidents: &[&Incident], extra: F)
where
    F: Fn(&Incident) -> Option<String>,
{
    let _ = writeln!(out, "{}:", title);
    if incidents.is_empty() {
        let _ = writeln!(out, "  OK");
        return;
    }
    for incident in incidents {
        let _ = writeln!(
            out,
            "  [{}] {}",
            incident.severity,
            incident.details.summary()
        );
        if let Some(text) = extra(incident) {
            out.push_str(&text);
        }
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("      {}\n", l)).collect()
}

fn remediations(
    unavailable: bool,
    changed: bool,
    suspicious: bool,
    certificate: bool,
) -> Vec<&'static str> {
    let mut actions = Vec::new();
    if unavailable {
        actions.push("Check the web server, hosting status and network connectivity");
    }
    if changed {
        actions.push("Review recent edits and the server logs; restore from backup if the change is unexpected");
    }
    if suspicious {
        actions.push("Scan the site for malware and rotate administrator passwords");
    }
    if certificate {
        actions.push("Renew or repair the TLS certificate");
    }
    actions
}
