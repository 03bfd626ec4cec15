//! Incidents and the incident log
//!
//! An incident is an immutable record of something abnormal observed during
//! a cycle. The log is append-only and keeps only the most recent entries;
//! it is best-effort, so an unreadable log reads as empty instead of failing
//! the cycle.

mod log;

pub use log::{IncidentLog, INCIDENTS_KEY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Incident severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Incident type, also the key of alert deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    SiteUnavailable,
    ContentChanged,
    SuspiciousCode,
    SslExpiring,
    SslError,
    /// All-clear notifications; never stored in the log
    Info,
    /// Alerts about the monitor itself failing; never stored in the log
    SystemError,
}

impl IncidentType {
    /// Every type, in declaration order
    pub const ALL: [IncidentType; 7] = [
        IncidentType::SiteUnavailable,
        IncidentType::ContentChanged,
        IncidentType::SuspiciousCode,
        IncidentType::SslExpiring,
        IncidentType::SslError,
        IncidentType::Info,
        IncidentType::SystemError,
    ];

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::SiteUnavailable => "site_unavailable",
            IncidentType::ContentChanged => "content_changed",
            IncidentType::SuspiciousCode => "suspicious_code",
            IncidentType::SslExpiring => "ssl_expiring",
            IncidentType::SslError => "ssl_error",
            IncidentType::Info => "info",
            IncidentType::SystemError => "system_error",
        }
    }

    /// Rank used to pick the representative type of a cycle (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            IncidentType::SiteUnavailable => 4,
            IncidentType::SuspiciousCode => 3,
            IncidentType::ContentChanged => 2,
            IncidentType::SslError => 1,
            IncidentType::SslExpiring => 1,
            IncidentType::Info | IncidentType::SystemError => 0,
        }
    }

    /// Most representative type among `types`, `None` when empty
    pub fn most_severe<I>(types: I) -> Option<IncidentType>
    where
        I: IntoIterator<Item = IncidentType>,
    {
        // On equal rank the first occurrence wins.
        types.into_iter().fold(None, |best, t| match best {
            Some(b) if b.priority() >= t.priority() => Some(b),
            _ => Some(t),
        })
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown incident type: {}", s))
    }
}

/// Type-specific incident context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncidentDetails {
    SiteUnavailable {
        resource: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ContentChanged {
        resource: String,
        url: String,
        previous_fingerprint: String,
        current_fingerprint: String,
        diff: String,
        #[serde(default)]
        truncated: bool,
    },
    SuspiciousCode {
        resource: String,
        pattern: String,
        description: String,
        occurrences: usize,
    },
    SslExpiring {
        hostname: String,
        expires_at: DateTime<Utc>,
        days_remaining: i64,
    },
    SslError {
        hostname: String,
        error: String,
    },
}

impl IncidentDetails {
    pub fn incident_type(&self) -> IncidentType {
        match self {
            IncidentDetails::SiteUnavailable { .. } => IncidentType::SiteUnavailable,
            IncidentDetails::ContentChanged { .. } => IncidentType::ContentChanged,
            IncidentDetails::SuspiciousCode { .. } => IncidentType::SuspiciousCode,
            IncidentDetails::SslExpiring { .. } => IncidentType::SslExpiring,
            IncidentDetails::SslError { .. } => IncidentType::SslError,
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        match self {
            IncidentDetails::SiteUnavailable {
                resource,
                status_code: Some(code),
                ..
            } => format!("{} returned HTTP {}", resource, code),
            IncidentDetails::SiteUnavailable {
                resource, error, ..
            } => format!(
                "{} unreachable: {}",
                resource,
                error.as_deref().unwrap_or("unknown error")
            ),
            IncidentDetails::ContentChanged { resource, .. } => {
                format!("{} content changed", resource)
            }
            IncidentDetails::SuspiciousCode {
                resource,
                description,
                occurrences,
                ..
            } => format!("{}: {} found {} time(s)", resource, description, occurrences),
            IncidentDetails::SslExpiring {
                hostname,
                days_remaining,
                ..
            } => format!(
                "certificate for {} expires in {} day(s)",
                hostname, days_remaining
            ),
            IncidentDetails::SslError { hostname, error } => {
                format!("certificate check for {} failed: {}", hostname, error)
            }
        }
    }
}

/// A recorded abnormal observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Assigned when appended to the log
    pub timestamp: DateTime<Utc>,

    pub severity: Severity,

    #[serde(flatten)]
    pub details: IncidentDetails,
}

impl Incident {
    /// New incident stamped with the current time
    pub fn new(severity: Severity, details: IncidentDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            details,
        }
    }

    pub fn incident_type(&self) -> IncidentType {
        self.details.incident_type()
    }

    /// Fetch failure or non-2xx response
    pub fn site_unavailable(
        resource: &str,
        url: &str,
        status_code: Option<u16>,
        error: Option<String>,
    ) -> Self {
        Self::new(
            Severity::High,
            IncidentDetails::SiteUnavailable {
                resource: resource.to_string(),
                url: url.to_string(),
                status_code,
                error,
            },
        )
    }

    /// Resource content differs from the last observation
    pub fn content_changed(
        resource: &str,
        url: &str,
        change: &crate::detector::ContentChange,
    ) -> Self {
        Self::new(
            Severity::Medium,
            IncidentDetails::ContentChanged {
                resource: resource.to_string(),
                url: url.to_string(),
                previous_fingerprint: change.previous_fingerprint.clone(),
                current_fingerprint: change.current_fingerprint.clone(),
                diff: change.diff.clone(),
                truncated: change.truncated,
            },
        )
    }

    /// A suspicious pattern matched the resource body
    pub fn suspicious_code(resource: &str, found: &crate::detector::PatternMatch) -> Self {
        Self::new(
            found.severity,
            IncidentDetails::SuspiciousCode {
                resource: resource.to_string(),
                pattern: found.pattern.clone(),
                description: found.description.clone(),
                occurrences: found.occurrences,
            },
        )
    }

    /// Certificate close to expiry
    pub fn ssl_expiring(hostname: &str, expires_at: DateTime<Utc>, days_remaining: i64) -> Self {
        Self::new(
            Severity::Medium,
            IncidentDetails::SslExpiring {
                hostname: hostname.to_string(),
                expires_at,
                days_remaining,
            },
        )
    }

    /// Certificate could not be validated
    pub fn ssl_error(hostname: &str, error: impl Into<String>) -> Self {
        Self::new(
            Severity::High,
            IncidentDetails::SslError {
                hostname: hostname.to_string(),
                error: error.into(),
            },
        )
    }
}
