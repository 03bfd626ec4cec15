//! Telemetry for the sitewatch agent
//!
//! - tracing subscriber setup (JSON by default, pretty for terminals)
//! - `metrics` - Prometheus metrics for monitoring cycles and alerts

pub mod metrics;

pub use metrics::SitewatchMetrics;

use clap::ValueEnum;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Log line format
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable multi-line output
    Pretty,
}

/// Filter directive for the verbosity flags; `None` defers to `RUST_LOG`
pub fn filter_directive(verbose: u8, quiet: bool) -> Option<&'static str> {
    if quiet {
        return Some("warn");
    }
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(verbose: u8, quiet: bool, format: LogFormat) {
    let directive = match filter_directive(verbose, quiet) {
        Some(level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    };

    let registry = tracing_subscriber::registry().with(EnvFilter::new(directive));
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(0, false), None);
        assert_eq!(filter_directive(1, false), Some("debug"));
        assert_eq!(filter_directive(3, false), Some("trace"));
        assert_eq!(filter_directive(2, true), Some("warn"));
    }

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }
}
