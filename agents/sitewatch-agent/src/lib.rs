//! Sitewatch agent
//!
//! Operational surface for the sitewatch monitor:
//!
//! - `cli` - one-shot commands (check, backup, restore, report, prune) and
//!   long-running modes (run, serve)
//! - `scheduler` - fixed-interval cycle loop with graceful shutdown
//! - `handler` - HTTP status, metrics and manual trigger endpoints
//! - `telemetry` - tracing setup and Prometheus metrics

pub mod cli;
pub mod error;
pub mod handler;
pub mod scheduler;
pub mod telemetry;

pub use error::AgentError;
pub use scheduler::{Scheduler, SchedulerStats};
