//! Sitewatch core
//!
//! Content-integrity change detection and alerting for a single monitored
//! website. One monitoring cycle fetches every configured resource, compares
//! its fingerprint against the last known one, scans it for suspicious code,
//! records incidents in a bounded log and sends at most one consolidated,
//! deduplicated alert.
//!
//! # Components
//! - [`hasher`]: stable SHA-256 content fingerprints
//! - [`fetcher`]: HTTP GET adapter (status + body, or a typed error)
//! - [`store`]: durable key-value persistence
//! - [`detector`]: per-resource change detection and pattern scanning
//! - [`incident`]: append-only, size-capped incident log
//! - [`alert`]: cooldown-based alert dispatcher
//! - [`notify`]: email, WhatsApp and webhook notification channels
//! - [`tls`]: certificate expiry probe
//! - [`monitor`]: the cycle orchestrator
//! - [`backup`]: content snapshots and restore
//! - [`report`]: incident reporting over a time window
//!
//! Scheduling, CLI parsing and HTTP surfaces live in the agent crate.

pub mod alert;
pub mod backup;
pub mod config;
pub mod detector;
pub mod error;
pub mod fetcher;
pub mod hasher;
pub mod incident;
pub mod monitor;
pub mod notify;
pub mod report;
pub mod store;
pub mod tls;

pub use alert::AlertDispatcher;
pub use backup::{BackupManager, BackupReport, RestoreOutcome, Verification};
pub use config::{MonitorConfig, ResourceConfig};
pub use detector::{ChangeDetector, ChangeResult, ContentChange, PatternMatch};
pub use error::{MonitorError, Result};
pub use fetcher::{FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use hasher::fingerprint;
pub use incident::{Incident, IncidentDetails, IncidentLog, IncidentType, Severity};
pub use monitor::{CycleRecord, CycleSummary, Monitor};
pub use notify::{MultiNotifier, NotificationError, Notifier};
pub use report::IncidentReport;
pub use store::{FileStore, KvStore, MemoryStore, PersistenceError};
