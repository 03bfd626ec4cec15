//! Change detection
//!
//! Per resource the detector is either *Unseen* (no fingerprint record) or
//! *Tracked*. The first observation only establishes a baseline. Later
//! observations are compared by fingerprint; on mismatch a unified line diff
//! against the previously stored body is produced and bounded in length.
//!
//! The fingerprint record and the raw body it was computed from are persisted
//! together under one key, so a failed write leaves the previous state whole.

mod patterns;

pub use patterns::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::sync::{Arc, Mutex};

use crate::hasher::fingerprint;
use crate::store::{get_json, put_json, KvStore, PersistenceError};

/// Lines of context around each diff hunk
const DIFF_CONTEXT_LINES: usize = 3;

/// Persisted fingerprint of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Content hash (lowercase hex)
    pub hash: String,

    /// Last successful observation
    pub last_seen: DateTime<Utc>,
}

/// Stored state of a tracked resource
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackedResource {
    #[serde(flatten)]
    record: FingerprintRecord,

    /// Body the fingerprint was computed from
    #[serde(default)]
    body: String,
}

/// Details of a detected content change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// Unified diff, at most `max_diff_chars` characters
    pub diff: String,

    /// Whether the diff was cut to fit the bound
    pub truncated: bool,

    pub previous_fingerprint: String,
    pub current_fingerprint: String,
}

/// Outcome of checking a fetched body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeResult {
    /// First observation of the resource
    Baseline,
    /// Same fingerprint as last time
    Unchanged,
    /// Fingerprint differs from last time
    Changed(ContentChange),
}

impl ChangeResult {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeResult::Changed(_))
    }
}

/// Fingerprint-based change detector
pub struct ChangeDetector {
    store: Arc<dyn KvStore>,
    max_diff_chars: usize,
    // Serialises read-modify-write of resource state.
    write_lock: Mutex<()>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn KvStore>, max_diff_chars: usize) -> Self {
        Self {
            store,
            max_diff_chars,
            write_lock: Mutex::new(()),
        }
    }

    /// Compare `fetched_body` against the last known state of `resource`
    pub fn check(&self, resource: &str, fetched_body: &str) -> Result<ChangeResult, PersistenceError> {
        self.check_at(resource, fetched_body, Utc::now())
    }

    /// [`check`](Self::check) with an explicit observation time
    pub fn check_at(
        &self,
        resource: &str,
        fetched_body: &str,
        now: DateTime<Utc>,
    ) -> Result<ChangeResult, PersistenceError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?;

        let new_fp = fingerprint(fetched_body);
        let previous = self.state(resource)?;

        let result = match previous {
            None => {
                tracing::info!(resource, fingerprint = %new_fp, "Baseline established");
                ChangeResult::Baseline
            }
            Some(state) if state.record.hash == new_fp => ChangeResult::Unchanged,
            Some(state) => {
                let (diff, truncated) =
                    bounded_diff(&state.body, fetched_body, self.max_diff_chars);

                tracing::warn!(
                    resource,
                    previous = %state.record.hash,
                    current = %new_fp,
                    truncated,
                    "Content changed"
                );

                ChangeResult::Changed(ContentChange {
                    diff,
                    truncated,
                    previous_fingerprint: state.record.hash,
                    current_fingerprint: new_fp.clone(),
                })
            }
        };

        put_json(
            self.store.as_ref(),
            &state_key(resource),
            &TrackedResource {
                record: FingerprintRecord {
                    hash: new_fp,
                    last_seen: now,
                },
                body: fetched_body.to_string(),
            },
        )?;

        Ok(result)
    }

    /// Current fingerprint record of a resource, if tracked
    pub fn record(&self, resource: &str) -> Result<Option<FingerprintRecord>, PersistenceError> {
        Ok(self.state(resource)?.map(|state| state.record))
    }

    /// Last stored body of a resource, if tracked
    pub fn body(&self, resource: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.state(resource)?.map(|state| state.body))
    }

    fn state(&self, resource: &str) -> Result<Option<TrackedResource>, PersistenceError> {
        get_json(self.store.as_ref(), &state_key(resource))
    }
}

fn state_key(resource: &str) -> String {
    format!("fingerprints/{}.json", resource)
}

/// Unified line diff of `old` → `new`, cut to at most `max_chars` characters
pub fn bounded_diff(old: &str, new: &str, max_chars: usize) -> (String, bool) {
    let diff = TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header("previous", "current")
        .to_string();

    truncate_chars(diff, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text, false),
    }
}
