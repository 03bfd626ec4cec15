//! Cycle history, used for availability statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{get_json, put_json, KvStore, PersistenceError};

/// Store key of the cycle history
pub const HISTORY_KEY: &str = "cycle_history.json";

/// Most recent cycles kept
pub const HISTORY_CAP: usize = 500;

/// Compact record of one finished cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub at: DateTime<Utc>,
    pub resources_checked: usize,
    pub resources_unavailable: usize,
    pub incidents: usize,
}

impl CycleRecord {
    /// Whether every resource answered with a 2xx
    pub fn fully_available(&self) -> bool {
        self.resources_unavailable == 0
    }
}

/// Every retained record, oldest first; empty when unreadable
pub fn load_history(store: &dyn KvStore) -> Vec<CycleRecord> {
    match get_json::<Vec<CycleRecord>>(store, HISTORY_KEY) {
        Ok(records) => records.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read cycle history");
            Vec::new()
        }
    }
}

/// Append a record, keeping at most [`HISTORY_CAP`]
pub fn append_history(store: &dyn KvStore, record: CycleRecord) -> Result<(), PersistenceError> {
    let mut records = load_history(store);
    records.push(record);
    if records.len() > HISTORY_CAP {
        records.drain(..records.len() - HISTORY_CAP);
    }
    put_json(store, HISTORY_KEY, &records)
}
