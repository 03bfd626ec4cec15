//! Capped, append-only incident log

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use super::Incident;
use crate::store::{get_json, put_json, KvStore, PersistenceError};

/// Store key of the persisted log
pub const INCIDENTS_KEY: &str = "incidents.json";

/// Append-only log truncated to the most recent `cap` entries
pub struct IncidentLog {
    store: Arc<dyn KvStore>,
    cap: usize,
    lock: Mutex<()>,
}

impl IncidentLog {
    pub fn new(store: Arc<dyn KvStore>, cap: usize) -> Self {
        Self {
            store,
            cap: cap.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Stamp `incident` with the current time and append it
    pub fn append(&self, incident: Incident) -> Result<Incident, PersistenceError> {
        self.append_at(incident, Utc::now())
    }

    /// [`append`](Self::append) with an explicit timestamp
    pub fn append_at(
        &self,
        mut incident: Incident,
        now: DateTime<Utc>,
    ) -> Result<Incident, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;

        incident.timestamp = now;

        let mut entries = match self.read() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Incident log unreadable, starting a new one");
                Vec::new()
            }
        };

        entries.push(incident.clone());
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            entries.drain(..excess);
        }

        put_json(self.store.as_ref(), INCIDENTS_KEY, &entries)?;

        tracing::info!(
            incident_type = %incident.incident_type(),
            severity = %incident.severity,
            "Incident recorded"
        );

        Ok(incident)
    }

    /// Last `n` incidents, oldest first. Empty when the log is unreadable.
    pub fn load_recent(&self, n: usize) -> Vec<Incident> {
        let mut entries = self.load_all();
        if entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        entries
    }

    /// Incidents recorded at or after `cutoff`, oldest first
    pub fn load_since(&self, cutoff: DateTime<Utc>) -> Vec<Incident> {
        self.load_all()
            .into_iter()
            .filter(|i| i.timestamp >= cutoff)
            .collect()
    }

    /// Every retained incident, oldest first
    pub fn load_all(&self) -> Vec<Incident> {
        self.read().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read incident log");
            Vec::new()
        })
    }

    fn read(&self) -> Result<Vec<Incident>, PersistenceError> {
        Ok(get_json(self.store.as_ref(), INCIDENTS_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::IncidentType;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn unavailable(resource: &str) -> Incident {
        Incident::site_unavailable(resource, "https://example.org", Some(500), None)
    }

    fn resource_of(incident: &Incident) -> String {
        match &incident.details {
            crate::incident::IncidentDetails::SiteUnavailable { resource, .. } => resource.clone(),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_append_assigns_timestamp() {
        let log = IncidentLog::new(Arc::new(MemoryStore::new()), 100);
        let at = Utc::now() - chrono::Duration::minutes(5);
        let stored = log.append_at(unavailable("homepage"), at).unwrap();

        assert_eq!(stored.timestamp, at);
        assert_eq!(log.load_all(), vec![stored]);
    }

    #[test]
    fn test_load_recent_keeps_insertion_order() {
        let log = IncidentLog::new(Arc::new(MemoryStore::new()), 100);
        for name in ["a", "b", "c", "d"] {
            log.append(unavailable(name)).unwrap();
        }

        let recent: Vec<_> = log.load_recent(2).iter().map(resource_of).collect();
        assert_eq!(recent, vec!["c", "d"]);
        assert_eq!(log.load_recent(10).len(), 4);
        assert!(log.load_recent(0).is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let log = IncidentLog::new(Arc::new(MemoryStore::new()), 3);
        for i in 0..5 {
            log.append(unavailable(&format!("r{}", i))).unwrap();
        }

        let names: Vec<_> = log.load_all().iter().map(resource_of).collect();
        assert_eq!(names, vec!["r2", "r3", "r4"]);
    }

    #[test]
    fn test_corrupt_log_reads_empty_and_recovers() {
        let store = Arc::new(MemoryStore::new());
        store.put(INCIDENTS_KEY, b"[{broken").unwrap();

        let log = IncidentLog::new(store, 100);
        assert!(log.load_recent(10).is_empty());

        log.append(Incident::ssl_error("example.org", "handshake")).unwrap();
        let all = log.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].incident_type(), IncidentType::SslError);
    }

    #[test]
    fn test_load_since() {
        let log = IncidentLog::new(Arc::new(MemoryStore::new()), 100);
        let now = Utc::now();
        log.append_at(unavailable("old"), now - chrono::Duration::days(10)).unwrap();
        log.append_at(unavailable("new"), now - chrono::Duration::days(1)).unwrap();

        let since: Vec<_> = log
            .load_since(now - chrono::Duration::days(7))
            .iter()
            .map(resource_of)
            .collect();
        assert_eq!(since, vec!["new"]);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_cap(cap in 1usize..20, appends in 0usize..60) {
            let log = IncidentLog::new(Arc::new(MemoryStore::new()), cap);
            for i in 0..appends {
                log.append(unavailable(&format!("r{}", i))).unwrap();
            }

            let all = log.load_all();
            prop_assert_eq!(all.len(), appends.min(cap));
            if appends > 0 {
                prop_assert_eq!(resource_of(&all[all.len() - 1]), format!("r{}", appends - 1));
            }
        }
    }
}
