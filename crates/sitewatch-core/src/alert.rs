//! Alert dispatch with per-type cooldown
//!
//! The dispatcher remembers, per incident type, when the last alert was
//! successfully delivered and suppresses another alert of the same type
//! until the cooldown has elapsed. A failed delivery leaves the state as it
//! was, so the next cycle retries.
//!
//! The dispatcher never records incidents itself.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::incident::IncidentType;
use crate::notify::Notifier;
use crate::store::{get_json, put_json, KvStore, PersistenceError};

/// Store key of the dedup state
pub const ALERT_STATE_KEY: &str = "alert_state.json";

/// Incident type → unix seconds of the last delivered alert
pub type AlertState = BTreeMap<IncidentType, i64>;

pub struct AlertDispatcher {
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    // Held across the send so two dispatches of one type cannot interleave.
    lock: Mutex<()>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn KvStore>, notifier: Arc<dyn Notifier>, cooldown: Duration) -> Self {
        Self {
            store,
            notifier,
            cooldown,
            lock: Mutex::new(()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Send unless an alert of this type went out within the cooldown
    pub async fn maybe_send(&self, incident_type: IncidentType, subject: &str, body: &str) -> bool {
        self.maybe_send_at(incident_type, subject, body, Utc::now())
            .await
    }

    /// [`maybe_send`](Self::maybe_send) evaluated at `now`
    pub async fn maybe_send_at(
        &self,
        incident_type: IncidentType,
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let _guard = self.lock.lock().await;

        let mut state = self.state().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Alert state unreadable, treating as empty");
            AlertState::new()
        });

        let now_secs = now.timestamp();
        let cooldown = i64::try_from(self.cooldown.as_secs()).unwrap_or(i64::MAX);

        if let Some(&last) = state.get(&incident_type) {
            if now_secs.saturating_sub(last) <= cooldown {
                tracing::info!(
                    incident_type = %incident_type,
                    last_sent = last,
                    "Alert suppressed by cooldown"
                );
                return false;
            }
        }

        match self.notifier.send(subject, body).await {
            Ok(()) => {
                state.insert(incident_type, now_secs);
                if let Err(e) = put_json(self.store.as_ref(), ALERT_STATE_KEY, &state) {
                    tracing::warn!(error = %e, "Failed to persist alert state");
                }
                tracing::info!(incident_type = %incident_type, subject, "Alert sent");
                true
            }
            Err(e) => {
                tracing::error!(incident_type = %incident_type, error = %e, "Alert delivery failed");
                false
            }
        }
    }

    /// Persisted dedup state
    pub fn state(&self) -> Result<AlertState, PersistenceError> {
        Ok(get_json(self.store.as_ref(), ALERT_STATE_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemoryStore;

    fn dispatcher(notifier: Arc<RecordingNotifier>) -> AlertDispatcher {
        AlertDispatcher::new(
            Arc::new(MemoryStore::new()),
            notifier,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_then_allows() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(notifier.clone());
        let t0 = Utc::now();

        assert!(dispatcher.maybe_send_at(IncidentType::ContentChanged, "a", "b", t0).await);
        assert!(
            !dispatcher
                .maybe_send_at(IncidentType::ContentChanged, "a", "b", t0 + chrono::Duration::minutes(30))
                .await
        );
        assert_eq!(notifier.count(), 1);

        assert!(
            dispatcher
                .maybe_send_at(IncidentType::ContentChanged, "a", "b", t0 + chrono::Duration::seconds(3601))
                .await
        );
        assert_eq!(notifier.count(), 2);
    }

    #[tokio::test]
    async fn test_exact_cooldown_boundary_is_suppressed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(notifier.clone());
        let t0 = Utc::now();

        dispatcher.maybe_send_at(IncidentType::SslError, "a", "b", t0).await;
        assert!(
            !dispatcher
                .maybe_send_at(IncidentType::SslError, "a", "b", t0 + chrono::Duration::seconds(3600))
                .await
        );
    }

    #[tokio::test]
    async fn test_types_are_deduplicated_independently() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(notifier.clone());
        let t0 = Utc::now();

        assert!(dispatcher.maybe_send_at(IncidentType::SiteUnavailable, "a", "b", t0).await);
        assert!(dispatcher.maybe_send_at(IncidentType::Info, "a", "b", t0).await);
        assert_eq!(notifier.count(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_update_state() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let dispatcher = dispatcher(notifier.clone());
        let t0 = Utc::now();

        assert!(!dispatcher.maybe_send_at(IncidentType::SiteUnavailable, "a", "b", t0).await);
        assert!(dispatcher.state().unwrap().is_empty());

        notifier.set_failing(false);
        assert!(
            dispatcher
                .maybe_send_at(IncidentType::SiteUnavailable, "a", "b", t0 + chrono::Duration::seconds(1))
                .await
        );
        assert_eq!(
            dispatcher.state().unwrap().get(&IncidentType::SiteUnavailable),
            Some(&(t0 + chrono::Duration::seconds(1)).timestamp())
        );
    }

    #[tokio::test]
    async fn test_state_persists_as_type_names() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(60),
        );
        let t0 = Utc::now();
        dispatcher.maybe_send_at(IncidentType::ContentChanged, "a", "b", t0).await;

        let raw: serde_json::Value = get_json(store.as_ref(), ALERT_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["content_changed"], t0.timestamp());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.put(ALERT_STATE_KEY, b"garbage").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(store, notifier.clone(), Duration::from_secs(60));

        assert!(dispatcher.maybe_send(IncidentType::SslExpiring, "a", "b").await);
        assert_eq!(notifier.count(), 1);
    }
}
