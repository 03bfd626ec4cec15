//! Notification channels
//!
//! Every channel implements [`Notifier`]: deliver a subject and a plain-text
//! body, succeed only on confirmed delivery. [`MultiNotifier`] fans one alert
//! out to every configured channel.

mod email;
mod webhook;
mod whatsapp;

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;
pub use whatsapp::WhatsAppNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NotificationSettings;

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotificationError {
    /// No channel is configured
    #[error("No notification channel configured")]
    NotConfigured,

    /// Network or protocol failure talking to the channel
    #[error("Transport error: {0}")]
    Transport(String),

    /// Channel answered but refused the message
    #[error("Channel rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Channel settings are unusable
    #[error("Invalid channel configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}

/// A channel able to deliver `(subject, body)` messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name, for logs
    fn name(&self) -> &str;

    /// Deliver one message; `Ok` only on confirmed delivery
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError>;
}

/// Fans a message out to several channels
#[derive(Default)]
pub struct MultiNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Build every channel present in the settings
    pub fn from_settings(settings: &NotificationSettings) -> Result<Self, NotificationError> {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();

        if let Some(email) = &settings.email {
            channels.push(Arc::new(EmailNotifier::from_settings(email)?));
        }
        if let Some(whatsapp) = &settings.whatsapp {
            channels.push(Arc::new(WhatsAppNotifier::from_settings(whatsapp)));
        }
        if let Some(webhook) = &settings.webhook {
            channels.push(Arc::new(WebhookNotifier::from_settings(webhook)));
        }

        Ok(Self { channels })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    fn name(&self) -> &str {
        "multi"
    }

    /// Succeeds when at least one channel delivered the message
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        if self.channels.is_empty() {
            return Err(NotificationError::NotConfigured);
        }

        let mut delivered = 0usize;
        let mut last_error = None;

        for channel in &self.channels {
            match channel.send(subject, body).await {
                Ok(()) => {
                    tracing::debug!(channel = channel.name(), "Notification delivered");
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(channel = channel.name(), error = %e, "Notification failed");
                    last_error = Some(e);
                }
            }
        }

        match (delivered, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every message and fails on demand
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            let notifier = Self::default();
            notifier.set_failing(true);
            notifier
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(NotificationError::Transport("connection refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}
