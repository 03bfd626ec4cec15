//! WhatsApp channel via the Twilio Messages API

use async_trait::async_trait;
use reqwest::Client;

use super::{NotificationError, Notifier};
use crate::config::WhatsAppSettings;

/// Twilio refuses message bodies longer than this
const MAX_BODY_CHARS: usize = 1600;

pub struct WhatsAppNotifier {
    client: Client,
    settings: WhatsAppSettings,
}

impl WhatsAppNotifier {
    pub fn from_settings(settings: &WhatsAppSettings) -> Self {
        Self {
            client: Client::new(),
            settings: settings.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

fn message_text(subject: &str, body: &str) -> String {
    let text = format!("{}\n\n{}", subject, body);
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let form = [
            ("From", whatsapp_address(&self.settings.from)),
            ("To", whatsapp_address(&self.settings.to)),
            ("Body", message_text(subject, body)),
        ];

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
