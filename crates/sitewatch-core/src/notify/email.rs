//! SMTP channel

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationError, Notifier};
use crate::config::EmailSettings;

/// Plain-text mail over SMTP with STARTTLS
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, NotificationError> {
        let from_addr = settings.from.as_deref().unwrap_or(&settings.username);
        let from: Mailbox = from_addr.parse().map_err(|e| {
            NotificationError::InvalidConfiguration(format!("sender '{}': {}", from_addr, e))
        })?;
        let to: Mailbox = settings.to.parse().map_err(|e| {
            NotificationError::InvalidConfiguration(format!("recipient '{}': {}", settings.to, e))
        })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_server)
            .map_err(|e| NotificationError::InvalidConfiguration(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self { transport, from, to })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message, NotificationError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotificationError::InvalidConfiguration(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let message = self.message(subject, body)?;

        // Negative SMTP replies surface as errors from the transport.
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(())
    }
}
