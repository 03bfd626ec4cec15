//! Generic JSON webhook channel

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationError, Notifier};
use crate::config::WebhookSettings;

/// POSTs `{"subject": .., "body": ..}` to a URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    pub fn from_settings(settings: &WebhookSettings) -> Self {
        Self {
            client: Client::new(),
            url: settings.url.clone(),
            bearer_token: settings.bearer_token.clone(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { subject, body });

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_json_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/alerts"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_json(json!({"subject": "All clear", "body": "nothing to report"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::from_settings(&WebhookSettings {
            url: format!("{}/hooks/alerts", server.uri()),
            bearer_token: Some("s3cret".into()),
        });
        notifier.send("All clear", "nothing to report").await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::from_settings(&WebhookSettings {
            url: server.uri(),
            bearer_token: None,
        });
        assert!(matches!(
            notifier.send("s", "b").await,
            Err(NotificationError::Rejected { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let notifier = WebhookNotifier::from_settings(&WebhookSettings {
            url: "http://127.0.0.1:9/hook".into(),
            bearer_token: None,
        });
        assert!(matches!(
            notifier.send("s", "b").await,
            Err(NotificationError::Transport(_))
        ));
    }
}
