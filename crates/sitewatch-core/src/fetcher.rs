//! Fetcher adapter
//!
//! Wraps an HTTP GET with timeout and user agent. A non-2xx status is not an
//! error at this layer: it is returned as a successful response carrying the
//! status code so the caller decides its severity.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::FetchSettings;

/// Fetch failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No response within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Anything else (TLS, decoding, invalid URL, ...)
    #[error("Fetch failed: {0}")]
    Other(String),
}

/// Response of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response body decoded as text
    pub body: String,

    /// Time until the body was fully read
    pub elapsed_ms: u64,
}

impl FetchResponse {
    /// Create a response (mostly useful for tests and fakes)
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            elapsed_ms: 0,
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Outbound GET capability
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL, failing after `timeout`
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// `reqwest`-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_count: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the given user agent and no retries
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_count: 1,
            retry_delay: Duration::ZERO,
        })
    }

    /// Create a fetcher from settings
    pub fn from_settings(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self::new(&settings.user_agent)?
            .with_retries(settings.retry_count, Duration::from_millis(settings.retry_delay_ms)))
    }

    /// Retry transport failures up to `attempts` attempts in total
    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_count = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(FetchResponse {
            status_code,
            body,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url, timeout).await {
                Ok(response) => {
                    tracing::debug!(url, attempt, status = response.status_code, "Fetched resource");
                    return Ok(response);
                }
                Err(e) if attempt < self.retry_count => {
                    tracing::warn!(url, attempt, error = %e, "Fetch attempt failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::ConnectionError(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/"))
            .and(header("user-agent", "sitewatch-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("sitewatch-test").unwrap();
        let response = fetcher
            .fetch(&format!("{}/feed/", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "<rss/>");
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("sitewatch-test").unwrap();
        let response = fetcher
            .fetch(&server.uri(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.status_code, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("sitewatch-test").unwrap();
        let err = fetcher
            .fetch(&server.uri(), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_connection_error() {
        let fetcher = HttpFetcher::new("sitewatch-test")
            .unwrap()
            .with_retries(2, Duration::from_millis(1));
        let err = fetcher
            .fetch("http://127.0.0.1:9/", Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::ConnectionError(_)));
    }

    #[test]
    fn test_success_range() {
        assert!(FetchResponse::new(204, "").is_success());
        assert!(!FetchResponse::new(301, "").is_success());
        assert!(!FetchResponse::new(404, "").is_success());
    }
}
