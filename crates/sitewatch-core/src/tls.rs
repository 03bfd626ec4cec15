//! TLS certificate expiry probe

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::incident::Incident;

/// Certificate probe errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Invalid host name: {0}")]
    InvalidHost(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    /// Handshake failed, including certificate verification failures
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("Server presented no certificate")]
    NoCertificate,

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Certificate probe timed out")]
    Timeout,
}

/// Leaf certificate validity as seen by the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub hostname: String,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

impl CertificateInfo {
    pub fn new(hostname: impl Into<String>, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            hostname: hostname.into(),
            expires_at,
            days_remaining: (expires_at - now).num_days(),
        }
    }
}

/// Reads the certificate a host serves
#[async_trait]
pub trait CertificateProbe: Send + Sync {
    async fn probe(&self, hostname: &str, port: u16) -> Result<CertificateInfo, CertificateError>;
}

/// Turn a probe outcome into an incident, if any
pub fn evaluate(
    hostname: &str,
    outcome: Result<CertificateInfo, CertificateError>,
    warning_days: i64,
) -> Option<Incident> {
    match outcome {
        Ok(info) if info.days_remaining < warning_days => Some(Incident::ssl_expiring(
            &info.hostname,
            info.expires_at,
            info.days_remaining,
        )),
        Ok(_) => None,
        Err(e) => Some(Incident::ssl_error(hostname, e.to_string())),
    }
}

/// Probe over a verified rustls handshake against the platform roots
pub struct TlsCertificateProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsCertificateProbe {
    pub fn new(timeout: Duration) -> Result<Self, CertificateError> {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            tracing::debug!(error = %error, "Skipping unreadable native certificate");
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "Loaded native root certificates");

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| CertificateError::Handshake(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }

    async fn probe_inner(
        &self,
        hostname: &str,
        port: u16,
    ) -> Result<CertificateInfo, CertificateError> {
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| CertificateError::InvalidHost(hostname.to_string()))?;

        let tcp = TcpStream::connect((hostname, port))
            .await
            .map_err(|e| CertificateError::Connect(e.to_string()))?;

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| CertificateError::Handshake(e.to_string()))?;

        let (_, connection) = tls.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(CertificateError::NoCertificate)?;

        let expires_at = not_after(leaf.as_ref())?;
        Ok(CertificateInfo::new(hostname, expires_at, Utc::now()))
    }
}

#[async_trait]
impl CertificateProbe for TlsCertificateProbe {
    async fn probe(&self, hostname: &str, port: u16) -> Result<CertificateInfo, CertificateError> {
        match tokio::time::timeout(self.timeout, self.probe_inner(hostname, port)).await {
            Ok(result) => result,
            Err(_) => Err(CertificateError::Timeout),
        }
    }
}

/// `notAfter` of a DER-encoded certificate
pub fn not_after(der: &[u8]) -> Result<DateTime<Utc>, CertificateError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| CertificateError::Parse(e.to_string()))?;
    let timestamp = cert.validity().not_after.timestamp();
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| CertificateError::Parse(format!("timestamp out of range: {}", timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{IncidentDetails, IncidentType, Severity};

    fn info(days: i64) -> CertificateInfo {
        let now = Utc::now();
        CertificateInfo::new("example.org", now + chrono::Duration::days(days) + chrono::Duration::hours(1), now)
    }

    #[test]
    fn test_days_remaining() {
        assert_eq!(info(30).days_remaining, 30);
        assert_eq!(info(0).days_remaining, 0);
    }

    #[test]
    fn test_expiring_soon_is_medium() {
        let incident = evaluate("example.org", Ok(info(3)), 7).unwrap();
        assert_eq!(incident.incident_type(), IncidentType::SslExpiring);
        assert_eq!(incident.severity, Severity::Medium);
        match incident.details {
            IncidentDetails::SslExpiring { days_remaining, .. } => assert_eq!(days_remaining, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(evaluate("example.org", Ok(info(7)), 7).is_none());
        assert!(evaluate("example.org", Ok(info(6)), 7).is_some());
    }

    #[test]
    fn test_probe_failure_is_high() {
        let incident = evaluate("example.org", Err(CertificateError::Timeout), 7).unwrap();
        assert_eq!(incident.incident_type(), IncidentType::SslError);
        assert_eq!(incident.severity, Severity::High);
    }

    #[test]
    fn test_garbage_der_is_parse_error() {
        assert!(matches!(not_after(b"not a certificate"), Err(CertificateError::Parse(_))));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let probe = TlsCertificateProbe::new(Duration::from_secs(2)).unwrap();
        let result = probe.probe("127.0.0.1", 9).await;
        assert!(result.is_err());
    }
}
