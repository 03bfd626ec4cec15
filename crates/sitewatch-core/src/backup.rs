//! Content snapshots and restore
//!
//! `backup_all` fetches every resource and writes its body to
//! `<resource>_<YYYYmmdd_HHMMSS>.<ext>` in the backup directory, next to a
//! `<file>.meta.json` carrying the SHA-256 of the payload, plus one
//! `backup_report_<ts>.json` per run. Restore copies payloads into the
//! restore directory and checks them against their metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::{MonitorConfig, ResourceConfig};
use crate::fetcher::Fetcher;
use crate::hasher::fingerprint_bytes;

const META_SUFFIX: &str = ".meta.json";
const REPORT_PREFIX: &str = "backup_report_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Backup and restore errors
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backup directory holds no payload
    #[error("No backups found in {0}")]
    NoBackups(String),

    /// No payload for the requested resource
    #[error("No backup found for resource '{0}'")]
    ResourceNotFound(String),
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

/// Sidecar written next to every payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub url: String,
    pub date: DateTime<Utc>,
    /// SHA-256 of the payload bytes
    pub hash: String,
    /// Payload size in bytes
    pub size: usize,
    pub resource: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// At least one resource was saved
    Completed,
    Failed,
}

/// Summary of one backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    pub date: DateTime<Utc>,
    pub site_url: String,
    pub total_endpoints: usize,
    pub successful_backups: usize,
    pub status: BackupStatus,
    pub files: Vec<String>,
}

/// Integrity check result of a restored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Mismatch { expected: String, actual: String },
    /// Metadata missing or unreadable
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub file: String,
    pub destination: PathBuf,
    pub verification: Verification,
}

/// A payload file found in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub filename: String,
    pub resource: String,
    /// `YYYYmmdd_HHMMSS` part of the file name
    pub stamp: String,
}

pub struct BackupManager {
    backup_dir: PathBuf,
    restore_dir: PathBuf,
    site_url: String,
}

impl BackupManager {
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        restore_dir: impl Into<PathBuf>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            restore_dir: restore_dir.into(),
            site_url: site_url.into(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(&config.backup_dir, &config.restore_dir, &config.site_url)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot every resource; per-resource failures are counted, not raised
    pub async fn backup_all(
        &self,
        fetcher: &dyn Fetcher,
        resources: &[ResourceConfig],
        timeout: Duration,
    ) -> Result<BackupReport, BackupError> {
        self.backup_all_at(fetcher, resources, timeout, Utc::now()).await
    }

    pub async fn backup_all_at(
        &self,
        fetcher: &dyn Fetcher,
        resources: &[ResourceConfig],
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<BackupReport, BackupError> {
        fs::create_dir_all(&self.backup_dir)?;
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut files = Vec::new();

        for resource in resources {
            let body = match fetcher.fetch(&resource.url, timeout).await {
                Ok(response) if response.is_success() => response.body,
                Ok(response) => {
                    tracing::warn!(
                        resource = %resource.name,
                        status = response.status_code,
                        "Backup skipped, non-success status"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(resource = %resource.name, error = %e, "Backup skipped, fetch failed");
                    continue;
                }
            };

            match self.save(resource, &body, &stamp, now) {
                Ok(filename) => {
                    tracing::info!(resource = %resource.name, file = %filename, "Backup saved");
                    files.push(filename);
                }
                Err(e) => {
                    tracing::error!(resource = %resource.name, error = %e, "Failed to save backup");
                }
            }
        }

        let report = BackupReport {
            date: now,
            site_url: self.site_url.clone(),
            total_endpoints: resources.len(),
            successful_backups: files.len(),
            status: if files.is_empty() {
                BackupStatus::Failed
            } else {
                BackupStatus::Completed
            },
            files,
        };

        let report_path = self
            .backup_dir
            .join(format!("{}{}.json", REPORT_PREFIX, stamp));
        fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;

        tracing::info!(
            successful = report.successful_backups,
            total = report.total_endpoints,
            "Backup run finished"
        );
        Ok(report)
    }

    fn save(
        &self,
        resource: &ResourceConfig,
        body: &str,
        stamp: &str,
        now: DateTime<Utc>,
    ) -> Result<String, BackupError> {
        let filename = format!("{}_{}.{}", resource.name, stamp, resource.extension);
        let path = self.backup_dir.join(&filename);
        fs::write(&path, body.as_bytes())?;

        let metadata = BackupMetadata {
            url: resource.url.clone(),
            date: now,
            hash: fingerprint_bytes(body.as_bytes()),
            size: body.len(),
            resource: resource.name.clone(),
            filename: filename.clone(),
        };
        fs::write(meta_path(&path), serde_json::to_vec_pretty(&metadata)?)?;

        Ok(filename)
    }

    /// Payload files in the backup directory, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>, BackupError> {
        let dir = match fs::read_dir(&self.backup_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = item?;
            if !item.file_type()?.is_file() {
                continue;
            }
            let filename = item.file_name().to_string_lossy().into_owned();
            if let Some((resource, stamp)) = parse_payload_name(&filename) {
                entries.push(BackupEntry {
                    path: item.path(),
                    filename,
                    resource,
                    stamp,
                });
            }
        }

        entries.sort_by(|a, b| a.stamp.cmp(&b.stamp).then_with(|| a.filename.cmp(&b.filename)));
        Ok(entries)
    }

    /// Restore every payload
    pub fn restore_all(&self) -> Result<Vec<RestoreOutcome>, BackupError> {
        let entries = self.list_backups()?;
        if entries.is_empty() {
            return Err(BackupError::NoBackups(self.backup_dir.display().to_string()));
        }

        fs::create_dir_all(&self.restore_dir)?;
        entries.iter().map(|e| self.restore_entry(e)).collect()
    }

    /// Restore the newest payload of one resource
    pub fn restore_latest(&self, resource: &str) -> Result<RestoreOutcome, BackupError> {
        let entries = self.list_backups()?;
        if entries.is_empty() {
            return Err(BackupError::NoBackups(self.backup_dir.display().to_string()));
        }

        let latest = entries
            .iter()
            .filter(|e| e.resource == resource)
            .last()
            .ok_or_else(|| BackupError::ResourceNotFound(resource.to_string()))?;

        fs::create_dir_all(&self.restore_dir)?;
        self.restore_entry(latest)
    }

    fn restore_entry(&self, entry: &BackupEntry) -> Result<RestoreOutcome, BackupError> {
        let bytes = fs::read(&entry.path)?;
        let destination = self.restore_dir.join(&entry.filename);
        fs::write(&destination, &bytes)?;

        let verification = match read_metadata(&entry.path) {
            Some(meta) => {
                let actual = fingerprint_bytes(&bytes);
                if actual == meta.hash {
                    Verification::Verified
                } else {
                    Verification::Mismatch {
                        expected: meta.hash,
                        actual,
                    }
                }
            }
            None => Verification::Unverified,
        };

        match &verification {
            Verification::Verified => {
                tracing::info!(file = %entry.filename, "Restored and verified")
            }
            Verification::Mismatch { .. } => {
                tracing::error!(file = %entry.filename, "Restored file does not match its metadata hash")
            }
            Verification::Unverified => {
                tracing::warn!(file = %entry.filename, "Restored without metadata")
            }
        }

        Ok(RestoreOutcome {
            file: entry.filename.clone(),
            destination,
            verification,
        })
    }
}

fn meta_path(payload: &Path) -> PathBuf {
    let mut name = payload.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

fn read_metadata(payload: &Path) -> Option<BackupMetadata> {
    let raw = fs::read(meta_path(payload)).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(file = %payload.display(), error = %e, "Unreadable backup metadata");
            None
        }
    }
}

/// `(resource, stamp)` of a payload file name, `None` for metadata, reports
/// and foreign files
fn parse_payload_name(filename: &str) -> Option<(String, String)> {
    if filename.ends_with(META_SUFFIX) || filename.starts_with(REPORT_PREFIX) {
        return None;
    }

    let (stem, _extension) = filename.rsplit_once('.')?;
    let mut parts = stem.rsplitn(3, '_');
    let time = parts.next()?;
    let date = parts.next()?;
    let resource = parts.next()?;

    let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    if resource.is_empty() || !digits(date, 8) || !digits(time, 6) {
        return None;
    }

    Some((resource.to_string(), format!("{}_{}", date, time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchError, FetchResponse};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            if url.ends_with("/feed/") {
                Ok(FetchResponse::new(200, "<rss/>"))
            } else if url.ends_with("/comments/feed/") {
                Err(FetchError::Timeout)
            } else {
                Ok(FetchResponse::new(200, "<html>home</html>"))
            }
        }
    }

    fn resources() -> Vec<ResourceConfig> {
        let mut config = MonitorConfig::default();
        config.site_url = "https://example.org".into();
        config.effective_resources()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_parse_payload_name() {
        assert_eq!(
            parse_payload_name("homepage_20240301_103000.html"),
            Some(("homepage".into(), "20240301_103000".into()))
        );
        assert_eq!(
            parse_payload_name("my_feed_20240301_103000.xml"),
            Some(("my_feed".into(), "20240301_103000".into()))
        );
        assert_eq!(parse_payload_name("homepage_20240301_103000.html.meta.json"), None);
        assert_eq!(parse_payload_name("backup_report_20240301_103000.json"), None);
        assert_eq!(parse_payload_name("notes.txt"), None);
    }

    #[tokio::test]
    async fn test_backup_writes_payloads_metadata_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("b"), dir.path().join("r"), "https://example.org");

        let report = manager
            .backup_all_at(&StaticFetcher, &resources(), Duration::from_secs(1), at(10))
            .await
            .unwrap();

        assert_eq!(report.total_endpoints, 3);
        assert_eq!(report.successful_backups, 2);
        assert_eq!(report.status, BackupStatus::Completed);
        assert_eq!(
            report.files,
            vec!["homepage_20240301_103000.html", "rss_20240301_103000.xml"]
        );

        let payload = manager.backup_dir().join("homepage_20240301_103000.html");
        assert_eq!(fs::read_to_string(&payload).unwrap(), "<html>home</html>");

        let meta = read_metadata(&payload).unwrap();
        assert_eq!(meta.hash, fingerprint_bytes(b"<html>home</html>"));
        assert_eq!(meta.size, 17);
        assert_eq!(meta.resource, "homepage");

        assert!(manager
            .backup_dir()
            .join("backup_report_20240301_103000.json")
            .exists());
    }

    #[tokio::test]
    async fn test_restore_verifies_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("b"), dir.path().join("r"), "https://example.org");
        manager
            .backup_all_at(&StaticFetcher, &resources(), Duration::from_secs(1), at(10))
            .await
            .unwrap();

        // Tamper with one payload and orphan another.
        fs::write(manager.backup_dir().join("rss_20240301_103000.xml"), "<rss>evil</rss>").unwrap();
        fs::write(manager.backup_dir().join("extra_20240301_090000.html"), "x").unwrap();

        let outcomes = manager.restore_all().unwrap();
        assert_eq!(outcomes.len(), 3);

        let by_file = |name: &str| {
            outcomes
                .iter()
                .find(|o| o.file == name)
                .map(|o| o.verification.clone())
                .unwrap()
        };
        assert_eq!(by_file("homepage_20240301_103000.html"), Verification::Verified);
        assert!(matches!(by_file("rss_20240301_103000.xml"), Verification::Mismatch { .. }));
        assert_eq!(by_file("extra_20240301_090000.html"), Verification::Unverified);

        assert!(dir.path().join("r/homepage_20240301_103000.html").exists());
    }

    #[tokio::test]
    async fn test_restore_latest_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("b"), dir.path().join("r"), "https://example.org");
        for hour in [9, 11, 10] {
            manager
                .backup_all_at(&StaticFetcher, &resources(), Duration::from_secs(1), at(hour))
                .await
                .unwrap();
        }

        let outcome = manager.restore_latest("homepage").unwrap();
        assert_eq!(outcome.file, "homepage_20240301_113000.html");
        assert_eq!(outcome.verification, Verification::Verified);

        assert!(matches!(
            manager.restore_latest("comments"),
            Err(BackupError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_restore_without_backups() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path().join("missing"), dir.path().join("r"), "x");
        assert!(matches!(manager.restore_all(), Err(BackupError::NoBackups(_))));
    }
}
