//! Monitor configuration
//!
//! A single [`MonitorConfig`] is built at startup (file, then environment
//! overrides), validated, and shared by reference with every component.
//!
//! # File formats
//!
//! Chosen by extension: `.toml`, `.yaml`/`.yml` or `.json`. Every field has a
//! default, so an empty file is a valid configuration.
//!
//! # Environment overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `SITEWATCH_SITE_URL` | `site_url` |
//! | `SITEWATCH_DATA_DIR` | `data_dir` |
//! | `SITEWATCH_BACKUP_DIR` | `backup_dir` |
//! | `SITEWATCH_CHECK_INTERVAL_SECS` | `schedule.interval_secs` |
//! | `SITEWATCH_REPORT_RETENTION_DAYS` | `schedule.report_retention_days` |
//! | `SITEWATCH_ALERT_COOLDOWN_SECS` | `alerts.cooldown_secs` |
//! | `SITEWATCH_SMTP_SERVER`, `_PORT`, `_USER`, `_PASS`, `SITEWATCH_ALERT_EMAIL` | `notifications.email` |
//! | `SITEWATCH_TWILIO_SID`, `_AUTH_TOKEN`, `_FROM`, `_TO` | `notifications.whatsapp` |
//! | `SITEWATCH_WEBHOOK_URL` | `notifications.webhook` |

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of all environment overrides
pub const ENV_PREFIX: &str = "SITEWATCH_";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read config file '{path}': {message}")]
    Io { path: String, message: String },

    /// Configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration is syntactically fine but semantically invalid
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid configuration error
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(format!("TOML error: {}", err))
    }
}

/// A named, fetchable content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Logical name, unique per configuration
    pub name: String,

    /// Absolute URL
    pub url: String,

    /// File extension used for backups
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            extension: default_extension(),
        }
    }

    /// Set the backup file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

fn default_extension() -> String {
    "html".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the monitored site
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Resources to check; derived from `site_url` when empty
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,

    /// Directory of the persisted monitoring state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory of content backups
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Directory restored backups are copied to
    #[serde(default = "default_restore_dir")]
    pub restore_dir: PathBuf,

    /// Check resources concurrently instead of one at a time
    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub detection: DetectionSettings,

    #[serde(default)]
    pub incidents: IncidentSettings,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub certificate: CertificateSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

fn default_site_url() -> String {
    "https://example.wordpress.com".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("monitor_data")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_restore_dir() -> PathBuf {
    PathBuf::from("restored")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            resources: Vec::new(),
            data_dir: default_data_dir(),
            backup_dir: default_backup_dir(),
            restore_dir: default_restore_dir(),
            parallel: false,
            fetch: FetchSettings::default(),
            detection: DetectionSettings::default(),
            incidents: IncidentSettings::default(),
            alerts: AlertSettings::default(),
            certificate: CertificateSettings::default(),
            schedule: ScheduleSettings::default(),
            notifications: NotificationSettings::default(),
        }
    }
}

/// HTTP fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Attempts per request for transport failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("sitewatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Change detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Upper bound of a diff carried by an incident or alert
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,

    /// Run the suspicious pattern scan on every fetched body
    #[serde(default = "default_true")]
    pub scan_patterns: bool,
}

fn default_max_diff_chars() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            max_diff_chars: default_max_diff_chars(),
            scan_patterns: true,
        }
    }
}

/// Incident log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSettings {
    /// Maximum number of incidents kept
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
}

fn default_retention_cap() -> usize {
    100
}

impl Default for IncidentSettings {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
        }
    }
}

/// Alert dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Minimum seconds between two alerts of the same type
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Send an informational notification when a cycle finds nothing
    #[serde(default = "default_true")]
    pub send_all_clear: bool,
}

fn default_cooldown_secs() -> u64 {
    3600
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            send_all_clear: true,
        }
    }
}

/// Certificate probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raise `ssl_expiring` below this many days of validity
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_expiry_warning_days() -> i64 {
    7
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_warning_days: default_expiry_warning_days(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Seconds between two cycle starts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Saved reports older than this are pruned
    #[serde(default = "default_report_retention_days")]
    pub report_retention_days: i64,
}

fn default_interval_secs() -> u64 {
    3 * 3600
}

fn default_report_retention_days() -> i64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            report_retention_days: default_report_retention_days(),
        }
    }
}

/// Notification channels; any subset may be configured
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub email: Option<EmailSettings>,

    #[serde(default)]
    pub whatsapp: Option<WhatsAppSettings>,

    #[serde(default)]
    pub webhook: Option<WebhookSettings>,
}

impl NotificationSettings {
    /// Whether at least one channel is configured
    pub fn any_configured(&self) -> bool {
        self.email.is_some() || self.whatsapp.is_some() || self.webhook.is_some()
    }
}

/// SMTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_server: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// Sender address; defaults to `username`
    #[serde(default)]
    pub from: Option<String>,

    /// Recipient address
    pub to: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Twilio WhatsApp settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppSettings {
    pub account_sid: String,

    #[serde(default, skip_serializing)]
    pub auth_token: String,

    /// Sender number, without the `whatsapp:` prefix
    pub from: String,

    /// Recipient number, without the `whatsapp:` prefix
    pub to: String,

    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// Generic JSON webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,

    /// Sent as `Authorization: Bearer <token>` when set
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
}

impl MonitorConfig {
    /// Load a configuration file, format chosen by extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        Self::parse(&content, &extension)
    }

    /// Parse configuration text of the given format (`toml`, `yaml`, `yml`, `json`)
    pub fn parse(content: &str, format: &str) -> Result<Self, ConfigError> {
        match format {
            "toml" => Ok(toml::from_str(content)?),
            "yaml" | "yml" => {
                if content.trim().is_empty() {
                    Ok(Self::default())
                } else {
                    Ok(serde_yaml::from_str(content)?)
                }
            }
            "json" => Ok(serde_json::from_str(content)?),
            other => Err(ConfigError::Parse(format!(
                "Unsupported config format: '{}'",
                other
            ))),
        }
    }

    /// Load from an optional file, apply process environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SITEWATCH_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        if let Some(url) = var("SITE_URL") {
            self.site_url = url;
        }
        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }
        if let Some(v) = var("CHECK_INTERVAL_SECS") {
            self.schedule.interval_secs = parse_number("CHECK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("REPORT_RETENTION_DAYS") {
            self.schedule.report_retention_days = parse_number("REPORT_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = var("ALERT_COOLDOWN_SECS") {
            self.alerts.cooldown_secs = parse_number("ALERT_COOLDOWN_SECS", &v)?;
        }

        if let (Some(server), Some(user), Some(to)) =
            (var("SMTP_SERVER"), var("SMTP_USER"), var("ALERT_EMAIL"))
        {
            let smtp_port = match var("SMTP_PORT") {
                Some(p) => parse_number("SMTP_PORT", &p)?,
                None => default_smtp_port(),
            };
            self.notifications.email = Some(EmailSettings {
                smtp_server: server,
                smtp_port,
                username: user,
                password: var("SMTP_PASS").unwrap_or_default(),
                from: None,
                to,
            });
        } else if let Some(email) = self.notifications.email.as_mut() {
            if let Some(pass) = var("SMTP_PASS") {
                email.password = pass;
            }
        }

        if let (Some(sid), Some(token), Some(from), Some(to)) = (
            var("TWILIO_SID"),
            var("TWILIO_AUTH_TOKEN"),
            var("TWILIO_FROM"),
            var("TWILIO_TO"),
        ) {
            self.notifications.whatsapp = Some(WhatsAppSettings {
                account_sid: sid,
                auth_token: token,
                from,
                to,
                api_base: default_twilio_api_base(),
            });
        } else if let Some(whatsapp) = self.notifications.whatsapp.as_mut() {
            if let Some(token) = var("TWILIO_AUTH_TOKEN") {
                whatsapp.auth_token = token;
            }
        }

        if let Some(url) = var("WEBHOOK_URL") {
            self.notifications.webhook = Some(WebhookSettings {
                url,
                bearer_token: var("WEBHOOK_TOKEN"),
            });
        }

        Ok(())
    }

    /// Check semantic constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.site_url) {
            return Err(ConfigError::invalid(format!(
                "site_url must be an http(s) URL, got '{}'",
                self.site_url
            )));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::invalid("fetch.timeout_ms must be greater than 0"));
        }
        if self.incidents.retention_cap == 0 {
            return Err(ConfigError::invalid(
                "incidents.retention_cap must be greater than 0",
            ));
        }
        if self.detection.max_diff_chars == 0 {
            return Err(ConfigError::invalid(
                "detection.max_diff_chars must be greater than 0",
            ));
        }
        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::invalid("schedule.interval_secs must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !is_valid_resource_name(&resource.name) {
                return Err(ConfigError::invalid(format!(
                    "Invalid resource name '{}': use letters, digits, '_' or '-'",
                    resource.name
                )));
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "Duplicate resource name '{}'",
                    resource.name
                )));
            }
            if !is_http_url(&resource.url) {
                return Err(ConfigError::invalid(format!(
                    "Resource '{}' must have an http(s) URL",
                    resource.name
                )));
            }
        }

        Ok(())
    }

    /// Resources to check: the configured list, or homepage/RSS/comments feeds
    pub fn effective_resources(&self) -> Vec<ResourceConfig> {
        if !self.resources.is_empty() {
            return self.resources.clone();
        }

        let base = self.site_url.trim_end_matches('/');
        vec![
            ResourceConfig::new("homepage", self.site_url.clone()),
            ResourceConfig::new("rss", format!("{}/feed/", base)).with_extension("xml"),
            ResourceConfig::new("comments", format!("{}/comments/feed/", base))
                .with_extension("xml"),
        ]
    }

    /// Host name of the site, used for the certificate probe
    pub fn site_host(&self) -> Option<String> {
        let rest = self
            .site_url
            .strip_prefix("https://")
            .or_else(|| self.site_url.strip_prefix("http://"))?;
        let authority = rest.split(['/', '?', '#']).next()?;
        let host = authority.rsplit('@').next()?;
        let host = host.split(':').next()?;
        if host.is_empty() {
            None
        } else {
            Some(host.to_string())
        }
    }

    /// Whether the site is served over TLS
    pub fn is_https(&self) -> bool {
        self.site_url.starts_with("https://")
    }

    /// Directory saved reports are written to
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(r) if !r.is_empty() && !r.starts_with('/'))
}

fn is_valid_resource_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::invalid(format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, value))
    })
}
