//! End-to-end cycles against a mock site, a durable store and a mock webhook

use sitewatch_core::config::WebhookSettings;
use sitewatch_core::{
    FileStore, HttpFetcher, IncidentType, KvStore, Monitor, MonitorConfig, MultiNotifier,
    ResourceConfig, Severity,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn hook(server: &MockServer) -> MultiNotifier {
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let mut settings = sitewatch_core::config::NotificationSettings::default();
    settings.webhook = Some(WebhookSettings {
        url: format!("{}/hook", server.uri()),
        bearer_token: None,
    });
    MultiNotifier::from_settings(&settings).unwrap()
}

fn config(site: &MockServer) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.site_url = site.uri();
    config.resources = vec![
        ResourceConfig::new("homepage", format!("{}/", site.uri())),
        ResourceConfig::new("rss", format!("{}/feed/", site.uri())).with_extension("xml"),
    ];
    config.fetch.timeout_ms = 2_000;
    config.alerts.cooldown_secs = 0;
    config
}

fn monitor(
    config: &MonitorConfig,
    store: Arc<dyn KvStore>,
    notifier: MultiNotifier,
) -> Monitor {
    let fetcher = HttpFetcher::new("sitewatch-test").unwrap();
    Monitor::new(
        Arc::new(config.clone()),
        store,
        Arc::new(fetcher),
        Arc::new(notifier),
    )
}

#[tokio::test]
async fn test_change_detected_across_restarts() {
    let site = MockServer::start().await;
    let alerts = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&site);

    serve(&site, "/", 200, "<html>v1</html>").await;
    serve(&site, "/feed/", 200, "<rss/>").await;

    {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let first = monitor(&config, store, hook(&alerts).await);
        let summary = first.run_cycle().await.unwrap();
        assert!(!summary.has_incidents());
        assert!(summary.alert_sent);
    }

    site.reset().await;
    serve(&site, "/", 200, "<html>v2</html>").await;
    serve(&site, "/feed/", 200, "<rss/>").await;

    // A fresh monitor over the same directory keeps the baseline.
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let second = monitor(&config, store, hook(&alerts).await);
    let summary = second.run_cycle().await.unwrap();

    assert_eq!(summary.counts.get(&IncidentType::ContentChanged), Some(&1));
    assert_eq!(summary.primary, Some(IncidentType::ContentChanged));
    assert_eq!(summary.persistence_errors, 0);

    let incidents = second.incident_log().load_recent(10);
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].severity, Severity::Medium);
    assert!(dir.path().join("incidents.json").exists());
    assert!(dir.path().join("fingerprints/homepage.json").exists());
}

#[tokio::test]
async fn test_unavailable_resource_and_suspicious_code() {
    let site = MockServer::start().await;
    let alerts = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve(&site, "/", 200, "<p>eval(something)</p><p>eval(something)</p>").await;
    serve(&site, "/feed/", 502, "bad gateway").await;

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let monitor = monitor(&config(&site), store, hook(&alerts).await);
    let summary = monitor.run_cycle().await.unwrap();

    assert_eq!(summary.resources_unavailable, 1);
    assert_eq!(summary.counts.get(&IncidentType::SiteUnavailable), Some(&1));
    assert_eq!(summary.counts.get(&IncidentType::SuspiciousCode), Some(&1));
    assert_eq!(summary.primary, Some(IncidentType::SiteUnavailable));
    assert!(summary.alert_sent);

    let received = alerts.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let payload: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(payload["subject"].as_str().unwrap().contains("Site unavailable"));
    assert!(payload["body"].as_str().unwrap().contains("rss returned HTTP 502"));
}

#[tokio::test]
async fn test_failed_delivery_is_retried_next_cycle() {
    let site = MockServer::start().await;
    let alerts = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&site);
    config.alerts.cooldown_secs = 3600;

    serve(&site, "/", 503, "").await;
    serve(&site, "/feed/", 200, "<rss/>").await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&alerts)
        .await;
    let notifier = hook(&alerts).await;

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let monitor = monitor(&config, store, notifier);

    assert!(!monitor.run_cycle().await.unwrap().alert_sent);
    assert!(monitor.run_cycle().await.unwrap().alert_sent);
    assert!(!monitor.run_cycle().await.unwrap().alert_sent);
}
