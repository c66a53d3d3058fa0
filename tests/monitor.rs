// ABOUTME: Integration tests for best-effort metric and alert delivery.
// ABOUTME: Uses a recording transport instead of real HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shipwright::monitor::{Channels, MetricType, Monitor, Severity, Transport, TransportError};

#[derive(Default)]
struct RecordingTransport {
    posts: Mutex<Vec<(String, Value)>>,
    fail: bool,
    hang: bool,
}

impl RecordingTransport {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().clone()
    }

    fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.posts().into_iter().map(|(url, _)| url).collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, url: &str, body: Value) -> Result<(), TransportError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.posts.lock().push((url.to_string(), body));
        if self.fail {
            return Err(TransportError::Status(503));
        }
        Ok(())
    }
}

fn all_channels() -> Channels {
    Channels {
        metrics_url: Some("http://metrics.test/ingest".to_string()),
        chat_webhook: Some("http://chat.test/hook".to_string()),
        pager_url: Some("http://pager.test/enqueue".to_string()),
        pager_key: Some("routing-key".to_string()),
    }
}

/// Test: Metrics post name, value, type, and tags to the gateway.
#[tokio::test]
async fn metric_is_posted_to_gateway() {
    let transport = Arc::new(RecordingTransport::default());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_metric(
        "deployment.duration_seconds",
        12.5,
        MetricType::Histogram,
        &[("environment", "staging"), ("status", "succeeded")],
    );
    monitor.flush(Duration::from_secs(5)).await;

    let posts = transport.posts();
    assert_eq!(posts.len(), 1);
    let (url, body) = &posts[0];
    assert_eq!(url, "http://metrics.test/ingest");
    assert_eq!(body["metric"], "deployment.duration_seconds");
    assert_eq!(body["value"], 12.5);
    assert_eq!(body["type"], "histogram");
    assert_eq!(body["tags"]["environment"], "staging");
}

/// Test: Non-fatal alerts go to chat only.
#[tokio::test]
async fn error_alert_goes_to_chat_only() {
    let transport = Arc::new(RecordingTransport::default());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_alert(Severity::Error, "deploy failed", "api-staging");
    monitor.flush(Duration::from_secs(5)).await;

    let posts = transport.posts();
    assert_eq!(transport.urls(), vec!["http://chat.test/hook"]);
    assert_eq!(posts[0].1["severity"], "error");
    assert_eq!(posts[0].1["text"], "[ERROR] api-staging: deploy failed");
}

/// Test: Fatal alerts also trigger a page.
#[tokio::test]
async fn fatal_alert_pages() {
    let transport = Arc::new(RecordingTransport::default());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_alert(Severity::Fatal, "rollback failed", "api-production");
    monitor.flush(Duration::from_secs(5)).await;

    assert_eq!(
        transport.urls(),
        vec!["http://chat.test/hook", "http://pager.test/enqueue"]
    );
    let page = transport
        .posts()
        .into_iter()
        .find(|(url, _)| url.contains("pager"))
        .map(|(_, body)| body)
        .unwrap();
    assert_eq!(page["routing_key"], "routing-key");
    assert_eq!(page["event_action"], "trigger");
    assert_eq!(page["payload"]["summary"], "rollback failed");
}

/// Test: Unconfigured channels send nothing.
#[tokio::test]
async fn disabled_channels_send_nothing() {
    let transport = Arc::new(RecordingTransport::default());
    let monitor = Monitor::new(
        Channels {
            pager_url: Some("http://pager.test/enqueue".to_string()),
            ..Channels::default()
        },
        transport.clone(),
    );

    monitor.send_metric("deployment.count", 1.0, MetricType::Counter, &[]);
    monitor.send_alert(Severity::Fatal, "no key configured", "api-dev");
    monitor.flush(Duration::from_secs(5)).await;

    assert!(transport.posts().is_empty());
}

/// Test: Delivery failures are swallowed.
#[tokio::test]
async fn delivery_failure_is_not_an_error() {
    let transport = Arc::new(RecordingTransport::failing());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_alert(Severity::Warning, "slow deploy", "api-dev");
    monitor.flush(Duration::from_secs(5)).await;

    assert_eq!(transport.posts().len(), 1);
}

/// Test: Flush gives up on hung deliveries after the timeout.
#[tokio::test(start_paused = true)]
async fn flush_abandons_hung_deliveries() {
    let transport = Arc::new(RecordingTransport::hanging());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_metric("deployment.count", 1.0, MetricType::Counter, &[]);

    let start = tokio::time::Instant::now();
    monitor.flush(Duration::from_secs(5)).await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));

    // Already drained: a second flush returns immediately
    monitor.flush(Duration::from_secs(5)).await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

/// Test: Sending outside a runtime drops the delivery instead of panicking.
#[test]
fn no_runtime_drops_delivery() {
    let transport = Arc::new(RecordingTransport::default());
    let monitor = Monitor::new(all_channels(), transport.clone());

    monitor.send_alert(Severity::Fatal, "outside runtime", "api-dev");
    monitor.send_metric("deployment.count", 1.0, MetricType::Counter, &[]);

    assert!(transport.posts().is_empty());
}
