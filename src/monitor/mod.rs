// ABOUTME: Best-effort delivery of metrics and alerts to external systems.
// ABOUTME: Deliveries run in the background and failures are logged at DEBUG, never returned.

mod transport;

pub use transport::{HttpTransport, Transport, TransportError};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where deliveries go. A `None` endpoint disables that channel.
#[derive(Debug, Clone, Default)]
pub struct Channels {
    pub metrics_url: Option<String>,
    pub chat_webhook: Option<String>,
    pub pager_url: Option<String>,
    pub pager_key: Option<String>,
}

impl Channels {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            metrics_url: settings.metrics_url.clone(),
            chat_webhook: settings.chat_webhook.clone(),
            pager_url: Some(settings.pager_url.clone()),
            pager_key: settings.pager_key.clone(),
        }
    }

    fn pager(&self) -> Option<(&str, &str)> {
        match (&self.pager_url, &self.pager_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Fire-and-forget monitoring adapter.
pub struct Monitor {
    channels: Channels,
    transport: Arc<dyn Transport>,
    source: String,
    pending: Mutex<JoinSet<()>>,
}

impl Monitor {
    pub fn new(channels: Channels, transport: Arc<dyn Transport>) -> Self {
        Self {
            channels,
            transport,
            source: gethostname::gethostname().to_string_lossy().into_owned(),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// A monitor with every channel disabled.
    pub fn disabled() -> Self {
        Self::new(Channels::default(), Arc::new(HttpTransport::default()))
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Send one metric sample to the metrics gateway, if configured.
    pub fn send_metric(&self, name: &str, value: f64, kind: MetricType, tags: &[(&str, &str)]) {
        let Some(url) = self.channels.metrics_url.clone() else {
            tracing::debug!(metric = name, "metrics gateway not configured, dropping metric");
            return;
        };

        let tags: BTreeMap<&str, &str> = tags.iter().copied().collect();
        let body = json!({
            "metric": name,
            "value": value,
            "type": kind,
            "tags": tags,
            "timestamp": Utc::now().timestamp(),
            "source": self.source,
        });
        self.dispatch("metrics", url, body);
    }

    /// Send an alert to the chat webhook; FATAL alerts also page.
    pub fn send_alert(&self, severity: Severity, message: &str, component: &str) {
        if let Some(url) = self.channels.chat_webhook.clone() {
            let body = json!({
                "text": format!("[{}] {}: {}", severity.as_str().to_uppercase(), component, message),
                "severity": severity,
                "component": component,
                "source": self.source,
                "timestamp": Utc::now().to_rfc3339(),
            });
            self.dispatch("chat", url, body);
        } else {
            tracing::debug!(%severity, component, "chat webhook not configured, dropping alert");
        }

        if severity == Severity::Fatal {
            self.page(message, component);
        }
    }

    fn page(&self, message: &str, component: &str) {
        let Some((url, key)) = self.channels.pager() else {
            tracing::debug!(component, "paging not configured, fatal alert not paged");
            return;
        };

        let body = json!({
            "routing_key": key,
            "event_action": "trigger",
            "payload": {
                "summary": message,
                "source": self.source,
                "severity": "critical",
                "component": component,
            },
        });
        self.dispatch("pager", url.to_string(), body);
    }

    fn dispatch(&self, channel: &'static str, url: String, body: serde_json::Value) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!(channel, "no async runtime, dropping delivery");
            return;
        }

        let transport = Arc::clone(&self.transport);
        self.pending.lock().spawn(async move {
            match transport.post(&url, body).await {
                Ok(()) => tracing::debug!(channel, "monitoring delivery sent"),
                Err(e) => tracing::debug!(channel, error = %e, "monitoring delivery failed"),
            }
        });
    }

    /// Wait up to `timeout` for in-flight deliveries, abandoning the rest.
    pub async fn flush(&self, timeout: Duration) {
        let mut pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::debug!(
                abandoned = pending.len(),
                "monitoring flush timed out, abandoning deliveries"
            );
            pending.abort_all();
        }
    }
}
