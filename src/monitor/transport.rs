// ABOUTME: Delivery transport for monitoring payloads.
// ABOUTME: The HTTP implementation posts JSON with a bounded request timeout.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn post(&self, url: &str, body: serde_json::Value) -> Result<(), TransportError>;
}

/// Posts payloads over HTTP(S).
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: serde_json::Value) -> Result<(), TransportError> {
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
