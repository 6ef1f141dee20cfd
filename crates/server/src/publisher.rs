use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use provisor_core::OrchestrationResult;
use provisor_worker::{MemoryPublisher, PublishError, ResultPublisher};

use crate::config::OutboundConfig;
use crate::error::ServerError;

/// Publishes each result as a JSON POST to a fixed URL.
///
/// Any 2xx status counts as delivered. Other statuses are rejections and
/// connection failures are transport errors; both leave the inbound message
/// unacknowledged so it is retried.
pub struct WebhookPublisher {
    destination: String,
    url: String,
    client: Client,
}

impl WebhookPublisher {
    pub fn new(
        destination: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Config(format!("result publisher client: {e}")))?;
        Ok(Self {
            destination: destination.into(),
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ResultPublisher for WebhookPublisher {
    async fn publish(&self, result: &OrchestrationResult) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(result)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(operation_id = %result.operation_id, %status, "result delivered");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected(format!("{status}: {body}")))
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

/// Build the result publisher named by `[outbound]`.
pub fn create_publisher(config: &OutboundConfig) -> Result<Arc<dyn ResultPublisher>, ServerError> {
    match config.backend.as_str() {
        "memory" => {
            info!(destination = %config.destination, "publishing results in memory");
            Ok(Arc::new(MemoryPublisher::new()))
        }
        "webhook" => {
            let url = config.url.as_deref().ok_or_else(|| {
                ServerError::Config("webhook outbound backend requires 'url' in [outbound]".into())
            })?;
            info!(destination = %config.destination, url, "publishing results over HTTP");
            Ok(Arc::new(WebhookPublisher::new(
                config.destination.as_str(),
                url,
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
        other => Err(ServerError::Config(format!(
            "unsupported outbound backend: {other}"
        ))),
    }
}
