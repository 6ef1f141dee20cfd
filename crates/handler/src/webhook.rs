use std::collections::HashMap;
use std::time::Duration;

use provisor_core::{OrchestrationAction, SuccessPayload};
use reqwest::Client;
use tracing::debug;

use crate::error::ProvisioningError;
use crate::handler::Handler;

/// A handler that delegates provisioning to an HTTP endpoint.
///
/// The action is POSTed as JSON. A 2xx response may carry a JSON body with
/// `loginUrl` and `firstTimeLoginUrl`; an empty body is an empty success.
/// Any other status is a rejection whose diagnostic includes the body. A
/// `friendlyMessage` string in an error body is passed through.
pub struct WebhookHandler {
    name: String,
    url: String,
    client: Client,
    headers: HashMap<String, String>,
}

impl WebhookHandler {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: Client::new(),
            headers: HashMap::new(),
        }
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, TLS).
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Extra headers to send with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Build a client with a request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ProvisioningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisioningError::Configuration(e.to_string()))?;
        Ok(self.with_client(client))
    }
}

fn parse_success(body: &str) -> Result<SuccessPayload, ProvisioningError> {
    if body.trim().is_empty() {
        return Ok(SuccessPayload::empty());
    }
    serde_json::from_str(body)
        .map_err(|e| ProvisioningError::rejected(format!("unreadable webhook response: {e}")))
}

fn rejection(status: u16, body: &str) -> ProvisioningError {
    let friendly = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("friendlyMessage")?.as_str().map(str::to_owned));
    ProvisioningError::Rejected {
        friendly,
        diagnostic: format!("webhook returned {status}: {body}"),
    }
}

impl Handler for WebhookHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        action: &OrchestrationAction,
    ) -> Result<SuccessPayload, ProvisioningError> {
        let mut request = self.client.post(&self.url).json(action);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProvisioningError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProvisioningError::Connection(e.to_string()))?;
        debug!(handler = %self.name, status = status.as_u16(), "webhook responded");

        if status.is_success() {
            parse_success(&body)
        } else {
            Err(rejection(status.as_u16(), &body))
        }
    }
}
