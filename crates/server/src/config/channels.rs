use serde::Deserialize;

/// Identity of the inbound source the worker consumes.
#[derive(Debug, Deserialize)]
pub struct InboundConfig {
    /// Source name. Also partitions the idempotency records, so workers
    /// sharing a source share their records.
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
        }
    }
}

fn default_source() -> String {
    "subscription-actions".to_owned()
}

/// Where orchestration results are published.
#[derive(Debug, Deserialize)]
pub struct OutboundConfig {
    /// Destination name used in logs.
    #[serde(default = "default_destination")]
    pub destination: String,
    /// `"memory"` keeps results in process; `"webhook"` POSTs them to `url`.
    #[serde(default = "default_outbound_backend")]
    pub backend: String,
    pub url: Option<String>,
    /// Per-request timeout for the webhook backend.
    #[serde(default = "default_outbound_timeout")]
    pub timeout_seconds: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            backend: default_outbound_backend(),
            url: None,
            timeout_seconds: default_outbound_timeout(),
        }
    }
}

fn default_destination() -> String {
    "subscription-results".to_owned()
}

fn default_outbound_backend() -> String {
    "memory".to_owned()
}

fn default_outbound_timeout() -> u64 {
    10
}
