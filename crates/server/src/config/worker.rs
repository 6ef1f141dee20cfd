use serde::Deserialize;

/// Orchestration worker tuning.
#[derive(Debug, Deserialize)]
pub struct WorkerServerConfig {
    /// Number of slots pulling from the inbound channel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-action handler timeout.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_seconds: u64,
    /// Upper bound on handler calls running at once.
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
    /// Deliveries of an undecodable message abandoned before dead-lettering.
    #[serde(default = "default_max_malformed_retries")]
    pub max_malformed_retries: u32,
    /// First redelivery delay for an abandoned message.
    #[serde(default = "default_redelivery_delay")]
    pub redelivery_delay_ms: u64,
    /// Cap on the exponential redelivery delay.
    #[serde(default = "default_max_redelivery_delay")]
    pub max_redelivery_delay_ms: u64,
}

impl Default for WorkerServerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            handler_timeout_seconds: default_handler_timeout(),
            max_concurrent_handlers: default_max_concurrent_handlers(),
            max_malformed_retries: default_max_malformed_retries(),
            redelivery_delay_ms: default_redelivery_delay(),
            max_redelivery_delay_ms: default_max_redelivery_delay(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_handler_timeout() -> u64 {
    30
}

fn default_max_concurrent_handlers() -> usize {
    10
}

fn default_max_malformed_retries() -> u32 {
    9
}

fn default_redelivery_delay() -> u64 {
    1_000
}

fn default_max_redelivery_delay() -> u64 {
    60_000
}

/// Idempotency record lifecycle.
#[derive(Debug, Deserialize)]
pub struct IdempotencyConfig {
    /// How long completed records are kept.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Age at which an in-flight claim is presumed abandoned.
    #[serde(default = "default_staleness")]
    pub staleness_seconds: u64,
    /// How often expired records are purged from the store.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            staleness_seconds: default_staleness(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_retention_days() -> u64 {
    30
}

fn default_staleness() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    3_600
}
