mod channels;
mod handlers;
mod server;
mod state;
mod worker;


pub use channels::*;
pub use handlers::*;
pub use server::*;
pub use state::*;
pub use worker::*;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use provisor_executor::{DispatcherConfig, RedeliveryBackoff};
use provisor_worker::{GuardConfig, WorkerConfig};

use crate::error::ServerError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Top-level configuration for the Provisor server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct ProvisorConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub inbound: InboundConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub worker: WorkerServerConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    /// Idempotency store backend.
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
}

impl ProvisorConfig {
    /// Read the file at `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the worker.
    pub fn validate(&self) -> Result<(), ServerError> {
        let nonzero = [
            (
                "worker.handler_timeout_seconds",
                self.worker.handler_timeout_seconds,
            ),
            (
                "idempotency.cleanup_interval_seconds",
                self.idempotency.cleanup_interval_seconds,
            ),
            (
                "idempotency.staleness_seconds",
                self.idempotency.staleness_seconds,
            ),
            ("idempotency.retention_days", self.idempotency.retention_days),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    /// Library configuration for the orchestration worker.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker.concurrency,
            max_malformed_retries: self.worker.max_malformed_retries,
            redelivery: RedeliveryBackoff::Exponential {
                base: Duration::from_millis(self.worker.redelivery_delay_ms),
                max: Duration::from_millis(self.worker.max_redelivery_delay_ms),
                multiplier: 2.0,
            },
            dispatcher: DispatcherConfig {
                handler_timeout: Duration::from_secs(self.worker.handler_timeout_seconds),
                max_concurrent: self.worker.max_concurrent_handlers,
            },
            guard: GuardConfig {
                namespace: self.inbound.source.clone(),
                staleness_threshold: Duration::from_secs(self.idempotency.staleness_seconds),
                retention: Duration::from_secs(
                    self.idempotency.retention_days.saturating_mul(SECONDS_PER_DAY),
                ),
            },
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.idempotency.cleanup_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }
}
