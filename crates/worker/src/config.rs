use provisor_executor::{DispatcherConfig, RedeliveryBackoff};

use crate::guard::GuardConfig;

/// Configuration for the [`OrchestrationWorker`](crate::OrchestrationWorker).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of slots pulling from the inbound channel.
    pub concurrency: usize,
    /// Deliveries of an undecodable message that are abandoned before it is
    /// dead-lettered. The message is dead-lettered on delivery
    /// `max_malformed_retries + 1`.
    pub max_malformed_retries: u32,
    /// Delay applied to every abandoned message.
    pub redelivery: RedeliveryBackoff,
    pub dispatcher: DispatcherConfig,
    pub guard: GuardConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            // A broker default of 10 deliveries before dead-lettering.
            max_malformed_retries: 9,
            redelivery: RedeliveryBackoff::default(),
            dispatcher: DispatcherConfig::default(),
            guard: GuardConfig::default(),
        }
    }
}
