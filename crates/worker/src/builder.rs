use std::sync::Arc;

use provisor_executor::{ActivityDispatcher, DispatcherConfig, RedeliveryBackoff};
use provisor_handler::HandlerRegistry;
use provisor_state::StateStore;

use crate::channel::InboundChannel;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::guard::{Clock, GuardConfig, IdempotencyGuard};
use crate::metrics::WorkerMetrics;
use crate::publisher::ResultPublisher;
use crate::worker::OrchestrationWorker;

/// Fluent builder for an [`OrchestrationWorker`].
///
/// An inbound channel, a result publisher, an idempotency store, and the
/// handler registry must be supplied. Everything else has defaults.
#[derive(Default)]
pub struct WorkerBuilder {
    channel: Option<Arc<dyn InboundChannel>>,
    publisher: Option<Arc<dyn ResultPublisher>>,
    store: Option<Arc<dyn StateStore>>,
    handlers: Option<HandlerRegistry>,
    config: WorkerConfig,
    clock: Option<Clock>,
    metrics: Option<Arc<WorkerMetrics>>,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn InboundChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn ResultPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn max_malformed_retries(mut self, retries: u32) -> Self {
        self.config.max_malformed_retries = retries;
        self
    }

    #[must_use]
    pub fn redelivery(mut self, backoff: RedeliveryBackoff) -> Self {
        self.config.redelivery = backoff;
        self
    }

    #[must_use]
    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.config.dispatcher = config;
        self
    }

    #[must_use]
    pub fn guard_config(mut self, config: GuardConfig) -> Self {
        self.config.guard = config;
        self
    }

    /// Clock used for claim staleness.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing metrics instance, e.g. with an HTTP endpoint.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<WorkerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the builder and produce a worker.
    ///
    /// Returns [`WorkerError::Configuration`] when a required part is
    /// missing, when a concurrency limit or the handler timeout is zero, or
    /// when the handler timeout is not below the claim staleness threshold.
    pub fn build(self) -> Result<OrchestrationWorker, WorkerError> {
        let channel = self
            .channel
            .ok_or_else(|| WorkerError::Configuration("inbound channel is required".into()))?;
        let publisher = self
            .publisher
            .ok_or_else(|| WorkerError::Configuration("result publisher is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| WorkerError::Configuration("idempotency store is required".into()))?;
        let handlers = self
            .handlers
            .ok_or_else(|| WorkerError::Configuration("handler registry is required".into()))?;

        let config = self.config;
        if config.concurrency == 0 {
            return Err(WorkerError::Configuration(
                "worker concurrency must be at least 1".into(),
            ));
        }
        if config.dispatcher.max_concurrent == 0 {
            return Err(WorkerError::Configuration(
                "dispatcher max_concurrent must be at least 1".into(),
            ));
        }
        if config.dispatcher.handler_timeout.is_zero() {
            return Err(WorkerError::Configuration(
                "handler timeout must be greater than zero".into(),
            ));
        }
        // A claim must not go stale while its handler can still be running.
        if config.dispatcher.handler_timeout >= config.guard.staleness_threshold {
            return Err(WorkerError::Configuration(format!(
                "handler timeout {:?} must be shorter than the staleness threshold {:?}",
                config.dispatcher.handler_timeout, config.guard.staleness_threshold
            )));
        }

        let mut guard = IdempotencyGuard::new(store, config.guard.clone());
        if let Some(clock) = self.clock {
            guard = guard.with_clock(clock);
        }
        let dispatcher = ActivityDispatcher::new(config.dispatcher.clone(), handlers);

        Ok(OrchestrationWorker::new(
            channel,
            publisher,
            Arc::new(guard),
            Arc::new(dispatcher),
            self.metrics.unwrap_or_default(),
            config,
        ))
    }
}
