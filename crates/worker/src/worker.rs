use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use provisor_core::{
    MessageId, OperationId, OrchestrationAction, OrchestrationResult, OrchestrationState,
};
use provisor_executor::ActivityDispatcher;

use crate::channel::{InboundChannel, InboundMessage};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::guard::{Claim, ClaimOutcome, IdempotencyGuard};
use crate::metrics::WorkerMetrics;
use crate::publisher::ResultPublisher;

/// Pause before a slot polls again after the channel reported an error.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The handler ran and its result was published and acknowledged.
    Published {
        operation_id: OperationId,
        state: OrchestrationState,
    },
    /// A stored result was republished without running the handler.
    Replayed { operation_id: OperationId },
    /// Another slot holds the claim; the message was abandoned.
    Busy { operation_id: OperationId },
    /// The message was abandoned for a later retry.
    Deferred {
        message_id: MessageId,
        reason: String,
    },
    /// The message exhausted its retries and was dead-lettered.
    DeadLettered { message_id: MessageId },
}

/// Pulls orchestration actions from an inbound channel, runs each logical
/// operation's handler at most once, and publishes a terminal result before
/// acknowledging the message.
///
/// Built with [`WorkerBuilder`](crate::WorkerBuilder).
pub struct OrchestrationWorker {
    channel: Arc<dyn InboundChannel>,
    publisher: Arc<dyn ResultPublisher>,
    guard: Arc<IdempotencyGuard>,
    dispatcher: Arc<ActivityDispatcher>,
    metrics: Arc<WorkerMetrics>,
    config: WorkerConfig,
}

impl OrchestrationWorker {
    pub(crate) fn new(
        channel: Arc<dyn InboundChannel>,
        publisher: Arc<dyn ResultPublisher>,
        guard: Arc<IdempotencyGuard>,
        dispatcher: Arc<ActivityDispatcher>,
        metrics: Arc<WorkerMetrics>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            channel,
            publisher,
            guard,
            dispatcher,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    pub fn guard(&self) -> &Arc<IdempotencyGuard> {
        &self.guard
    }

    pub fn dispatcher(&self) -> &Arc<ActivityDispatcher> {
        &self.dispatcher
    }

    /// Drive `concurrency` slots until `shutdown` is cancelled or the channel
    /// closes, then wait for every in-flight action to finish.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            concurrency = self.config.concurrency,
            destination = self.publisher.destination(),
            "orchestration worker starting"
        );

        let tracker = TaskTracker::new();
        for slot in 0..self.config.concurrency {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tracker.spawn(async move { worker.run_slot(slot, shutdown).await });
        }
        tracker.close();
        tracker.wait().await;

        info!("orchestration worker stopped");
    }

    async fn run_slot(&self, slot: usize, shutdown: CancellationToken) {
        debug!(slot, "worker slot started");
        loop {
            let received = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                received = self.channel.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    if let Err(e) = self.process(message).await {
                        error!(slot, error = %e, "failed to settle message");
                    }
                }
                Ok(None) => {
                    debug!(slot, "inbound channel closed");
                    break;
                }
                Err(e) => {
                    error!(slot, error = %e, "inbound receive failed");
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                }
            }
        }
        debug!(slot, "worker slot stopped");
    }

    /// Receive and process exactly one delivery.
    ///
    /// Returns `None` when the channel is closed and drained.
    pub async fn process_next(&self) -> Result<Option<Processed>, WorkerError> {
        match self.channel.receive().await? {
            Some(message) => self.process(message).await.map(Some),
            None => Ok(None),
        }
    }

    /// Take one delivery through claim, dispatch, record, publish, and
    /// settlement.
    ///
    /// An `Err` means the message could not be settled on the channel; the
    /// transport will redeliver it.
    #[instrument(
        skip(self, message),
        fields(message_id = %message.message_id, delivery_count = message.delivery_count)
    )]
    pub async fn process(&self, message: InboundMessage) -> Result<Processed, WorkerError> {
        self.metrics.increment_received();

        let action = match OrchestrationAction::from_slice(&message.body) {
            Ok(action) => action,
            Err(e) => return self.reject_malformed(&message, e.to_string()).await,
        };
        let operation_id = action.operation_id.clone();

        // Queue for a handler slot before claiming, so the claim's age is
        // bounded by the handler timeout alone.
        let permit = match self.dispatcher.acquire().await {
            Ok(permit) => permit,
            Err(err) => return self.defer(&message, err.to_string()).await,
        };

        let claim = match self.guard.claim(&operation_id).await {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::Completed(result)) => {
                drop(permit);
                info!(operation_id = %operation_id, "operation already completed, replaying result");
                self.metrics.increment_replayed();
                return self.publish_and_ack(&message, &result, true).await;
            }
            Ok(ClaimOutcome::Busy) => {
                debug!(operation_id = %operation_id, "operation in flight elsewhere");
                self.metrics.increment_busy();
                self.abandon(&message).await?;
                return Ok(Processed::Busy { operation_id });
            }
            Err(e) => {
                let err = WorkerError::from(e);
                warn!(operation_id = %operation_id, error = %err, "could not claim operation");
                return self.defer(&message, err.to_string()).await;
            }
        };

        if claim.attempt() > 1 {
            info!(
                operation_id = %operation_id,
                attempt = claim.attempt(),
                "retrying operation"
            );
        }

        self.metrics.increment_dispatched();
        let dispatched = self.dispatcher.dispatch_permitted(&permit, &action).await;
        drop(permit);
        let (result, interrupted) = match dispatched {
            Ok(result) => (result, false),
            Err(err) => (
                ActivityDispatcher::failed_result(&action, &err),
                err.is_interrupted(),
            ),
        };

        // The result is stored before publishing so a redelivery after a
        // failed publish replays it instead of running the handler again.
        if interrupted {
            self.release(&claim).await;
        } else if let Err(e) = self.guard.complete(&claim, &result).await {
            warn!(operation_id = %operation_id, error = %e, "failed to record operation result");
        }

        self.publish_and_ack(&message, &result, false).await
    }

    async fn publish_and_ack(
        &self,
        message: &InboundMessage,
        result: &OrchestrationResult,
        replayed: bool,
    ) -> Result<Processed, WorkerError> {
        if let Err(e) = self.publisher.publish(result).await {
            self.metrics.increment_publish_failures();
            warn!(
                operation_id = %result.operation_id,
                destination = self.publisher.destination(),
                error = %e,
                "result publish failed"
            );
            return self.defer(message, WorkerError::from(e).to_string()).await;
        }

        if !replayed {
            match result.state {
                OrchestrationState::Succeeded => self.metrics.increment_succeeded(),
                OrchestrationState::Failed => self.metrics.increment_failed(),
            }
        }

        // The result is out; a failed ack only costs a replay.
        if let Err(e) = self.channel.ack(message).await {
            warn!(operation_id = %result.operation_id, error = %e, "failed to acknowledge message");
        }

        info!(
            operation_id = %result.operation_id,
            state = ?result.state,
            replayed,
            "result published"
        );
        let operation_id = result.operation_id.clone();
        Ok(if replayed {
            Processed::Replayed { operation_id }
        } else {
            Processed::Published {
                operation_id,
                state: result.state,
            }
        })
    }

    async fn reject_malformed(
        &self,
        message: &InboundMessage,
        detail: String,
    ) -> Result<Processed, WorkerError> {
        self.metrics.increment_malformed();
        let reason = WorkerError::MalformedInput(detail).to_string();

        if message.delivery_count > self.config.max_malformed_retries {
            error!(reason = %reason, "dead-lettering malformed message");
            self.channel.dead_letter(message, &reason).await?;
            self.metrics.increment_dead_lettered();
            return Ok(Processed::DeadLettered {
                message_id: message.message_id.clone(),
            });
        }

        warn!(
            reason = %reason,
            remaining_retries = self.config.max_malformed_retries - message.delivery_count,
            "malformed message, abandoning"
        );
        self.abandon(message).await?;
        Ok(Processed::Deferred {
            message_id: message.message_id.clone(),
            reason,
        })
    }

    async fn defer(
        &self,
        message: &InboundMessage,
        reason: String,
    ) -> Result<Processed, WorkerError> {
        self.metrics.increment_deferred();
        self.abandon(message).await?;
        Ok(Processed::Deferred {
            message_id: message.message_id.clone(),
            reason,
        })
    }

    async fn abandon(&self, message: &InboundMessage) -> Result<(), WorkerError> {
        let delay = self.config.redelivery.delay_for(message.delivery_count);
        self.channel.abandon(message, delay).await?;
        Ok(())
    }

    async fn release(&self, claim: &Claim) {
        if let Err(e) = self.guard.release(claim).await {
            warn!(operation_id = %claim.operation_id(), error = %e, "failed to release claim");
        }
    }
}
