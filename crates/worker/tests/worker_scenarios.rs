use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use provisor_core::{OperationId, OrchestrationAction, OrchestrationState, SubscriptionEvent};
use provisor_executor::{DispatcherConfig, RedeliveryBackoff};
use provisor_handler::{Handler, HandlerRegistry, ProvisioningError, SuccessPayload};
use provisor_state::{CasResult, StateError, StateKey, StateStore, Versioned};
use provisor_state_memory::MemoryStateStore;
use provisor_worker::{
    ClaimOutcome, Clock, GuardConfig, MemoryChannel, MemoryPublisher, OrchestrationWorker,
    Processed, RecordStatus, WorkerBuilder,
};

/// Counts calls and optionally sleeps before answering.
struct CountingHandler {
    calls: AtomicUsize,
    login_url: Option<String>,
    delay: Duration,
}

impl CountingHandler {
    fn new() -> Arc<Self> {
        Self::build(None, Duration::ZERO)
    }

    fn with_login_url(url: &str) -> Arc<Self> {
        Self::build(Some(url.to_owned()), Duration::ZERO)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Self::build(None, delay)
    }

    fn build(login_url: Option<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            login_url,
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Handler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    async fn handle(
        &self,
        _action: &OrchestrationAction,
    ) -> Result<SuccessPayload, ProvisioningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut payload = SuccessPayload::empty();
        if let Some(url) = &self.login_url {
            payload = payload.with_login_url(url.clone());
        }
        Ok(payload)
    }
}

/// A store whose backend is always unreachable.
struct UnreachableStore;

fn unreachable() -> StateError {
    StateError::Connection("connection refused".into())
}

#[async_trait]
impl StateStore for UnreachableStore {
    async fn check_and_set(
        &self,
        _key: &StateKey,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        Err(unreachable())
    }

    async fn get(&self, _key: &StateKey) -> Result<Option<String>, StateError> {
        Err(unreachable())
    }

    async fn get_versioned(&self, _key: &StateKey) -> Result<Option<Versioned>, StateError> {
        Err(unreachable())
    }

    async fn set(
        &self,
        _key: &StateKey,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        Err(unreachable())
    }

    async fn delete(&self, _key: &StateKey) -> Result<bool, StateError> {
        Err(unreachable())
    }

    async fn compare_and_swap(
        &self,
        _key: &StateKey,
        _expected_version: u64,
        _new_value: &str,
        _ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        Err(unreachable())
    }
}

struct Harness {
    channel: Arc<MemoryChannel>,
    publisher: Arc<MemoryPublisher>,
    worker: OrchestrationWorker,
}

fn harness_with(
    handlers: HandlerRegistry,
    configure: impl FnOnce(WorkerBuilder) -> WorkerBuilder,
) -> Harness {
    let channel = Arc::new(MemoryChannel::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let builder = WorkerBuilder::new()
        .channel(channel.clone())
        .publisher(publisher.clone())
        .store(Arc::new(MemoryStateStore::new()))
        .handlers(handlers)
        .redelivery(RedeliveryBackoff::Immediate);
    let worker = configure(builder).build().unwrap();
    Harness {
        channel,
        publisher,
        worker,
    }
}

fn harness(handlers: HandlerRegistry) -> Harness {
    harness_with(handlers, |b| b)
}

fn registry_with(event: SubscriptionEvent, handler: Arc<CountingHandler>) -> HandlerRegistry {
    HandlerRegistry::reference("http://reference.test/login").with_handler(event, handler)
}

fn body(operation_id: &str, event: serde_json::Value) -> String {
    json!({
        "operationId": operation_id,
        "applicationId": "app-1",
        "tenantId": "tenant-1",
        "subscriptionId": "sub-1",
        "event": event,
    })
    .to_string()
}

#[tokio::test]
async fn create_publishes_login_url() {
    let create = CountingHandler::with_login_url("http://example.test/login");
    let h = harness(registry_with(SubscriptionEvent::Create, create.clone()));
    h.channel.send(body("op-1", json!("Create"))).unwrap();

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(
        processed,
        Processed::Published {
            operation_id: OperationId::new("op-1"),
            state: OrchestrationState::Succeeded,
        }
    );

    let published = h.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].operation_id.as_str(), "op-1");
    assert_eq!(published[0].subscription_id.as_str(), "sub-1");
    assert_eq!(
        published[0].login_url.as_deref(),
        Some("http://example.test/login")
    );
    assert!(published[0].failure_detail.is_none());
    assert_eq!(create.calls(), 1);
    assert_eq!(h.channel.acked_count(), 1);
}

#[tokio::test]
async fn unknown_event_publishes_failure() {
    let h = harness(HandlerRegistry::reference("http://reference.test/login"));
    h.channel.send(body("op-2", json!(999))).unwrap();

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(
        processed,
        Processed::Published {
            state: OrchestrationState::Failed,
            ..
        }
    ));

    let result = &h.publisher.published()[0];
    assert_eq!(result.tenant_id.as_str(), "tenant-1");
    assert_eq!(result.application_id.as_str(), "app-1");
    let detail = result.failure_detail.as_ref().unwrap();
    assert!(detail.friendly_message.contains("sub-1"));
    assert!(detail.detailed_message.contains("999"));
    assert_eq!(h.channel.acked_count(), 1);
    assert_eq!(h.worker.metrics().snapshot().failed, 1);
}

#[tokio::test]
async fn malformed_message_is_dead_lettered_after_retries() {
    let h = harness_with(HandlerRegistry::reference("http://reference.test"), |b| {
        b.max_malformed_retries(3)
    });
    h.channel.send_with_id("garbled", "{ not an action").unwrap();

    for delivery in 1..=3 {
        let processed = h.worker.process_next().await.unwrap().unwrap();
        assert!(
            matches!(processed, Processed::Deferred { .. }),
            "delivery {delivery} should be abandoned, got {processed:?}"
        );
        assert_eq!(h.channel.dead_letter_count(), 0);
    }

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(
        processed,
        Processed::DeadLettered {
            message_id: "garbled".into()
        }
    );

    let dead = h.channel.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].delivery_count, 4);
    assert!(dead[0].reason.contains("malformed"));
    assert_eq!(h.channel.acked_count(), 0);
    assert_eq!(h.publisher.published_count(), 0);

    let snap = h.worker.metrics().snapshot();
    assert_eq!(snap.malformed, 4);
    assert_eq!(snap.dead_lettered, 1);
}

#[tokio::test]
async fn blank_operation_id_is_malformed() {
    let h = harness_with(HandlerRegistry::reference("http://reference.test"), |b| {
        b.max_malformed_retries(0)
    });
    h.channel.send(body("  ", json!("Create"))).unwrap();

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(processed, Processed::DeadLettered { .. }));
}

#[tokio::test]
async fn duplicate_delivery_replays_stored_result() {
    let update = CountingHandler::with_login_url("http://example.test/update");
    let h = harness(registry_with(SubscriptionEvent::Update, update.clone()));
    h.channel.send(body("op-3", json!("Update"))).unwrap();
    h.channel.send(body("op-3", json!("Update"))).unwrap();

    let first = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(first, Processed::Published { .. }));
    let second = h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(
        second,
        Processed::Replayed {
            operation_id: "op-3".into()
        }
    );

    assert_eq!(update.calls(), 1);
    let published = h.publisher.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);
    assert_eq!(h.channel.acked_count(), 2);
    assert_eq!(h.worker.metrics().snapshot().replayed, 1);
}

#[tokio::test]
async fn publish_failure_is_retried_without_rerunning_handler() {
    let suspend = CountingHandler::new();
    let h = harness(registry_with(SubscriptionEvent::Suspend, suspend.clone()));
    h.publisher.fail_next(1);
    h.channel.send(body("op-4", json!("Suspend"))).unwrap();

    let first = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(first, Processed::Deferred { .. }));
    assert_eq!(h.channel.acked_count(), 0);
    assert_eq!(h.publisher.published_count(), 0);

    let second = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(second, Processed::Replayed { .. }));
    assert_eq!(suspend.calls(), 1);
    assert_eq!(h.publisher.published_count(), 1);
    assert_eq!(h.channel.acked_count(), 1);
    assert_eq!(h.worker.metrics().snapshot().publish_failures, 1);
}

#[tokio::test]
async fn stale_claim_is_reprocessed() {
    let now = Arc::new(Mutex::new(Utc::now()));
    let clock: Clock = {
        let now = Arc::clone(&now);
        Arc::new(move || -> DateTime<Utc> { *now.lock() })
    };
    let delete = CountingHandler::new();
    let h = harness_with(registry_with(SubscriptionEvent::Delete, delete.clone()), |b| {
        b.clock(clock)
    });

    // A worker that crashed after claiming the operation.
    let op = OperationId::new("op-5");
    assert!(matches!(
        h.worker.guard().claim(&op).await.unwrap(),
        ClaimOutcome::Claimed(_)
    ));

    h.channel.send(body("op-5", json!("Delete"))).unwrap();
    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(processed, Processed::Busy { operation_id: op.clone() });
    assert_eq!(delete.calls(), 0);

    *now.lock() += chrono::Duration::minutes(6);
    assert!(h.worker.guard().should_process(&op).await.unwrap());

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(processed, Processed::Published { .. }));
    assert_eq!(delete.calls(), 1);

    let record = h.worker.guard().record(&op).await.unwrap().unwrap();
    assert_eq!(record.attempts, 2);
    assert!(matches!(record.status, RecordStatus::Completed { .. }));
}

#[tokio::test(start_paused = true)]
async fn handler_timeout_releases_claim() {
    let reinstate = CountingHandler::slow(Duration::from_secs(10));
    let h = harness_with(
        registry_with(SubscriptionEvent::Reinstate, reinstate.clone()),
        |b| {
            b.dispatcher_config(DispatcherConfig {
                handler_timeout: Duration::from_secs(1),
                max_concurrent: 10,
            })
        },
    );
    h.channel.send(body("op-6", json!("Reinstate"))).unwrap();

    let processed = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(
        processed,
        Processed::Published {
            state: OrchestrationState::Failed,
            ..
        }
    ));

    let result = &h.publisher.published()[0];
    let detail = result.failure_detail.as_ref().unwrap();
    assert!(detail.detailed_message.contains("timed out"));
    assert!(detail.friendly_message.contains("sub-1"));

    let op = OperationId::new("op-6");
    assert!(h.worker.guard().should_process(&op).await.unwrap());
    assert!(h.worker.guard().lookup(&op).await.unwrap().is_none());
    assert_eq!(h.channel.acked_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicates_run_handler_once() {
    let create = CountingHandler::slow(Duration::from_millis(200));
    let h = harness_with(registry_with(SubscriptionEvent::Create, create.clone()), |b| {
        b.concurrency(2).redelivery(RedeliveryBackoff::Constant {
            delay: Duration::from_millis(20),
        })
    });
    h.channel.send(body("op-7", json!("Create"))).unwrap();
    h.channel.send(body("op-7", json!("Create"))).unwrap();

    let channel = h.channel.clone();
    let worker = Arc::new(h.worker);
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(Arc::clone(&worker).run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(30), async {
        while channel.acked_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();
    running.await.unwrap();

    assert_eq!(create.calls(), 1);
    let published = h.publisher.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);

    let snap = worker.metrics().snapshot();
    assert_eq!(snap.dispatched, 1);
    assert_eq!(snap.replayed, 1);
    assert!(snap.busy >= 1);
}

#[tokio::test(start_paused = true)]
async fn queued_slots_do_not_age_claims() {
    // Wall clock follows tokio's paused clock so claim staleness tracks it.
    let base = Utc::now();
    let started = tokio::time::Instant::now();
    let clock: Clock = Arc::new(move || -> DateTime<Utc> {
        base + chrono::Duration::from_std(started.elapsed()).unwrap()
    });

    let create = CountingHandler::slow(Duration::from_millis(900));
    let h = harness_with(HandlerRegistry::uniform(create.clone()), |b| {
        b.concurrency(8)
            .clock(clock)
            .redelivery(RedeliveryBackoff::Constant {
                delay: Duration::from_millis(20),
            })
            .dispatcher_config(DispatcherConfig {
                handler_timeout: Duration::from_secs(1),
                max_concurrent: 1,
            })
            .guard_config(GuardConfig {
                staleness_threshold: Duration::from_secs(2),
                ..GuardConfig::default()
            })
    });
    for op in ["op-a", "op-b", "op-d", "op-e", "op-f", "op-c", "op-c"] {
        h.channel.send(body(op, json!("Create"))).unwrap();
    }

    let channel = h.channel.clone();
    let worker = Arc::new(h.worker);
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(Arc::clone(&worker).run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(120), async {
        while channel.acked_count() < 7 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();
    running.await.unwrap();

    // Six distinct operations, each handled exactly once.
    assert_eq!(create.calls(), 6);
    assert_eq!(h.publisher.published_count(), 7);
    let snap = worker.metrics().snapshot();
    assert_eq!(snap.dispatched, 6);
    assert_eq!(snap.replayed, 1);
}

#[tokio::test]
async fn unreachable_store_defers_without_dispatch() {
    let create = CountingHandler::new();
    let h = harness_with(registry_with(SubscriptionEvent::Create, create.clone()), |b| {
        b.store(Arc::new(UnreachableStore))
    });
    h.channel.send(body("op-8", json!("Create"))).unwrap();

    let processed = h.worker.process_next().await.unwrap().unwrap();
    match processed {
        Processed::Deferred { reason, .. } => assert!(reason.contains("unavailable")),
        other => panic!("expected a deferral, got {other:?}"),
    }
    assert_eq!(create.calls(), 0);
    assert_eq!(h.channel.acked_count(), 0);
    assert_eq!(h.channel.pending(), 1);
    assert_eq!(h.worker.metrics().snapshot().deferred, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_in_flight_action() {
    let update = CountingHandler::slow(Duration::from_millis(500));
    let h = harness(registry_with(SubscriptionEvent::Update, update.clone()));
    h.channel.send(body("op-9", json!("Update"))).unwrap();

    let worker = Arc::new(h.worker);
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(Arc::clone(&worker).run(shutdown.clone()));

    while update.calls() == 0 {
        tokio::task::yield_now().await;
    }
    shutdown.cancel();
    running.await.unwrap();

    assert_eq!(h.channel.acked_count(), 1);
    assert_eq!(h.publisher.published_count(), 1);
    assert_eq!(h.channel.in_flight_count(), 0);
}

#[tokio::test]
async fn closed_channel_ends_processing() {
    let h = harness(HandlerRegistry::reference("http://reference.test"));
    h.channel.close();
    assert!(h.worker.process_next().await.unwrap().is_none());
}
