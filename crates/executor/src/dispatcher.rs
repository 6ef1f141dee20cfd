use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument, warn};

use provisor_core::{FailureDetail, OrchestrationAction, OrchestrationResult, SubscriptionId};
use provisor_handler::{DynHandler, HandlerRegistry};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;

/// Subscriber-facing message used whenever a handler gives none.
pub fn friendly_failure_message(subscription_id: &SubscriptionId) -> String {
    format!(
        "Oops! Something went wrong while trying to action against subscription with Id {subscription_id}"
    )
}

/// Routes each action to the handler for its event and turns whatever the
/// handler does into an [`OrchestrationResult`].
///
/// A semaphore bounds concurrent handler calls to
/// [`DispatcherConfig::max_concurrent`] and each call is cut off after
/// [`DispatcherConfig::handler_timeout`].
pub struct ActivityDispatcher {
    config: DispatcherConfig,
    handlers: HandlerRegistry,
    semaphore: Arc<Semaphore>,
}

/// One slot of the dispatcher's handler concurrency, released on drop.
pub struct DispatchPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl ActivityDispatcher {
    pub fn new(config: DispatcherConfig, handlers: HandlerRegistry) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            handlers,
            semaphore,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Stop accepting new dispatches. Calls already holding a permit finish.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Dispatch an action, folding every failure into a failed result.
    pub async fn dispatch(&self, action: &OrchestrationAction) -> OrchestrationResult {
        match self.try_dispatch(action).await {
            Ok(result) => result,
            Err(err) => Self::failed_result(action, &err),
        }
    }

    /// Wait for a free handler slot.
    ///
    /// Callers whose clock starts before the handler runs take the permit
    /// first and then call [`dispatch_permitted`](Self::dispatch_permitted),
    /// so queueing for a slot happens outside that window.
    pub async fn acquire(&self) -> Result<DispatchPermit<'_>, DispatchError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(DispatchPermit { _permit: permit })
    }

    /// Dispatch an action, reporting the failure class to the caller.
    ///
    /// Returns the succeeded result when the handler succeeds.
    pub async fn try_dispatch(
        &self,
        action: &OrchestrationAction,
    ) -> Result<OrchestrationResult, DispatchError> {
        let permit = self.acquire().await?;
        self.dispatch_permitted(&permit, action).await
    }

    /// Dispatch an action under a permit already taken with
    /// [`acquire`](Self::acquire). Only the handler call is awaited, and it
    /// is bounded by [`DispatcherConfig::handler_timeout`].
    #[instrument(
        skip(self, _permit, action),
        fields(operation_id = %action.operation_id, event = %action.event_kind)
    )]
    pub async fn dispatch_permitted(
        &self,
        _permit: &DispatchPermit<'_>,
        action: &OrchestrationAction,
    ) -> Result<OrchestrationResult, DispatchError> {
        let Some(event) = action.event_kind.known() else {
            warn!(raw_event = %action.event_kind, "unsupported orchestration event");
            return Err(DispatchError::UnsupportedEvent(action.event_kind.to_string()));
        };
        let handler = self.handlers.handler_for(event);

        debug!(handler = handler.name(), "invoking handler");
        match tokio::time::timeout(self.config.handler_timeout, handler.handle(action)).await {
            Ok(Ok(payload)) => {
                info!(handler = handler.name(), "handler succeeded");
                Ok(action.success_result(payload))
            }
            Ok(Err(err)) => {
                warn!(handler = handler.name(), error = %err, "handler failed");
                Err(err.into())
            }
            Err(_elapsed) => {
                warn!(
                    handler = handler.name(),
                    timeout = ?self.config.handler_timeout,
                    "handler timed out"
                );
                Err(DispatchError::Timeout(self.config.handler_timeout))
            }
        }
    }

    /// Failed result for `action` explaining `err`.
    ///
    /// The friendly message is the handler's own when it supplied one and the
    /// generic template otherwise; the diagnostic is the raw error text.
    pub fn failed_result(action: &OrchestrationAction, err: &DispatchError) -> OrchestrationResult {
        let friendly = match err {
            DispatchError::Provisioning(e) => e.friendly_message().map(str::to_owned),
            _ => None,
        }
        .unwrap_or_else(|| friendly_failure_message(&action.subscription_id));
        action.failed_result(FailureDetail::new(friendly, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use provisor_core::{EventKind, OrchestrationState, SubscriptionEvent, SuccessPayload};
    use provisor_handler::{Handler, ProvisioningError};

    use super::*;

    /// Records every action it sees and answers with a login URL named
    /// after itself.
    struct RecordingHandler {
        name: String,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Handler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(
            &self,
            action: &OrchestrationAction,
        ) -> Result<SuccessPayload, ProvisioningError> {
            self.calls
                .lock()
                .unwrap()
                .push(action.operation_id.to_string());
            Ok(SuccessPayload::empty().with_login_url(format!("http://{}.test", self.name)))
        }
    }

    struct FailingHandler(ProvisioningError);

    impl Handler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(
            &self,
            _action: &OrchestrationAction,
        ) -> Result<SuccessPayload, ProvisioningError> {
            Err(self.0.clone())
        }
    }

    struct SlowHandler {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowHandler {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    impl Handler for SlowHandler {
        fn name(&self) -> &str {
            "slow"
        }

        async fn handle(
            &self,
            _action: &OrchestrationAction,
        ) -> Result<SuccessPayload, ProvisioningError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(SuccessPayload::empty())
        }
    }

    fn action(event: impl Into<EventKind>) -> OrchestrationAction {
        OrchestrationAction::new("op-1", "app-1", "tenant-1", "sub-1", event)
    }

    fn dispatcher(handlers: HandlerRegistry) -> ActivityDispatcher {
        ActivityDispatcher::new(DispatcherConfig::default(), handlers)
    }

    #[tokio::test]
    async fn each_event_invokes_only_its_handler() {
        let recorders: Vec<Arc<RecordingHandler>> = SubscriptionEvent::ALL
            .iter()
            .map(|e| RecordingHandler::new(&e.as_str().to_ascii_lowercase()))
            .collect();
        let as_dyn = |i: usize| -> Arc<dyn DynHandler> { recorders[i].clone() };
        let d = dispatcher(HandlerRegistry::new(
            as_dyn(0),
            as_dyn(1),
            as_dyn(2),
            as_dyn(3),
            as_dyn(4),
        ));

        for (i, event) in SubscriptionEvent::ALL.into_iter().enumerate() {
            let result = d.dispatch(&action(event)).await;
            assert_eq!(result.state, OrchestrationState::Succeeded);
            let expected = format!("http://{}.test", event.as_str().to_ascii_lowercase());
            assert_eq!(result.login_url.as_deref(), Some(expected.as_str()));

            for (j, recorder) in recorders.iter().enumerate() {
                let expected_calls = usize::from(j <= i);
                assert_eq!(recorder.call_count(), expected_calls, "after {event}");
            }
        }
    }

    #[tokio::test]
    async fn unsupported_event_yields_failed_result() {
        let recorder = RecordingHandler::new("any");
        let d = dispatcher(HandlerRegistry::uniform(recorder.clone()));
        let input = action(EventKind::from_value(serde_json::Value::from(999)));

        let err = d.try_dispatch(&input).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedEvent(ref raw) if raw == "999"));

        let result = d.dispatch(&input).await;
        assert_eq!(result.state, OrchestrationState::Failed);
        assert_eq!(result.operation_id, input.operation_id);
        assert_eq!(result.tenant_id, input.tenant_id);
        assert_eq!(result.subscription_id, input.subscription_id);
        assert_eq!(result.application_id, input.application_id);

        let detail = result.failure_detail.expect("failure detail");
        assert!(detail.friendly_message.contains("sub-1"));
        assert!(detail.detailed_message.contains("999"));
        assert_eq!(recorder.call_count(), 0);
    }

    #[tokio::test]
    async fn handler_failure_uses_template_and_raw_diagnostic() {
        let d = dispatcher(HandlerRegistry::uniform(Arc::new(FailingHandler(
            ProvisioningError::rejected("license server returned 503"),
        ))));

        let result = d.dispatch(&action(SubscriptionEvent::Create)).await;
        assert!(result.is_failed());
        assert!(result.login_url.is_none());
        let detail = result.failure_detail.unwrap();
        assert_eq!(
            detail.friendly_message,
            "Oops! Something went wrong while trying to action against subscription with Id sub-1"
        );
        assert_eq!(detail.detailed_message, "license server returned 503");
    }

    #[tokio::test]
    async fn handler_friendly_message_wins() {
        let d = dispatcher(HandlerRegistry::uniform(Arc::new(FailingHandler(
            ProvisioningError::rejected_with_friendly("Plan is sold out", "inventory empty"),
        ))));

        let detail = d
            .dispatch(&action(SubscriptionEvent::Update))
            .await
            .failure_detail
            .unwrap();
        assert_eq!(detail.friendly_message, "Plan is sold out");
        assert_eq!(detail.detailed_message, "inventory empty");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let d = ActivityDispatcher::new(
            DispatcherConfig {
                handler_timeout: Duration::from_secs(1),
                max_concurrent: 4,
            },
            HandlerRegistry::uniform(SlowHandler::new(Duration::from_secs(60))),
        );

        let err = d
            .try_dispatch(&action(SubscriptionEvent::Suspend))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(t) if t == Duration::from_secs(1)));
        assert!(err.is_interrupted());

        let result = d.dispatch(&action(SubscriptionEvent::Suspend)).await;
        let detail = result.failure_detail.unwrap();
        assert_eq!(detail.detailed_message, "handler timed out after 1s");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let slow = SlowHandler::new(Duration::from_millis(100));
        let d = Arc::new(ActivityDispatcher::new(
            DispatcherConfig {
                handler_timeout: Duration::from_secs(5),
                max_concurrent: 2,
            },
            HandlerRegistry::uniform(slow.clone()),
        ));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let d = Arc::clone(&d);
            handles.push(tokio::spawn(async move {
                d.dispatch(&action(SubscriptionEvent::Create)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert_eq!(slow.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_dispatcher_refuses_work() {
        let recorder = RecordingHandler::new("any");
        let d = dispatcher(HandlerRegistry::uniform(recorder.clone()));
        d.close();

        let err = d
            .try_dispatch(&action(SubscriptionEvent::Delete))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Closed));
        assert_eq!(recorder.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn held_permit_blocks_other_dispatches() {
        let recorder = RecordingHandler::new("any");
        let d = ActivityDispatcher::new(
            DispatcherConfig {
                handler_timeout: Duration::from_secs(1),
                max_concurrent: 1,
            },
            HandlerRegistry::uniform(recorder.clone()),
        );

        let permit = d.acquire().await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_secs(10),
            d.try_dispatch(&action(SubscriptionEvent::Create)),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(recorder.call_count(), 0);

        let result = d
            .dispatch_permitted(&permit, &action(SubscriptionEvent::Create))
            .await
            .unwrap();
        assert!(result.is_success());
        drop(permit);

        assert!(d.dispatch(&action(SubscriptionEvent::Update)).await.is_success());
        assert_eq!(recorder.call_count(), 2);
    }
}
