use provisor_core::{OrchestrationAction, SubscriptionEvent, SuccessPayload};
use tracing::info;

use crate::error::ProvisioningError;
use crate::handler::Handler;

/// Canned handler that acknowledges every action without side effects.
///
/// Create and Delete succeed with no login link. Update, Suspend and
/// Reinstate hand back the configured login URL. Useful as a starting point
/// and for exercising a deployment end to end.
#[derive(Debug, Clone)]
pub struct ReferenceHandler {
    event: SubscriptionEvent,
    name: String,
    login_url: Option<String>,
}

impl ReferenceHandler {
    /// Reference behaviour for `event`, using `login_url` where the event
    /// reports one.
    pub fn new(event: SubscriptionEvent, login_url: impl Into<String>) -> Self {
        let login_url = match event {
            SubscriptionEvent::Create | SubscriptionEvent::Delete => None,
            SubscriptionEvent::Update
            | SubscriptionEvent::Suspend
            | SubscriptionEvent::Reinstate => Some(login_url.into()),
        };
        Self {
            event,
            name: format!("reference-{}", event.as_str().to_ascii_lowercase()),
            login_url,
        }
    }

    pub fn event(&self) -> SubscriptionEvent {
        self.event
    }
}

impl Handler for ReferenceHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        action: &OrchestrationAction,
    ) -> Result<SuccessPayload, ProvisioningError> {
        info!(
            handler = %self.name,
            operation_id = %action.operation_id,
            subscription_id = %action.subscription_id,
            "reference handler acknowledged action"
        );
        let payload = SuccessPayload::empty();
        Ok(match &self.login_url {
            Some(url) => payload.with_login_url(url.clone()),
            None => payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://mycoolwebsite.net";

    fn action(event: SubscriptionEvent) -> OrchestrationAction {
        OrchestrationAction::new("op", "app", "tenant", "sub", event)
    }

    #[tokio::test]
    async fn create_and_delete_have_no_login_url() {
        for event in [SubscriptionEvent::Create, SubscriptionEvent::Delete] {
            let handler = ReferenceHandler::new(event, URL);
            let payload = Handler::handle(&handler, &action(event)).await.unwrap();
            assert!(payload.login_url.is_none(), "{event} should not report a URL");
        }
    }

    #[tokio::test]
    async fn other_events_report_login_url() {
        for event in [
            SubscriptionEvent::Update,
            SubscriptionEvent::Suspend,
            SubscriptionEvent::Reinstate,
        ] {
            let handler = ReferenceHandler::new(event, URL);
            let payload = Handler::handle(&handler, &action(event)).await.unwrap();
            assert_eq!(payload.login_url.as_deref(), Some(URL));
            assert!(payload.first_time_login_url.is_none());
        }
    }

    #[test]
    fn names_follow_event() {
        let handler = ReferenceHandler::new(SubscriptionEvent::Reinstate, URL);
        assert_eq!(Handler::name(&handler), "reference-reinstate");
        assert_eq!(handler.event(), SubscriptionEvent::Reinstate);
    }
}
