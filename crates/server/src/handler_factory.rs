use std::sync::Arc;
use std::time::Duration;

use provisor_core::SubscriptionEvent;
use provisor_handler::{DynHandler, HandlerRegistry, WebhookHandler};
use tracing::info;

use crate::config::HandlersConfig;
use crate::error::ServerError;

/// Build the handler registry named by `[handlers]`.
///
/// Webhook handlers get a request timeout equal to the dispatcher's handler
/// timeout so the HTTP call is abandoned together with the attempt.
pub fn create_handlers(
    config: &HandlersConfig,
    handler_timeout: Duration,
) -> Result<HandlerRegistry, ServerError> {
    let registry = match config.mode.as_str() {
        "reference" => HandlerRegistry::reference(&config.login_url),
        "webhook" => {
            let base = config.webhook_url.as_deref().ok_or_else(|| {
                ServerError::Config("webhook handler mode requires 'webhook_url' in [handlers]".into())
            })?;
            let base = base.trim_end_matches('/');
            let webhook = |event: SubscriptionEvent| -> Result<Arc<dyn DynHandler>, ServerError> {
                let path = event.as_str().to_ascii_lowercase();
                let handler = WebhookHandler::new(format!("webhook-{path}"), format!("{base}/{path}"))
                    .with_timeout(handler_timeout)
                    .map_err(|e| ServerError::Config(e.to_string()))?;
                Ok(Arc::new(handler))
            };
            HandlerRegistry::new(
                webhook(SubscriptionEvent::Create)?,
                webhook(SubscriptionEvent::Update)?,
                webhook(SubscriptionEvent::Suspend)?,
                webhook(SubscriptionEvent::Delete)?,
                webhook(SubscriptionEvent::Reinstate)?,
            )
        }
        other => {
            return Err(ServerError::Config(format!(
                "unsupported handler mode: {other}"
            )));
        }
    };

    for (event, name) in registry.list() {
        info!(event = event.as_str(), handler = name, "handler registered");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_mode() {
        let registry = create_handlers(&HandlersConfig::default(), Duration::from_secs(30)).unwrap();
        assert_eq!(
            registry.handler_for(SubscriptionEvent::Suspend).name(),
            "reference-suspend"
        );
    }

    #[test]
    fn webhook_mode_routes_each_event_to_its_path() {
        let config = HandlersConfig {
            mode: "webhook".into(),
            webhook_url: Some("http://hooks.test/".into()),
            ..HandlersConfig::default()
        };
        let registry = create_handlers(&config, Duration::from_secs(30)).unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|(_, n)| n.to_owned()).collect();
        assert_eq!(
            names,
            [
                "webhook-create",
                "webhook-update",
                "webhook-suspend",
                "webhook-delete",
                "webhook-reinstate"
            ]
        );
    }

    #[test]
    fn webhook_mode_needs_url() {
        let config = HandlersConfig {
            mode: "webhook".into(),
            ..HandlersConfig::default()
        };
        assert!(create_handlers(&config, Duration::from_secs(30)).is_err());
    }
}
