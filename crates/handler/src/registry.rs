use std::sync::Arc;

use provisor_core::SubscriptionEvent;

use crate::handler::DynHandler;
use crate::reference::ReferenceHandler;

/// Fixed mapping from lifecycle event to the handler that services it.
///
/// Every [`SubscriptionEvent`] always has exactly one handler, so lookups
/// cannot fail. Built once at startup and shared behind an `Arc`.
#[derive(Clone)]
pub struct HandlerRegistry {
    create: Arc<dyn DynHandler>,
    update: Arc<dyn DynHandler>,
    suspend: Arc<dyn DynHandler>,
    delete: Arc<dyn DynHandler>,
    reinstate: Arc<dyn DynHandler>,
}

impl HandlerRegistry {
    pub fn new(
        create: Arc<dyn DynHandler>,
        update: Arc<dyn DynHandler>,
        suspend: Arc<dyn DynHandler>,
        delete: Arc<dyn DynHandler>,
        reinstate: Arc<dyn DynHandler>,
    ) -> Self {
        Self {
            create,
            update,
            suspend,
            delete,
            reinstate,
        }
    }

    /// Route every event to the same handler.
    pub fn uniform(handler: Arc<dyn DynHandler>) -> Self {
        Self::new(
            Arc::clone(&handler),
            Arc::clone(&handler),
            Arc::clone(&handler),
            Arc::clone(&handler),
            handler,
        )
    }

    /// Reference handlers for every event.
    pub fn reference(login_url: &str) -> Self {
        let handler = |event| -> Arc<dyn DynHandler> {
            Arc::new(ReferenceHandler::new(event, login_url))
        };
        Self::new(
            handler(SubscriptionEvent::Create),
            handler(SubscriptionEvent::Update),
            handler(SubscriptionEvent::Suspend),
            handler(SubscriptionEvent::Delete),
            handler(SubscriptionEvent::Reinstate),
        )
    }

    /// Replace the handler for one event.
    #[must_use]
    pub fn with_handler(mut self, event: SubscriptionEvent, handler: Arc<dyn DynHandler>) -> Self {
        *self.slot_mut(event) = handler;
        self
    }

    /// The handler responsible for `event`.
    pub fn handler_for(&self, event: SubscriptionEvent) -> &Arc<dyn DynHandler> {
        match event {
            SubscriptionEvent::Create => &self.create,
            SubscriptionEvent::Update => &self.update,
            SubscriptionEvent::Suspend => &self.suspend,
            SubscriptionEvent::Delete => &self.delete,
            SubscriptionEvent::Reinstate => &self.reinstate,
        }
    }

    fn slot_mut(&mut self, event: SubscriptionEvent) -> &mut Arc<dyn DynHandler> {
        match event {
            SubscriptionEvent::Create => &mut self.create,
            SubscriptionEvent::Update => &mut self.update,
            SubscriptionEvent::Suspend => &mut self.suspend,
            SubscriptionEvent::Delete => &mut self.delete,
            SubscriptionEvent::Reinstate => &mut self.reinstate,
        }
    }

    /// Event-to-handler-name pairs in event order.
    pub fn list(&self) -> Vec<(SubscriptionEvent, &str)> {
        SubscriptionEvent::ALL
            .into_iter()
            .map(|event| (event, self.handler_for(event).name()))
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.list()).finish()
    }
}
