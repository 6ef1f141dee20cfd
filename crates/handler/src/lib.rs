pub mod error;
pub mod handler;
pub mod reference;
pub mod registry;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use error::ProvisioningError;
pub use handler::{DynHandler, Handler};
pub use provisor_core::SuccessPayload;
pub use reference::ReferenceHandler;
pub use registry::HandlerRegistry;

#[cfg(feature = "webhook")]
pub use webhook::WebhookHandler;
