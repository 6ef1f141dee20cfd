pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;

pub use backoff::RedeliveryBackoff;
pub use config::DispatcherConfig;
pub use dispatcher::{ActivityDispatcher, DispatchPermit, friendly_failure_message};
pub use error::DispatchError;
