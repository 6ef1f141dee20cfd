use provisor_state::StateError;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::guard::GuardError;
use crate::publisher::PublishError;

/// Errors surfaced by the orchestration worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The message body is not a valid orchestration action.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The idempotency store could not be reached.
    #[error("idempotency store unavailable: {0}")]
    StoreUnavailable(#[from] StateError),

    #[error("idempotency guard error: {0}")]
    Guard(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<GuardError> for WorkerError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Store(e) => Self::StoreUnavailable(e),
            other => Self::Guard(other.to_string()),
        }
    }
}
