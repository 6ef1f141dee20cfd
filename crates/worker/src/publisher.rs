use async_trait::async_trait;
use thiserror::Error;

use provisor_core::OrchestrationResult;

/// Errors from publishing a result.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("result serialization failed: {0}")]
    Serialization(String),

    #[error("result channel unreachable: {0}")]
    Transport(String),

    /// The destination answered but refused the result.
    #[error("result rejected: {0}")]
    Rejected(String),
}

/// Sink for terminal orchestration results.
///
/// Publishing must be safe to repeat: consumers key on `operationId` and a
/// replayed result is identical to the original.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, result: &OrchestrationResult) -> Result<(), PublishError>;

    /// Human-readable destination, used in logs.
    fn destination(&self) -> &str;
}
