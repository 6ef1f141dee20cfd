use std::time::Duration;

use provisor_handler::ProvisioningError;
use thiserror::Error;

/// Why an action did not produce a successful result.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action named an event outside the lifecycle enumeration.
    #[error("no handler for orchestration event {0}")]
    UnsupportedEvent(String),

    /// The handler reported a failure.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The handler did not finish within the per-action timeout.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    /// The dispatcher has been closed and accepts no new work.
    #[error("dispatcher is closed")]
    Closed,
}

impl DispatchError {
    /// Whether the handler may have been interrupted before finishing, so a
    /// later attempt is allowed to run it again.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            DispatchError::UnsupportedEvent("999".into()).to_string(),
            "no handler for orchestration event 999"
        );
        assert_eq!(
            DispatchError::Timeout(Duration::from_millis(250)).to_string(),
            "handler timed out after 250ms"
        );
        assert_eq!(
            DispatchError::from(ProvisioningError::rejected("quota")).to_string(),
            "quota"
        );
    }

    #[test]
    fn interruption() {
        assert!(DispatchError::Timeout(Duration::from_secs(1)).is_interrupted());
        assert!(DispatchError::Closed.is_interrupted());
        assert!(!DispatchError::UnsupportedEvent("x".into()).is_interrupted());
        assert!(!DispatchError::from(ProvisioningError::rejected("x")).is_interrupted());
    }
}
