use thiserror::Error;

/// Errors raised while interpreting action and result models.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An event name or ordinal that is not part of the lifecycle enumeration.
    #[error("unknown subscription event: {0}")]
    UnknownEvent(String),

    /// The raw message body could not be decoded into an action.
    #[error("malformed action: {0}")]
    MalformedAction(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedAction(e.to_string())
    }
}
