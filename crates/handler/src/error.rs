use thiserror::Error;

/// Failure reported by a provisioning handler.
///
/// Every variant carries diagnostic text for operators. A handler may also
/// attach a message meant for the subscriber; when it does not, the
/// dispatcher substitutes a generic one.
#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    /// The downstream system refused or failed the change.
    #[error("{diagnostic}")]
    Rejected {
        friendly: Option<String>,
        diagnostic: String,
    },

    /// The downstream system could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The handler is misconfigured.
    #[error("invalid handler configuration: {0}")]
    Configuration(String),
}

impl ProvisioningError {
    /// A rejection with diagnostic text only.
    pub fn rejected(diagnostic: impl Into<String>) -> Self {
        Self::Rejected {
            friendly: None,
            diagnostic: diagnostic.into(),
        }
    }

    /// A rejection carrying both a subscriber-facing and a diagnostic message.
    pub fn rejected_with_friendly(
        friendly: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            friendly: Some(friendly.into()),
            diagnostic: diagnostic.into(),
        }
    }

    /// The subscriber-facing message, if the handler supplied one.
    pub fn friendly_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { friendly, .. } => friendly.as_deref().filter(|m| !m.trim().is_empty()),
            Self::Connection(_) | Self::Configuration(_) => None,
        }
    }

    /// Raw error text for the failure's diagnostic field.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}
