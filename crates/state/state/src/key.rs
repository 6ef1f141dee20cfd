use serde::{Deserialize, Serialize};

/// The kind of record being stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Idempotency record for one logical operation.
    Operation,
}

impl KeyKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Operation => "operation",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address entries in the store.
///
/// The namespace partitions records per inbound source so two workers fed
/// from different queues never share idempotency state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub namespace: String,
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            id: id.into(),
        }
    }

    /// Key of the idempotency record for `operation_id`.
    #[must_use]
    pub fn operation(namespace: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self::new(namespace, KeyKind::Operation, operation_id)
    }

    /// Canonical string form: `namespace:kind:id`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.namespace, self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}
