use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded; the entry now holds the new value at `version`.
    Ok { version: u64 },
    /// The swap failed because the current version didn't match.
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// A stored value together with its version.
///
/// Versions start at 1 when an entry is created and increase by one on every
/// write. An absent entry is treated as version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

/// Durable key-value storage for idempotency records.
///
/// Implementations must be `Send + Sync` and safe for concurrent access. The
/// atomic operations (`check_and_set`, `compare_and_swap`) are the only way
/// two workers may race on the same key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Get the value and version for a key.
    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>)
    -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Replace the value only if the stored version equals `expected_version`.
    ///
    /// An `expected_version` of 0 succeeds only when the key is absent.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// Remove entries whose TTL has elapsed and return how many were dropped.
    ///
    /// Backends with native expiry have nothing to do here.
    async fn purge_expired(&self) -> Result<usize, StateError> {
        Ok(0)
    }

    /// Verify that the backend is reachable.
    async fn ping(&self) -> Result<(), StateError> {
        Ok(())
    }
}
