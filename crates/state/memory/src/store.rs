use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use provisor_state::error::StateError;
use provisor_state::key::StateKey;
use provisor_state::store::{CasResult, StateStore, Versioned};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, version: u64, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_owned(),
            version,
            expires_at: expiry_from_ttl(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// Expired entries are evicted lazily on access and in bulk by
/// [`StateStore::purge_expired`]. Nothing survives a process restart, so this
/// backend only suits tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Entry>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn live(&self, rendered: &str) -> Option<Entry> {
        let entry = self.data.get(rendered)?;
        if entry.is_expired() {
            drop(entry);
            self.data.remove_if(rendered, |_, e| e.is_expired());
            return None;
        }
        Some(entry.value().clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        match self.data.entry(key.canonical()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry::new(value, 1, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, 1, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        Ok(self.live(&key.canonical()).map(|e| e.value))
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        Ok(self.live(&key.canonical()).map(|e| Versioned {
            value: e.value,
            version: e.version,
        }))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        match self.data.entry(key.canonical()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let version = if entry.is_expired() { 1 } else { entry.version + 1 };
                *entry = Entry::new(value, version, ttl);
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, 1, ttl));
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        match self.data.remove(&key.canonical()) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        // The map entry stays locked for the whole comparison.
        match self.data.entry(key.canonical()) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let entry = occupied.get_mut();
                if entry.version != expected_version {
                    return Ok(CasResult::Conflict {
                        current_value: Some(entry.value.clone()),
                        current_version: entry.version,
                    });
                }
                let expires_at = expiry_from_ttl(ttl).or(entry.expires_at);
                new_value.clone_into(&mut entry.value);
                entry.version += 1;
                entry.expires_at = expires_at;
                Ok(CasResult::Ok {
                    version: entry.version,
                })
            }
            MapEntry::Occupied(mut expired) => {
                if expected_version != 0 {
                    expired.remove();
                    return Ok(CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    });
                }
                expired.insert(Entry::new(new_value, 1, ttl));
                Ok(CasResult::Ok { version: 1 })
            }
            MapEntry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    });
                }
                vacant.insert(Entry::new(new_value, 1, ttl));
                Ok(CasResult::Ok { version: 1 })
            }
        }
    }

    async fn purge_expired(&self) -> Result<usize, StateError> {
        let mut purged = 0;
        self.data.retain(|_, entry| {
            let keep = !entry.is_expired();
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}
