use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use provisor_core::{OperationId, OrchestrationResult};
use provisor_state::{CasResult, StateError, StateKey, StateStore, Versioned};

/// Source of wall-clock time for staleness decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// How many times a racing write is retried before giving up.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Errors from the idempotency guard.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("idempotency store unavailable: {0}")]
    Store(#[from] StateError),

    /// Another worker took over the operation after this claim went stale.
    #[error("claim on {operation_id} lost: expected version {expected}, found {found}")]
    ClaimLost {
        operation_id: OperationId,
        expected: u64,
        found: u64,
    },

    /// Concurrent writers kept winning every attempt to update the record.
    #[error("idempotency record for {0} is contended")]
    Contended(OperationId),
}

/// Configuration for the [`IdempotencyGuard`].
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Partition for the records, normally the inbound source name.
    pub namespace: String,
    /// An in-flight claim older than this is considered abandoned.
    pub staleness_threshold: Duration,
    /// How long records are kept before the store may purge them.
    pub retention: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            namespace: String::from("provisor"),
            staleness_threshold: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordStatus {
    /// A worker is running the handler.
    InFlight { claimed_at: DateTime<Utc> },
    /// The handler finished and this result was recorded.
    Completed {
        result: OrchestrationResult,
        completed_at: DateTime<Utc>,
    },
    /// The last attempt gave up without a result; the next one may run.
    Released { released_at: DateTime<Utc> },
    /// Dropped by an operator. Reads treat it as absent, but the entry keeps
    /// the version sequence going so claims taken before the forget cannot
    /// match a later one.
    Forgotten { forgotten_at: DateTime<Utc> },
}

/// The persisted idempotency record of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub status: RecordStatus,
    /// Number of claims taken so far.
    pub attempts: u32,
}

/// Proof that the holder may run the handler for an operation.
///
/// Carries the record version written by the claim, so later writes only
/// land if nobody else has touched the record since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    operation_id: OperationId,
    version: u64,
    attempt: u32,
}

impl Claim {
    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 1 for the first claim, higher after crash recovery or a release.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Outcome of [`IdempotencyGuard::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller owns the operation and should dispatch it.
    Claimed(Claim),
    /// The operation already finished; replay this result.
    Completed(OrchestrationResult),
    /// Another worker holds a live claim.
    Busy,
}

/// Durable dedup of logical operations keyed on `operation_id`.
///
/// All writes go through the store's atomic check-and-set or
/// compare-and-swap, so at most one worker can hold a live claim on an
/// operation.
pub struct IdempotencyGuard {
    store: Arc<dyn StateStore>,
    config: GuardConfig,
    clock: Clock,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn StateStore>, config: GuardConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. with a controllable one in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn key(&self, operation_id: &OperationId) -> StateKey {
        StateKey::operation(self.config.namespace.as_str(), operation_id.as_str())
    }

    fn ttl(&self) -> Option<Duration> {
        Some(self.config.retention)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn is_stale(&self, claimed_at: DateTime<Utc>) -> bool {
        (self.now() - claimed_at)
            .to_std()
            .is_ok_and(|age| age >= self.config.staleness_threshold)
    }

    /// Read and decode the record. An undecodable record is reported as
    /// `None` alongside its version so it can be overwritten.
    async fn read(
        &self,
        key: &StateKey,
    ) -> Result<Option<(Option<OperationRecord>, u64)>, GuardError> {
        let Some(Versioned { value, version }) = self.store.get_versioned(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&value) {
            Ok(record) => Ok(Some((Some(record), version))),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable idempotency record");
                Ok(Some((None, version)))
            }
        }
    }

    fn encode(record: &OperationRecord) -> Result<String, GuardError> {
        serde_json::to_string(record)
            .map_err(|e| GuardError::Store(StateError::Serialization(e.to_string())))
    }

    /// The stored record for an operation, if any. A forgotten operation
    /// has none.
    pub async fn record(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<OperationRecord>, GuardError> {
        Ok(self
            .read(&self.key(operation_id))
            .await?
            .and_then(|(record, _)| record)
            .filter(|record| !matches!(record.status, RecordStatus::Forgotten { .. })))
    }

    /// The completed result for an operation, if one was recorded.
    pub async fn lookup(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<OrchestrationResult>, GuardError> {
        Ok(match self.record(operation_id).await? {
            Some(OperationRecord {
                status: RecordStatus::Completed { result, .. },
                ..
            }) => Some(result),
            _ => None,
        })
    }

    /// Whether a new attempt may run the handler for this operation.
    ///
    /// False once a result is recorded and while a live claim exists. A
    /// claim older than the staleness threshold counts as abandoned.
    pub async fn should_process(&self, operation_id: &OperationId) -> Result<bool, GuardError> {
        Ok(match self.read(&self.key(operation_id)).await? {
            None | Some((None, _)) => true,
            Some((Some(record), _)) => match record.status {
                RecordStatus::Completed { .. } => false,
                RecordStatus::InFlight { claimed_at } => self.is_stale(claimed_at),
                RecordStatus::Released { .. } | RecordStatus::Forgotten { .. } => true,
            },
        })
    }

    /// Atomically take ownership of an operation.
    pub async fn claim(&self, operation_id: &OperationId) -> Result<ClaimOutcome, GuardError> {
        let key = self.key(operation_id);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let now = self.now();
            match self.read(&key).await? {
                None => {
                    let record = OperationRecord {
                        status: RecordStatus::InFlight { claimed_at: now },
                        attempts: 1,
                    };
                    if self
                        .store
                        .check_and_set(&key, &Self::encode(&record)?, self.ttl())
                        .await?
                    {
                        debug!(operation_id = %operation_id, "claimed new operation");
                        return Ok(ClaimOutcome::Claimed(Claim {
                            operation_id: operation_id.clone(),
                            version: 1,
                            attempt: 1,
                        }));
                    }
                }
                Some((Some(record), version)) => {
                    let previous_attempts = match record.status {
                        RecordStatus::Completed { result, .. } => {
                            return Ok(ClaimOutcome::Completed(result));
                        }
                        RecordStatus::InFlight { claimed_at } if !self.is_stale(claimed_at) => {
                            return Ok(ClaimOutcome::Busy);
                        }
                        RecordStatus::InFlight { claimed_at } => {
                            info!(
                                operation_id = %operation_id,
                                %claimed_at,
                                attempts = record.attempts,
                                "reclaiming stale in-flight operation"
                            );
                            record.attempts
                        }
                        RecordStatus::Released { .. } | RecordStatus::Forgotten { .. } => {
                            record.attempts
                        }
                    };
                    if let Some(claim) = self
                        .reclaim(&key, operation_id, version, previous_attempts, now)
                        .await?
                    {
                        return Ok(ClaimOutcome::Claimed(claim));
                    }
                }
                Some((None, version)) => {
                    if let Some(claim) = self.reclaim(&key, operation_id, version, 0, now).await? {
                        return Ok(ClaimOutcome::Claimed(claim));
                    }
                }
            }
        }

        Err(GuardError::Contended(operation_id.clone()))
    }

    async fn reclaim(
        &self,
        key: &StateKey,
        operation_id: &OperationId,
        version: u64,
        previous_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Claim>, GuardError> {
        let attempt = previous_attempts.saturating_add(1);
        let record = OperationRecord {
            status: RecordStatus::InFlight { claimed_at: now },
            attempts: attempt,
        };
        match self
            .store
            .compare_and_swap(key, version, &Self::encode(&record)?, self.ttl())
            .await?
        {
            CasResult::Ok { version } => Ok(Some(Claim {
                operation_id: operation_id.clone(),
                version,
                attempt,
            })),
            CasResult::Conflict { .. } => Ok(None),
        }
    }

    /// Record the result of a claimed attempt.
    ///
    /// Fails with [`GuardError::ClaimLost`] when the record changed since the
    /// claim was taken.
    pub async fn complete(
        &self,
        claim: &Claim,
        result: &OrchestrationResult,
    ) -> Result<(), GuardError> {
        let record = OperationRecord {
            status: RecordStatus::Completed {
                result: result.clone(),
                completed_at: self.now(),
            },
            attempts: claim.attempt,
        };
        let key = self.key(&claim.operation_id);
        match self
            .store
            .compare_and_swap(&key, claim.version, &Self::encode(&record)?, self.ttl())
            .await?
        {
            CasResult::Ok { .. } => {
                debug!(operation_id = %claim.operation_id, "operation completed");
                Ok(())
            }
            CasResult::Conflict {
                current_version, ..
            } => Err(GuardError::ClaimLost {
                operation_id: claim.operation_id.clone(),
                expected: claim.version,
                found: current_version,
            }),
        }
    }

    /// Record a result for an operation regardless of who holds the claim.
    ///
    /// A result that is already recorded is left untouched.
    pub async fn mark_complete(
        &self,
        operation_id: &OperationId,
        result: &OrchestrationResult,
    ) -> Result<(), GuardError> {
        let key = self.key(operation_id);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let (attempts, version) = match self.read(&key).await? {
                None => (1, 0),
                Some((Some(record), version)) => {
                    if matches!(record.status, RecordStatus::Completed { .. }) {
                        return Ok(());
                    }
                    (record.attempts.max(1), version)
                }
                Some((None, version)) => (1, version),
            };
            let record = OperationRecord {
                status: RecordStatus::Completed {
                    result: result.clone(),
                    completed_at: self.now(),
                },
                attempts,
            };
            if let CasResult::Ok { .. } = self
                .store
                .compare_and_swap(&key, version, &Self::encode(&record)?, self.ttl())
                .await?
            {
                return Ok(());
            }
        }

        Err(GuardError::Contended(operation_id.clone()))
    }

    /// Give up a claim without a result so a later delivery may retry.
    ///
    /// Returns `false` if the claim had already been lost.
    pub async fn release(&self, claim: &Claim) -> Result<bool, GuardError> {
        let record = OperationRecord {
            status: RecordStatus::Released {
                released_at: self.now(),
            },
            attempts: claim.attempt,
        };
        let key = self.key(&claim.operation_id);
        match self
            .store
            .compare_and_swap(&key, claim.version, &Self::encode(&record)?, self.ttl())
            .await?
        {
            CasResult::Ok { .. } => {
                debug!(operation_id = %claim.operation_id, "claim released");
                Ok(true)
            }
            CasResult::Conflict {
                current_version, ..
            } => {
                warn!(
                    operation_id = %claim.operation_id,
                    expected = claim.version,
                    found = current_version,
                    "claim was lost before release"
                );
                Ok(false)
            }
        }
    }

    /// Drop the record for an operation so the next delivery runs the
    /// handler again. Returns `true` if there was one to drop.
    ///
    /// The entry is overwritten with a [`RecordStatus::Forgotten`] marker
    /// rather than deleted: deleting would restart versions at 1, and a claim
    /// taken before the forget could then complete over a newer claim that
    /// happens to hold the same version. The marker expires with the
    /// retention window like any other record.
    pub async fn forget(&self, operation_id: &OperationId) -> Result<bool, GuardError> {
        let key = self.key(operation_id);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let (attempts, version) = match self.read(&key).await? {
                None => return Ok(false),
                Some((Some(record), _))
                    if matches!(record.status, RecordStatus::Forgotten { .. }) =>
                {
                    return Ok(false);
                }
                Some((Some(record), version)) => (record.attempts, version),
                Some((None, version)) => (0, version),
            };
            let record = OperationRecord {
                status: RecordStatus::Forgotten {
                    forgotten_at: self.now(),
                },
                attempts,
            };
            if let CasResult::Ok { .. } = self
                .store
                .compare_and_swap(&key, version, &Self::encode(&record)?, self.ttl())
                .await?
            {
                info!(operation_id = %operation_id, "operation forgotten");
                return Ok(true);
            }
        }

        Err(GuardError::Contended(operation_id.clone()))
    }
}
