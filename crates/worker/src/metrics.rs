use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking worker outcomes.
///
/// Counters use relaxed ordering; call [`snapshot`](Self::snapshot) for a
/// point-in-time view.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Messages taken from the inbound channel.
    pub received: AtomicU64,
    /// Actions handed to the dispatcher.
    pub dispatched: AtomicU64,
    /// Published results in the succeeded state.
    pub succeeded: AtomicU64,
    /// Published results in the failed state.
    pub failed: AtomicU64,
    /// Deliveries answered from a stored result without dispatching.
    pub replayed: AtomicU64,
    /// Deliveries deferred because another slot held the claim.
    pub busy: AtomicU64,
    /// Deliveries abandoned so a later delivery can retry them.
    pub deferred: AtomicU64,
    /// Messages moved to the dead-letter path.
    pub dead_lettered: AtomicU64,
    /// Result publish attempts that failed.
    pub publish_failures: AtomicU64,
    /// Deliveries whose body could not be decoded.
    pub malformed: AtomicU64,
}

impl WorkerMetrics {
    pub fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replayed(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`WorkerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub replayed: u64,
    pub busy: u64,
    pub deferred: u64,
    pub dead_lettered: u64,
    pub publish_failures: u64,
    pub malformed: u64,
}
