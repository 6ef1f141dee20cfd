//! In-process channel and publisher, used by the server's local ingress and
//! by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use provisor_core::{MessageId, OrchestrationResult};

use crate::channel::{ChannelError, InboundChannel, InboundMessage};
use crate::publisher::{PublishError, ResultPublisher};

/// A message moved to the dead-letter list.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterEntry {
    pub message_id: MessageId,
    /// Body as UTF-8, lossily decoded.
    pub body: String,
    pub delivery_count: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Queues {
    ready: VecDeque<InboundMessage>,
    delayed: Vec<(Instant, InboundMessage)>,
    in_flight: HashMap<MessageId, InboundMessage>,
    dead: Vec<DeadLetterEntry>,
    acked: usize,
    closed: bool,
}

impl Queues {
    /// Move every delayed message whose time has come onto the ready queue.
    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, message) = self.delayed.swap_remove(i);
                self.ready.push_back(message);
            } else {
                i += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn settle(&mut self, message: &InboundMessage) -> Result<InboundMessage, ChannelError> {
        self.in_flight
            .remove(&message.message_id)
            .ok_or_else(|| ChannelError::UnknownDelivery(message.message_id.clone()))
    }
}

/// An [`InboundChannel`] held entirely in memory.
///
/// Abandoned messages become visible again after their redelivery delay and
/// each hand-out bumps the delivery count, mirroring a broker with peek-lock
/// semantics. After [`close`](Self::close), `send` is refused and `receive`
/// returns `None` once nothing is ready, delayed, or in flight.
#[derive(Default)]
pub struct MemoryChannel {
    queues: Mutex<Queues>,
    notify: Notify,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body under a fresh message id.
    pub fn send(&self, body: impl Into<Bytes>) -> Result<MessageId, ChannelError> {
        self.send_with_id(Uuid::new_v4().to_string(), body)
    }

    pub fn send_with_id(
        &self,
        message_id: impl Into<MessageId>,
        body: impl Into<Bytes>,
    ) -> Result<MessageId, ChannelError> {
        let message = InboundMessage::new(message_id, body);
        let id = message.message_id.clone();
        {
            let mut queues = self.queues.lock();
            if queues.closed {
                return Err(ChannelError::Closed);
            }
            queues.ready.push_back(message);
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    /// Refuse further sends.
    pub fn close(&self) {
        self.queues.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.queues.lock().closed
    }

    pub fn acked_count(&self) -> usize {
        self.queues.lock().acked
    }

    /// Messages waiting to be delivered, including delayed ones.
    pub fn pending(&self) -> usize {
        let queues = self.queues.lock();
        queues.ready.len() + queues.delayed.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.queues.lock().in_flight.len()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.queues.lock().dead.len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.queues.lock().dead.clone()
    }

    /// Remove and return everything on the dead-letter list.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetterEntry> {
        std::mem::take(&mut self.queues.lock().dead)
    }
}

#[async_trait]
impl InboundChannel for MemoryChannel {
    async fn receive(&self) -> Result<Option<InboundMessage>, ChannelError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut queues = self.queues.lock();
                queues.promote_due(Instant::now());
                if let Some(mut message) = queues.ready.pop_front() {
                    message.delivery_count += 1;
                    queues
                        .in_flight
                        .insert(message.message_id.clone(), message.clone());
                    return Ok(Some(message));
                }
                if queues.closed && queues.delayed.is_empty() && queues.in_flight.is_empty() {
                    return Ok(None);
                }
                queues.next_due()
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn ack(&self, message: &InboundMessage) -> Result<(), ChannelError> {
        {
            let mut queues = self.queues.lock();
            queues.settle(message)?;
            queues.acked += 1;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn abandon(
        &self,
        message: &InboundMessage,
        redeliver_after: Duration,
    ) -> Result<(), ChannelError> {
        {
            let mut queues = self.queues.lock();
            let message = queues.settle(message)?;
            if redeliver_after.is_zero() {
                queues.ready.push_back(message);
            } else {
                queues
                    .delayed
                    .push((Instant::now() + redeliver_after, message));
            }
        }
        debug!(message_id = %message.message_id, ?redeliver_after, "message abandoned");
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        reason: &str,
    ) -> Result<(), ChannelError> {
        {
            let mut queues = self.queues.lock();
            let message = queues.settle(message)?;
            queues.dead.push(DeadLetterEntry {
                body: String::from_utf8_lossy(&message.body).into_owned(),
                message_id: message.message_id,
                delivery_count: message.delivery_count,
                reason: reason.to_owned(),
                dead_lettered_at: Utc::now(),
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

/// A [`ResultPublisher`] that records every result it is given.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<OrchestrationResult>>,
    failures_remaining: AtomicUsize,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publish calls fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<OrchestrationResult> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl ResultPublisher for MemoryPublisher {
    async fn publish(&self, result: &OrchestrationResult) -> Result<(), PublishError> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(PublishError::Transport(String::from(
                "injected publish failure",
            )));
        }
        self.published.lock().push(result.clone());
        Ok(())
    }

    fn destination(&self) -> &str {
        "memory"
    }
}
