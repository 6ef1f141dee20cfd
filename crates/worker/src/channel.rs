use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use provisor_core::MessageId;

/// A message received from the inbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport-assigned identifier, distinct per message.
    pub message_id: MessageId,
    /// Raw body, expected to be an encoded orchestration action.
    pub body: Bytes,
    /// How many times this message has been handed out, starting at 1.
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(message_id: impl Into<MessageId>, body: impl Into<Bytes>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            delivery_count: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Errors reported by an inbound channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    /// Settlement referred to a message that is not currently delivered.
    #[error("message {0} is not in flight")]
    UnknownDelivery(MessageId),

    #[error("channel transport error: {0}")]
    Transport(String),
}

/// At-least-once source of orchestration actions.
///
/// Every message returned by [`receive`](InboundChannel::receive) must be
/// settled exactly once with `ack`, `abandon`, or `dead_letter`. A message
/// that is never settled is delivered again by the transport.
#[async_trait]
pub trait InboundChannel: Send + Sync {
    /// Wait for the next message. `None` means the channel is closed and
    /// drained.
    async fn receive(&self) -> Result<Option<InboundMessage>, ChannelError>;

    /// Remove the message permanently.
    async fn ack(&self, message: &InboundMessage) -> Result<(), ChannelError>;

    /// Return the message for redelivery after the given delay.
    async fn abandon(
        &self,
        message: &InboundMessage,
        redeliver_after: Duration,
    ) -> Result<(), ChannelError>;

    /// Move the message to the dead-letter sub-queue.
    async fn dead_letter(&self, message: &InboundMessage, reason: &str)
    -> Result<(), ChannelError>;
}
