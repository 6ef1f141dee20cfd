//! The orchestration worker: pulls lifecycle actions from an inbound
//! channel, runs each logical operation's handler at most once, and
//! publishes a terminal result before acknowledging the message.

pub mod builder;
pub mod channel;
pub mod config;
pub mod error;
pub mod guard;
pub mod memory;
pub mod metrics;
pub mod publisher;
pub mod worker;

pub use builder::WorkerBuilder;
pub use channel::{ChannelError, InboundChannel, InboundMessage};
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use guard::{
    Claim, ClaimOutcome, Clock, GuardConfig, GuardError, IdempotencyGuard, OperationRecord,
    RecordStatus,
};
pub use memory::{DeadLetterEntry, MemoryChannel, MemoryPublisher};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use publisher::{PublishError, ResultPublisher};
pub use worker::{OrchestrationWorker, Processed};
