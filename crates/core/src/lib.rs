pub mod action;
pub mod error;
pub mod event;
pub mod result;
pub mod types;

pub use action::{OrchestrationAction, UserField};
pub use error::CoreError;
pub use event::{EventKind, SubscriptionEvent};
pub use result::{FailureDetail, OrchestrationResult, OrchestrationState, SuccessPayload};
pub use types::{ApplicationId, MessageId, OperationId, PlanId, SubscriptionId, TenantId};
