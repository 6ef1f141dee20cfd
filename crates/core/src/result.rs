use serde::{Deserialize, Serialize};

use crate::types::{ApplicationId, OperationId, SubscriptionId, TenantId};

/// Terminal state of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestrationState {
    Succeeded,
    Failed,
}

/// Explanation attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    /// Message safe to show to the subscriber.
    #[serde(alias = "FriendlyMessage")]
    pub friendly_message: String,
    /// Internal diagnostic text for operators.
    #[serde(alias = "DetailedMessage")]
    pub detailed_message: String,
}

impl FailureDetail {
    #[must_use]
    pub fn new(friendly_message: impl Into<String>, detailed_message: impl Into<String>) -> Self {
        Self {
            friendly_message: friendly_message.into(),
            detailed_message: detailed_message.into(),
        }
    }
}

/// What a handler hands back when the provisioning side effect succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_time_login_url: Option<String>,
}

impl SuccessPayload {
    /// A success that carries no login links.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_first_time_login_url(mut self, url: impl Into<String>) -> Self {
        self.first_time_login_url = Some(url.into());
        self
    }
}

/// The terminal outcome published downstream for one operation.
///
/// Identifiers are always copied from the triggering action; build results
/// through [`OrchestrationAction::success_result`](crate::OrchestrationAction::success_result)
/// or [`OrchestrationAction::failed_result`](crate::OrchestrationAction::failed_result).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub operation_id: OperationId,
    pub tenant_id: TenantId,
    pub subscription_id: SubscriptionId,
    pub application_id: ApplicationId,
    pub state: OrchestrationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_time_login_url: Option<String>,
    /// Present only when `state` is [`OrchestrationState::Failed`].
    #[serde(
        default,
        rename = "failureMessage",
        alias = "failureDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_detail: Option<FailureDetail>,
}

impl OrchestrationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == OrchestrationState::Succeeded
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == OrchestrationState::Failed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{OrchestrationAction, SubscriptionEvent};

    fn action() -> OrchestrationAction {
        OrchestrationAction::new("op-1", "app-1", "tenant-1", "sub-1", SubscriptionEvent::Create)
    }

    #[test]
    fn success_result_omits_empty_fields() {
        let result = action().success_result(SuccessPayload::empty());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "operationId": "op-1",
                "tenantId": "tenant-1",
                "subscriptionId": "sub-1",
                "applicationId": "app-1",
                "state": "Succeeded",
            })
        );
        assert!(result.is_success());
    }

    #[test]
    fn failed_result_carries_failure_message() {
        let result = action().failed_result(FailureDetail::new("try later", "db down"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["state"], "Failed");
        assert_eq!(value["failureMessage"]["friendlyMessage"], "try later");
        assert_eq!(value["failureMessage"]["detailedMessage"], "db down");
        assert!(result.login_url.is_none());
        assert!(result.is_failed());
    }

    #[test]
    fn success_payload_links() {
        let payload = SuccessPayload::empty()
            .with_login_url("https://app.test/login")
            .with_first_time_login_url("https://app.test/welcome");
        let result = action().success_result(payload);
        assert_eq!(result.login_url.as_deref(), Some("https://app.test/login"));
        assert_eq!(
            result.first_time_login_url.as_deref(),
            Some("https://app.test/welcome")
        );
        assert!(result.failure_detail.is_none());
    }
}
