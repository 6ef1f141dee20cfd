use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::EventKind;
use crate::result::{FailureDetail, OrchestrationResult, OrchestrationState, SuccessPayload};
use crate::types::{ApplicationId, OperationId, PlanId, SubscriptionId, TenantId};

/// A named value captured from the subscriber at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserField {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Value")]
    pub value: String,
}

/// A lifecycle request received from the upstream producer.
///
/// Property names are camelCase on the wire; the PascalCase spelling used by
/// older producers is accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationAction {
    /// Unique per logical request. Redeliveries of the same request reuse it.
    #[serde(alias = "OperationId")]
    pub operation_id: OperationId,

    #[serde(alias = "ApplicationId")]
    pub application_id: ApplicationId,

    #[serde(alias = "TenantId")]
    pub tenant_id: TenantId,

    #[serde(alias = "SubscriptionId")]
    pub subscription_id: SubscriptionId,

    #[serde(default, alias = "PlanId", skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,

    /// Requested lifecycle transition.
    #[serde(rename = "event", alias = "Event", alias = "eventKind")]
    pub event_kind: EventKind,

    /// Ordered name/value pairs supplied by the subscriber.
    #[serde(default, alias = "UserFields")]
    pub user_fields: Vec<UserField>,

    #[serde(default, alias = "ActionDetails", skip_serializing_if = "Option::is_none")]
    pub action_details: Option<HashMap<String, String>>,
}

impl OrchestrationAction {
    /// Create an action with the required identifiers and no optional data.
    #[must_use]
    pub fn new(
        operation_id: impl Into<OperationId>,
        application_id: impl Into<ApplicationId>,
        tenant_id: impl Into<TenantId>,
        subscription_id: impl Into<SubscriptionId>,
        event_kind: impl Into<EventKind>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            application_id: application_id.into(),
            tenant_id: tenant_id.into(),
            subscription_id: subscription_id.into(),
            plan_id: None,
            event_kind: event_kind.into(),
            user_fields: Vec::new(),
            action_details: None,
        }
    }

    /// Decode an action from a raw message body.
    ///
    /// Fails when the body is not JSON, a required property is missing, or
    /// one of the identifiers is blank.
    pub fn from_slice(body: &[u8]) -> Result<Self, CoreError> {
        let action: Self = serde_json::from_slice(body)?;
        let identifiers = [
            ("operationId", action.operation_id.as_str()),
            ("applicationId", action.application_id.as_str()),
            ("tenantId", action.tenant_id.as_str()),
            ("subscriptionId", action.subscription_id.as_str()),
        ];
        if let Some((name, _)) = identifiers.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(CoreError::MalformedAction(format!("{name} is blank")));
        }
        Ok(action)
    }

    #[must_use]
    pub fn with_plan(mut self, plan_id: impl Into<PlanId>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    #[must_use]
    pub fn with_user_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_fields.push(UserField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.action_details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// First user field with the given name.
    #[must_use]
    pub fn user_field(&self, name: &str) -> Option<&str> {
        self.user_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Build a succeeded result for this action.
    #[must_use]
    pub fn success_result(&self, payload: SuccessPayload) -> OrchestrationResult {
        OrchestrationResult {
            operation_id: self.operation_id.clone(),
            tenant_id: self.tenant_id.clone(),
            subscription_id: self.subscription_id.clone(),
            application_id: self.application_id.clone(),
            state: OrchestrationState::Succeeded,
            login_url: payload.login_url,
            first_time_login_url: payload.first_time_login_url,
            failure_detail: None,
        }
    }

    /// Build a failed result for this action.
    #[must_use]
    pub fn failed_result(&self, detail: FailureDetail) -> OrchestrationResult {
        OrchestrationResult {
            operation_id: self.operation_id.clone(),
            tenant_id: self.tenant_id.clone(),
            subscription_id: self.subscription_id.clone(),
            application_id: self.application_id.clone(),
            state: OrchestrationState::Failed,
            login_url: None,
            first_time_login_url: None,
            failure_detail: Some(detail),
        }
    }
}
