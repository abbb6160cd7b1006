use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// A durable thread of work for one (tenant, principal) pair. Owns a
/// collection of workflow steps; continued across requests via the
/// `x-context-id` header.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct WorkflowContext {
    pub context_id: String,
    pub tenant_id: String,
    pub principal_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    RequiresApproval,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    /// Transitions form a DAG: in_progress may move to any other state,
    /// requires_approval only to a terminal one, terminal states never
    /// move again.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        match self {
            StepStatus::InProgress => next != StepStatus::InProgress,
            StepStatus::RequiresApproval => next.is_terminal(),
            StepStatus::Completed | StepStatus::Failed => false,
        }
    }
}

/// Who must act on a step: the publisher for human approvals, the
/// principal when the buyer must resubmit, the system when the
/// operation is self-driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepOwner {
    System,
    Publisher,
    Principal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepComment {
    pub user: String,
    pub comment: String,
    pub at: DateTime<Utc>,
}

/// One tracked operation: the request that started it, its state, and
/// an append-only comment log.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct WorkflowStep {
    pub step_id: String,
    pub context_id: String,
    pub tenant_id: String,
    pub step_type: String,
    pub owner: StepOwner,
    pub status: StepStatus,
    pub tool_name: String,
    pub request_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub comments: Vec<StepComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectType {
    MediaBuy,
    Creative,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingAction {
    Create,
    Update,
    ApprovalRequired,
}

/// Links a business object to a workflow step affecting it; webhook
/// delivery on step completion walks these in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct ObjectWorkflowMapping {
    pub step_id: String,
    pub object_type: ObjectType,
    pub object_id: String,
    pub action: MappingAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
pub enum PushAuthScheme {
    #[serde(rename = "HMAC-SHA256")]
    #[strum(serialize = "HMAC-SHA256")]
    HmacSha256,
    #[serde(rename = "Bearer")]
    #[strum(serialize = "Bearer")]
    Bearer,
    #[default]
    #[serde(rename = "None")]
    #[strum(serialize = "None")]
    None,
}

/// Webhook registration for async status updates, upsert-keyed by id,
/// scoped to (tenant, principal).
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct PushNotificationConfig {
    pub id: String,
    pub tenant_id: String,
    pub principal_id: String,
    pub url: String,
    #[serde(default)]
    #[builder(default)]
    pub auth_scheme: PushAuthScheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub credentials: Option<String>,
    #[serde(default = "default_true")]
    #[builder(default = "true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_dag() {
        use StepStatus::*;

        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(RequiresApproval));
        assert!(!InProgress.can_transition_to(InProgress));

        assert!(RequiresApproval.can_transition_to(Completed));
        assert!(RequiresApproval.can_transition_to(Failed));
        assert!(!RequiresApproval.can_transition_to(InProgress));
        assert!(!RequiresApproval.can_transition_to(RequiresApproval));

        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
    }

    #[test]
    fn test_push_auth_scheme_wire_names() {
        assert_eq!(
            serde_json::to_string(&PushAuthScheme::HmacSha256).unwrap(),
            "\"HMAC-SHA256\""
        );
        assert_eq!("Bearer".parse::<PushAuthScheme>().unwrap(), PushAuthScheme::Bearer);
        assert_eq!("None".parse::<PushAuthScheme>().unwrap(), PushAuthScheme::None);
    }
}
