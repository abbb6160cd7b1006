use crate::core::auth::RequestHeaders;
use crate::core::models::media_buy::{new_context_id, new_push_config_id, new_step_id};
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{
    MappingAction, ObjectType, ObjectWorkflowMapping, PushAuthScheme, PushNotificationConfig,
    StepComment, StepOwner, StepStatus, WorkflowContext, WorkflowStep,
};
use crate::core::notify::SlackNotifier;
use crate::core::spec::requests::PushNotificationConfigInput;
use crate::core::store::Store;
use crate::core::workflow::WebhookDeliverer;
use anyhow::{Error, anyhow};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters for opening a new workflow step.
pub struct StepSpec {
    pub step_type: String,
    pub owner: StepOwner,
    pub status: StepStatus,
    pub tool_name: String,
    pub request_data: Value,
    pub initial_comment: Option<String>,
}

/// Partial update applied to an existing step. Status changes are
/// validated against the transition DAG.
#[derive(Default)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub response_data: Option<Value>,
    pub error_message: Option<String>,
    pub add_comment: Option<(String, String)>,
    pub owner: Option<StepOwner>,
    pub step_type: Option<String>,
    pub assignee: Option<String>,
}

impl StepUpdate {
    pub fn completed() -> Self {
        StepUpdate {
            status: Some(StepStatus::Completed),
            ..Default::default()
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        StepUpdate {
            status: Some(StepStatus::Failed),
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }
}

/// The persistent context + step state machine. Every mutating tool
/// call opens a step here; approvals, webhooks, and the audit trail
/// all hang off it.
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    slack: Arc<SlackNotifier>,
    webhooks: Arc<WebhookDeliverer>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, slack: Arc<SlackNotifier>, webhooks: Arc<WebhookDeliverer>) -> Self {
        WorkflowEngine {
            store,
            slack,
            webhooks,
        }
    }

    /// Reuses the context named by `x-context-id` when it exists for
    /// this tenant, otherwise opens a fresh one.
    pub async fn get_or_create_context(
        &self,
        tenant_id: &str,
        principal_id: &str,
        requested: Option<&str>,
    ) -> Result<WorkflowContext, Error> {
        if let Some(context_id) = requested
            && let Some(existing) = self.store.get_context(tenant_id, context_id).await?
        {
            return Ok(existing);
        }

        let context = WorkflowContext {
            context_id: new_context_id(),
            tenant_id: tenant_id.to_string(),
            principal_id: principal_id.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_context(context.clone()).await?;

        Ok(context)
    }

    pub async fn create_step(&self, context: &WorkflowContext, spec: StepSpec) -> Result<WorkflowStep, Error> {
        let now = Utc::now();
        let comments = spec
            .initial_comment
            .map(|comment| {
                vec![StepComment {
                    user: "system".to_string(),
                    comment,
                    at: now,
                }]
            })
            .unwrap_or_default();

        let step = WorkflowStep {
            step_id: new_step_id(),
            context_id: context.context_id.clone(),
            tenant_id: context.tenant_id.clone(),
            step_type: spec.step_type,
            owner: spec.owner,
            status: spec.status,
            tool_name: spec.tool_name,
            request_data: spec.request_data,
            response_data: None,
            error_message: None,
            assignee: None,
            comments,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_step(step.clone()).await?;
        debug!("Opened workflow step {} ({})", step.step_id, step.step_type);

        Ok(step)
    }

    /// Applies an update, enforcing monotonic status transitions. On a
    /// move into `requires_approval` the publisher is notified; on a
    /// terminal move webhooks fire for every mapped object.
    pub async fn update_step(
        &self,
        tenant: &Tenant,
        step_id: &str,
        update: StepUpdate,
    ) -> Result<WorkflowStep, Error> {
        let mut step = self
            .store
            .get_step(&tenant.tenant_id, step_id)
            .await?
            .ok_or_else(|| anyhow!("Workflow step {} not found", step_id))?;

        let now = Utc::now();
        let transition = update.status;

        if let Some(next) = transition {
            if !step.status.can_transition_to(next) {
                return Err(anyhow!(
                    "Workflow step {} cannot move from {} to {}",
                    step_id,
                    step.status,
                    next
                ));
            }
            step.status = next;
        }

        if let Some(response_data) = update.response_data {
            step.response_data = Some(response_data);
        }
        if let Some(error_message) = update.error_message {
            step.error_message = Some(error_message);
        }
        if let Some(owner) = update.owner {
            step.owner = owner;
        }
        if let Some(step_type) = update.step_type {
            step.step_type = step_type;
        }
        if let Some(assignee) = update.assignee {
            step.assignee = Some(assignee);
        }
        if let Some((user, comment)) = update.add_comment {
            step.comments.push(StepComment {
                user,
                comment,
                at: now,
            });
        }

        step.updated_at = now;
        self.store.update_step(step.clone()).await?;

        // Side effects fire on transitions only; comment or data
        // updates to a parked step stay silent.
        if transition == Some(StepStatus::RequiresApproval) {
            let context = self.store.get_context(&tenant.tenant_id, &step.context_id).await?;
            let principal = context
                .as_ref()
                .map(|c| c.principal_id.clone())
                .unwrap_or_else(|| "unknown".to_string());
            self.slack
                .notify_approval_required(tenant, &step.step_id, &step.tool_name, &principal)
                .await;
        }

        if transition.map(|s| s.is_terminal()).unwrap_or(false) {
            self.dispatch_webhooks(tenant, &step).await?;
        }

        Ok(step)
    }

    /// Spawns delivery of completion webhooks: one payload per mapped
    /// object, serialized in mapping insertion order. Fire-and-forget
    /// from the caller's perspective.
    async fn dispatch_webhooks(&self, tenant: &Tenant, step: &WorkflowStep) -> Result<(), Error> {
        let mappings = self.store.mappings_for_step(&step.step_id).await?;
        if mappings.is_empty() {
            return Ok(());
        }

        let context = self.store.get_context(&tenant.tenant_id, &step.context_id).await?;
        let Some(context) = context else {
            warn!("Step {} has no context; skipping webhook delivery", step.step_id);
            return Ok(());
        };

        let configs = self
            .store
            .push_configs_for(&tenant.tenant_id, &context.principal_id)
            .await?;
        if configs.is_empty() {
            return Ok(());
        }

        let webhooks = self.webhooks.clone();
        let step = step.clone();
        tokio::spawn(async move {
            for mapping in mappings {
                let payload = json!({
                    "workflow_step_id": step.step_id,
                    "status": step.status,
                    "tool_name": step.tool_name,
                    "object_type": mapping.object_type,
                    "object_id": mapping.object_id,
                    "action": mapping.action,
                    "error_message": step.error_message,
                    "response_data": step.response_data,
                });

                webhooks.deliver(&configs, &payload).await;
            }
        });

        Ok(())
    }

    pub async fn add_mapping(
        &self,
        step_id: &str,
        object_type: ObjectType,
        object_id: &str,
        action: MappingAction,
    ) -> Result<(), Error> {
        self.store
            .insert_mapping(ObjectWorkflowMapping {
                step_id: step_id.to_string(),
                object_type,
                object_id: object_id.to_string(),
                action,
                created_at: Utc::now(),
            })
            .await
    }

    /// Registers or refreshes a push notification endpoint from a
    /// request body.
    pub async fn upsert_push_config(
        &self,
        tenant_id: &str,
        principal_id: &str,
        input: &PushNotificationConfigInput,
    ) -> Result<PushNotificationConfig, Error> {
        let auth = input.authentication.as_ref();
        let scheme = auth
            .and_then(|a| a.schemes.first())
            .map(|s| s.parse::<PushAuthScheme>())
            .transpose()
            .map_err(|_| anyhow!("Unknown push notification auth scheme"))?
            .unwrap_or(PushAuthScheme::None);

        let now = Utc::now();
        let push_config = PushNotificationConfig {
            id: input.id.clone().unwrap_or_else(new_push_config_id),
            tenant_id: tenant_id.to_string(),
            principal_id: principal_id.to_string(),
            url: input.url.clone(),
            auth_scheme: scheme,
            credentials: auth.and_then(|a| a.credentials.clone()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.store.upsert_push_config(push_config.clone()).await?;
        info!("Registered push notification config {} for {}", push_config.id, principal_id);

        Ok(push_config)
    }

    /// Same, from the `x-push-notification-*` headers.
    pub async fn upsert_push_config_from_headers(
        &self,
        tenant_id: &str,
        principal_id: &str,
        headers: &RequestHeaders,
    ) -> Result<Option<PushNotificationConfig>, Error> {
        let Some(url) = headers.push_notification_url.clone() else {
            return Ok(None);
        };

        let scheme = headers
            .push_notification_auth_scheme
            .clone()
            .unwrap_or_else(|| "None".to_string());
        let input = PushNotificationConfigInput {
            id: None,
            url,
            authentication: (scheme != "None").then(|| crate::core::spec::requests::PushAuthenticationInput {
                schemes: vec![scheme],
                credentials: headers.push_notification_credentials.clone(),
            }),
        };

        Ok(Some(self.upsert_push_config(tenant_id, principal_id, &input).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tenant::TenantBuilder;
    use crate::core::store::LocalStore;

    fn tenant() -> Tenant {
        TenantBuilder::default()
            .tenant_id("acme".to_string())
            .name("Acme".to_string())
            .subdomain("acme".to_string())
            .admin_token("tok".to_string())
            .build()
            .unwrap()
    }

    fn engine(store: Arc<LocalStore>) -> WorkflowEngine {
        WorkflowEngine::new(
            store,
            Arc::new(SlackNotifier::new()),
            Arc::new(WebhookDeliverer::new()),
        )
    }

    async fn open_step(engine: &WorkflowEngine) -> WorkflowStep {
        let context = engine.get_or_create_context("acme", "buyer", None).await.unwrap();
        engine
            .create_step(
                &context,
                StepSpec {
                    step_type: "media_buy_creation".to_string(),
                    owner: StepOwner::System,
                    status: StepStatus::InProgress,
                    tool_name: "create_media_buy".to_string(),
                    request_data: json!({}),
                    initial_comment: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_context_reuse_by_id() {
        let engine = engine(Arc::new(LocalStore::new()));

        let first = engine.get_or_create_context("acme", "buyer", None).await.unwrap();
        let reused = engine
            .get_or_create_context("acme", "buyer", Some(&first.context_id))
            .await
            .unwrap();
        let fresh = engine
            .get_or_create_context("acme", "buyer", Some("ctx_does_not_exist"))
            .await
            .unwrap();

        assert_eq!(first.context_id, reused.context_id);
        assert_ne!(first.context_id, fresh.context_id);
    }

    #[tokio::test]
    async fn test_terminal_status_never_reassigned() {
        let engine = engine(Arc::new(LocalStore::new()));
        let step = open_step(&engine).await;

        engine
            .update_step(&tenant(), &step.step_id, StepUpdate::completed())
            .await
            .unwrap();

        let result = engine
            .update_step(&tenant(), &step.step_id, StepUpdate::failed("late failure"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_requires_approval_then_completed() {
        let engine = engine(Arc::new(LocalStore::new()));
        let step = open_step(&engine).await;

        let updated = engine
            .update_step(
                &tenant(),
                &step.step_id,
                StepUpdate {
                    status: Some(StepStatus::RequiresApproval),
                    owner: Some(StepOwner::Publisher),
                    add_comment: Some(("system".to_string(), "Manual approval required".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, StepStatus::RequiresApproval);
        assert_eq!(updated.owner, StepOwner::Publisher);
        assert_eq!(updated.comments.len(), 1);

        let done = engine
            .update_step(&tenant(), &step.step_id, StepUpdate::completed())
            .await
            .unwrap();
        assert_eq!(done.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_update_records_error() {
        let engine = engine(Arc::new(LocalStore::new()));
        let step = open_step(&engine).await;

        let failed = engine
            .update_step(&tenant(), &step.step_id, StepUpdate::failed("bid below floor"))
            .await
            .unwrap();

        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("bid below floor"));
    }

    #[tokio::test]
    async fn test_push_config_upsert_is_keyed_by_id() {
        let store = Arc::new(LocalStore::new());
        let engine = engine(store.clone());

        let input = PushNotificationConfigInput {
            id: Some("pnc_fixed".to_string()),
            url: "https://buyer.example/hooks".to_string(),
            authentication: Some(crate::core::spec::requests::PushAuthenticationInput {
                schemes: vec!["Bearer".to_string()],
                credentials: Some("tok".to_string()),
            }),
        };

        engine.upsert_push_config("acme", "buyer", &input).await.unwrap();

        let mut second = input.clone();
        second.url = "https://buyer.example/hooks/v2".to_string();
        engine.upsert_push_config("acme", "buyer", &second).await.unwrap();

        let configs = store.push_configs_for("acme", "buyer").await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].url, "https://buyer.example/hooks/v2");
        assert_eq!(configs[0].auth_scheme, PushAuthScheme::Bearer);
    }
}
