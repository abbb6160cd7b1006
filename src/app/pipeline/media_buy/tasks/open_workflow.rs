use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::models::workflow::{StepOwner, StepStatus};
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use crate::core::workflow::{StepSpec, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Resolves the principal row, attaches or opens the durable context,
/// and opens the tracking step capturing the full request. Also
/// registers any push notification config carried by the request or
/// headers.
pub struct OpenWorkflowTask {
    store: Arc<dyn Store>,
    engine: Arc<WorkflowEngine>,
}

impl OpenWorkflowTask {
    pub fn new(store: Arc<dyn Store>, engine: Arc<WorkflowEngine>) -> Self {
        OpenWorkflowTask { store, engine }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for OpenWorkflowTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let principal = self
            .store
            .get_principal(&context.tenant.tenant_id, &context.principal_id)
            .await?;

        let Some(principal) = principal else {
            return Err(context.fail(AdcpError::new(
                ErrorCode::AuthenticationError,
                format!("Principal {} not found", context.principal_id),
            )));
        };
        let _ = context.principal.set(principal);

        let workflow = self
            .engine
            .get_or_create_context(
                &context.tenant.tenant_id,
                &context.principal_id,
                context.headers.context_id.as_deref(),
            )
            .await?;

        let request_data = serde_json::to_value(&*context.req.read())?;
        let step = self
            .engine
            .create_step(
                &workflow,
                StepSpec {
                    step_type: "media_buy_creation".to_string(),
                    owner: StepOwner::System,
                    status: StepStatus::InProgress,
                    tool_name: "create_media_buy".to_string(),
                    request_data,
                    initial_comment: None,
                },
            )
            .await?;

        let _ = context.workflow.set(workflow);
        let _ = context.step.set(step);

        let push_input = context.req.read().push_notification_config.clone();
        let registration = match push_input {
            Some(input) => self
                .engine
                .upsert_push_config(&context.tenant.tenant_id, &context.principal_id, &input)
                .await
                .map(Some),
            None => {
                self.engine
                    .upsert_push_config_from_headers(
                        &context.tenant.tenant_id,
                        &context.principal_id,
                        &context.headers,
                    )
                    .await
            }
        };

        if let Err(e) = registration {
            // Registration problems are reported but never block the
            // buy itself.
            warn!("Push notification config registration failed: {}", e);
        }

        Ok(())
    }
}
