use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::models::workflow::{StepOwner, StepStatus};
use crate::core::pipeline::AsyncTask;
use crate::core::workflow::{StepSpec, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct OpenUpdateWorkflowTask {
    engine: Arc<WorkflowEngine>,
}

impl OpenUpdateWorkflowTask {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        OpenUpdateWorkflowTask { engine }
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for OpenUpdateWorkflowTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let workflow = self
            .engine
            .get_or_create_context(
                &context.tenant.tenant_id,
                &context.principal_id,
                context.headers.context_id.as_deref(),
            )
            .await?;

        let step = self
            .engine
            .create_step(
                &workflow,
                StepSpec {
                    step_type: "tool_call".to_string(),
                    owner: StepOwner::Principal,
                    status: StepStatus::InProgress,
                    tool_name: "update_media_buy".to_string(),
                    request_data: serde_json::to_value(&context.req)?,
                    initial_comment: None,
                },
            )
            .await?;

        let _ = context.workflow.set(workflow);
        let _ = context.step.set(step);

        if let Some(input) = &context.req.push_notification_config
            && let Err(e) = self
                .engine
                .upsert_push_config(&context.tenant.tenant_id, &context.principal_id, input)
                .await
        {
            warn!("Push notification config registration failed: {}", e);
        }

        Ok(())
    }
}
