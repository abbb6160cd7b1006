use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::core::models::workflow::{StepOwner, StepStatus};
use crate::core::pipeline::AsyncTask;
use crate::core::workflow::{StepSpec, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub struct OpenSyncWorkflowTask {
    engine: Arc<WorkflowEngine>,
}

impl OpenSyncWorkflowTask {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        OpenSyncWorkflowTask { engine }
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for OpenSyncWorkflowTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let workflow = self
            .engine
            .get_or_create_context(
                &context.tenant.tenant_id,
                &context.principal_id,
                context.headers.context_id.as_deref(),
            )
            .await?;

        // The step records batch shape, not the full payload: creative
        // bodies can be large and live in their own rows anyway.
        let step = self
            .engine
            .create_step(
                &workflow,
                StepSpec {
                    step_type: "tool_call".to_string(),
                    owner: StepOwner::Principal,
                    status: StepStatus::InProgress,
                    tool_name: "sync_creatives".to_string(),
                    request_data: json!({
                        "creative_count": context.req.creatives.len(),
                        "patch": context.req.patch,
                        "dry_run": context.req.dry_run,
                        "validation_mode": context.req.validation_mode,
                        "has_assignments": context.req.assignments.is_some(),
                    }),
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
