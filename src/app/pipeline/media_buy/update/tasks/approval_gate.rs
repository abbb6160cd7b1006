use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::adapters::{AdClient, build_adapter};
use crate::core::models::workflow::{StepOwner, StepStatus};
use crate::core::pipeline::AsyncTask;
use crate::core::spec::responses::{ToolOutcome, UpdateMediaBuyResponse};
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Parks the update when the publisher requires human approval for
/// media buy changes; the caller polls the returned step id.
pub struct UpdateApprovalGateTask {
    engine: Arc<WorkflowEngine>,
    http: Arc<AdClient>,
}

impl UpdateApprovalGateTask {
    pub fn new(engine: Arc<WorkflowEngine>, http: Arc<AdClient>) -> Self {
        UpdateApprovalGateTask { engine, http }
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for UpdateApprovalGateTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let principal = context.principal.get().expect("ownership verified before the gate");

        let adapter = build_adapter(
            &context.tenant,
            principal,
            context.testing.dry_run,
            self.http.clone(),
        );
        let _ = context.adapter.set(adapter.clone());

        let held = adapter.manual_approval_required()
            && adapter
                .manual_approval_operations()
                .iter()
                .any(|op| op == "update_media_buy");
        if !held {
            return Ok(());
        }

        let step = context.step.get().expect("workflow step open before the gate");
        self.engine
            .update_step(
                &context.tenant,
                &step.step_id,
                StepUpdate {
                    status: Some(StepStatus::RequiresApproval),
                    owner: Some(StepOwner::Publisher),
                    add_comment: Some((
                        "system".to_string(),
                        "Publisher requires manual approval for all media buy updates".to_string(),
                    )),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            "Update of {} held for approval (step {})",
            context.req.media_buy_id, step.step_id
        );

        let _ = context.res.set(ToolOutcome::input_required(UpdateMediaBuyResponse {
            media_buy_id: context.req.media_buy_id.clone(),
            buyer_ref: context.req.buyer_ref.clone(),
            task_id: Some(step.step_id.clone()),
            ..Default::default()
        }));

        Err(anyhow!("media buy update held for approval"))
    }
}
