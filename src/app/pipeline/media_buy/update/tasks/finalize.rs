use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::models::workflow::{MappingAction, ObjectType, StepStatus};
use crate::core::observability::AuditLogger;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::responses::{ToolOutcome, UpdateMediaBuyResponse};
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Links the update to its buy for webhook delivery, completes the
/// step, and builds the success envelope.
pub struct FinalizeUpdateTask {
    engine: Arc<WorkflowEngine>,
}

impl FinalizeUpdateTask {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        FinalizeUpdateTask { engine }
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for FinalizeUpdateTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let req = &context.req;
        let step = context.step.get().expect("workflow step open before finalize");

        self.engine
            .add_mapping(&step.step_id, ObjectType::MediaBuy, &req.media_buy_id, MappingAction::Update)
            .await?;

        self.engine
            .update_step(
                &context.tenant,
                &step.step_id,
                StepUpdate {
                    status: Some(StepStatus::Completed),
                    response_data: Some(json!({
                        "updates_applied": {
                            "campaign_level": req.active.is_some(),
                            "package_count": req.packages.as_ref().map(|p| p.len()).unwrap_or(0),
                            "budget": req.budget.is_some(),
                            "flight_dates": req.start_time.is_some() || req.end_time.is_some(),
                        },
                    })),
                    ..Default::default()
                },
            )
            .await?;

        AuditLogger::new(&context.tenant.tenant_id).log_operation(
            "update_media_buy",
            context
                .principal
                .get()
                .map(|p| p.name.as_str())
                .unwrap_or(&context.principal_id),
            Some(&context.principal_id),
            true,
            &json!({ "media_buy_id": req.media_buy_id }),
        );

        let _ = context.res.set(ToolOutcome::completed(UpdateMediaBuyResponse {
            media_buy_id: req.media_buy_id.clone(),
            buyer_ref: req.buyer_ref.clone(),
            implementation_date: Some(context.now),
            ..Default::default()
        }));

        Ok(())
    }
}
