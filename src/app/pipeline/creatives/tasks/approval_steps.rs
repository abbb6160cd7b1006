use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::core::creatives::{ReviewJob, ReviewPool};
use crate::core::models::tenant::ApprovalMode;
use crate::core::models::workflow::{MappingAction, ObjectType, StepOwner, StepStatus};
use crate::core::notify::SlackNotifier;
use crate::core::pipeline::AsyncTask;
use crate::core::workflow::{StepSpec, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Opens a `creative_approval` step per pending creative, links it for
/// webhook delivery, and either notifies the publisher (human review)
/// or hands the creative to the background review pool (AI review).
pub struct ApprovalStepsTask {
    engine: Arc<WorkflowEngine>,
    slack: Arc<SlackNotifier>,
    review: Arc<ReviewPool>,
}

impl ApprovalStepsTask {
    pub fn new(engine: Arc<WorkflowEngine>, slack: Arc<SlackNotifier>, review: Arc<ReviewPool>) -> Self {
        ApprovalStepsTask {
            engine,
            slack,
            review,
        }
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for ApprovalStepsTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        if context.req.dry_run {
            return Ok(());
        }

        let candidates = context.needing_approval.lock().clone();
        if candidates.is_empty() {
            return Ok(());
        }

        let workflow = context.workflow.get().expect("workflow open before approval steps");
        let approval_mode = context.tenant.approval_mode;

        for candidate in &candidates {
            let comment = format!(
                "Creative '{}' (format: {}) requires {}",
                candidate.name,
                candidate.format_id.as_deref().unwrap_or("unknown"),
                match approval_mode {
                    ApprovalMode::AiPowered => "review; queued for automated review",
                    _ => "manual approval",
                },
            );

            let mut request_data = json!({
                "creative_id": candidate.creative_id,
                "format": candidate.format_id,
                "name": candidate.name,
                "approval_mode": approval_mode,
            });
            if let Some(push) = &context.req.push_notification_config
                && let Some(object) = request_data.as_object_mut()
            {
                object.insert("push_notification_config".to_string(), json!(push));
            }

            let step = self
                .engine
                .create_step(
                    workflow,
                    StepSpec {
                        step_type: "creative_approval".to_string(),
                        owner: StepOwner::Publisher,
                        status: StepStatus::RequiresApproval,
                        tool_name: "sync_creatives".to_string(),
                        request_data,
                        initial_comment: Some(comment),
                    },
                )
                .await?;

            // The mapping is what routes the eventual approval webhook
            // back to this creative.
            self.engine
                .add_mapping(
                    &step.step_id,
                    ObjectType::Creative,
                    &candidate.creative_id,
                    MappingAction::ApprovalRequired,
                )
                .await?;

            match approval_mode {
                ApprovalMode::AiPowered => {
                    let job = ReviewJob {
                        tenant_id: context.tenant.tenant_id.clone(),
                        principal_id: context.principal_id.clone(),
                        creative_id: candidate.creative_id.clone(),
                        step_id: step.step_id.clone(),
                    };
                    if let Err(e) = self.review.submit(job) {
                        warn!(
                            "Review queue full, creative {} stays pending for manual review: {}",
                            candidate.creative_id, e
                        );
                    }
                }
                ApprovalMode::RequireHuman => {
                    self.slack
                        .notify_creative_pending(
                            &context.tenant,
                            &candidate.creative_id,
                            &context.principal_id,
                            candidate.format_id.as_deref(),
                            None,
                        )
                        .await;
                }
                ApprovalMode::AutoApprove => {}
            }
        }

        info!("Opened {} creative approval steps", candidates.len());

        Ok(())
    }
}
