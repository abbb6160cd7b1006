use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::core::models::workflow::StepStatus;
use crate::core::observability::AuditLogger;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::responses::{SyncAction, SyncCreativesResponse, SyncSummary, ToolOutcome};
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Aggregates per-creative results into the summary envelope and
/// completes the batch's workflow step.
pub struct FinalizeSyncTask {
    engine: Arc<WorkflowEngine>,
}

impl FinalizeSyncTask {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        FinalizeSyncTask { engine }
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for FinalizeSyncTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let results = context.results.lock().clone();
        let assignments_created = *context.assignments_created.lock();
        let approvals = context.needing_approval.lock().len();

        let count = |action: SyncAction| results.iter().filter(|r| r.action == action).count();
        let summary = SyncSummary {
            total_processed: results.len(),
            created: count(SyncAction::Created),
            updated: count(SyncAction::Updated),
            unchanged: count(SyncAction::Unchanged),
            failed: count(SyncAction::Failed),
        };

        let mut message = format!("Synced {} creatives", summary.created + summary.updated);
        if summary.unchanged > 0 {
            message.push_str(&format!(", {} unchanged", summary.unchanged));
        }
        if summary.failed > 0 {
            message.push_str(&format!(", {} failed", summary.failed));
        }
        if assignments_created > 0 {
            message.push_str(&format!(", {} assignments created", assignments_created));
        }
        if approvals > 0 {
            message.push_str(&format!(", {} require approval", approvals));
        }

        if let Some(step) = context.step.get() {
            self.engine
                .update_step(
                    &context.tenant,
                    &step.step_id,
                    StepUpdate {
                        status: Some(StepStatus::Completed),
                        response_data: Some(json!({
                            "summary": summary.clone(),
                            "assignments_created": assignments_created,
                        })),
                        ..Default::default()
                    },
                )
                .await?;
        }

        AuditLogger::new(&context.tenant.tenant_id).log_operation(
            "sync_creatives",
            &context.principal_id,
            Some(&context.principal_id),
            summary.failed == 0,
            &json!({
                "synced_count": summary.created + summary.updated,
                "failed_count": summary.failed,
                "assignment_count": assignments_created,
                "patch_mode": context.req.patch,
                "dry_run": context.req.dry_run,
            }),
        );

        let _ = context.res.set(ToolOutcome::completed(SyncCreativesResponse {
            message,
            summary,
            results,
            dry_run: context.req.dry_run,
            errors: None,
        }));

        Ok(())
    }
}
