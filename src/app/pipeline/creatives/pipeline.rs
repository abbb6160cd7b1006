use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::app::pipeline::creatives::tasks::{
    ApprovalStepsTask, AssignCreativesTask, FinalizeSyncTask, OpenSyncWorkflowTask,
    UpsertCreativesTask, ValidateBatchTask,
};
use crate::child_span_info;
use crate::core::creatives::ReviewPool;
use crate::core::managers::FormatLibrary;
use crate::core::notify::SlackNotifier;
use crate::core::pipeline::{AsyncTask, Pipeline, PipelineBuilder};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::responses::{SyncCreativesResponse, ToolOutcome};
use crate::core::spec::status::TaskStatus;
use crate::core::store::Store;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

pub struct SyncDeps {
    pub store: Arc<dyn Store>,
    pub engine: Arc<WorkflowEngine>,
    pub slack: Arc<SlackNotifier>,
    pub formats: Arc<FormatLibrary>,
    pub review: Arc<ReviewPool>,
}

/// Sync pipeline plus the finalizer guaranteeing an outcome and a
/// terminal batch step on failure.
pub struct SyncCreativesPipelineTask {
    main: Pipeline<SyncCreativesContext, Error>,
    engine: Arc<WorkflowEngine>,
}

impl SyncCreativesPipelineTask {
    async fn run0(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let pipeline_result = self.main.run(context).await;

        if let Err(e) = &pipeline_result {
            debug!("sync_creatives pipeline aborted: {}", e);

            if context.res.get().is_none() {
                let _ = context.res.set(ToolOutcome::failed(SyncCreativesResponse {
                    message: format!("Failed to sync creatives: {}", e),
                    errors: Some(vec![
                        AdcpError::new(ErrorCode::ToolError, format!("Failed to sync creatives: {}", e))
                            .detail(),
                    ]),
                    dry_run: context.req.dry_run,
                    ..Default::default()
                }));
            }

            let outcome = context.res.get().expect("outcome recorded above");
            if outcome.status == TaskStatus::Failed
                && let Some(step) = context.step.get()
            {
                let message = outcome
                    .payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("creative sync failed")
                    .to_string();
                if let Err(update_err) = self
                    .engine
                    .update_step(&context.tenant, &step.step_id, StepUpdate::failed(message))
                    .await
                {
                    warn!("Could not mark step {} failed: {}", step.step_id, update_err);
                }
            }
        }

        pipeline_result
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for SyncCreativesPipelineTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let span = child_span_info!("sync_creatives_pipeline");

        self.run0(context).instrument(span).await
    }
}

pub fn build_sync_creatives_pipeline(deps: &SyncDeps) -> Pipeline<SyncCreativesContext, Error> {
    let main = PipelineBuilder::new()
        .with_async(Box::new(OpenSyncWorkflowTask::new(deps.engine.clone())))
        .with_blocking(Box::new(ValidateBatchTask))
        .with_async(Box::new(UpsertCreativesTask::new(
            deps.store.clone(),
            deps.formats.clone(),
        )))
        .with_async(Box::new(AssignCreativesTask::new(deps.store.clone())))
        .with_async(Box::new(ApprovalStepsTask::new(
            deps.engine.clone(),
            deps.slack.clone(),
            deps.review.clone(),
        )))
        .with_async(Box::new(FinalizeSyncTask::new(deps.engine.clone())))
        .build()
        .expect("sync creatives pipeline should have tasks");

    PipelineBuilder::new()
        .with_async(Box::new(SyncCreativesPipelineTask {
            main,
            engine: deps.engine.clone(),
        }))
        .build()
        .expect("wrapped sync pipeline should have tasks")
}

pub fn outcome_of(context: &SyncCreativesContext) -> ToolOutcome {
    context.res.get().cloned().unwrap_or_else(|| {
        ToolOutcome::failed(SyncCreativesResponse {
            message: "creative sync produced no outcome".to_string(),
            errors: Some(vec![
                AdcpError::new(ErrorCode::ToolError, "creative sync produced no outcome").detail(),
            ]),
            ..Default::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::creatives::context::SyncCreativesContext;
    use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
    use crate::app::pipeline::media_buy::pipeline::build_create_media_buy_pipeline;
    use crate::app::pipeline::testkit::{Harness, buy_request, harness, harness_with};
    use crate::core::auth::RequestHeaders;
    use crate::core::models::creative::CreativeStatus;
    use crate::core::models::tenant::ApprovalMode;
    use crate::core::spec::formats::FormatRef;
    use crate::core::spec::requests::{CreativeInput, ListCreativesRequest, SyncCreativesRequest};
    use crate::core::spec::status::TaskStatus;
    use crate::core::store::Store;
    use std::collections::HashMap;

    fn creative_input(id: &str, name: &str) -> CreativeInput {
        CreativeInput {
            creative_id: Some(id.to_string()),
            name: Some(name.to_string()),
            format_id: Some(FormatRef::standard("display_300x250_image")),
            url: Some("https://cdn.example.com/banner.png".to_string()),
            width: Some(300),
            height: Some(250),
            ..Default::default()
        }
    }

    fn sync_request(creatives: Vec<CreativeInput>) -> SyncCreativesRequest {
        SyncCreativesRequest {
            creatives,
            patch: false,
            assignments: None,
            delete_missing: false,
            dry_run: false,
            validation_mode: Default::default(),
            push_notification_config: None,
        }
    }

    async fn run_sync(h: &Harness, principal_id: &str, req: SyncCreativesRequest) -> ToolOutcome {
        let pipeline = build_sync_creatives_pipeline(&h.sync_deps);
        let context = SyncCreativesContext::new(
            h.tenant.clone(),
            principal_id.to_string(),
            RequestHeaders::default(),
            req,
        );
        let _ = pipeline.run(&context).await;
        outcome_of(&context)
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let h = harness().await;

        let first = run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_1", "Banner")])).await;
        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(first.payload["results"][0]["action"], "created");

        let second = run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_1", "Banner")])).await;
        assert_eq!(second.status, TaskStatus::Completed);
        assert_eq!(second.payload["results"][0]["action"], "unchanged");
        assert_eq!(second.payload["summary"]["unchanged"], 1);
    }

    #[tokio::test]
    async fn test_cross_principal_same_creative_id_creates_separate_rows() {
        let h = harness().await;

        run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_shared", "A's banner")])).await;
        let outcome =
            run_sync(&h, "buyer_b", sync_request(vec![creative_input("cr_shared", "B's banner")])).await;
        assert_eq!(outcome.payload["results"][0]["action"], "created");

        let a = h.store.get_creative("acme", "buyer_a", "cr_shared").await.unwrap().unwrap();
        let b = h.store.get_creative("acme", "buyer_b", "cr_shared").await.unwrap().unwrap();
        assert_eq!(a.name, "A's banner");
        assert_eq!(b.name, "B's banner");
        assert_eq!(a.data.url, b.data.url);
    }

    #[tokio::test]
    async fn test_approval_mode_drives_status_and_steps() {
        // require-human (the default) leaves the creative pending with
        // an approval step mapped to it.
        let h = harness().await;
        run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_rh", "Pending banner")])).await;

        let creative = h.store.get_creative("acme", "buyer_a", "cr_rh").await.unwrap().unwrap();
        assert_eq!(creative.status, CreativeStatus::Pending);

        let (steps, _) = h
            .store
            .query_steps("acme", &crate::core::spec::requests::ListTasksRequest::default())
            .await
            .unwrap();
        let approval = steps.iter().find(|s| s.step_type == "creative_approval").unwrap();
        let mappings = h.store.mappings_for_step(&approval.step_id).await.unwrap();
        assert_eq!(mappings[0].object_id, "cr_rh");

        // auto-approve skips the workflow entirely.
        let h = harness_with(|t| t.approval_mode = ApprovalMode::AutoApprove).await;
        run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_auto", "Live banner")])).await;
        let creative = h.store.get_creative("acme", "buyer_a", "cr_auto").await.unwrap().unwrap();
        assert_eq!(creative.status, CreativeStatus::Approved);
    }

    #[tokio::test]
    async fn test_structural_validation_rejects_without_writing() {
        let h = harness().await;

        let mut both = creative_input("cr_bad", "Bad");
        both.snippet = Some("<script></script>".to_string());

        let mut foreign_agent = creative_input("cr_foreign", "Foreign");
        foreign_agent.format_id = Some(FormatRef {
            agent_url: "https://unregistered.example".to_string(),
            id: "display_300x250_image".to_string(),
        });

        let outcome = run_sync(&h, "buyer_a", sync_request(vec![both, foreign_agent])).await;

        assert_eq!(outcome.payload["summary"]["failed"], 2);
        assert!(h.store.get_creative("acme", "buyer_a", "cr_bad").await.unwrap().is_none());
        assert!(h.store.get_creative("acme", "buyer_a", "cr_foreign").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_unsupported() {
        let h = harness().await;
        let mut req = sync_request(vec![creative_input("cr_1", "Banner")]);
        req.delete_missing = true;

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.payload["errors"][0]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_assignment_visible_via_media_buy_filter() {
        let h = harness().await;

        // A live media buy provides the package to assign against.
        let create = build_create_media_buy_pipeline(&h.deps);
        let context = CreateMediaBuyContext::new(
            h.tenant.clone(),
            "buyer_a".to_string(),
            RequestHeaders::default(),
            buy_request("prod_cpm_fixed", 10_000.0),
        );
        create.run(&context).await.unwrap();
        let created = crate::app::pipeline::media_buy::pipeline::outcome_of(&context);
        let media_buy_id = created.payload["media_buy_id"].as_str().unwrap().to_string();
        let package_id = created.payload["packages"][0]["package_id"]
            .as_str()
            .unwrap()
            .to_string();

        let mut req = sync_request(vec![creative_input("cr_assigned", "Assigned banner")]);
        let mut assignments = HashMap::new();
        assignments.insert("cr_assigned".to_string(), vec![package_id]);
        req.assignments = Some(assignments);

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Completed);

        let query = ListCreativesRequest {
            media_buy_id: Some(media_buy_id),
            ..Default::default()
        };
        let (found, total) = h.store.query_creatives("acme", "buyer_a", &query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].creative_id, "cr_assigned");
    }

    #[tokio::test]
    async fn test_strict_assignment_to_unknown_package_fails() {
        let h = harness().await;

        let mut req = sync_request(vec![creative_input("cr_1", "Banner")]);
        let mut assignments = HashMap::new();
        assignments.insert("cr_1".to_string(), vec!["pkg_does_not_exist".to_string()]);
        req.assignments = Some(assignments);

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(
            outcome.payload["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("Package not found")
        );

        // Lenient mode skips instead.
        let mut req = sync_request(vec![creative_input("cr_2", "Banner two")]);
        let mut assignments = HashMap::new();
        assignments.insert("cr_2".to_string(), vec!["pkg_does_not_exist".to_string()]);
        req.assignments = Some(assignments);
        req.validation_mode = crate::core::spec::requests::ValidationMode::Lenient;

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let h = harness().await;
        let mut req = sync_request(vec![creative_input("cr_dry", "Dry banner")]);
        req.dry_run = true;

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.payload["dry_run"], true);
        assert_eq!(outcome.payload["results"][0]["action"], "created");

        assert!(h.store.get_creative("acme", "buyer_a", "cr_dry").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_updates_only_supplied_fields() {
        let h = harness().await;
        run_sync(&h, "buyer_a", sync_request(vec![creative_input("cr_1", "Banner")])).await;

        let mut req = sync_request(vec![CreativeInput {
            creative_id: Some("cr_1".to_string()),
            click_url: Some("https://example.com/landing".to_string()),
            ..Default::default()
        }]);
        req.patch = true;

        let outcome = run_sync(&h, "buyer_a", req).await;
        assert_eq!(outcome.payload["results"][0]["action"], "updated");

        let creative = h.store.get_creative("acme", "buyer_a", "cr_1").await.unwrap().unwrap();
        assert_eq!(creative.name, "Banner");
        assert_eq!(creative.data.click_url.as_deref(), Some("https://example.com/landing"));
        assert_eq!(creative.data.url.as_deref(), Some("https://cdn.example.com/banner.png"));
    }
}
