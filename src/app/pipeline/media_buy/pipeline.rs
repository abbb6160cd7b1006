use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::app::pipeline::media_buy::tasks::{
    AdapterCreateTask, ApprovalGateTask, AssociateCreativesTask, BuildPackagesTask, FinalizeTask,
    InlineCreativesTask, OpenWorkflowTask, PersistTask, PricingTask, ResolveCurrencyTask,
    SetupGateTask, ValidateRequestTask,
};
use crate::child_span_info;
use crate::core::adapters::AdClient;
use crate::core::delivery::DeliveryCache;
use crate::core::managers::FormatLibrary;
use crate::core::models::workflow::StepStatus;
use crate::core::notify::SlackNotifier;
use crate::core::observability::AuditLogger;
use crate::core::pipeline::{AsyncTask, Pipeline, PipelineBuilder};
use crate::core::policy::SetupChecklist;
use crate::core::spec::responses::{CreateMediaBuyResponse, ToolOutcome};
use crate::core::spec::status::TaskStatus;
use crate::core::store::Store;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, warn};

/// Everything the media buy pipelines need at build time.
#[derive(Clone)]
pub struct MediaBuyDeps {
    pub store: Arc<dyn Store>,
    pub engine: Arc<WorkflowEngine>,
    pub slack: Arc<SlackNotifier>,
    pub setup: Arc<SetupChecklist>,
    pub formats: Arc<FormatLibrary>,
    pub cache: Arc<DeliveryCache>,
    pub http: Arc<AdClient>,
    pub adapter_timeout: Duration,
}

fn build_main_pipeline(deps: &MediaBuyDeps) -> Pipeline<CreateMediaBuyContext, Error> {
    PipelineBuilder::new()
        .with_async(Box::new(SetupGateTask::new(deps.setup.clone())))
        .with_async(Box::new(OpenWorkflowTask::new(deps.store.clone(), deps.engine.clone())))
        .with_blocking(Box::new(ValidateRequestTask))
        .with_async(Box::new(ResolveCurrencyTask::new(deps.store.clone())))
        .with_blocking(Box::new(PricingTask))
        .with_async(Box::new(BuildPackagesTask::new(deps.formats.clone())))
        .with_async(Box::new(ApprovalGateTask::new(
            deps.store.clone(),
            deps.engine.clone(),
            deps.slack.clone(),
            deps.cache.clone(),
            deps.http.clone(),
        )))
        .with_async(Box::new(AdapterCreateTask::new(deps.adapter_timeout)))
        .with_async(Box::new(PersistTask::new(
            deps.store.clone(),
            deps.engine.clone(),
            deps.cache.clone(),
        )))
        .with_async(Box::new(InlineCreativesTask::new(deps.store.clone())))
        .with_async(Box::new(AssociateCreativesTask))
        .with_async(Box::new(FinalizeTask::new(deps.engine.clone(), deps.slack.clone())))
        .build()
        .expect("create media buy pipeline should have tasks")
}

/// The create pipeline plus the finalizers that must run no matter
/// where it stopped: an outcome is always present on the context, and
/// an open workflow step never stays in_progress after a failure.
pub struct CreateMediaBuyPipelineTask {
    main: Pipeline<CreateMediaBuyContext, Error>,
    engine: Arc<WorkflowEngine>,
    slack: Arc<SlackNotifier>,
}

impl CreateMediaBuyPipelineTask {
    async fn run0(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let pipeline_result = self.main.run(context).await;

        match &pipeline_result {
            Ok(_) => debug!("create_media_buy pipeline success"),
            Err(e) => debug!("create_media_buy pipeline aborted: {}", e),
        }

        if pipeline_result.is_ok() {
            return Ok(());
        }

        // A task that aborted without recording an outcome is itself
        // a bug; surface it as a generic creation failure.
        if context.res.get().is_none() {
            let message = pipeline_result
                .as_ref()
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());

            let _ = context.res.set(ToolOutcome::failed(CreateMediaBuyResponse {
                buyer_ref: context.buyer_ref(),
                errors: Some(vec![
                    crate::core::spec::errors::AdcpError::new(
                        crate::core::spec::errors::ErrorCode::MediaBuyCreationError,
                        format!("Failed to create media buy: {}", message),
                    )
                    .detail(),
                ]),
                ..Default::default()
            }));
        }

        let outcome = context.res.get().expect("outcome recorded above");

        // Held-for-approval aborts leave the step in requires_approval
        // on purpose; only failure outcomes move it to failed.
        if outcome.status == TaskStatus::Failed
            && let Some(step) = context.step.get()
        {
            let error_message = outcome
                .payload
                .get("errors")
                .and_then(|e| e.as_array())
                .and_then(|e| e.first())
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("media buy creation failed")
                .to_string();

            let current = self
                .engine
                .update_step(&context.tenant, &step.step_id, StepUpdate::failed(error_message.clone()))
                .await;
            if let Err(e) = current {
                warn!("Could not mark step {} failed: {}", step.step_id, e);
            }

            // Failure notifications go out only after the step is
            // marked failed.
            let principal_name = context
                .principal
                .get()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| context.principal_id.clone());

            self.slack
                .notify_media_buy_event(
                    &context.tenant,
                    "failed",
                    context.media_buy_id.get().map(|s| s.as_str()),
                    &principal_name,
                    json!({
                        "error_message": error_message,
                        "workflow_step_id": step.step_id,
                    }),
                    false,
                )
                .await;

            AuditLogger::new(&context.tenant.tenant_id).log_failure(
                "create_media_buy",
                &principal_name,
                Some(&context.principal_id),
                &error_message,
            );
        }

        pipeline_result
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for CreateMediaBuyPipelineTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let span = child_span_info!("create_media_buy_pipeline");

        self.run0(context).instrument(span).await
    }
}

/// Builds the full `create_media_buy` pipeline: the task chain wrapped
/// by the always-run finalizers.
pub fn build_create_media_buy_pipeline(deps: &MediaBuyDeps) -> Pipeline<CreateMediaBuyContext, Error> {
    let main = build_main_pipeline(deps);

    PipelineBuilder::new()
        .with_async(Box::new(CreateMediaBuyPipelineTask {
            main,
            engine: deps.engine.clone(),
            slack: deps.slack.clone(),
        }))
        .build()
        .expect("wrapped create pipeline should have tasks")
}

/// Callers read the outcome off the context whether or not the
/// pipeline completed; a missing outcome after the wrapper ran would
/// be a bug.
pub fn outcome_of(context: &CreateMediaBuyContext) -> ToolOutcome {
    context
        .res
        .get()
        .cloned()
        .unwrap_or_else(|| {
            ToolOutcome::failed(CreateMediaBuyResponse {
                buyer_ref: context.buyer_ref(),
                errors: Some(vec![
                    crate::core::spec::errors::AdcpError::new(
                        crate::core::spec::errors::ErrorCode::ToolError,
                        "media buy pipeline produced no outcome",
                    )
                    .detail(),
                ]),
                ..Default::default()
            })
        })
}

/// Ensures a step stuck in progress after a handler panic or uncaught
/// error still terminates; used by the dispatcher's failure path.
pub async fn fail_open_step(
    engine: &WorkflowEngine,
    context: &CreateMediaBuyContext,
    message: &str,
) {
    if let Some(step) = context.step.get()
        && !step.status.is_terminal()
        && step.status != StepStatus::RequiresApproval
    {
        let _ = engine
            .update_step(&context.tenant, &step.step_id, StepUpdate::failed(message.to_string()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::media_buy::approve::execute_approved_media_buy;
    use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
    use crate::app::pipeline::testkit::{Harness, asap_request, buy_request, harness, harness_with};
    use crate::core::auth::RequestHeaders;
    use crate::core::spec::requests::{CreateMediaBuyRequest, ListTasksRequest};
    use crate::core::spec::status::{MediaBuyStatus, TaskStatus};
    use crate::core::store::Store;

    async fn run_create(
        h: &Harness,
        principal_id: &str,
        req: CreateMediaBuyRequest,
    ) -> (ToolOutcome, CreateMediaBuyContext) {
        let pipeline = build_create_media_buy_pipeline(&h.deps);
        let context =
            CreateMediaBuyContext::new(h.tenant.clone(), principal_id.to_string(), RequestHeaders::default(), req);
        let _ = pipeline.run(&context).await;
        let outcome = outcome_of(&context);
        (outcome, context)
    }

    fn error_code(outcome: &ToolOutcome) -> String {
        outcome.payload["errors"][0]["code"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_auto_approved_buy_lands_ready() {
        let h = harness().await;
        let (outcome, _) = run_create(&h, "buyer_a", buy_request("prod_cpm_fixed", 10_000.0)).await;

        assert_eq!(outcome.status, TaskStatus::Completed, "payload: {}", outcome.payload);

        let media_buy_id = outcome.payload["media_buy_id"].as_str().unwrap().to_string();
        assert!(media_buy_id.starts_with("mb_"));

        let buy = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(buy.status, MediaBuyStatus::Ready);
        assert_eq!(buy.buyer_ref, "bref-1");
        assert_eq!(buy.currency, "USD");
        assert_eq!(buy.budget, 10_000.0);

        let packages = h.store.list_media_packages(&media_buy_id).await.unwrap();
        assert_eq!(packages.len(), 1);
        assert!(packages[0].package_id.starts_with("pkg_prod_cpm_fixed_"));
        assert_eq!(packages[0].budget, Some(10_000.0));

        let (steps, _) = h
            .store
            .query_steps("acme", &ListTasksRequest::default())
            .await
            .unwrap();
        let creation_steps: Vec<_> = steps.iter().filter(|s| s.step_type == "media_buy_creation").collect();
        assert_eq!(creation_steps.len(), 1);
        assert_eq!(creation_steps[0].status.to_string(), "completed");
    }

    #[tokio::test]
    async fn test_asap_start_resolves_to_now_and_activates() {
        let h = harness().await;
        let (outcome, context) = run_create(&h, "buyer_a", asap_request("prod_cpm_fixed", 3_000.0)).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        let start = *context.start_time.get().unwrap();
        assert!(start >= context.now - chrono::Duration::seconds(1));
        assert!(start <= chrono::Utc::now());

        let media_buy_id = outcome.payload["media_buy_id"].as_str().unwrap();
        let buy = h.store.get_media_buy("acme", media_buy_id).await.unwrap().unwrap();
        assert_eq!(buy.status, MediaBuyStatus::Active);
    }

    #[tokio::test]
    async fn test_manual_approval_holds_with_permanent_ids_then_executes() {
        let h = harness_with(|tenant| {
            tenant.adapter_settings.manual_approval_required = true;
            tenant.adapter_settings.manual_approval_operations = vec!["create_media_buy".to_string()];
        })
        .await;

        let (outcome, _) = run_create(&h, "buyer_a", buy_request("prod_cpm_fixed", 10_000.0)).await;

        assert_eq!(outcome.status, TaskStatus::InputRequired);
        let media_buy_id = outcome.payload["media_buy_id"].as_str().unwrap().to_string();
        let step_id = outcome.payload["workflow_step_id"].as_str().unwrap().to_string();
        assert!(media_buy_id.starts_with("mb_"));

        let buy = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(buy.status, MediaBuyStatus::PendingApproval);

        let packages = h.store.list_media_packages(&media_buy_id).await.unwrap();
        assert_eq!(packages.len(), 1);
        let held_package_id = packages[0].package_id.clone();

        let mappings = h.store.mappings_for_step(&step_id).await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].object_id, media_buy_id);
        assert_eq!(mappings[0].action.to_string(), "create");

        // Approval replays the adapter leg under the very same ids.
        let (success, error) = execute_approved_media_buy(&h.deps, &media_buy_id, "acme").await;
        assert!(success, "approval failed: {:?}", error);

        let buy = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(buy.status, MediaBuyStatus::Ready);
        assert_eq!(buy.media_buy_id, media_buy_id);

        let packages = h.store.list_media_packages(&media_buy_id).await.unwrap();
        assert_eq!(packages[0].package_id, held_package_id);
    }

    #[tokio::test]
    async fn test_bid_below_floor_rejected_without_persistence() {
        let h = harness().await;
        let mut req = buy_request("prod_cpm_auction", 5_000.0);
        req.packages[0].bid_price = Some(5.0);

        let (outcome, _) = run_create(&h, "buyer_a", req).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "PRICING_ERROR");
        assert!(
            outcome.payload["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("below floor price")
        );

        assert!(h.store.list_media_buys("acme", "buyer_a").await.unwrap().is_empty());

        let (steps, _) = h
            .store
            .query_steps("acme", &ListTasksRequest::default())
            .await
            .unwrap();
        let creation_step = steps.iter().find(|s| s.step_type == "media_buy_creation").unwrap();
        assert_eq!(creation_step.status.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_auction_bid_at_floor_accepted() {
        let h = harness().await;
        let mut req = buy_request("prod_cpm_auction", 5_000.0);
        req.packages[0].bid_price = Some(8.0);

        let (outcome, _) = run_create(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Completed, "payload: {}", outcome.payload);
    }

    #[tokio::test]
    async fn test_non_positive_budget_rejected() {
        let h = harness().await;
        let (outcome, _) = run_create(&h, "buyer_a", buy_request("prod_cpm_fixed", 0.0)).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "invalid_budget");
    }

    #[tokio::test]
    async fn test_end_before_start_rejected() {
        let h = harness().await;
        let mut req = buy_request("prod_cpm_fixed", 5_000.0);
        req.end_time = chrono::Utc::now() - chrono::Duration::days(1);

        let (outcome, _) = run_create(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "invalid_datetime");
    }

    #[tokio::test]
    async fn test_duplicate_product_ids_rejected() {
        let h = harness().await;
        let mut req = buy_request("prod_cpm_fixed", 5_000.0);
        let mut duplicate = req.packages[0].clone();
        duplicate.buyer_ref = Some("bref-dup".to_string());
        req.packages.push(duplicate);

        let (outcome, _) = run_create(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "validation_error");
        assert!(
            outcome.payload["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("Duplicate product_id")
        );
    }

    #[tokio::test]
    async fn test_unsupported_currency_rejected() {
        let h = harness().await;
        let mut req = buy_request("prod_cpm_fixed", 5_000.0);
        req.currency = Some("CHF".to_string());
        // Strip the package pricing model so currency resolution falls
        // through to the request field.
        req.packages[0].pricing_model = None;
        h.store
            .upsert_product({
                let mut product = h.store.get_product("acme", "prod_cpm_fixed").await.unwrap().unwrap();
                product.pricing_options.clear();
                product
            })
            .await
            .unwrap();

        let (outcome, _) = run_create(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_product_auto_create_disabled_holds_for_approval() {
        let h = harness().await;
        let mut product = h.store.get_product("acme", "prod_cpm_fixed").await.unwrap().unwrap();
        product.auto_create_enabled = false;
        h.store.upsert_product(product).await.unwrap();

        let (outcome, _) = run_create(&h, "buyer_a", buy_request("prod_cpm_fixed", 5_000.0)).await;
        assert_eq!(outcome.status, TaskStatus::InputRequired);

        let media_buy_id = outcome.payload["media_buy_id"].as_str().unwrap();
        let buy = h.store.get_media_buy("acme", media_buy_id).await.unwrap().unwrap();
        assert_eq!(buy.status, MediaBuyStatus::PendingApproval);
    }
}
