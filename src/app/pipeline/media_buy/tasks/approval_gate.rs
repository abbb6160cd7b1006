use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::app::pipeline::media_buy::tasks::persist::{build_media_buy_row, build_package_rows};
use crate::core::adapters::{AdClient, build_adapter};
use crate::core::delivery::DeliveryCache;
use crate::core::models::creative::CreativeAssignment;
use crate::core::models::media_buy::new_assignment_id;
use crate::core::models::workflow::{MappingAction, ObjectType, StepOwner, StepStatus};
use crate::core::notify::SlackNotifier;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::responses::{CreateMediaBuyResponse, ToolOutcome};
use crate::core::spec::status::MediaBuyStatus;
use crate::core::store::Store;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the tenant's adapter and decides whether the buy is held for
/// human approval: the adapter declares `create_media_buy` as a manual
/// operation, or the tenant disabled auto-creation, or any targeted
/// product did.
///
/// The held path persists the buy under its permanent id with status
/// `pending_approval` and answers `input-required`; approval later
/// replays the adapter leg under the very same ids.
pub struct ApprovalGateTask {
    store: Arc<dyn Store>,
    engine: Arc<WorkflowEngine>,
    slack: Arc<SlackNotifier>,
    cache: Arc<DeliveryCache>,
    http: Arc<AdClient>,
}

impl ApprovalGateTask {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<WorkflowEngine>,
        slack: Arc<SlackNotifier>,
        cache: Arc<DeliveryCache>,
        http: Arc<AdClient>,
    ) -> Self {
        ApprovalGateTask {
            store,
            engine,
            slack,
            cache,
            http,
        }
    }

    async fn hold_for_approval(&self, context: &CreateMediaBuyContext, reason: &str) -> Result<(), Error> {
        let media_buy_id = context
            .media_buy_id
            .get()
            .expect("permanent ids issued before the approval gate")
            .clone();
        let step = context.step.get().expect("workflow step open before the approval gate");

        self.engine
            .update_step(
                &context.tenant,
                &step.step_id,
                StepUpdate {
                    status: Some(StepStatus::RequiresApproval),
                    owner: Some(StepOwner::Publisher),
                    add_comment: Some(("system".to_string(), reason.to_string())),
                    ..Default::default()
                },
            )
            .await?;

        let buy = build_media_buy_row(context, &media_buy_id, MediaBuyStatus::PendingApproval)?;
        self.store.insert_media_buy(buy.clone()).await?;

        // Package status stays null until the adapter actually creates
        // the line items after approval.
        let packages = build_package_rows(context, &media_buy_id, &[]);
        let package_count = packages.len();
        self.store.insert_media_packages(packages).await?;

        self.engine
            .add_mapping(&step.step_id, ObjectType::MediaBuy, &media_buy_id, MappingAction::Create)
            .await?;

        // Inline creatives get their assignments now so approval can
        // upload them without re-reading the request.
        let req = context.req.read().clone();
        for package in &req.packages {
            let Some(package_id) = package.package_id.as_deref() else {
                continue;
            };
            for creative_id in package.creative_ids.iter().flatten() {
                let known = self
                    .store
                    .get_creative(&context.tenant.tenant_id, &context.principal_id, creative_id)
                    .await?;
                if known.is_none() {
                    warn!("Creative {} not found, skipping assignment", creative_id);
                    continue;
                }

                self.store
                    .insert_assignment(CreativeAssignment {
                        assignment_id: new_assignment_id(),
                        tenant_id: context.tenant.tenant_id.clone(),
                        media_buy_id: media_buy_id.clone(),
                        package_id: package_id.to_string(),
                        creative_id: creative_id.clone(),
                        weight: 100,
                        created_at: context.now,
                    })
                    .await?;
            }
        }

        self.cache.insert(buy);

        let principal_name = context
            .principal
            .get()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| context.principal_id.clone());
        self.slack
            .notify_media_buy_event(
                &context.tenant,
                "approval_required",
                Some(&media_buy_id),
                &principal_name,
                json!({
                    "reason": reason,
                    "total_budget": context.total_budget.get(),
                    "workflow_step_id": step.step_id,
                }),
                true,
            )
            .await;

        let response_packages: Vec<serde_json::Value> = context
            .package_specs
            .lock()
            .iter()
            .map(|spec| {
                json!({
                    "package_id": spec.package_id,
                    "name": spec.name,
                    "product_id": spec.product_id,
                    "buyer_ref": spec.buyer_ref,
                    "budget": spec.budget,
                    "creative_ids": spec.creative_ids,
                })
            })
            .collect();

        let message = format!(
            "{} The request has been queued and will be reviewed shortly. Workflow Step ID: {}",
            reason, step.step_id
        );

        let _ = context.res.set(ToolOutcome::input_required(CreateMediaBuyResponse {
            buyer_ref: context.buyer_ref(),
            media_buy_id: Some(media_buy_id.clone()),
            packages: Some(response_packages),
            workflow_step_id: Some(step.step_id.clone()),
            message: Some(message),
            ..Default::default()
        }));

        info!(
            "Media buy {} held for approval ({} packages): {}",
            media_buy_id, package_count, reason
        );

        // Aborts the remaining pipeline; the outcome on the context is
        // already the approval envelope, not a failure.
        Err(anyhow!("media buy held for approval"))
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for ApprovalGateTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let principal = context.principal.get().expect("principal loaded before the approval gate");

        let adapter = build_adapter(
            &context.tenant,
            principal,
            context.testing.dry_run,
            self.http.clone(),
        );
        let _ = context.adapter.set(adapter.clone());

        if adapter.manual_approval_required()
            && adapter
                .manual_approval_operations()
                .iter()
                .any(|op| op == "create_media_buy")
        {
            return self
                .hold_for_approval(context, "Manual approval required for media buy creation.")
                .await;
        }

        if !context.tenant.auto_create_media_buys {
            return self
                .hold_for_approval(context, "Media buy requires approval due to tenant configuration.")
                .await;
        }

        let products = context.products.get().expect("products resolved before the approval gate");
        if products.values().any(|p| !p.auto_create_enabled) {
            return self
                .hold_for_approval(context, "Media buy requires approval due to product configuration.")
                .await;
        }

        Ok(())
    }
}
