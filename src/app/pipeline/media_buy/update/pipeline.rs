use crate::app::pipeline::media_buy::pipeline::MediaBuyDeps;
use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::app::pipeline::media_buy::update::tasks::{
    ApplyUpdatesTask, FinalizeUpdateTask, OpenUpdateWorkflowTask, UpdateApprovalGateTask,
    ValidateLimitsTask, VerifyOwnershipTask,
};
use crate::child_span_info;
use crate::core::pipeline::{AsyncTask, Pipeline, PipelineBuilder};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::responses::{ToolOutcome, UpdateMediaBuyResponse};
use crate::core::spec::status::TaskStatus;
use crate::core::workflow::{StepUpdate, WorkflowEngine};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

/// Update pipeline plus the finalizer guaranteeing an outcome and a
/// terminal step on failure.
pub struct UpdateMediaBuyPipelineTask {
    main: Pipeline<UpdateMediaBuyContext, Error>,
    engine: Arc<WorkflowEngine>,
}

impl UpdateMediaBuyPipelineTask {
    async fn run0(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let pipeline_result = self.main.run(context).await;

        if let Err(e) = &pipeline_result {
            debug!("update_media_buy pipeline aborted: {}", e);

            if context.res.get().is_none() {
                let _ = context.res.set(ToolOutcome::failed(UpdateMediaBuyResponse {
                    media_buy_id: context.req.media_buy_id.clone(),
                    buyer_ref: context.req.buyer_ref.clone(),
                    errors: Some(vec![
                        AdcpError::new(ErrorCode::ToolError, format!("Failed to update media buy: {}", e))
                            .detail(),
                    ]),
                    ..Default::default()
                }));
            }

            let outcome = context.res.get().expect("outcome recorded above");
            if outcome.status == TaskStatus::Failed
                && let Some(step) = context.step.get()
            {
                let message = outcome
                    .payload
                    .get("errors")
                    .and_then(|e| e.as_array())
                    .and_then(|e| e.first())
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("media buy update failed")
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
impl AsyncTask<UpdateMediaBuyContext, Error> for UpdateMediaBuyPipelineTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let span = child_span_info!("update_media_buy_pipeline");

        self.run0(context).instrument(span).await
    }
}

pub fn build_update_media_buy_pipeline(deps: &MediaBuyDeps) -> Pipeline<UpdateMediaBuyContext, Error> {
    let main = PipelineBuilder::new()
        .with_async(Box::new(VerifyOwnershipTask::new(deps.store.clone())))
        .with_async(Box::new(OpenUpdateWorkflowTask::new(deps.engine.clone())))
        .with_async(Box::new(UpdateApprovalGateTask::new(
            deps.engine.clone(),
            deps.http.clone(),
        )))
        .with_async(Box::new(ValidateLimitsTask::new(deps.store.clone())))
        .with_async(Box::new(ApplyUpdatesTask::new(
            deps.store.clone(),
            deps.cache.clone(),
            deps.adapter_timeout,
        )))
        .with_async(Box::new(FinalizeUpdateTask::new(deps.engine.clone())))
        .build()
        .expect("update media buy pipeline should have tasks");

    PipelineBuilder::new()
        .with_async(Box::new(UpdateMediaBuyPipelineTask {
            main,
            engine: deps.engine.clone(),
        }))
        .build()
        .expect("wrapped update pipeline should have tasks")
}

pub fn outcome_of(context: &UpdateMediaBuyContext) -> ToolOutcome {
    context.res.get().cloned().unwrap_or_else(|| {
        ToolOutcome::failed(UpdateMediaBuyResponse {
            media_buy_id: context.req.media_buy_id.clone(),
            buyer_ref: context.req.buyer_ref.clone(),
            errors: Some(vec![
                AdcpError::new(ErrorCode::ToolError, "media buy update produced no outcome").detail(),
            ]),
            ..Default::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
    use crate::app::pipeline::media_buy::pipeline::build_create_media_buy_pipeline;
    use crate::app::pipeline::testkit::{Harness, buy_request, harness};
    use crate::core::auth::RequestHeaders;
    use crate::core::spec::requests::UpdateMediaBuyRequest;
    use crate::core::store::Store;
    use chrono::Duration;

    /// Creates a buy at the daily-cap boundary: 30,000 USD over 30
    /// days against the 1,000 USD/day limit.
    async fn seeded_buy(h: &Harness) -> String {
        let pipeline = build_create_media_buy_pipeline(&h.deps);
        let context = CreateMediaBuyContext::new(
            h.tenant.clone(),
            "buyer_a".to_string(),
            RequestHeaders::default(),
            buy_request("prod_cpm_fixed", 30_000.0),
        );
        pipeline.run(&context).await.unwrap();

        crate::app::pipeline::media_buy::pipeline::outcome_of(&context).payload["media_buy_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn run_update(
        h: &Harness,
        principal_id: &str,
        req: UpdateMediaBuyRequest,
    ) -> crate::core::spec::responses::ToolOutcome {
        let pipeline = build_update_media_buy_pipeline(&h.deps);
        let context = crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext::new(
            h.tenant.clone(),
            principal_id.to_string(),
            RequestHeaders::default(),
            req,
        );
        let _ = pipeline.run(&context).await;
        outcome_of(&context)
    }

    fn error_code(outcome: &crate::core::spec::responses::ToolOutcome) -> String {
        outcome.payload["errors"][0]["code"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_flight_shortening_cannot_bypass_daily_cap() {
        let h = harness().await;
        let media_buy_id = seeded_buy(&h).await;

        let before = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();

        // Shrinking the flight to 5 days leaves 6,000 USD/day against
        // a 1,000 USD/day cap.
        let req = UpdateMediaBuyRequest {
            media_buy_id: media_buy_id.clone(),
            end_time: Some(before.start_time + Duration::days(5)),
            buyer_ref: None,
            active: None,
            budget: None,
            currency: None,
            start_time: None,
            pacing: None,
            daily_budget: None,
            targeting_overlay: None,
            packages: None,
            creatives: None,
            push_notification_config: None,
        };

        let outcome = run_update(&h, "buyer_a", req).await;

        assert_eq!(outcome.status, crate::core::spec::status::TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "budget_limit_exceeded");
        assert!(
            outcome.payload["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("daily")
        );

        // No state change.
        let after = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(after.end_time, before.end_time);
        assert_eq!(after.budget, before.budget);
    }

    #[tokio::test]
    async fn test_cross_principal_update_rejected_without_change() {
        let h = harness().await;
        let media_buy_id = seeded_buy(&h).await;
        let before = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();

        let req = UpdateMediaBuyRequest {
            media_buy_id: media_buy_id.clone(),
            budget: Some(5_000.0),
            buyer_ref: None,
            active: None,
            currency: None,
            start_time: None,
            end_time: None,
            pacing: None,
            daily_budget: None,
            targeting_overlay: None,
            packages: None,
            creatives: None,
            push_notification_config: None,
        };

        let outcome = run_update(&h, "buyer_b", req).await;

        assert_eq!(outcome.status, crate::core::spec::status::TaskStatus::Failed);
        assert_eq!(error_code(&outcome), "authentication_error");

        let after = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(after.budget, before.budget);
        assert_eq!(after.principal_id, "buyer_a");
    }

    #[tokio::test]
    async fn test_currency_change_rejected() {
        let h = harness().await;
        let media_buy_id = seeded_buy(&h).await;

        let req = UpdateMediaBuyRequest {
            media_buy_id: media_buy_id.clone(),
            currency: Some("EUR".to_string()),
            budget: Some(10_000.0),
            buyer_ref: None,
            active: None,
            start_time: None,
            end_time: None,
            pacing: None,
            daily_budget: None,
            targeting_overlay: None,
            packages: None,
            creatives: None,
            push_notification_config: None,
        };

        let outcome = run_update(&h, "buyer_a", req).await;
        assert_eq!(error_code(&outcome), "currency_not_supported");
    }

    #[tokio::test]
    async fn test_budget_update_writes_through() {
        let h = harness().await;
        let media_buy_id = seeded_buy(&h).await;

        // 15,000 over the original 30 days stays inside the cap.
        let req = UpdateMediaBuyRequest {
            media_buy_id: media_buy_id.clone(),
            budget: Some(15_000.0),
            buyer_ref: Some("bref-renamed".to_string()),
            active: Some(true),
            currency: None,
            start_time: None,
            end_time: None,
            pacing: None,
            daily_budget: None,
            targeting_overlay: None,
            packages: None,
            creatives: None,
            push_notification_config: None,
        };

        let outcome = run_update(&h, "buyer_a", req).await;
        assert_eq!(outcome.status, crate::core::spec::status::TaskStatus::Completed);

        let after = h.store.get_media_buy("acme", &media_buy_id).await.unwrap().unwrap();
        assert_eq!(after.budget, 15_000.0);
        assert_eq!(after.buyer_ref, "bref-renamed");
    }
}
