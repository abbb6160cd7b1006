use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::app::pipeline::media_buy::pipeline as create_pipeline;
use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::app::pipeline::media_buy::update::pipeline as update_pipeline;
use crate::app::state::AppState;
use crate::core::adapters::build_adapter;
use crate::core::auth::{AuthContext, RequestHeaders};
use crate::core::observability::AuditLogger;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::requests::{
    CreateMediaBuyRequest, GetMediaBuyDeliveryRequest, UpdateMediaBuyRequest,
    UpdatePerformanceIndexRequest,
};
use crate::core::spec::responses::{ToolOutcome, UpdatePerformanceIndexResponse};
use crate::core::spec::testing::TestingContext;
use anyhow::Error;
use serde_json::json;
use tracing::{info, warn};

/// Runs the create pipeline; the envelope always comes off the
/// context, whether the pipeline completed, failed, or parked the buy
/// for approval.
pub async fn create_media_buy(
    state: &AppState,
    auth: &AuthContext,
    headers: RequestHeaders,
    req: CreateMediaBuyRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .clone()
        .expect("dispatcher enforces auth for create_media_buy");

    let context = CreateMediaBuyContext::new(auth.tenant.clone(), principal_id, headers, req);

    let _ = state.create_pipeline.run(&context).await;

    Ok(create_pipeline::outcome_of(&context))
}

pub async fn update_media_buy(
    state: &AppState,
    auth: &AuthContext,
    headers: RequestHeaders,
    req: UpdateMediaBuyRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .clone()
        .expect("dispatcher enforces auth for update_media_buy");

    let context = UpdateMediaBuyContext::new(auth.tenant.clone(), principal_id, headers, req);

    let _ = state.update_pipeline.run(&context).await;

    Ok(update_pipeline::outcome_of(&context))
}

pub async fn get_media_buy_delivery(
    state: &AppState,
    auth: &AuthContext,
    req: GetMediaBuyDeliveryRequest,
    testing: &TestingContext,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .as_deref()
        .expect("dispatcher enforces auth for get_media_buy_delivery");

    let response = state
        .reporter
        .report(&auth.tenant.tenant_id, principal_id, &req, testing)
        .await?;

    Ok(ToolOutcome::completed(response))
}

/// Fans per-product performance scores into the adapter's optimization
/// hook. Low scores are surfaced in the audit trail only.
pub async fn update_performance_index(
    state: &AppState,
    auth: &AuthContext,
    req: UpdatePerformanceIndexRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .as_deref()
        .expect("dispatcher enforces auth for update_performance_index");
    let tenant = &auth.tenant;
    let audit = AuditLogger::new(&tenant.tenant_id);

    let buy = state
        .store
        .get_media_buy(&tenant.tenant_id, &req.media_buy_id)
        .await?;
    let Some(buy) = buy else {
        return Err(AdcpError::validation(format!("Media buy {} not found", req.media_buy_id)).into());
    };

    if buy.principal_id != principal_id {
        audit.log_security_violation(
            "update_performance_index",
            Some(principal_id),
            &format!(
                "Principal attempted to modify media buy {} owned by {}",
                buy.media_buy_id, buy.principal_id
            ),
        );
        return Err(AdcpError::new(
            ErrorCode::AuthenticationError,
            format!("Principal {} does not own media buy {}", principal_id, req.media_buy_id),
        )
        .into());
    }

    let principal = state
        .store
        .get_principal(&tenant.tenant_id, principal_id)
        .await?
        .ok_or_else(|| AdcpError::new(ErrorCode::AuthenticationError, "Principal not found"))?;

    // Scores arrive keyed by product; line items are keyed by package.
    let packages = state.store.list_media_packages(&req.media_buy_id).await?;
    let scores: Vec<(String, f64)> = req
        .performance_data
        .iter()
        .map(|perf| {
            let package_id = packages
                .iter()
                .find(|p| p.product_id() == Some(perf.product_id.as_str()))
                .map(|p| p.package_id.clone())
                .unwrap_or_else(|| perf.product_id.clone());
            (package_id, perf.performance_index)
        })
        .collect();

    let adapter = build_adapter(tenant, &principal, false, state.http.clone());
    let success = adapter.update_performance_index(&req.media_buy_id, &scores).await?;

    for perf in &req.performance_data {
        if perf.performance_index < 0.8 {
            warn!(
                "Low performance index {:.2} for product {} on {}",
                perf.performance_index, perf.product_id, req.media_buy_id
            );
        }
    }

    audit.log_operation(
        "update_performance_index",
        &principal.name,
        Some(principal_id),
        success,
        &json!({
            "media_buy_id": req.media_buy_id,
            "product_count": req.performance_data.len(),
            "low_scores": req
                .performance_data
                .iter()
                .filter(|p| p.performance_index < 0.8)
                .count(),
        }),
    );

    info!(
        "Performance index update for {}: {} products, success={}",
        req.media_buy_id,
        req.performance_data.len(),
        success
    );

    let response = UpdatePerformanceIndexResponse {
        detail: format!(
            "Performance index updated for {} products",
            req.performance_data.len()
        ),
        errors: None,
    };

    if success {
        Ok(ToolOutcome::completed(response))
    } else {
        Ok(ToolOutcome::failed(response))
    }
}
