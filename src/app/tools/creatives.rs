use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::app::pipeline::creatives::pipeline as sync_pipeline;
use crate::app::state::AppState;
use crate::core::auth::{AuthContext, RequestHeaders};
use crate::core::creatives::creative_view;
use crate::core::observability::AuditLogger;
use crate::core::spec::requests::{ListCreativesRequest, SyncCreativesRequest};
use crate::core::spec::responses::{ListCreativesResponse, Pagination, QuerySummary, ToolOutcome};
use anyhow::Error;
use serde_json::json;

pub async fn sync_creatives(
    state: &AppState,
    auth: &AuthContext,
    headers: RequestHeaders,
    req: SyncCreativesRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .clone()
        .expect("dispatcher enforces auth for sync_creatives");

    let context = SyncCreativesContext::new(auth.tenant.clone(), principal_id, headers, req);

    let _ = state.sync_pipeline.run(&context).await;

    Ok(sync_pipeline::outcome_of(&context))
}

/// Principal-scoped library listing with filters, sorting, and
/// pagination. Never returns another principal's creatives, creative
/// ids notwithstanding.
pub async fn list_creatives(
    state: &AppState,
    auth: &AuthContext,
    mut req: ListCreativesRequest,
) -> Result<ToolOutcome, Error> {
    let principal_id = auth
        .principal_id
        .as_deref()
        .expect("dispatcher enforces auth for list_creatives");

    req.limit = req.limit.clamp(1, 1000);
    req.page = req.page.max(1);

    let (creatives, total) = state
        .store
        .query_creatives(&auth.tenant.tenant_id, principal_id, &req)
        .await?;

    let views: Vec<_> = creatives.iter().map(creative_view).collect();

    let mut filters_applied = Vec::new();
    if let Some(media_buy_id) = &req.media_buy_id {
        filters_applied.push(format!("media_buy_id={}", media_buy_id));
    }
    if let Some(buyer_ref) = &req.buyer_ref {
        filters_applied.push(format!("buyer_ref={}", buyer_ref));
    }
    if let Some(status) = &req.status {
        filters_applied.push(format!("status={}", status));
    }
    if let Some(format) = &req.format {
        filters_applied.push(format!("format={}", format));
    }
    if let Some(search) = &req.search {
        filters_applied.push(format!("search={}", search));
    }

    let total_pages = (total as u32).div_ceil(req.limit);
    let has_more = req.page * req.limit < total as u32;
    let offset = (req.page - 1) * req.limit;

    let mut message = format!("Found {} creatives", views.len());
    if total > views.len() {
        message.push_str(&format!(" (page {} of {} total)", req.page, total));
    }

    AuditLogger::new(&auth.tenant.tenant_id).log_operation(
        "list_creatives",
        principal_id,
        Some(principal_id),
        true,
        &json!({ "result_count": views.len(), "total_count": total, "page": req.page }),
    );

    Ok(ToolOutcome::completed(ListCreativesResponse {
        message,
        query_summary: QuerySummary {
            total_matching: total,
            returned: views.len(),
            filters_applied,
            sort_applied: Some(json!({
                "field": req.sort_by,
                "direction": req.sort_order,
            })),
        },
        pagination: Pagination {
            limit: req.limit,
            offset,
            has_more,
            total_pages,
            current_page: req.page,
        },
        creatives: views,
    }))
}
