use crate::app::pipeline::media_buy::pipeline::MediaBuyDeps;
use crate::app::pipeline::media_buy::tasks::asset_from_creative;
use crate::core::adapters::{AdapterBuyRequest, AdapterPackageSpec, build_adapter, call_with_timeout};
use crate::core::models::media_buy::{MediaBuy, PricingInfo};
use crate::core::spec::requests::CreateMediaBuyRequest;
use crate::core::spec::status::determine_media_buy_status;
use anyhow::Error;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Executes the adapter leg for a manually approved media buy.
///
/// The original request is rehydrated from the stored raw request and
/// marked already-approved so the adapter skips its own approval
/// workflow; the persisted package rows supply the permanent ids and
/// the validated pricing (including auction bid prices). Creatives
/// without a platform id are uploaded, and order approval is
/// re-attempted on adapters that support it.
///
/// Returns `(success, error_message)` so the caller can transition the
/// workflow step either way.
pub async fn execute_approved_media_buy(
    deps: &MediaBuyDeps,
    media_buy_id: &str,
    tenant_id: &str,
) -> (bool, Option<String>) {
    match run(deps, media_buy_id, tenant_id).await {
        Ok(()) => (true, None),
        Err(e) => {
            error!("Approved media buy {} failed to execute: {}", media_buy_id, e);
            (false, Some(e.to_string()))
        }
    }
}

async fn run(deps: &MediaBuyDeps, media_buy_id: &str, tenant_id: &str) -> Result<(), Error> {
    let tenant = deps
        .store
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Tenant {} not found", tenant_id))?;

    let mut buy: MediaBuy = deps
        .store
        .get_media_buy(tenant_id, media_buy_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Media buy {} not found", media_buy_id))?;

    let mut request: CreateMediaBuyRequest = serde_json::from_value(buy.raw_request.clone())
        .map_err(|e| anyhow::anyhow!("Failed to reconstruct request: {}", e))?;
    request.already_approved = true;

    let packages = deps.store.list_media_packages(media_buy_id).await?;
    if packages.is_empty() {
        return Err(anyhow::anyhow!("No packages found for media buy {}", media_buy_id));
    }

    let principal = deps
        .store
        .get_principal(tenant_id, &buy.principal_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Principal {} not found", buy.principal_id))?;

    // Rebuild adapter specs from the persisted rows, keeping the
    // stored pricing info so auction bid prices survive the approval
    // hop.
    let mut specs: Vec<AdapterPackageSpec> = Vec::new();
    let mut pricing_info: HashMap<String, PricingInfo> = HashMap::new();

    for package in &packages {
        let product_id = package
            .product_id()
            .ok_or_else(|| anyhow::anyhow!("Package {} missing product_id", package.package_id))?
            .to_string();

        let product = deps
            .store
            .get_product(tenant_id, &product_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("Product {} not found for package {}", product_id, package.package_id)
            })?;

        let pricing = package.pricing_info().or_else(|| {
            product.pricing_options.first().map(|option| PricingInfo {
                pricing_model: option.pricing_model,
                rate: option.rate,
                currency: option.currency.clone(),
                is_fixed: option.is_fixed,
                bid_price: None,
            })
        });

        let cpm = pricing
            .as_ref()
            .map(|p| p.effective_rate())
            .filter(|rate| *rate > 0.0)
            .unwrap_or(10.0);
        let budget = package.budget.unwrap_or(0.0);

        if let Some(pricing) = pricing {
            pricing_info.insert(package.package_id.clone(), pricing);
        }

        specs.push(AdapterPackageSpec {
            package_id: package.package_id.clone(),
            name: package
                .package_config
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&product.name)
                .to_string(),
            product_id,
            delivery_type: product.delivery_type,
            cpm,
            impressions: (budget / cpm * 1000.0).max(0.0) as u64,
            format_ids: product.formats.clone(),
            targeting_overlay: package.package_config.get("targeting_overlay").cloned(),
            buyer_ref: Some(buy.buyer_ref.clone()),
            budget: package.budget,
            creative_ids: package.creative_ids(),
        });
    }

    let adapter = build_adapter(&tenant, &principal, false, deps.http.clone());

    let adapter_request = AdapterBuyRequest {
        media_buy_id: media_buy_id.to_string(),
        buyer_ref: buy.buyer_ref.clone(),
        po_number: buy.po_number.clone(),
        order_name: buy.order_name.clone(),
        total_budget: buy.budget,
        currency: buy.currency.clone(),
        targeting_overlay: request.targeting_overlay.clone(),
        already_approved: request.already_approved,
    };

    let result = call_with_timeout(
        deps.adapter_timeout,
        "create_media_buy",
        adapter.create_media_buy(&adapter_request, &specs, buy.start_time, buy.end_time, &pricing_info),
    )
    .await?;

    info!(
        "Adapter creation succeeded for approved media buy {} ({} packages)",
        media_buy_id,
        result.packages.len()
    );

    // Upload every assigned creative that the ad server does not know
    // yet, grouped so each creative goes up once with all its
    // packages.
    let assignments = deps
        .store
        .list_assignments_for_media_buy(tenant_id, media_buy_id)
        .await?;

    let mut packages_by_creative: HashMap<String, Vec<String>> = HashMap::new();
    for assignment in &assignments {
        packages_by_creative
            .entry(assignment.creative_id.clone())
            .or_default()
            .push(assignment.package_id.clone());
    }

    let mut all_approved = true;
    for (creative_id, package_ids) in packages_by_creative {
        let Some(mut creative) = deps
            .store
            .get_creative(tenant_id, &buy.principal_id, &creative_id)
            .await?
        else {
            warn!("Creative {} not found during approval execution", creative_id);
            continue;
        };

        if creative.status != crate::core::models::creative::CreativeStatus::Approved {
            all_approved = false;
        }

        if creative.data.platform_creative_id.is_some() {
            continue;
        }

        let Some(asset) = asset_from_creative(&creative, package_ids) else {
            continue;
        };

        let statuses = adapter
            .add_creative_assets(media_buy_id, &[asset], Utc::now())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to upload creatives to adapter: {}", e))?;

        if let Some(status) = statuses.first()
            && let Some(platform_id) = &status.platform_creative_id
        {
            creative.data.platform_creative_id = Some(platform_id.clone());
            creative.updated_at = Utc::now();
            deps.store.upsert_creative(creative).await?;
        }
    }

    if !adapter.approve_order(media_buy_id).await? {
        return Err(anyhow::anyhow!(
            "Failed to approve order {}, it will remain in draft status",
            media_buy_id
        ));
    }

    // A buy carrying no creative assignments waits on nothing;
    // unapproved assignments park it at needs_creatives.
    let creatives_settled = assignments.is_empty() || all_approved;
    buy.status = determine_media_buy_status(
        false,
        true,
        creatives_settled,
        buy.start_time,
        buy.end_time,
        Utc::now(),
    );
    buy.updated_at = Utc::now();
    deps.store.update_media_buy(buy.clone()).await?;
    deps.cache.insert(buy);

    Ok(())
}
