use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::delivery::DeliveryCache;
use crate::core::models::media_buy::{MediaBuy, MediaPackage};
use crate::core::models::workflow::{MappingAction, ObjectType};
use crate::core::pipeline::AsyncTask;
use crate::core::spec::status::{MediaBuyStatus, determine_media_buy_status, sanitize_package_status};
use crate::core::store::Store;
use crate::core::workflow::WorkflowEngine;
use anyhow::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Builds the media buy row for persistence. The raw request is
/// serialized after permanent package ids were injected, so the
/// post-approval path can rehydrate the exact same ids.
pub(crate) fn build_media_buy_row(
    context: &CreateMediaBuyContext,
    media_buy_id: &str,
    status: MediaBuyStatus,
) -> Result<MediaBuy, Error> {
    let req = context.req.read();
    let principal = context.principal.get().expect("principal loaded before persistence");
    let start_time = *context.start_time.get().expect("start resolved before persistence");

    Ok(MediaBuy {
        media_buy_id: media_buy_id.to_string(),
        tenant_id: context.tenant.tenant_id.clone(),
        principal_id: context.principal_id.clone(),
        buyer_ref: req.buyer_ref.clone(),
        po_number: req.po_number.clone(),
        order_name: req
            .po_number
            .clone()
            .unwrap_or_else(|| format!("{} - {}", req.buyer_ref, start_time.format("%Y-%m-%d"))),
        advertiser_name: principal.name.clone(),
        budget: *context.total_budget.get().expect("budget validated before persistence"),
        currency: context.currency.get().expect("currency resolved before persistence").clone(),
        start_time,
        end_time: *context.end_time.get().expect("end resolved before persistence"),
        status,
        raw_request: serde_json::to_value(&*req)?,
        created_at: context.now,
        updated_at: context.now,
    })
}

/// Builds the package rows with the dual write: budget, bid price and
/// pacing land both in their dedicated fields and inside the
/// `package_config` JSON. Adapter-reported statuses are sanitized so
/// workflow states can never leak into a package status.
pub(crate) fn build_package_rows(
    context: &CreateMediaBuyContext,
    media_buy_id: &str,
    adapter_statuses: &[Option<String>],
) -> Vec<MediaPackage> {
    let specs = context.package_specs.lock();
    let pricing = context.pricing_by_package.lock();
    let req = context.req.read();
    let pacing = req.pacing.to_string();

    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let pricing_info = pricing.get(&spec.package_id);
            let status = sanitize_package_status(
                adapter_statuses.get(i).and_then(|s| s.as_deref()),
            );

            let package_config = json!({
                "package_id": spec.package_id,
                "name": spec.name,
                "product_id": spec.product_id,
                "budget": spec.budget,
                "targeting_overlay": spec.targeting_overlay,
                "creative_ids": spec.creative_ids,
                "status": status,
                "pricing_info": pricing_info,
                "impressions": spec.impressions,
            });

            MediaPackage {
                media_buy_id: media_buy_id.to_string(),
                package_id: spec.package_id.clone(),
                budget: spec.budget,
                bid_price: pricing_info.and_then(|p| p.bid_price),
                pacing: Some(pacing.clone()),
                package_config,
                created_at: context.now,
            }
        })
        .collect()
}

/// Persists the created buy: the MediaBuy row first, then its
/// packages, then the workflow mapping, in that order. Also feeds the
/// in-memory delivery cache.
pub struct PersistTask {
    store: Arc<dyn Store>,
    engine: Arc<WorkflowEngine>,
    cache: Arc<DeliveryCache>,
}

impl PersistTask {
    pub fn new(store: Arc<dyn Store>, engine: Arc<WorkflowEngine>, cache: Arc<DeliveryCache>) -> Self {
        PersistTask {
            store,
            engine,
            cache,
        }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for PersistTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let result = context.adapter_result.get().expect("adapter ran before persistence");
        let media_buy_id = result.media_buy_id.clone();

        let has_inline_creatives = context
            .req
            .read()
            .packages
            .iter()
            .any(|p| p.creative_ids.as_ref().map(|ids| !ids.is_empty()).unwrap_or(false));

        // Inline creatives still need the sync approval flow before
        // they count as approved; a buy that referenced none waits on
        // nothing and takes its flight-window status directly.
        let status = determine_media_buy_status(
            false,
            true,
            !has_inline_creatives,
            *context.start_time.get().expect("start resolved"),
            *context.end_time.get().expect("end resolved"),
            context.now,
        );

        let buy = build_media_buy_row(context, &media_buy_id, status)?;
        self.store.insert_media_buy(buy.clone()).await?;

        let adapter_statuses: Vec<Option<String>> =
            result.packages.iter().map(|p| p.status.clone()).collect();
        let packages = build_package_rows(context, &media_buy_id, &adapter_statuses);
        self.store.insert_media_packages(packages).await?;

        if let Some(step) = context.step.get() {
            self.engine
                .add_mapping(&step.step_id, ObjectType::MediaBuy, &media_buy_id, MappingAction::Create)
                .await?;
        }

        self.cache.insert(buy);

        info!("Persisted media buy {} with status {}", media_buy_id, status);

        Ok(())
    }
}
