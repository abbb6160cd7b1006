use crate::core::adapters::{
    AdServerAdapter, AdapterAsset, AdapterBuyRequest, AdapterPackage, AdapterPackageSpec,
    AdapterType, AssociationResult, CreativeAssetStatus, MediaBuyResult, UpdateAction,
    UpdateOutcome,
};
use crate::core::models::media_buy::PricingInfo;
use crate::core::models::product::PricingModel;
use crate::core::models::tenant::AdapterSettings;
use anyhow::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Deterministic in-process ad server. Echoes the permanent ids it is
/// given, provisions synthetic line items, and approves everything
/// unless configured for manual approval.
pub struct MockAdServer {
    settings: AdapterSettings,
    tenant_id: String,
    dry_run: bool,
}

impl MockAdServer {
    pub fn new(settings: AdapterSettings, tenant_id: String, dry_run: bool) -> Self {
        MockAdServer {
            settings,
            tenant_id,
            dry_run,
        }
    }
}

#[async_trait]
impl AdServerAdapter for MockAdServer {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Mock
    }

    fn manual_approval_required(&self) -> bool {
        self.settings.manual_approval_required
    }

    fn manual_approval_operations(&self) -> Vec<String> {
        self.settings.manual_approval_operations.clone()
    }

    fn supported_pricing_models(&self) -> HashSet<PricingModel> {
        [
            PricingModel::Cpm,
            PricingModel::Cpcv,
            PricingModel::Cpp,
            PricingModel::Cpc,
            PricingModel::Cpv,
            PricingModel::FlatRate,
        ]
        .into_iter()
        .collect()
    }

    async fn create_media_buy(
        &self,
        request: &AdapterBuyRequest,
        packages: &[AdapterPackageSpec],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        pricing_info: &HashMap<String, PricingInfo>,
    ) -> Result<MediaBuyResult, Error> {
        info!(
            "Mock order {} for tenant {}: {} packages, {} {} ({} -> {}), approved={}",
            request.media_buy_id,
            self.tenant_id,
            packages.len(),
            request.total_budget,
            request.currency,
            start_time,
            end_time,
            request.already_approved,
        );

        let result_packages = packages
            .iter()
            .map(|spec| {
                let rate = pricing_info
                    .get(&spec.package_id)
                    .map(|p| p.effective_rate())
                    .unwrap_or(spec.cpm);
                debug!(
                    "Mock line item for package {} at effective rate {}",
                    spec.package_id, rate
                );

                AdapterPackage {
                    package_id: Some(spec.package_id.clone()),
                    name: Some(spec.name.clone()),
                    product_id: Some(spec.product_id.clone()),
                    budget: spec.budget,
                    status: Some("draft".to_string()),
                    platform_line_item_id: Some(format!("mock_li_{}", spec.package_id)),
                }
            })
            .collect();

        Ok(MediaBuyResult {
            media_buy_id: request.media_buy_id.clone(),
            packages: result_packages,
            creative_deadline: Some(start_time - chrono::Duration::hours(48)),
            errors: Vec::new(),
        })
    }

    async fn update_media_buy(
        &self,
        media_buy_id: &str,
        action: UpdateAction,
        package_id: Option<&str>,
        budget: Option<f64>,
        _now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Error> {
        if self.dry_run {
            info!("Would {} on {} (package={:?}, budget={:?})", action, media_buy_id, package_id, budget);
            return Ok(UpdateOutcome::ok());
        }

        debug!("Mock {} on {} (package={:?})", action, media_buy_id, package_id);
        Ok(UpdateOutcome::ok())
    }

    async fn add_creative_assets(
        &self,
        media_buy_id: &str,
        assets: &[AdapterAsset],
        _now: DateTime<Utc>,
    ) -> Result<Vec<CreativeAssetStatus>, Error> {
        Ok(assets
            .iter()
            .map(|asset| {
                let platform_id = format!("mock_cr_{}", &Uuid::new_v4().simple().to_string()[..8]);
                debug!(
                    "Mock upload of creative {} to order {} as {}",
                    asset.creative_id, media_buy_id, platform_id
                );

                CreativeAssetStatus {
                    creative_id: asset.creative_id.clone(),
                    platform_creative_id: Some(platform_id),
                    approved: true,
                    message: None,
                }
            })
            .collect())
    }

    async fn associate_creatives(
        &self,
        line_item_ids: &[String],
        platform_creative_ids: &[String],
    ) -> Result<Vec<AssociationResult>, Error> {
        let mut results = Vec::new();

        for line_item_id in line_item_ids {
            for creative_id in platform_creative_ids {
                results.push(AssociationResult {
                    line_item_id: line_item_id.clone(),
                    creative_id: creative_id.clone(),
                    success: true,
                    error: None,
                });
            }
        }

        Ok(results)
    }

    async fn approve_order(&self, media_buy_id: &str) -> Result<bool, Error> {
        info!("Mock approving order {}", media_buy_id);
        Ok(true)
    }

    async fn update_performance_index(
        &self,
        media_buy_id: &str,
        scores: &[(String, f64)],
    ) -> Result<bool, Error> {
        debug!("Mock performance index for {}: {} packages", media_buy_id, scores.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(package_id: &str) -> AdapterPackageSpec {
        AdapterPackageSpec {
            package_id: package_id.to_string(),
            name: "pkg".to_string(),
            product_id: "prod".to_string(),
            delivery_type: Default::default(),
            cpm: 10.0,
            impressions: 100_000,
            format_ids: Vec::new(),
            targeting_overlay: None,
            buyer_ref: None,
            budget: Some(1000.0),
            creative_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_echoes_permanent_package_ids() {
        let adapter = MockAdServer::new(AdapterSettings::default(), "acme".to_string(), false);
        let request = AdapterBuyRequest {
            media_buy_id: "mb_abc123".to_string(),
            buyer_ref: "bref-1".to_string(),
            po_number: None,
            order_name: "order".to_string(),
            total_budget: 1000.0,
            currency: "USD".to_string(),
            targeting_overlay: None,
            already_approved: false,
        };

        let now = Utc::now();
        let result = adapter
            .create_media_buy(
                &request,
                &[spec("pkg_prod_deadbeef_1")],
                now + chrono::Duration::days(1),
                now + chrono::Duration::days(31),
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.media_buy_id, "mb_abc123");
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].package_id.as_deref(), Some("pkg_prod_deadbeef_1"));
        assert_eq!(
            result.packages[0].platform_line_item_id.as_deref(),
            Some("mock_li_pkg_prod_deadbeef_1")
        );
    }

    #[tokio::test]
    async fn test_uploads_assign_platform_ids() {
        let adapter = MockAdServer::new(AdapterSettings::default(), "acme".to_string(), false);
        let assets = vec![AdapterAsset {
            creative_id: "cr_1".to_string(),
            name: "banner".to_string(),
            package_assignments: vec!["pkg_1".to_string()],
            width: Some(300),
            height: Some(250),
            url: Some("https://cdn.example.com/b.png".to_string()),
            snippet: None,
            asset_type: "image".to_string(),
        }];

        let statuses = adapter.add_creative_assets("mb_1", &assets, Utc::now()).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].approved);
        assert!(statuses[0].platform_creative_id.as_ref().unwrap().starts_with("mock_cr_"));
    }
}
