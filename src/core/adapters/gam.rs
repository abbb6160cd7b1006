use crate::core::adapters::{
    AdClient, AdServerAdapter, AdapterAsset, AdapterBuyRequest, AdapterPackage,
    AdapterPackageSpec, AdapterType, AssociationResult, CreativeAssetStatus, MediaBuyResult,
    UpdateAction, UpdateOutcome,
};
use crate::core::models::media_buy::PricingInfo;
use crate::core::models::product::PricingModel;
use crate::core::models::tenant::{AdapterSettings, GamSettings};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

/// Google Ad Manager connector. Talks to the GAM bridge service
/// configured per tenant; order and line item ids are scoped under the
/// tenant's network code.
pub struct GoogleAdManager {
    settings: AdapterSettings,
    gam: GamSettings,
    tenant_id: String,
    advertiser_id: Option<String>,
    dry_run: bool,
    http: Arc<AdClient>,
}

impl GoogleAdManager {
    pub fn new(
        settings: AdapterSettings,
        tenant_id: String,
        advertiser_id: Option<String>,
        dry_run: bool,
        http: Arc<AdClient>,
    ) -> Self {
        let gam = settings.gam.clone().unwrap_or_default();
        GoogleAdManager {
            settings,
            gam,
            tenant_id,
            advertiser_id,
            dry_run,
            http,
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, Error> {
        let base = self.gam.endpoint.as_deref().ok_or_else(|| {
            AdcpError::new(
                ErrorCode::InvalidConfiguration,
                format!("Tenant {} has no GAM bridge endpoint configured", self.tenant_id),
            )
        })?;

        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

#[async_trait]
impl AdServerAdapter for GoogleAdManager {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::GoogleAdManager
    }

    fn manual_approval_required(&self) -> bool {
        self.settings.manual_approval_required
    }

    fn manual_approval_operations(&self) -> Vec<String> {
        self.settings.manual_approval_operations.clone()
    }

    fn supported_pricing_models(&self) -> HashSet<PricingModel> {
        [PricingModel::Cpm, PricingModel::Cpcv, PricingModel::Cpp]
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
        if self.dry_run {
            info!("Would create GAM order {} with {} line items", request.media_buy_id, packages.len());
            return Ok(MediaBuyResult {
                media_buy_id: request.media_buy_id.clone(),
                packages: packages
                    .iter()
                    .map(|p| AdapterPackage {
                        package_id: Some(p.package_id.clone()),
                        name: Some(p.name.clone()),
                        product_id: Some(p.product_id.clone()),
                        budget: p.budget,
                        status: Some("draft".to_string()),
                        platform_line_item_id: None,
                    })
                    .collect(),
                creative_deadline: None,
                errors: Vec::new(),
            });
        }

        let url = self.endpoint("orders")?;
        let body = json!({
            "network_code": self.gam.network_code,
            "trafficker_id": self.gam.trafficker_id,
            "advertiser_id": self.advertiser_id,
            "order_ref": request.media_buy_id,
            "order_name": request.order_name,
            "po_number": request.po_number,
            "total_budget": request.total_budget,
            "currency": request.currency,
            "start_time": start_time,
            "end_time": end_time,
            "skip_approval_workflow": request.already_approved,
            "line_items": packages,
            "pricing": pricing_info,
        });

        let response = self.http.post_json(&url, None, &body).await?;
        let Some(payload) = response.body else {
            error!("GAM order creation for {} returned http {}", request.media_buy_id, response.status_code);
            return Err(anyhow!(
                "GAM rejected order {} with http {}",
                request.media_buy_id,
                response.status_code
            ));
        };

        let line_items = payload
            .get("line_items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let packages = packages
            .iter()
            .enumerate()
            .map(|(i, spec)| AdapterPackage {
                package_id: Some(spec.package_id.clone()),
                name: Some(spec.name.clone()),
                product_id: Some(spec.product_id.clone()),
                budget: spec.budget,
                status: Some("draft".to_string()),
                platform_line_item_id: line_items
                    .get(i)
                    .and_then(|li| li.get("id"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            })
            .collect();

        Ok(MediaBuyResult {
            media_buy_id: request.media_buy_id.clone(),
            packages,
            creative_deadline: None,
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
            info!("Would {} on GAM order {}", action, media_buy_id);
            return Ok(UpdateOutcome::ok());
        }

        let url = self.endpoint(&format!("orders/{}/actions", media_buy_id))?;
        let body = json!({
            "action": action.to_string(),
            "line_item_ref": package_id,
            "budget": budget,
        });

        let response = self.http.post_json(&url, None, &body).await?;
        if response.body.is_none() {
            return Ok(UpdateOutcome::failed(format!(
                "GAM returned http {} for {}",
                response.status_code, action
            )));
        }

        Ok(UpdateOutcome::ok())
    }

    async fn add_creative_assets(
        &self,
        media_buy_id: &str,
        assets: &[AdapterAsset],
        _now: DateTime<Utc>,
    ) -> Result<Vec<CreativeAssetStatus>, Error> {
        let url = self.endpoint(&format!("orders/{}/creatives", media_buy_id))?;
        let body = json!({ "advertiser_id": self.advertiser_id, "creatives": assets });

        let response = self.http.post_json(&url, None, &body).await?;
        let Some(payload) = response.body else {
            return Err(anyhow!(
                "GAM creative upload for {} failed with http {}",
                media_buy_id,
                response.status_code
            ));
        };

        let uploaded = payload
            .get("creatives")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(assets
            .iter()
            .enumerate()
            .map(|(i, asset)| {
                let platform_id = uploaded
                    .get(i)
                    .and_then(|c| c.get("id"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                CreativeAssetStatus {
                    creative_id: asset.creative_id.clone(),
                    approved: platform_id.is_some(),
                    message: platform_id.is_none().then(|| "upload rejected".to_string()),
                    platform_creative_id: platform_id,
                }
            })
            .collect())
    }

    async fn associate_creatives(
        &self,
        line_item_ids: &[String],
        platform_creative_ids: &[String],
    ) -> Result<Vec<AssociationResult>, Error> {
        let url = self.endpoint("associations")?;
        let body = json!({
            "line_item_ids": line_item_ids,
            "creative_ids": platform_creative_ids,
        });

        let response = self.http.post_json(&url, None, &body).await?;
        let success = response.body.is_some();

        let mut results = Vec::new();
        for line_item_id in line_item_ids {
            for creative_id in platform_creative_ids {
                results.push(AssociationResult {
                    line_item_id: line_item_id.clone(),
                    creative_id: creative_id.clone(),
                    success,
                    error: (!success).then(|| format!("http {}", response.status_code)),
                });
            }
        }

        Ok(results)
    }

    async fn approve_order(&self, media_buy_id: &str) -> Result<bool, Error> {
        if self.dry_run {
            info!("Would approve GAM order {}", media_buy_id);
            return Ok(true);
        }

        let url = self.endpoint(&format!("orders/{}/approve", media_buy_id))?;
        let response = self.http.post_json(&url, None, &json!({})).await?;

        Ok(response.body.is_some())
    }

    async fn update_performance_index(
        &self,
        media_buy_id: &str,
        scores: &[(String, f64)],
    ) -> Result<bool, Error> {
        let url = self.endpoint(&format!("orders/{}/performance", media_buy_id))?;
        let body = json!({
            "scores": scores
                .iter()
                .map(|(package_id, index)| json!({"line_item_ref": package_id, "index": index}))
                .collect::<Vec<_>>(),
        });

        let response = self.http.post_json(&url, None, &body).await?;
        Ok(response.body.is_some())
    }
}
