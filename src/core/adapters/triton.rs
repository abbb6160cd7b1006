use crate::core::adapters::{
    AdClient, AdServerAdapter, AdapterAsset, AdapterBuyRequest, AdapterPackage,
    AdapterPackageSpec, AdapterType, AssociationResult, CreativeAssetStatus, MediaBuyResult,
    UpdateAction, UpdateOutcome,
};
use crate::core::models::media_buy::PricingInfo;
use crate::core::models::product::PricingModel;
use crate::core::models::tenant::{AdapterSettings, TritonSettings};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Triton Digital connector for audio inventory. Orders attach to the
/// tenant's station.
pub struct TritonDigital {
    settings: AdapterSettings,
    triton: TritonSettings,
    tenant_id: String,
    dry_run: bool,
    http: Arc<AdClient>,
}

impl TritonDigital {
    pub fn new(settings: AdapterSettings, tenant_id: String, dry_run: bool, http: Arc<AdClient>) -> Self {
        let triton = settings.triton.clone().unwrap_or_default();
        TritonDigital {
            settings,
            triton,
            tenant_id,
            dry_run,
            http,
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, Error> {
        let base = self.triton.endpoint.as_deref().ok_or_else(|| {
            AdcpError::new(
                ErrorCode::InvalidConfiguration,
                format!("Tenant {} has no Triton endpoint configured", self.tenant_id),
            )
        })?;

        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

#[async_trait]
impl AdServerAdapter for TritonDigital {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Triton
    }

    fn manual_approval_required(&self) -> bool {
        self.settings.manual_approval_required
    }

    fn manual_approval_operations(&self) -> Vec<String> {
        self.settings.manual_approval_operations.clone()
    }

    fn supported_pricing_models(&self) -> HashSet<PricingModel> {
        [PricingModel::Cpm].into_iter().collect()
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
            info!("Would create Triton order {} with {} spots", request.media_buy_id, packages.len());
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
            "station_id": self.triton.station_id,
            "order_ref": request.media_buy_id,
            "name": request.order_name,
            "budget": request.total_budget,
            "currency": request.currency,
            "start": start_time,
            "end": end_time,
            "spots": packages,
            "pricing": pricing_info,
        });

        let response = self
            .http
            .post_json(&url, self.triton.api_key.as_deref(), &body)
            .await?;
        let Some(payload) = response.body else {
            return Err(anyhow!(
                "Triton rejected order {} with http {}",
                request.media_buy_id,
                response.status_code
            ));
        };

        let spots = payload
            .get("spots")
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
                platform_line_item_id: spots
                    .get(i)
                    .and_then(|s| s.get("id"))
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
            info!("Would {} on Triton order {}", action, media_buy_id);
            return Ok(UpdateOutcome::ok());
        }

        let url = self.endpoint(&format!("orders/{}/actions", media_buy_id))?;
        let body = json!({
            "action": action.to_string(),
            "spot_ref": package_id,
            "budget": budget,
        });

        let response = self
            .http
            .post_json(&url, self.triton.api_key.as_deref(), &body)
            .await?;
        if response.body.is_none() {
            return Ok(UpdateOutcome::failed(format!(
                "Triton returned http {} for {}",
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
        let url = self.endpoint(&format!("orders/{}/audio", media_buy_id))?;
        let body = json!({ "creatives": assets });

        let response = self
            .http
            .post_json(&url, self.triton.api_key.as_deref(), &body)
            .await?;
        let Some(payload) = response.body else {
            return Err(anyhow!(
                "Triton creative upload for {} failed with http {}",
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
        // Triton associates at upload time; report success so callers
        // don't retry.
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

    async fn approve_order(&self, _media_buy_id: &str) -> Result<bool, Error> {
        Ok(true)
    }

    async fn update_performance_index(
        &self,
        media_buy_id: &str,
        scores: &[(String, f64)],
    ) -> Result<bool, Error> {
        info!(
            "Triton has no optimization hook; ignoring {} scores for {}",
            scores.len(),
            media_buy_id
        );
        Ok(false)
    }
}
