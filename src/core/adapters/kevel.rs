use crate::core::adapters::{
    AdClient, AdServerAdapter, AdapterAsset, AdapterBuyRequest, AdapterPackage,
    AdapterPackageSpec, AdapterType, AssociationResult, CreativeAssetStatus, MediaBuyResult,
    UpdateAction, UpdateOutcome,
};
use crate::core::models::media_buy::PricingInfo;
use crate::core::models::product::PricingModel;
use crate::core::models::tenant::{AdapterSettings, KevelSettings};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Kevel connector. Campaigns map to media buys and flights to
/// packages, keyed by the tenant's network id.
pub struct Kevel {
    settings: AdapterSettings,
    kevel: KevelSettings,
    tenant_id: String,
    advertiser_id: Option<String>,
    dry_run: bool,
    http: Arc<AdClient>,
}

impl Kevel {
    pub fn new(
        settings: AdapterSettings,
        tenant_id: String,
        advertiser_id: Option<String>,
        dry_run: bool,
        http: Arc<AdClient>,
    ) -> Self {
        let kevel = settings.kevel.clone().unwrap_or_default();
        Kevel {
            settings,
            kevel,
            tenant_id,
            advertiser_id,
            dry_run,
            http,
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, Error> {
        let base = self.kevel.endpoint.as_deref().ok_or_else(|| {
            AdcpError::new(
                ErrorCode::InvalidConfiguration,
                format!("Tenant {} has no Kevel endpoint configured", self.tenant_id),
            )
        })?;

        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    fn api_key(&self) -> Option<&str> {
        self.kevel.api_key.as_deref()
    }
}

#[async_trait]
impl AdServerAdapter for Kevel {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Kevel
    }

    fn manual_approval_required(&self) -> bool {
        self.settings.manual_approval_required
    }

    fn manual_approval_operations(&self) -> Vec<String> {
        self.settings.manual_approval_operations.clone()
    }

    fn supported_pricing_models(&self) -> HashSet<PricingModel> {
        [PricingModel::Cpm, PricingModel::Cpc, PricingModel::FlatRate]
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
            info!("Would create Kevel campaign {} with {} flights", request.media_buy_id, packages.len());
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

        let url = self.endpoint("campaigns")?;
        let body = json!({
            "network_id": self.kevel.network_id,
            "advertiser_id": self.advertiser_id,
            "campaign_ref": request.media_buy_id,
            "name": request.order_name,
            "budget": request.total_budget,
            "currency": request.currency,
            "start": start_time,
            "end": end_time,
            "flights": packages,
            "pricing": pricing_info,
        });

        let response = self.http.post_json(&url, self.api_key(), &body).await?;
        let Some(payload) = response.body else {
            return Err(anyhow!(
                "Kevel rejected campaign {} with http {}",
                request.media_buy_id,
                response.status_code
            ));
        };

        let flights = payload
            .get("flights")
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
                platform_line_item_id: flights
                    .get(i)
                    .and_then(|f| f.get("id"))
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
            info!("Would {} on Kevel campaign {}", action, media_buy_id);
            return Ok(UpdateOutcome::ok());
        }

        let url = self.endpoint(&format!("campaigns/{}/actions", media_buy_id))?;
        let body = json!({
            "action": action.to_string(),
            "flight_ref": package_id,
            "budget": budget,
        });

        let response = self.http.post_json(&url, self.api_key(), &body).await?;
        if response.body.is_none() {
            return Ok(UpdateOutcome::failed(format!(
                "Kevel returned http {} for {}",
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
        let url = self.endpoint(&format!("campaigns/{}/creatives", media_buy_id))?;
        let body = json!({ "creatives": assets });

        let response = self.http.post_json(&url, self.api_key(), &body).await?;
        let Some(payload) = response.body else {
            return Err(anyhow!(
                "Kevel creative upload for {} failed with http {}",
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
        let url = self.endpoint("ad-mappings")?;
        let body = json!({
            "flight_ids": line_item_ids,
            "creative_ids": platform_creative_ids,
        });

        let response = self.http.post_json(&url, self.api_key(), &body).await?;
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

    async fn approve_order(&self, _media_buy_id: &str) -> Result<bool, Error> {
        // Kevel has no order approval concept; campaigns go live on
        // activation.
        Ok(true)
    }

    async fn update_performance_index(
        &self,
        media_buy_id: &str,
        scores: &[(String, f64)],
    ) -> Result<bool, Error> {
        let url = self.endpoint(&format!("campaigns/{}/priorities", media_buy_id))?;
        let body = json!({
            "scores": scores
                .iter()
                .map(|(package_id, index)| json!({"flight_ref": package_id, "index": index}))
                .collect::<Vec<_>>(),
        });

        let response = self.http.post_json(&url, self.api_key(), &body).await?;
        Ok(response.body.is_some())
    }
}
