mod client;
mod gam;
mod kevel;
mod mock;
mod triton;

pub use client::AdClient;
pub use gam::GoogleAdManager;
pub use kevel::Kevel;
pub use mock::MockAdServer;
pub use triton::TritonDigital;

use crate::core::models::media_buy::PricingInfo;
use crate::core::models::principal::Principal;
use crate::core::models::product::{DeliveryType, PricingModel};
use crate::core::models::tenant::Tenant;
use crate::core::spec::errors::{AdcpError, ErrorCode, ErrorDetail};
use crate::core::spec::formats::FormatRef;
use anyhow::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum AdapterType {
    #[default]
    Mock,
    GoogleAdManager,
    Kevel,
    #[strum(to_string = "triton", serialize = "triton_digital")]
    Triton,
}

/// Campaign-level fields handed to an adapter. The media buy id is
/// issued by the engine before the adapter runs and scopes every
/// platform-side artifact; adapters echo it back.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterBuyRequest {
    pub media_buy_id: String,
    pub buyer_ref: String,
    pub po_number: Option<String>,
    pub order_name: String,
    pub total_budget: f64,
    pub currency: String,
    pub targeting_overlay: Option<Value>,
    /// Suppresses the adapter's own approval workflow when the buy
    /// was already approved upstream.
    pub already_approved: bool,
}

/// One line-item-equivalent to provision, with its permanent id.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterPackageSpec {
    pub package_id: String,
    pub name: String,
    pub product_id: String,
    pub delivery_type: DeliveryType,
    pub cpm: f64,
    pub impressions: u64,
    pub format_ids: Vec<FormatRef>,
    pub targeting_overlay: Option<Value>,
    pub buyer_ref: Option<String>,
    pub budget: Option<f64>,
    pub creative_ids: Vec<String>,
}

/// A package as returned by the adapter. `package_id` must always be
/// present; the orchestrator treats its absence as an integrity bug.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterPackage {
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_line_item_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaBuyResult {
    pub media_buy_id: String,
    pub packages: Vec<AdapterPackage>,
    pub creative_deadline: Option<DateTime<Utc>>,
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum UpdateAction {
    ResumeMediaBuy,
    PauseMediaBuy,
    ResumePackage,
    PausePackage,
    UpdatePackageBudget,
    UpdatePackageImpressions,
    UpdateFlightDates,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub success: bool,
    pub detail: Option<String>,
}

impl UpdateOutcome {
    pub fn ok() -> Self {
        UpdateOutcome {
            success: true,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        UpdateOutcome {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// A creative in the shape adapters upload: either a hosted asset
/// with dimensions or a snippet, plus the packages it runs on.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterAsset {
    pub creative_id: String,
    pub name: String,
    pub package_assignments: Vec<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub asset_type: String,
}

#[derive(Debug, Clone)]
pub struct CreativeAssetStatus {
    pub creative_id: String,
    pub platform_creative_id: Option<String>,
    pub approved: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssociationResult {
    pub line_item_id: String,
    pub creative_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Capability surface every ad-server back-end exposes. Construction
/// is a pure function of the tenant's adapter settings and the
/// principal; see [`build_adapter`].
#[async_trait]
pub trait AdServerAdapter: Send + Sync {
    fn adapter_type(&self) -> AdapterType;

    fn manual_approval_required(&self) -> bool;

    fn manual_approval_operations(&self) -> Vec<String>;

    fn supported_pricing_models(&self) -> HashSet<PricingModel>;

    async fn create_media_buy(
        &self,
        request: &AdapterBuyRequest,
        packages: &[AdapterPackageSpec],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        pricing_info: &HashMap<String, PricingInfo>,
    ) -> Result<MediaBuyResult, Error>;

    async fn update_media_buy(
        &self,
        media_buy_id: &str,
        action: UpdateAction,
        package_id: Option<&str>,
        budget: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Error>;

    async fn add_creative_assets(
        &self,
        media_buy_id: &str,
        assets: &[AdapterAsset],
        now: DateTime<Utc>,
    ) -> Result<Vec<CreativeAssetStatus>, Error>;

    async fn associate_creatives(
        &self,
        line_item_ids: &[String],
        platform_creative_ids: &[String],
    ) -> Result<Vec<AssociationResult>, Error>;

    async fn approve_order(&self, media_buy_id: &str) -> Result<bool, Error>;

    async fn update_performance_index(
        &self,
        media_buy_id: &str,
        scores: &[(String, f64)],
    ) -> Result<bool, Error>;
}

/// Builds the adapter for a tenant's configured ad server. Unknown
/// adapter identifiers fall back to mock rather than failing the
/// request; the tenant id scopes adapter-side artifacts.
pub fn build_adapter(
    tenant: &Tenant,
    principal: &Principal,
    dry_run: bool,
    http: Arc<AdClient>,
) -> Arc<dyn AdServerAdapter> {
    let adapter_type = tenant.ad_server.parse::<AdapterType>().unwrap_or_else(|_| {
        warn!(
            "Unknown ad server '{}' for tenant '{}', falling back to mock",
            tenant.ad_server, tenant.tenant_id
        );
        AdapterType::Mock
    });

    let settings = tenant.adapter_settings.clone();
    let tenant_id = tenant.tenant_id.clone();
    let advertiser_id = principal.advertiser_id_for(&adapter_type.to_string());

    match adapter_type {
        AdapterType::Mock => {
            let dry_run = dry_run || settings.mock_dry_run;
            Arc::new(MockAdServer::new(settings, tenant_id, dry_run))
        }
        AdapterType::GoogleAdManager => Arc::new(GoogleAdManager::new(
            settings,
            tenant_id,
            advertiser_id,
            dry_run,
            http,
        )),
        AdapterType::Kevel => Arc::new(Kevel::new(settings, tenant_id, advertiser_id, dry_run, http)),
        AdapterType::Triton => Arc::new(TritonDigital::new(settings, tenant_id, dry_run, http)),
    }
}

/// Applies the configured adapter call timeout. Elapsed timers become
/// `ADAPTER_TIMEOUT` protocol errors; no retry is attempted.
pub async fn call_with_timeout<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdcpError::new(
            ErrorCode::AdapterTimeout,
            format!("Adapter call '{}' timed out after {:?}", operation, timeout),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_type_parsing_with_fallback_spellings() {
        assert_eq!("mock".parse::<AdapterType>().unwrap(), AdapterType::Mock);
        assert_eq!(
            "google_ad_manager".parse::<AdapterType>().unwrap(),
            AdapterType::GoogleAdManager
        );
        assert_eq!("triton".parse::<AdapterType>().unwrap(), AdapterType::Triton);
        assert_eq!("triton_digital".parse::<AdapterType>().unwrap(), AdapterType::Triton);
        assert!("adzerk".parse::<AdapterType>().is_err());
    }

    #[tokio::test]
    async fn test_call_with_timeout_maps_to_adapter_timeout() {
        let result: Result<(), Error> = call_with_timeout(Duration::from_millis(10), "create_media_buy", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        let adcp = err.downcast_ref::<AdcpError>().unwrap();
        assert_eq!(adcp.code, ErrorCode::AdapterTimeout);
    }
}
