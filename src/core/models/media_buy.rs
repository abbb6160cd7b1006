use crate::core::models::product::PricingModel;
use crate::core::spec::status::MediaBuyStatus;
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Permanent media buy id, issued once at the first creation attempt
/// and never renamed, whether the buy is held for approval or created
/// immediately.
pub fn new_media_buy_id() -> String {
    format!("mb_{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Permanent package id. `idx` is 1-based position within the buy.
pub fn new_package_id(product_id: &str, idx: usize) -> String {
    format!(
        "pkg_{}_{}_{}",
        product_id,
        &Uuid::new_v4().simple().to_string()[..8],
        idx
    )
}

pub fn new_assignment_id() -> String {
    format!("assign_{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub fn new_context_id() -> String {
    format!("ctx_{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub fn new_step_id() -> String {
    format!("step_{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub fn new_push_config_id() -> String {
    format!("pnc_{}", &Uuid::new_v4().simple().to_string()[..16])
}

/// Resolved pricing for one package, validated against the product's
/// pricing options and handed to the adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingInfo {
    pub pricing_model: PricingModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub currency: String,
    pub is_fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,
}

impl PricingInfo {
    /// Effective CPM-equivalent rate used for impression estimation.
    pub fn effective_rate(&self) -> f64 {
        if self.is_fixed {
            self.rate.unwrap_or(0.0)
        } else {
            self.bid_price.or(self.rate).unwrap_or(0.0)
        }
    }
}

/// A campaign order as persisted. `raw_request` round-trips the exact
/// request for post-approval execution; the typed columns are the
/// read path.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct MediaBuy {
    pub media_buy_id: String,
    pub tenant_id: String,
    pub principal_id: String,
    pub buyer_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub po_number: Option<String>,
    pub order_name: String,
    pub advertiser_name: String,
    pub budget: f64,
    pub currency: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: MediaBuyStatus,
    pub raw_request: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaBuy {
    pub fn flight_days(&self) -> i64 {
        let days = (self.end_time - self.start_time).num_days();
        days.max(1)
    }
}

/// A line item within a media buy. Budget, bid price and pacing are
/// written both to their dedicated fields and inside `package_config`
/// in lock-step; reads prefer the dedicated fields.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct MediaPackage {
    pub media_buy_id: String,
    pub package_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub bid_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub pacing: Option<String>,
    pub package_config: Value,
    pub created_at: DateTime<Utc>,
}

impl MediaPackage {
    pub fn product_id(&self) -> Option<&str> {
        self.package_config.get("product_id").and_then(|v| v.as_str())
    }

    pub fn pricing_info(&self) -> Option<PricingInfo> {
        self.package_config
            .get("pricing_info")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn creative_ids(&self) -> Vec<String> {
        self.package_config
            .get("creative_ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shapes() {
        let mb = new_media_buy_id();
        assert!(mb.starts_with("mb_"));
        assert_eq!(mb.len(), 3 + 12);

        let pkg = new_package_id("prod_cpm_fixed", 1);
        assert!(pkg.starts_with("pkg_prod_cpm_fixed_"));
        assert!(pkg.ends_with("_1"));

        let parts: Vec<&str> = pkg.rsplitn(3, '_').collect();
        assert_eq!(parts[0], "1");
        assert_eq!(parts[1].len(), 8);

        assert!(new_assignment_id().starts_with("assign_"));
        assert!(new_push_config_id().starts_with("pnc_"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_media_buy_id();
        let b = new_media_buy_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_effective_rate() {
        let fixed = PricingInfo {
            pricing_model: PricingModel::Cpm,
            rate: Some(12.5),
            currency: "USD".to_string(),
            is_fixed: true,
            bid_price: None,
        };
        assert_eq!(fixed.effective_rate(), 12.5);

        let auction = PricingInfo {
            pricing_model: PricingModel::Cpm,
            rate: None,
            currency: "USD".to_string(),
            is_fixed: false,
            bid_price: Some(9.0),
        };
        assert_eq!(auction.effective_rate(), 9.0);
    }

    #[test]
    fn test_package_config_accessors() {
        let pkg = MediaPackage {
            media_buy_id: "mb_x".to_string(),
            package_id: "pkg_x".to_string(),
            budget: Some(1000.0),
            bid_price: None,
            pacing: None,
            package_config: serde_json::json!({
                "product_id": "prod_a",
                "creative_ids": ["cr_1", "cr_2"],
                "pricing_info": {
                    "pricing_model": "cpm",
                    "rate": 10.0,
                    "currency": "USD",
                    "is_fixed": true
                }
            }),
            created_at: Utc::now(),
        };

        assert_eq!(pkg.product_id(), Some("prod_a"));
        assert_eq!(pkg.creative_ids(), vec!["cr_1", "cr_2"]);
        assert_eq!(pkg.pricing_info().unwrap().rate, Some(10.0));
    }
}
