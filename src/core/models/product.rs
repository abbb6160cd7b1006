use crate::core::spec::formats::FormatRef;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryType {
    Guaranteed,
    #[default]
    NonGuaranteed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PricingModel {
    Cpm,
    Cpcv,
    Cpp,
    Cpc,
    Cpv,
    FlatRate,
}

/// Auction guidance published alongside non-fixed pricing options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct PriceGuidance {
    pub floor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p25: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p75: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
}

/// One way a product can be bought: a (model, currency, fixed/auction)
/// tuple with either a rate or auction guidance.
///
/// Invariant: `is_fixed` implies `rate` is set; auction options carry
/// `price_guidance` instead.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct PricingOption {
    pub pricing_model: PricingModel,
    pub currency: String,
    pub is_fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub price_guidance: Option<PriceGuidance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub min_spend_per_package: Option<f64>,
    /// Model-specific parameters, e.g. the demographic for CPP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub parameters: Option<Value>,
    /// Annotated at discovery time against the tenant's adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub supported: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub unsupported_reason: Option<String>,
}

impl PricingOption {
    /// Composite identifier in the form `{model}_{currency}_{fixed|auction}`,
    /// matched case-insensitively on the request path.
    pub fn option_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.pricing_model,
            self.currency.to_lowercase(),
            if self.is_fixed { "fixed" } else { "auction" }
        )
    }

    pub fn floor(&self) -> f64 {
        self.price_guidance.as_ref().map(|g| g.floor).unwrap_or(0.0)
    }
}

/// Publisher-offered inventory unit within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Product {
    pub tenant_id: String,
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    #[builder(default)]
    pub delivery_type: DeliveryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub min_spend: Option<f64>,
    #[serde(default)]
    #[builder(default)]
    pub formats: Vec<FormatRef>,
    #[serde(default)]
    #[builder(default)]
    pub pricing_options: Vec<PricingOption>,
    #[serde(default = "default_true")]
    #[builder(default = "true")]
    pub auto_create_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub implementation_config: Option<Value>,
    // Discovery-time dynamic pricing enrichment, never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub floor_cpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub recommended_cpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub estimated_exposures: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// First option matching the given currency, the default selection
    /// when a package names neither an option id nor a model.
    pub fn first_option_for_currency(&self, currency: &str) -> Option<&PricingOption> {
        self.pricing_options.iter().find(|o| o.currency == currency)
    }
}

/// Per (tenant, currency) spend guardrails, enforced on every create
/// and update.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CurrencyLimit {
    pub tenant_id: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub min_package_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub max_daily_package_spend: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_id_format() {
        let option = PricingOption {
            pricing_model: PricingModel::Cpm,
            currency: "USD".to_string(),
            is_fixed: true,
            rate: Some(12.0),
            price_guidance: None,
            min_spend_per_package: None,
            parameters: None,
            supported: None,
            unsupported_reason: None,
        };
        assert_eq!(option.option_id(), "cpm_usd_fixed");

        let auction = PricingOption {
            is_fixed: false,
            rate: None,
            price_guidance: Some(PriceGuidance {
                floor: 8.0,
                ..Default::default()
            }),
            ..option
        };
        assert_eq!(auction.option_id(), "cpm_usd_auction");
        assert_eq!(auction.floor(), 8.0);
    }

    #[test]
    fn test_pricing_model_parses_case_insensitive() {
        assert_eq!("CPM".parse::<PricingModel>().unwrap(), PricingModel::Cpm);
        assert_eq!("cpcv".parse::<PricingModel>().unwrap(), PricingModel::Cpcv);
    }
}
