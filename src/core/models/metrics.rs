use chrono::NaiveDate;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Rolling delivery aggregates by country and creative size, fed by
/// ad-server reporting. Input to discovery-time dynamic pricing.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct FormatPerformanceMetrics {
    pub tenant_id: String,
    /// None aggregates across all countries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub country_code: Option<String>,
    /// `WxH`, matching the dimensions embedded in format ids.
    pub creative_size: String,
    pub period_start: NaiveDate,
    pub total_impressions: u64,
    pub average_cpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub p25_cpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub p75_cpm: Option<f64>,
}
