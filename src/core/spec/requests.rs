use crate::core::models::product::PricingModel;
use crate::core::spec::formats::FormatRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use strum::{Display, EnumString};

/// Campaign start: either a concrete instant or the literal `"asap"`,
/// which the server resolves to the current UTC instant on receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum StartTime {
    Asap,
    At(DateTime<Utc>),
}

impl Serialize for StartTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StartTime::Asap => serializer.serialize_str("asap"),
            StartTime::At(dt) => dt.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        if raw == "asap" {
            return Ok(StartTime::Asap);
        }

        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| StartTime::At(dt.with_timezone(&Utc)))
            .map_err(|e| serde::de::Error::custom(format!("invalid start_time '{}': {}", raw, e)))
    }
}

impl StartTime {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            StartTime::Asap => now,
            StartTime::At(dt) => *dt,
        }
    }

    pub fn is_asap(&self) -> bool {
        matches!(self, StartTime::Asap)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pacing {
    #[default]
    Even,
    Asap,
    DailyBudget,
}

/// Budget on the wire: a flat number, or the detailed object carrying
/// currency and pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BudgetInput {
    Total(f64),
    Detailed {
        total: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pacing: Option<Pacing>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        daily_cap: Option<f64>,
    },
}

impl BudgetInput {
    pub fn total(&self) -> f64 {
        match self {
            BudgetInput::Total(v) => *v,
            BudgetInput::Detailed { total, .. } => *total,
        }
    }

    pub fn currency(&self) -> Option<&str> {
        match self {
            BudgetInput::Total(_) => None,
            BudgetInput::Detailed { currency, .. } => currency.as_deref(),
        }
    }

    pub fn pacing(&self) -> Option<Pacing> {
        match self {
            BudgetInput::Total(_) => None,
            BudgetInput::Detailed { pacing, .. } => *pacing,
        }
    }
}

/// A single requested line item within a media buy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PackageRequest {
    /// Server-generated; populated into the stored raw request once
    /// permanent ids are issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impressions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<PricingModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_overlay: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_ids: Option<Vec<FormatRef>>,
}

impl PackageRequest {
    pub fn budget_total(&self) -> Option<f64> {
        self.budget.as_ref().map(|b| b.total())
    }
}

/// Push notification registration, A2A shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotificationConfigInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<PushAuthenticationInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAuthenticationInput {
    #[serde(default)]
    pub schemes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMediaBuyRequest {
    pub buyer_ref: String,
    pub brand_manifest: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageRequest>,
    pub start_time: StartTime,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_overlay: Option<Value>,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creatives: Option<Vec<CreativeInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_webhook: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notification_config: Option<PushNotificationConfigInput>,
    /// Set when re-running an approved buy so the adapter's own
    /// approval workflow is suppressed. Never accepted from the wire.
    #[serde(skip)]
    pub already_approved: bool,
}

impl CreateMediaBuyRequest {
    pub fn product_ids(&self) -> Vec<String> {
        self.packages
            .iter()
            .filter_map(|p| p.product_id.clone())
            .collect()
    }

    /// Campaign total: the sum of package budgets, falling back to the
    /// request-level budget when packages carry none.
    pub fn total_budget(&self) -> f64 {
        let package_total: f64 = self.packages.iter().filter_map(|p| p.budget_total()).sum();

        if package_total > 0.0 {
            return package_total;
        }

        self.budget.as_ref().map(|b| b.total()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PackageUpdate {
    pub package_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impressions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_overlay: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMediaBuyRequest {
    pub media_buy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<StartTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<Pacing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_overlay: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageUpdate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creatives: Option<Vec<CreativeInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notification_config: Option<PushNotificationConfigInput>,
}

/// A creative as submitted by the buyer. Either a hosted asset (`url`
/// plus dimensions/duration) or a third-party `snippet`, never both.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreativeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<FormatRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_variables: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValidationMode {
    #[default]
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCreativesRequest {
    #[serde(default)]
    pub creatives: Vec<CreativeInput>,
    #[serde(default)]
    pub patch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub delete_missing: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub validation_mode: ValidationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notification_config: Option<PushNotificationConfigInput>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CreativeSortField {
    #[default]
    CreatedAt,
    Name,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCreativesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub sort_by: CreativeSortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl Default for ListCreativesRequest {
    fn default() -> Self {
        ListCreativesRequest {
            media_buy_id: None,
            buyer_ref: None,
            status: None,
            format: None,
            tags: Vec::new(),
            created_after: None,
            created_before: None,
            search: None,
            page: default_page(),
            limit: default_limit(),
            sort_by: CreativeSortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fixed_price: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_ids: Option<Vec<String>>,
    #[serde(default)]
    pub standard_formats_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetProductsRequest {
    #[serde(default)]
    pub brief: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_offering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_manifest: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_exposures: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ProductFilters>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListCreativeFormatsRequest {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub format_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListAuthorizedPropertiesRequest {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignalFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_providers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_coverage_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetSignalsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SignalFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateSignalRequest {
    pub signal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<String>,
}

/// Status filter accepting either a single value or an array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusFilter {
    One(String),
    Many(Vec<String>),
}

impl StatusFilter {
    pub fn values(&self) -> Vec<String> {
        match self {
            StatusFilter::One(v) if v == "all" => {
                ["active", "pending", "paused", "completed", "failed"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }
            StatusFilter::One(v) => vec![v.clone()],
            StatusFilter::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetMediaBuyDeliveryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_refs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<StatusFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPerformance {
    pub product_id: String,
    pub performance_index: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePerformanceIndexRequest {
    pub media_buy_id: String,
    pub performance_data: Vec<ProductPerformance>,
}

fn default_task_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default = "default_task_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for ListTasksRequest {
    fn default() -> Self {
        ListTasksRequest {
            status: None,
            object_type: None,
            object_id: None,
            limit: default_task_limit(),
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskRequest {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    pub task_id: String,
    #[serde(default = "default_complete_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_complete_status() -> String {
    "completed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_time_asap_round_trip() {
        let parsed: StartTime = serde_json::from_str("\"asap\"").unwrap();
        assert!(parsed.is_asap());

        let parsed: StartTime = serde_json::from_str("\"2030-06-01T00:00:00Z\"").unwrap();
        assert!(!parsed.is_asap());

        assert!(serde_json::from_str::<StartTime>("\"yesterday\"").is_err());
    }

    #[test]
    fn test_budget_input_accepts_flat_and_object() {
        let flat: BudgetInput = serde_json::from_str("10000").unwrap();
        assert_eq!(flat.total(), 10000.0);
        assert_eq!(flat.currency(), None);

        let detailed: BudgetInput =
            serde_json::from_str(r#"{"total": 5000, "currency": "EUR", "pacing": "even"}"#).unwrap();
        assert_eq!(detailed.total(), 5000.0);
        assert_eq!(detailed.currency(), Some("EUR"));
        assert_eq!(detailed.pacing(), Some(Pacing::Even));
    }

    #[test]
    fn test_total_budget_prefers_package_budgets() {
        let req: CreateMediaBuyRequest = serde_json::from_value(serde_json::json!({
            "buyer_ref": "bref-1",
            "brand_manifest": {"name": "Acme Widgets"},
            "start_time": "asap",
            "end_time": "2031-01-01T00:00:00Z",
            "budget": 999.0,
            "packages": [
                {"product_id": "p1", "budget": 4000.0},
                {"product_id": "p2", "budget": 6000.0}
            ]
        }))
        .unwrap();

        assert_eq!(req.total_budget(), 10000.0);
        assert_eq!(req.product_ids(), vec!["p1", "p2"]);
        assert!(!req.already_approved);
    }

    #[test]
    fn test_status_filter_all_expands() {
        let filter = StatusFilter::One("all".to_string());
        assert_eq!(filter.values().len(), 5);

        let filter = StatusFilter::Many(vec!["active".to_string(), "completed".to_string()]);
        assert_eq!(filter.values(), vec!["active", "completed"]);
    }
}
