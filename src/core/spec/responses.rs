use crate::core::models::creative::CreativeStatus;
use crate::core::models::product::Product;
use crate::core::models::property::PropertyIdentifier;
use crate::core::models::tenant::{SignalDeployment, SignalPricing};
use crate::core::spec::errors::ErrorDetail;
use crate::core::spec::formats::{Format, FormatRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use strum::Display;

/// A finished tool invocation: the protocol status plus the domain
/// payload. The dispatcher serializes this as the payload object with
/// the `status` field injected at the top level.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub status: crate::core::spec::status::TaskStatus,
    pub payload: Value,
}

impl ToolOutcome {
    pub fn new(status: crate::core::spec::status::TaskStatus, payload: impl Serialize) -> Self {
        ToolOutcome {
            status,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn completed(payload: impl Serialize) -> Self {
        Self::new(crate::core::spec::status::TaskStatus::Completed, payload)
    }

    pub fn working(payload: impl Serialize) -> Self {
        Self::new(crate::core::spec::status::TaskStatus::Working, payload)
    }

    pub fn input_required(payload: impl Serialize) -> Self {
        Self::new(crate::core::spec::status::TaskStatus::InputRequired, payload)
    }

    pub fn failed(payload: impl Serialize) -> Self {
        Self::new(crate::core::spec::status::TaskStatus::Failed, payload)
    }

    /// Full wire body with `status` merged into the payload object.
    pub fn to_body(&self) -> Value {
        let mut body = match &self.payload {
            Value::Object(map) => Value::Object(map.clone()),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => serde_json::json!({ "result": other }),
        };

        if let Value::Object(map) = &mut body {
            map.insert("status".to_string(), serde_json::json!(self.status));
        }

        body
    }
}

/// Domain payload of a `create_media_buy` response. The protocol
/// `status` field is attached by the envelope, not here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateMediaBuyResponse {
    pub buyer_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<String>,
    /// Adapter package data merged with the request package fields;
    /// shape varies per adapter, so it stays dynamic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMediaBuyResponse {
    pub media_buy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_date: Option<DateTime<Utc>>,
    /// Workflow step to poll when the update parked for approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCreativeResult {
    pub creative_id: String,
    pub action: SyncAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CreativeStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncSummary {
    pub total_processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncCreativesResponse {
    pub message: String,
    pub summary: SyncSummary,
    pub results: Vec<SyncCreativeResult>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

/// Principal-facing view of a creative in the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeView {
    pub creative_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<FormatRef>,
    pub status: CreativeStatus,
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
    pub platform_creative_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuerySummary {
    pub total_matching: usize,
    pub returned: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters_applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_applied: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
    pub total_pages: u32,
    pub current_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListCreativesResponse {
    pub message: String,
    pub query_summary: QuerySummary,
    pub pagination: Pagination,
    pub creatives: Vec<CreativeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetProductsResponse {
    pub products: Vec<Product>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCreativeFormatsResponse {
    pub formats: Vec<Format>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyView {
    pub property_type: String,
    pub name: String,
    pub identifiers: Vec<PropertyIdentifier>,
    pub tags: Vec<String>,
    pub publisher_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyTagMetadata {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListAuthorizedPropertiesResponse {
    pub properties: Vec<PropertyView>,
    pub tags: HashMap<String, PropertyTagMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalView {
    pub signal_agent_segment_id: String,
    pub name: String,
    pub description: String,
    pub signal_type: String,
    pub data_provider: String,
    pub coverage_percentage: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<SignalDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<SignalPricing>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetSignalsResponse {
    pub signals: Vec<SignalView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateSignalResponse {
    pub signal_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryTotals {
    pub impressions: u64,
    pub spend: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDelivery {
    pub package_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    pub impressions: u64,
    pub spend: f64,
    pub pacing_index: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaBuyDeliveryData {
    pub media_buy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    pub status: String,
    pub totals: DeliveryTotals,
    pub by_package: Vec<PackageDelivery>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AggregatedTotals {
    pub impressions: u64,
    pub spend: f64,
    pub media_buy_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMediaBuyDeliveryResponse {
    pub reporting_period: ReportingPeriod,
    pub currency: String,
    pub aggregated_totals: AggregatedTotals,
    pub deliveries: Vec<MediaBuyDeliveryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePerformanceIndexResponse {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatedObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub tool_name: String,
    pub owner: String,
    pub context_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associated_objects: Vec<AssociatedObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
    pub offset: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task_id: String,
    pub context_id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub tool_name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub request_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associated_objects: Vec<AssociatedObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
    pub completed_at: DateTime<Utc>,
    pub completed_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::status::TaskStatus;

    #[test]
    fn test_envelope_injects_status_into_payload() {
        let outcome = ToolOutcome::completed(CreateMediaBuyResponse {
            buyer_ref: "bref-1".to_string(),
            media_buy_id: Some("mb_abc".to_string()),
            ..Default::default()
        });

        let body = outcome.to_body();
        assert_eq!(body["status"], "completed");
        assert_eq!(body["buyer_ref"], "bref-1");
        assert_eq!(body["media_buy_id"], "mb_abc");
    }

    #[test]
    fn test_failed_envelope_keeps_errors() {
        let outcome = ToolOutcome::failed(serde_json::json!({
            "errors": [{"code": "PRICING_ERROR", "message": "Bid price 5 is below floor price 8"}],
        }));

        let body = outcome.to_body();
        assert_eq!(body["status"], "failed");
        assert_eq!(body["errors"][0]["code"], "PRICING_ERROR");
    }

    #[test]
    fn test_input_required_wire_string() {
        let outcome = ToolOutcome::input_required(serde_json::json!({}));
        assert_eq!(outcome.to_body()["status"], "input-required");
        assert_eq!(outcome.status, TaskStatus::InputRequired);
    }
}
