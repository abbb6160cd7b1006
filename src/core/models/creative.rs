use crate::core::spec::formats::FormatRef;
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CreativeStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Payload blob for a creative: either a hosted asset url with its
/// dimensions/duration, or a third-party snippet. Persisted as the
/// creative's `data` JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct CreativeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_variables: Option<Value>,
    /// Assigned by the ad server after upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_creative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_review: Option<Value>,
}

/// A creative asset, unique per (tenant, principal, creative_id).
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Creative {
    pub tenant_id: String,
    pub principal_id: String,
    pub creative_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub format: Option<FormatRef>,
    #[serde(default)]
    #[builder(default)]
    pub status: CreativeStatus,
    #[serde(default)]
    #[builder(default)]
    pub data: CreativeData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Creative {
    pub fn is_snippet(&self) -> bool {
        self.data.snippet.is_some()
    }
}

/// Many-to-many link between a creative and a media package.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CreativeAssignment {
    pub assignment_id: String,
    pub tenant_id: String,
    pub media_buy_id: String,
    pub package_id: String,
    pub creative_id: String,
    #[serde(default = "default_weight")]
    #[builder(default = "default_weight()")]
    pub weight: u32,
    pub created_at: DateTime<Utc>,
}

fn default_weight() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        let creative = Creative {
            tenant_id: "acme".to_string(),
            principal_id: "buyer_a".to_string(),
            creative_id: "cr_1".to_string(),
            name: "Banner".to_string(),
            format: Some(FormatRef::standard("display_300x250_image")),
            status: CreativeStatus::default(),
            data: CreativeData {
                url: Some("https://cdn.example.com/banner.png".to_string()),
                ..Default::default()
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(creative.status, CreativeStatus::Pending);
        assert!(!creative.is_snippet());
    }

    #[test]
    fn test_assignment_default_weight() {
        let json = serde_json::json!({
            "assignment_id": "assign_1",
            "tenant_id": "acme",
            "media_buy_id": "mb_1",
            "package_id": "pkg_1",
            "creative_id": "cr_1",
            "created_at": Utc::now()
        });
        let assignment: CreativeAssignment = serde_json::from_value(json).unwrap();
        assert_eq!(assignment.weight, 100);
    }
}
