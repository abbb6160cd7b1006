use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyIdentifier {
    #[serde(rename = "type")]
    pub id_type: String,
    pub value: String,
}

/// An advertising property (site, app, podcast) this agent is
/// authorized to sell on behalf of the tenant. Only verified
/// properties are exposed to buyers.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct AuthorizedProperty {
    pub tenant_id: String,
    pub property_id: String,
    pub property_type: String,
    pub name: String,
    #[serde(default)]
    #[builder(default)]
    pub identifiers: Vec<PropertyIdentifier>,
    #[serde(default)]
    #[builder(default)]
    pub tags: Vec<String>,
    pub publisher_domain: String,
    #[serde(default)]
    #[builder(default)]
    pub verification_status: VerificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct PropertyTag {
    pub tenant_id: String,
    pub tag_id: String,
    pub name: String,
    #[serde(default)]
    #[builder(default)]
    pub description: String,
}
