use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How creatives submitted to this tenant get approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
pub enum ApprovalMode {
    #[serde(rename = "auto-approve")]
    #[strum(serialize = "auto-approve")]
    AutoApprove,
    #[default]
    #[serde(rename = "require-human")]
    #[strum(serialize = "require-human")]
    RequireHuman,
    #[serde(rename = "ai-powered")]
    #[strum(serialize = "ai-powered")]
    AiPowered,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct PolicySettings {
    pub require_manual_review: bool,
    pub prohibited_categories: Vec<String>,
    pub prohibited_terms: Vec<String>,
}

/// Credentials and behavior switches for the tenant's chosen ad server.
/// Only the section matching `Tenant::ad_server` is consulted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct AdapterSettings {
    pub manual_approval_required: bool,
    pub manual_approval_operations: Vec<String>,
    pub gam: Option<GamSettings>,
    pub kevel: Option<KevelSettings>,
    pub triton: Option<TritonSettings>,
    pub mock_dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct GamSettings {
    pub network_code: Option<String>,
    pub refresh_token: Option<String>,
    pub trafficker_id: Option<String>,
    pub endpoint: Option<String>,
}

impl GamSettings {
    pub fn has_credentials(&self) -> bool {
        self.refresh_token.is_some() || self.network_code.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct KevelSettings {
    pub network_id: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct TritonSettings {
    pub station_id: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

/// An audience or contextual signal this tenant can offer to buyers.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct SignalDefinition {
    pub signal_agent_segment_id: String,
    pub name: String,
    pub description: String,
    pub signal_type: String,
    pub data_provider: String,
    pub coverage_percentage: f64,
    #[serde(default)]
    #[builder(default)]
    pub deployments: Vec<SignalDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub pricing: Option<SignalPricing>,
    #[serde(default)]
    #[builder(default)]
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct SignalDeployment {
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub account: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub is_live: bool,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub decisioning_platform_segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub estimated_activation_duration_minutes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct SignalPricing {
    pub cpm: f64,
    pub currency: String,
}

/// A publisher. Owns every other entity keyed on `tenant_id`.
/// The id is immutable; everything else is admin-mutable.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub subdomain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub virtual_host: Option<String>,
    /// Adapter identifier; unknown values fall back to mock at
    /// construction time.
    #[serde(default = "default_ad_server")]
    #[builder(default = "default_ad_server()")]
    pub ad_server: String,
    pub admin_token: String,
    #[serde(default)]
    #[builder(default)]
    pub authorized_domains: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub authorized_emails: Vec<String>,
    #[serde(default = "default_true")]
    #[builder(default = "true")]
    pub auto_create_media_buys: bool,
    #[serde(default)]
    #[builder(default)]
    pub approval_mode: ApprovalMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub slack_audit_webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub policy_settings: Option<PolicySettings>,
    #[serde(default)]
    #[builder(default)]
    pub adapter_settings: AdapterSettings,
    /// Additional creative agents registered for this tenant, beyond
    /// the default registry agent.
    #[serde(default)]
    #[builder(default)]
    pub creative_agents: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub signals: Vec<SignalDefinition>,
    #[serde(default = "default_true")]
    #[builder(default = "true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn default_ad_server() -> String {
    "mock".to_string()
}

impl Tenant {
    pub fn admin_principal_id(&self) -> String {
        format!("{}_admin", self.tenant_id)
    }

    pub fn requires_manual_review(&self) -> bool {
        self.policy_settings
            .as_ref()
            .map(|p| p.require_manual_review)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&ApprovalMode::AutoApprove).unwrap(),
            "\"auto-approve\""
        );
        assert_eq!(
            "ai-powered".parse::<ApprovalMode>().unwrap(),
            ApprovalMode::AiPowered
        );
    }

    #[test]
    fn test_admin_principal_id() {
        let tenant = TenantBuilder::default()
            .tenant_id("acme".to_string())
            .name("Acme".to_string())
            .subdomain("acme".to_string())
            .admin_token("tok".to_string())
            .build()
            .unwrap();

        assert_eq!(tenant.admin_principal_id(), "acme_admin");
        assert!(tenant.is_active);
        assert!(tenant.auto_create_media_buys);
        assert_eq!(tenant.ad_server, "mock");
    }
}
