use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An advertiser identity within a tenant, authenticated by its
/// opaque bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Principal {
    pub tenant_id: String,
    pub principal_id: String,
    pub name: String,
    pub access_token: String,
    /// Ad-server name to platform-specific advertiser identifiers.
    #[serde(default)]
    #[builder(default)]
    pub platform_mappings: HashMap<String, Value>,
}

impl Principal {
    /// Platform advertiser id for the given adapter. Supports both the
    /// nested `{adapter: {advertiser_id}}` mapping and a flat
    /// `{adapter}_advertiser_id` key.
    pub fn advertiser_id_for(&self, adapter: &str) -> Option<String> {
        if let Some(nested) = self.platform_mappings.get(adapter)
            && let Some(id) = nested.get("advertiser_id").and_then(|v| v.as_str())
        {
            return Some(id.to_string());
        }

        self.platform_mappings
            .get(&format!("{}_advertiser_id", adapter))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_advertiser_id_nested_and_flat() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "google_ad_manager".to_string(),
            json!({"advertiser_id": "123456"}),
        );
        mappings.insert("kevel_advertiser_id".to_string(), json!("789"));

        let principal = Principal {
            tenant_id: "acme".to_string(),
            principal_id: "buyer_a".to_string(),
            name: "Buyer A".to_string(),
            access_token: "tok_a".to_string(),
            platform_mappings: mappings,
        };

        assert_eq!(
            principal.advertiser_id_for("google_ad_manager"),
            Some("123456".to_string())
        );
        assert_eq!(principal.advertiser_id_for("kevel"), Some("789".to_string()));
        assert_eq!(principal.advertiser_id_for("triton"), None);
    }
}
