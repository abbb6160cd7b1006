use crate::core::models::tenant::Tenant;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::formats::{
    DEFAULT_CREATIVE_AGENT_URL, FORMAT_REGISTRY, Format, FormatRef, normalize_agent_url,
    registry_format,
};
use crate::core::store::Store;
use anyhow::Error;
use std::collections::HashSet;
use std::sync::Arc;

/// Merged creative-format catalog: the standard registry plus tenant
/// custom formats, with tenant rows winning id conflicts. Also the
/// authority on which creative agents a tenant accepts.
pub struct FormatLibrary {
    store: Arc<dyn Store>,
}

impl FormatLibrary {
    pub fn new(store: Arc<dyn Store>) -> Self {
        FormatLibrary { store }
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Format>, Error> {
        let mut formats = self.store.list_creative_formats(tenant_id).await?;
        let mut seen: HashSet<String> = formats.iter().map(|f| f.format_id.clone()).collect();

        for format in FORMAT_REGISTRY.iter() {
            if seen.insert(format.format_id.clone()) {
                formats.push(format.clone());
            }
        }

        formats.sort_by(|a, b| {
            (a.format_type.to_string(), a.name.clone()).cmp(&(b.format_type.to_string(), b.name.clone()))
        });

        Ok(formats)
    }

    /// Agent URLs registered for the tenant, normalized. The default
    /// registry agent is always present.
    pub fn registered_agents(&self, tenant: &Tenant) -> HashSet<String> {
        let mut agents: HashSet<String> = tenant
            .creative_agents
            .iter()
            .map(|url| normalize_agent_url(url))
            .collect();
        agents.insert(normalize_agent_url(DEFAULT_CREATIVE_AGENT_URL));
        agents
    }

    /// Enforces that a wire format reference names a registered agent
    /// and a format that exists there.
    pub async fn validate_reference(&self, tenant: &Tenant, format: &FormatRef) -> Result<(), Error> {
        if format.agent_url.trim().is_empty() || format.id.trim().is_empty() {
            return Err(AdcpError::new(
                ErrorCode::FormatValidationError,
                "Format reference requires both agent_url and id",
            )
            .into());
        }

        let normalized = normalize_agent_url(&format.agent_url);
        let registered = self.registered_agents(tenant);
        if !registered.contains(&normalized) {
            let mut known: Vec<String> = registered.into_iter().collect();
            known.sort();
            return Err(AdcpError::new(
                ErrorCode::FormatValidationError,
                format!(
                    "Creative agent not registered: {}. Registered agents: {}",
                    format.agent_url,
                    known.join(", ")
                ),
            )
            .into());
        }

        if registry_format(&format.id).is_some() {
            return Ok(());
        }

        let tenant_formats = self.store.list_creative_formats(&tenant.tenant_id).await?;
        if tenant_formats.iter().any(|f| f.format_id == format.id) {
            return Ok(());
        }

        Err(AdcpError::new(
            ErrorCode::FormatValidationError,
            format!(
                "Format not found on agent {}: {}. Use list_creative_formats to discover \
                 available formats.",
                format.agent_url, format.id
            ),
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tenant::TenantBuilder;
    use crate::core::spec::formats::FormatType;
    use crate::core::store::LocalStore;

    fn tenant() -> Tenant {
        TenantBuilder::default()
            .tenant_id("acme".to_string())
            .name("Acme".to_string())
            .subdomain("acme".to_string())
            .admin_token("tok".to_string())
            .creative_agents(vec!["https://creatives.acme.example/mcp/".to_string()])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_merged_list_prefers_tenant_formats() {
        let store = Arc::new(LocalStore::new());
        store
            .upsert_creative_format(
                "acme",
                Format {
                    format_id: "display_300x250_image".to_string(),
                    name: "Acme Rectangle Override".to_string(),
                    format_type: FormatType::Display,
                    is_standard: false,
                    requirements: None,
                },
            )
            .await
            .unwrap();

        let library = FormatLibrary::new(store);
        let formats = library.list_for_tenant("acme").await.unwrap();

        // The tenant override shadows the registry row.
        let rectangle: Vec<&Format> = formats
            .iter()
            .filter(|f| f.format_id == "display_300x250_image")
            .collect();
        assert_eq!(rectangle.len(), 1);
        assert_eq!(rectangle[0].name, "Acme Rectangle Override");

        // And the rest of the registry is still present.
        assert!(formats.len() >= FORMAT_REGISTRY.len());
    }

    #[tokio::test]
    async fn test_reference_validation() {
        let library = FormatLibrary::new(Arc::new(LocalStore::new()));
        let tenant = tenant();

        // Default agent, standard format.
        assert!(
            library
                .validate_reference(&tenant, &FormatRef::standard("display_300x250_image"))
                .await
                .is_ok()
        );

        // Tenant agent with transport suffix normalizes to a match.
        let custom_agent = FormatRef {
            agent_url: "https://creatives.acme.example".to_string(),
            id: "display_300x250_image".to_string(),
        };
        assert!(library.validate_reference(&tenant, &custom_agent).await.is_ok());

        // Unregistered agent rejected.
        let foreign = FormatRef {
            agent_url: "https://evil.example".to_string(),
            id: "display_300x250_image".to_string(),
        };
        assert!(library.validate_reference(&tenant, &foreign).await.is_err());

        // Unknown format rejected.
        assert!(
            library
                .validate_reference(&tenant, &FormatRef::standard("display_1x1_mystery"))
                .await
                .is_err()
        );
    }
}
