use crate::core::auth::RequestHeaders;
use crate::core::managers::TenantManager;
use crate::core::models::tenant::Tenant;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use anyhow::Error;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-header labels that never denote a tenant subdomain.
const RESERVED_SUBDOMAINS: &[&str] = &["localhost", "adcp-sales-agent", "www", "admin"];

/// The authenticated scope of a request: the resolved tenant and,
/// when a bearer token was presented, the principal behind it.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant: Arc<Tenant>,
    pub principal_id: Option<String>,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.principal_id.as_deref() == Some(self.tenant.admin_principal_id().as_str())
    }
}

/// Maps inbound requests to `(tenant, principal)`.
///
/// Tenant detection order: Host subdomain, `x-adcp-tenant` (subdomain
/// first, then direct id), `apx-incoming-host` virtual host. Token
/// lookup is scoped to the detected tenant when one was found.
///
/// Isolation rule: a tenant fixed by headers is never replaced by the
/// tenant of the principal row a token happens to belong to. Only the
/// global (no-hint) lookup derives the tenant from the principal, and
/// then only after verifying the tenant is active.
pub struct AuthResolver {
    store: Arc<dyn Store>,
    tenants: Arc<TenantManager>,
}

impl AuthResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let tenants = Arc::new(TenantManager::new(store.clone()));
        AuthResolver { store, tenants }
    }

    pub fn with_manager(store: Arc<dyn Store>, tenants: Arc<TenantManager>) -> Self {
        AuthResolver { store, tenants }
    }

    pub async fn resolve(&self, headers: &RequestHeaders) -> Result<AuthContext, Error> {
        let hinted_tenant = self.detect_tenant(headers).await?;

        let Some(token) = headers.auth_token.as_deref() else {
            // No bearer: allowed for discovery tools, which still need
            // a tenant scope from the host headers.
            let tenant = hinted_tenant.ok_or_else(|| {
                AdcpError::new(
                    ErrorCode::ToolError,
                    "No tenant context available: supply a tenant subdomain, x-adcp-tenant, \
                     or virtual host header",
                )
            })?;

            return Ok(AuthContext {
                tenant,
                principal_id: None,
            });
        };

        match hinted_tenant {
            Some(tenant) => {
                // Scoped lookup only. The principal row must belong to
                // this tenant; it never redirects the tenant context.
                if let Some(principal) = self
                    .store
                    .find_principal_by_token(&tenant.tenant_id, token)
                    .await?
                {
                    debug!("Resolved principal '{}' in tenant '{}'", principal.principal_id, tenant.tenant_id);
                    return Ok(AuthContext {
                        tenant,
                        principal_id: Some(principal.principal_id),
                    });
                }

                if token == tenant.admin_token {
                    debug!("Token matches admin token for tenant '{}'", tenant.tenant_id);
                    let principal_id = tenant.admin_principal_id();
                    return Ok(AuthContext {
                        tenant,
                        principal_id: Some(principal_id),
                    });
                }

                Err(AdcpError::new(
                    ErrorCode::InvalidAuthToken,
                    format!(
                        "Authentication token is invalid for tenant '{}'. The token may be \
                         expired, revoked, or associated with a different tenant.",
                        tenant.tenant_id
                    ),
                )
                .into())
            }
            None => {
                // Global lookup sets the tenant context from the
                // principal, failing closed on inactive tenants.
                let Some(principal) = self.store.find_principal_by_token_global(token).await? else {
                    return Err(AdcpError::new(
                        ErrorCode::InvalidAuthToken,
                        "Authentication token is invalid for tenant 'any'. The token may be \
                         expired, revoked, or associated with a different tenant.",
                    )
                    .into());
                };

                let tenant = self.tenants.by_id(&principal.tenant_id).await?;
                let Some(tenant) = tenant.filter(|t| t.is_active) else {
                    warn!("Tenant '{}' is inactive or deleted", principal.tenant_id);
                    return Err(AdcpError::new(
                        ErrorCode::InvalidAuthToken,
                        "Authentication token is invalid for tenant 'any'. The token may be \
                         expired, revoked, or associated with a different tenant.",
                    )
                    .into());
                };

                let principal_id = if token == tenant.admin_token {
                    tenant.admin_principal_id()
                } else {
                    principal.principal_id
                };

                Ok(AuthContext {
                    tenant,
                    principal_id: Some(principal_id),
                })
            }
        }
    }

    async fn detect_tenant(&self, headers: &RequestHeaders) -> Result<Option<Arc<Tenant>>, Error> {
        // 1. Host subdomain, the common case.
        if let Some(subdomain) = headers.subdomain()
            && !RESERVED_SUBDOMAINS.contains(&subdomain)
            && let Some(tenant) = active(self.tenants.by_subdomain(subdomain).await?)
        {
            debug!("Tenant '{}' detected from subdomain '{}'", tenant.tenant_id, subdomain);
            return Ok(Some(tenant));
        }

        // 2. Explicit hint: subdomain lookup first, direct id second.
        if let Some(hint) = headers.adcp_tenant.as_deref() {
            if let Some(tenant) = active(self.tenants.by_subdomain(hint).await?) {
                debug!("Tenant '{}' detected from x-adcp-tenant subdomain", tenant.tenant_id);
                return Ok(Some(tenant));
            }

            if let Some(tenant) = active(self.tenants.by_id(hint).await?) {
                debug!("Tenant '{}' detected from x-adcp-tenant id", tenant.tenant_id);
                return Ok(Some(tenant));
            }
        }

        // 3. Virtual host routing.
        if let Some(apx_host) = headers.apx_incoming_host.as_deref()
            && let Some(tenant) = active(self.tenants.by_virtual_host(apx_host).await?)
        {
            debug!("Tenant '{}' detected from virtual host '{}'", tenant.tenant_id, apx_host);
            return Ok(Some(tenant));
        }

        debug!("No tenant detected from headers; will fall back to global token lookup");
        Ok(None)
    }
}

fn active(tenant: Option<Arc<Tenant>>) -> Option<Arc<Tenant>> {
    tenant.filter(|t| t.is_active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::principal::Principal;
    use crate::core::models::tenant::TenantBuilder;
    use crate::core::store::LocalStore;
    use std::collections::HashMap;

    async fn seeded_store() -> Arc<LocalStore> {
        let store = Arc::new(LocalStore::new());

        for (id, vhost) in [("acme", Some("ads.acme.example")), ("globex", None)] {
            let tenant = TenantBuilder::default()
                .tenant_id(id.to_string())
                .name(id.to_string())
                .subdomain(id.to_string())
                .virtual_host(vhost.map(|v| v.to_string()))
                .admin_token(format!("{}_admin_tok", id))
                .build()
                .unwrap();
            store.upsert_tenant(tenant).await.unwrap();

            store
                .upsert_principal(Principal {
                    tenant_id: id.to_string(),
                    principal_id: format!("{}_buyer", id),
                    name: format!("{} buyer", id),
                    access_token: format!("{}_tok", id),
                    platform_mappings: HashMap::new(),
                })
                .await
                .unwrap();
        }

        store
    }

    fn headers(host: Option<&str>, token: Option<&str>) -> RequestHeaders {
        RequestHeaders {
            host: host.map(|h| h.to_string()),
            auth_token: token.map(|t| t.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_subdomain_scoped_lookup() {
        let resolver = AuthResolver::new(seeded_store().await);

        let ctx = resolver
            .resolve(&headers(Some("acme.sales.example"), Some("acme_tok")))
            .await
            .unwrap();

        assert_eq!(ctx.tenant.tenant_id, "acme");
        assert_eq!(ctx.principal_id.as_deref(), Some("acme_buyer"));
    }

    #[tokio::test]
    async fn test_hinted_tenant_never_overwritten_by_principal_row() {
        let resolver = AuthResolver::new(seeded_store().await);

        // globex token presented against the acme subdomain: the
        // token is unknown within acme, so this is a hard failure, not
        // a silent switch to globex.
        let result = resolver
            .resolve(&headers(Some("acme.sales.example"), Some("globex_tok")))
            .await;

        let err = result.unwrap_err();
        let adcp = err.downcast_ref::<AdcpError>().unwrap();
        assert_eq!(adcp.code, ErrorCode::InvalidAuthToken);
    }

    #[tokio::test]
    async fn test_global_lookup_sets_tenant_from_principal() {
        let resolver = AuthResolver::new(seeded_store().await);

        let ctx = resolver.resolve(&headers(None, Some("globex_tok"))).await.unwrap();
        assert_eq!(ctx.tenant.tenant_id, "globex");
        assert_eq!(ctx.principal_id.as_deref(), Some("globex_buyer"));
    }

    #[tokio::test]
    async fn test_global_lookup_rejects_inactive_tenant() {
        let store = seeded_store().await;
        let mut tenant = store.get_tenant("globex").await.unwrap().unwrap();
        tenant.is_active = false;
        store.upsert_tenant(tenant).await.unwrap();

        let resolver = AuthResolver::new(store);
        let result = resolver.resolve(&headers(None, Some("globex_tok"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_admin_token_yields_synthetic_principal() {
        let resolver = AuthResolver::new(seeded_store().await);

        let ctx = resolver
            .resolve(&headers(Some("acme.sales.example"), Some("acme_admin_tok")))
            .await
            .unwrap();

        assert_eq!(ctx.principal_id.as_deref(), Some("acme_admin"));
        assert!(ctx.is_admin());
    }

    #[tokio::test]
    async fn test_missing_token_allowed_with_tenant_scope() {
        let resolver = AuthResolver::new(seeded_store().await);

        let ctx = resolver.resolve(&headers(Some("acme.sales.example"), None)).await.unwrap();
        assert_eq!(ctx.tenant.tenant_id, "acme");
        assert!(ctx.principal_id.is_none());
    }

    #[tokio::test]
    async fn test_reserved_subdomains_skipped() {
        let resolver = AuthResolver::new(seeded_store().await);

        // admin.* is reserved, so only the global token lookup applies.
        let ctx = resolver
            .resolve(&headers(Some("admin.sales.example"), Some("acme_tok")))
            .await
            .unwrap();
        assert_eq!(ctx.tenant.tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_tenant_hint_header_direct_id() {
        let resolver = AuthResolver::new(seeded_store().await);

        let mut h = headers(None, Some("acme_tok"));
        h.adcp_tenant = Some("acme".to_string());

        let ctx = resolver.resolve(&h).await.unwrap();
        assert_eq!(ctx.tenant.tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_virtual_host_detection() {
        let resolver = AuthResolver::new(seeded_store().await);

        let mut h = headers(None, Some("acme_tok"));
        h.apx_incoming_host = Some("ads.acme.example".to_string());

        let ctx = resolver.resolve(&h).await.unwrap();
        assert_eq!(ctx.tenant.tenant_id, "acme");
    }
}
