use crate::core::models::tenant::Tenant;
use crate::core::store::Store;
use anyhow::Error;
use moka::sync::{Cache, CacheBuilder};
use std::sync::Arc;
use std::time::Duration;

/// Read-through tenant lookup with a short-lived cache in front of the
/// store. Admin mutations land in the store; the cache TTL bounds how
/// stale request routing can get.
pub struct TenantManager {
    store: Arc<dyn Store>,
    cache: Cache<String, Arc<Tenant>>,
}

impl TenantManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        TenantManager {
            store,
            cache: CacheBuilder::new(10_000)
                .time_to_live(Duration::from_secs(30))
                .build(),
        }
    }

    pub async fn by_id(&self, tenant_id: &str) -> Result<Option<Arc<Tenant>>, Error> {
        let key = format!("id:{}", tenant_id);
        if let Some(tenant) = self.cache.get(&key) {
            return Ok(Some(tenant));
        }

        match self.store.get_tenant(tenant_id).await? {
            Some(tenant) => {
                let tenant = Arc::new(tenant);
                self.cache.insert(key, tenant.clone());
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    pub async fn by_subdomain(&self, subdomain: &str) -> Result<Option<Arc<Tenant>>, Error> {
        let key = format!("sub:{}", subdomain);
        if let Some(tenant) = self.cache.get(&key) {
            return Ok(Some(tenant));
        }

        match self.store.get_tenant_by_subdomain(subdomain).await? {
            Some(tenant) => {
                let tenant = Arc::new(tenant);
                self.cache.insert(key, tenant.clone());
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    pub async fn by_virtual_host(&self, host: &str) -> Result<Option<Arc<Tenant>>, Error> {
        let key = format!("vh:{}", host);
        if let Some(tenant) = self.cache.get(&key) {
            return Ok(Some(tenant));
        }

        match self.store.get_tenant_by_virtual_host(host).await? {
            Some(tenant) => {
                let tenant = Arc::new(tenant);
                self.cache.insert(key, tenant.clone());
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    pub fn invalidate(&self, tenant: &Tenant) {
        self.cache.invalidate(&format!("id:{}", tenant.tenant_id));
        self.cache.invalidate(&format!("sub:{}", tenant.subdomain));
        if let Some(virtual_host) = &tenant.virtual_host {
            self.cache.invalidate(&format!("vh:{}", virtual_host));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tenant::TenantBuilder;
    use crate::core::store::LocalStore;

    #[tokio::test]
    async fn test_read_through_and_invalidate() {
        let store = Arc::new(LocalStore::new());
        let tenant = TenantBuilder::default()
            .tenant_id("acme".to_string())
            .name("Acme".to_string())
            .subdomain("acme".to_string())
            .admin_token("tok".to_string())
            .build()
            .unwrap();
        store.upsert_tenant(tenant.clone()).await.unwrap();

        let manager = TenantManager::new(store.clone());

        assert!(manager.by_id("acme").await.unwrap().is_some());
        assert!(manager.by_subdomain("acme").await.unwrap().is_some());
        assert!(manager.by_id("nope").await.unwrap().is_none());

        // Cached copy survives a store change until invalidated.
        let mut renamed = tenant.clone();
        renamed.name = "Acme v2".to_string();
        store.upsert_tenant(renamed).await.unwrap();
        assert_eq!(manager.by_id("acme").await.unwrap().unwrap().name, "Acme");

        manager.invalidate(&tenant);
        assert_eq!(manager.by_id("acme").await.unwrap().unwrap().name, "Acme v2");
    }
}
