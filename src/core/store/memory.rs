use crate::core::models::creative::{Creative, CreativeAssignment};
use crate::core::models::media_buy::{MediaBuy, MediaPackage};
use crate::core::models::metrics::FormatPerformanceMetrics;
use crate::core::models::principal::Principal;
use crate::core::models::product::{CurrencyLimit, Product};
use crate::core::models::property::{AuthorizedProperty, PropertyTag};
use crate::core::models::tenant::Tenant;
use crate::core::models::workflow::{
    ObjectWorkflowMapping, PushNotificationConfig, WorkflowContext, WorkflowStep,
};
use crate::core::spec::formats::Format;
use crate::core::spec::requests::{
    CreativeSortField, ListCreativesRequest, ListTasksRequest, SortOrder,
};
use crate::core::store::{Store, scoped, scoped3};
use anyhow::Error;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

/// In-memory store for development and tests. Keeps the same
/// visibility semantics as the persistent backends: every method is an
/// independent atomic operation.
#[derive(Default)]
pub struct LocalStore {
    tenants: DashMap<String, Tenant>,
    principals: DashMap<String, Principal>,
    products: DashMap<String, Product>,
    currency_limits: DashMap<String, CurrencyLimit>,
    media_buys: DashMap<String, MediaBuy>,
    media_packages: DashMap<String, Vec<MediaPackage>>,
    creatives: DashMap<String, Creative>,
    assignments: DashMap<String, Vec<CreativeAssignment>>,
    contexts: DashMap<String, WorkflowContext>,
    steps: DashMap<String, WorkflowStep>,
    mappings: DashMap<String, Vec<ObjectWorkflowMapping>>,
    push_configs: DashMap<String, PushNotificationConfig>,
    properties: DashMap<String, AuthorizedProperty>,
    property_tags: DashMap<String, PropertyTag>,
    creative_formats: DashMap<String, Format>,
    format_metrics: DashMap<String, FormatPerformanceMetrics>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn media_buy_ids_for_buyer_ref(&self, tenant_id: &str, buyer_ref: &str) -> Vec<String> {
        self.media_buys
            .iter()
            .filter(|e| e.value().tenant_id == tenant_id && e.value().buyer_ref == buyer_ref)
            .map(|e| e.value().media_buy_id.clone())
            .collect()
    }

    fn creative_has_assignment(
        &self,
        tenant_id: &str,
        creative_id: &str,
        media_buy_ids: &[String],
    ) -> bool {
        self.assignments.iter().any(|e| {
            e.value().iter().any(|a| {
                a.tenant_id == tenant_id
                    && a.creative_id == creative_id
                    && media_buy_ids.contains(&a.media_buy_id)
            })
        })
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn upsert_tenant(&self, tenant: Tenant) -> Result<(), Error> {
        self.tenants.insert(tenant.tenant_id.clone(), tenant);
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, Error> {
        Ok(self.tenants.get(tenant_id).map(|t| t.clone()))
    }

    async fn get_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, Error> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.value().subdomain == subdomain)
            .map(|t| t.value().clone()))
    }

    async fn get_tenant_by_virtual_host(&self, host: &str) -> Result<Option<Tenant>, Error> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.value().virtual_host.as_deref() == Some(host))
            .map(|t| t.value().clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, Error> {
        Ok(self.tenants.iter().map(|t| t.value().clone()).collect())
    }

    async fn upsert_principal(&self, principal: Principal) -> Result<(), Error> {
        let key = scoped(&principal.tenant_id, &principal.principal_id);
        self.principals.insert(key, principal);
        Ok(())
    }

    async fn get_principal(&self, tenant_id: &str, principal_id: &str) -> Result<Option<Principal>, Error> {
        Ok(self
            .principals
            .get(&scoped(tenant_id, principal_id))
            .map(|p| p.clone()))
    }

    async fn count_principals(&self, tenant_id: &str) -> Result<usize, Error> {
        Ok(self
            .principals
            .iter()
            .filter(|p| p.value().tenant_id == tenant_id)
            .count())
    }

    async fn find_principal_by_token(&self, tenant_id: &str, token: &str) -> Result<Option<Principal>, Error> {
        Ok(self
            .principals
            .iter()
            .find(|p| p.value().tenant_id == tenant_id && p.value().access_token == token)
            .map(|p| p.value().clone()))
    }

    async fn find_principal_by_token_global(&self, token: &str) -> Result<Option<Principal>, Error> {
        Ok(self
            .principals
            .iter()
            .find(|p| p.value().access_token == token)
            .map(|p| p.value().clone()))
    }

    async fn upsert_product(&self, product: Product) -> Result<(), Error> {
        let key = scoped(&product.tenant_id, &product.product_id);
        self.products.insert(key, product);
        Ok(())
    }

    async fn get_product(&self, tenant_id: &str, product_id: &str) -> Result<Option<Product>, Error> {
        Ok(self.products.get(&scoped(tenant_id, product_id)).map(|p| p.clone()))
    }

    async fn list_products(&self, tenant_id: &str) -> Result<Vec<Product>, Error> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.value().tenant_id == tenant_id)
            .map(|p| p.value().clone())
            .collect();
        products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(products)
    }

    async fn upsert_currency_limit(&self, limit: CurrencyLimit) -> Result<(), Error> {
        let key = scoped(&limit.tenant_id, &limit.currency);
        self.currency_limits.insert(key, limit);
        Ok(())
    }

    async fn get_currency_limit(&self, tenant_id: &str, currency: &str) -> Result<Option<CurrencyLimit>, Error> {
        Ok(self
            .currency_limits
            .get(&scoped(tenant_id, currency))
            .map(|l| l.clone()))
    }

    async fn count_currency_limits(&self, tenant_id: &str) -> Result<usize, Error> {
        Ok(self
            .currency_limits
            .iter()
            .filter(|l| l.value().tenant_id == tenant_id)
            .count())
    }

    async fn insert_media_buy(&self, buy: MediaBuy) -> Result<(), Error> {
        let key = scoped(&buy.tenant_id, &buy.media_buy_id);
        self.media_buys.insert(key, buy);
        Ok(())
    }

    async fn update_media_buy(&self, buy: MediaBuy) -> Result<(), Error> {
        self.insert_media_buy(buy).await
    }

    async fn get_media_buy(&self, tenant_id: &str, media_buy_id: &str) -> Result<Option<MediaBuy>, Error> {
        Ok(self
            .media_buys
            .get(&scoped(tenant_id, media_buy_id))
            .map(|b| b.clone()))
    }

    async fn list_media_buys(&self, tenant_id: &str, principal_id: &str) -> Result<Vec<MediaBuy>, Error> {
        let mut buys: Vec<MediaBuy> = self
            .media_buys
            .iter()
            .filter(|b| b.value().tenant_id == tenant_id && b.value().principal_id == principal_id)
            .map(|b| b.value().clone())
            .collect();
        buys.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(buys)
    }

    async fn find_media_buy_for_package(
        &self,
        tenant_id: &str,
        package_id: &str,
    ) -> Result<Option<MediaBuy>, Error> {
        for entry in self.media_packages.iter() {
            if entry.value().iter().any(|p| p.package_id == package_id) {
                let media_buy_id = entry.key().clone();
                return self.get_media_buy(tenant_id, &media_buy_id).await;
            }
        }

        Ok(None)
    }

    async fn insert_media_packages(&self, packages: Vec<MediaPackage>) -> Result<(), Error> {
        for package in packages {
            self.media_packages
                .entry(package.media_buy_id.clone())
                .or_default()
                .push(package);
        }
        Ok(())
    }

    async fn list_media_packages(&self, media_buy_id: &str) -> Result<Vec<MediaPackage>, Error> {
        Ok(self
            .media_packages
            .get(media_buy_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn update_media_package(&self, package: MediaPackage) -> Result<(), Error> {
        if let Some(mut packages) = self.media_packages.get_mut(&package.media_buy_id)
            && let Some(slot) = packages.iter_mut().find(|p| p.package_id == package.package_id)
        {
            *slot = package;
        }
        Ok(())
    }

    async fn upsert_creative(&self, creative: Creative) -> Result<(), Error> {
        let key = scoped3(&creative.tenant_id, &creative.principal_id, &creative.creative_id);
        self.creatives.insert(key, creative);
        Ok(())
    }

    async fn get_creative(
        &self,
        tenant_id: &str,
        principal_id: &str,
        creative_id: &str,
    ) -> Result<Option<Creative>, Error> {
        Ok(self
            .creatives
            .get(&scoped3(tenant_id, principal_id, creative_id))
            .map(|c| c.clone()))
    }

    async fn query_creatives(
        &self,
        tenant_id: &str,
        principal_id: &str,
        query: &ListCreativesRequest,
    ) -> Result<(Vec<Creative>, usize), Error> {
        let buyer_ref_buys = query
            .buyer_ref
            .as_deref()
            .map(|br| self.media_buy_ids_for_buyer_ref(tenant_id, br));

        let mut matched: Vec<Creative> = self
            .creatives
            .iter()
            .filter(|c| c.value().tenant_id == tenant_id && c.value().principal_id == principal_id)
            .map(|c| c.value().clone())
            .filter(|c| {
                if let Some(status) = &query.status
                    && c.status.to_string() != *status
                {
                    return false;
                }

                if let Some(format) = &query.format
                    && c.format.as_ref().map(|f| f.id.as_str()) != Some(format.as_str())
                {
                    return false;
                }

                if !query.tags.is_empty() {
                    let name = c.name.to_lowercase();
                    if !query.tags.iter().all(|t| name.contains(&t.to_lowercase())) {
                        return false;
                    }
                }

                if let Some(after) = query.created_after
                    && c.created_at < after
                {
                    return false;
                }

                if let Some(before) = query.created_before
                    && c.created_at > before
                {
                    return false;
                }

                if let Some(search) = &query.search
                    && !c.name.to_lowercase().contains(&search.to_lowercase())
                {
                    return false;
                }

                if let Some(media_buy_id) = &query.media_buy_id
                    && !self.creative_has_assignment(
                        tenant_id,
                        &c.creative_id,
                        std::slice::from_ref(media_buy_id),
                    )
                {
                    return false;
                }

                if let Some(buys) = &buyer_ref_buys
                    && !self.creative_has_assignment(tenant_id, &c.creative_id, buys)
                {
                    return false;
                }

                true
            })
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match query.sort_by {
                CreativeSortField::Name => a.name.cmp(&b.name),
                CreativeSortField::Status => a.status.to_string().cmp(&b.status.to_string()),
                CreativeSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matched.len();
        let offset = (query.page.saturating_sub(1) as usize) * query.limit as usize;
        let page: Vec<Creative> = matched
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn insert_assignment(&self, assignment: CreativeAssignment) -> Result<(), Error> {
        self.assignments
            .entry(scoped(&assignment.tenant_id, &assignment.media_buy_id))
            .or_default()
            .push(assignment);
        Ok(())
    }

    async fn list_assignments_for_media_buy(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error> {
        Ok(self
            .assignments
            .get(&scoped(tenant_id, media_buy_id))
            .map(|a| a.clone())
            .unwrap_or_default())
    }

    async fn list_assignments_for_creative(
        &self,
        tenant_id: &str,
        creative_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error> {
        Ok(self
            .assignments
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|a| a.tenant_id == tenant_id && a.creative_id == creative_id)
            .collect())
    }

    async fn insert_context(&self, context: WorkflowContext) -> Result<(), Error> {
        let key = scoped(&context.tenant_id, &context.context_id);
        self.contexts.insert(key, context);
        Ok(())
    }

    async fn get_context(&self, tenant_id: &str, context_id: &str) -> Result<Option<WorkflowContext>, Error> {
        Ok(self
            .contexts
            .get(&scoped(tenant_id, context_id))
            .map(|c| c.clone()))
    }

    async fn insert_step(&self, step: WorkflowStep) -> Result<(), Error> {
        let key = scoped(&step.tenant_id, &step.step_id);
        self.steps.insert(key, step);
        Ok(())
    }

    async fn update_step(&self, step: WorkflowStep) -> Result<(), Error> {
        self.insert_step(step).await
    }

    async fn get_step(&self, tenant_id: &str, step_id: &str) -> Result<Option<WorkflowStep>, Error> {
        Ok(self.steps.get(&scoped(tenant_id, step_id)).map(|s| s.clone()))
    }

    async fn query_steps(
        &self,
        tenant_id: &str,
        query: &ListTasksRequest,
    ) -> Result<(Vec<WorkflowStep>, usize), Error> {
        let mut matched: Vec<WorkflowStep> = Vec::new();

        for entry in self.steps.iter() {
            let step = entry.value();
            if step.tenant_id != tenant_id {
                continue;
            }

            if let Some(status) = &query.status
                && step.status.to_string() != *status
            {
                continue;
            }

            if query.object_type.is_some() || query.object_id.is_some() {
                let mappings = self.mappings_for_step(&step.step_id).await?;
                let hit = mappings.iter().any(|m| {
                    let type_ok = query
                        .object_type
                        .as_deref()
                        .map(|t| m.object_type.to_string() == t)
                        .unwrap_or(true);
                    let id_ok = query
                        .object_id
                        .as_deref()
                        .map(|id| m.object_id == id)
                        .unwrap_or(true);
                    type_ok && id_ok
                });
                if !hit {
                    continue;
                }
            }

            matched.push(step.clone());
        }

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn insert_mapping(&self, mapping: ObjectWorkflowMapping) -> Result<(), Error> {
        self.mappings
            .entry(mapping.step_id.clone())
            .or_default()
            .push(mapping);
        Ok(())
    }

    async fn mappings_for_step(&self, step_id: &str) -> Result<Vec<ObjectWorkflowMapping>, Error> {
        Ok(self.mappings.get(step_id).map(|m| m.clone()).unwrap_or_default())
    }

    async fn upsert_push_config(&self, push_config: PushNotificationConfig) -> Result<(), Error> {
        let key = scoped3(&push_config.tenant_id, &push_config.principal_id, &push_config.id);
        self.push_configs.insert(key, push_config);
        Ok(())
    }

    async fn push_configs_for(
        &self,
        tenant_id: &str,
        principal_id: &str,
    ) -> Result<Vec<PushNotificationConfig>, Error> {
        Ok(self
            .push_configs
            .iter()
            .filter(|c| {
                c.value().tenant_id == tenant_id
                    && c.value().principal_id == principal_id
                    && c.value().is_active
            })
            .map(|c| c.value().clone())
            .collect())
    }

    async fn upsert_property(&self, property: AuthorizedProperty) -> Result<(), Error> {
        let key = scoped(&property.tenant_id, &property.property_id);
        self.properties.insert(key, property);
        Ok(())
    }

    async fn list_properties(&self, tenant_id: &str) -> Result<Vec<AuthorizedProperty>, Error> {
        Ok(self
            .properties
            .iter()
            .filter(|p| p.value().tenant_id == tenant_id)
            .map(|p| p.value().clone())
            .collect())
    }

    async fn upsert_property_tag(&self, tag: PropertyTag) -> Result<(), Error> {
        let key = scoped(&tag.tenant_id, &tag.tag_id);
        self.property_tags.insert(key, tag);
        Ok(())
    }

    async fn list_property_tags(&self, tenant_id: &str) -> Result<Vec<PropertyTag>, Error> {
        Ok(self
            .property_tags
            .iter()
            .filter(|t| t.value().tenant_id == tenant_id)
            .map(|t| t.value().clone())
            .collect())
    }

    async fn upsert_creative_format(&self, tenant_id: &str, format: Format) -> Result<(), Error> {
        let key = scoped(tenant_id, &format.format_id);
        self.creative_formats.insert(key, format);
        Ok(())
    }

    async fn list_creative_formats(&self, tenant_id: &str) -> Result<Vec<Format>, Error> {
        let prefix = scoped(tenant_id, "");
        Ok(self
            .creative_formats
            .iter()
            .filter(|f| f.key().starts_with(&prefix))
            .map(|f| f.value().clone())
            .collect())
    }

    async fn upsert_format_metrics(&self, metrics: FormatPerformanceMetrics) -> Result<(), Error> {
        let key = scoped3(
            &metrics.tenant_id,
            metrics.country_code.as_deref().unwrap_or("all"),
            &format!("{}_{}", metrics.creative_size, metrics.period_start),
        );
        self.format_metrics.insert(key, metrics);
        Ok(())
    }

    async fn query_format_metrics(
        &self,
        tenant_id: &str,
        country_code: Option<&str>,
        creative_sizes: &[String],
        cutoff: NaiveDate,
    ) -> Result<Vec<FormatPerformanceMetrics>, Error> {
        Ok(self
            .format_metrics
            .iter()
            .filter(|m| {
                let m = m.value();
                m.tenant_id == tenant_id
                    && m.period_start >= cutoff
                    && creative_sizes.contains(&m.creative_size)
                    && (country_code.is_none() || m.country_code.as_deref() == country_code)
            })
            .map(|m| m.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::creative::{CreativeData, CreativeStatus};
    use crate::core::spec::formats::FormatRef;
    use chrono::Utc;

    fn creative(tenant: &str, principal: &str, id: &str, name: &str) -> Creative {
        Creative {
            tenant_id: tenant.to_string(),
            principal_id: principal.to_string(),
            creative_id: id.to_string(),
            name: name.to_string(),
            format: Some(FormatRef::standard("display_300x250_image")),
            status: CreativeStatus::Pending,
            data: CreativeData::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_creatives_scoped_per_principal() {
        let store = LocalStore::new();

        store
            .upsert_creative(creative("acme", "buyer_a", "cr_1", "A banner"))
            .await
            .unwrap();
        store
            .upsert_creative(creative("acme", "buyer_b", "cr_1", "B banner"))
            .await
            .unwrap();

        let a = store.get_creative("acme", "buyer_a", "cr_1").await.unwrap().unwrap();
        let b = store.get_creative("acme", "buyer_b", "cr_1").await.unwrap().unwrap();

        assert_eq!(a.name, "A banner");
        assert_eq!(b.name, "B banner");

        let (page, total) = store
            .query_creatives("acme", "buyer_a", &ListCreativesRequest::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "A banner");
    }

    #[tokio::test]
    async fn test_query_creatives_pagination() {
        let store = LocalStore::new();
        for i in 0..7 {
            store
                .upsert_creative(creative("acme", "buyer_a", &format!("cr_{}", i), &format!("c{}", i)))
                .await
                .unwrap();
        }

        let query = ListCreativesRequest {
            limit: 3,
            page: 2,
            sort_by: CreativeSortField::Name,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let (page, total) = store.query_creatives("acme", "buyer_a", &query).await.unwrap();

        assert_eq!(total, 7);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].name, "c3");
    }

    #[tokio::test]
    async fn test_tenant_lookup_by_subdomain_and_vhost() {
        use crate::core::models::tenant::TenantBuilder;

        let store = LocalStore::new();
        let tenant = TenantBuilder::default()
            .tenant_id("acme".to_string())
            .name("Acme".to_string())
            .subdomain("acme".to_string())
            .virtual_host(Some("ads.acme.example".to_string()))
            .admin_token("admin_tok".to_string())
            .build()
            .unwrap();
        store.upsert_tenant(tenant).await.unwrap();

        assert!(store.get_tenant_by_subdomain("acme").await.unwrap().is_some());
        assert!(store.get_tenant_by_subdomain("other").await.unwrap().is_none());
        assert!(
            store
                .get_tenant_by_virtual_host("ads.acme.example")
                .await
                .unwrap()
                .is_some()
        );
    }
}
