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
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use chrono::NaiveDate;
use firestore::FirestoreDb;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

mod collections {
    pub const TENANTS: &str = "tenants";
    pub const PRINCIPALS: &str = "principals";
    pub const PRODUCTS: &str = "products";
    pub const CURRENCY_LIMITS: &str = "currency_limits";
    pub const MEDIA_BUYS: &str = "media_buys";
    pub const MEDIA_PACKAGES: &str = "media_packages";
    pub const CREATIVES: &str = "creatives";
    pub const ASSIGNMENTS: &str = "creative_assignments";
    pub const CONTEXTS: &str = "workflow_contexts";
    pub const STEPS: &str = "workflow_steps";
    pub const MAPPINGS: &str = "object_workflow_mappings";
    pub const PUSH_CONFIGS: &str = "push_notification_configs";
    pub const PROPERTIES: &str = "authorized_properties";
    pub const PROPERTY_TAGS: &str = "property_tags";
    pub const CREATIVE_FORMATS: &str = "creative_formats";
    pub const FORMAT_METRICS: &str = "format_performance_metrics";
}

fn doc_id(parts: &[&str]) -> String {
    parts.join("__")
}

/// Firestore-backed store. Documents are whole serialized entities
/// keyed by composite ids; collection scans deserialize defensively so
/// one malformed document cannot take the whole listing down.
pub struct FirestoreStore {
    db: FirestoreDb,
}

impl FirestoreStore {
    pub fn new(db: FirestoreDb) -> Self {
        FirestoreStore { db }
    }

    async fn put<T>(&self, collection: &str, id: &str, obj: &T) -> Result<(), Error>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.db
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(obj)
            .execute::<T>()
            .await?;

        Ok(())
    }

    async fn fetch<T>(&self, collection: &str, id: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send + Sync,
    {
        Ok(self
            .db
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<T>()
            .one(id)
            .await?)
    }

    async fn load_all<T>(&self, collection: &str) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let docs = self.db.fluent().select().from(collection).query().await?;

        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            match FirestoreDb::deserialize_doc_to::<T>(&doc) {
                Ok(obj) => results.push(obj),
                Err(err) => {
                    warn!("Failed to deserialize document {} in {}: {}", doc.name, collection, err);
                }
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl Store for FirestoreStore {
    async fn upsert_tenant(&self, tenant: Tenant) -> Result<(), Error> {
        self.put(collections::TENANTS, &tenant.tenant_id.clone(), &tenant).await
    }

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, Error> {
        self.fetch(collections::TENANTS, tenant_id).await
    }

    async fn get_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, Error> {
        let tenants: Vec<Tenant> = self.load_all(collections::TENANTS).await?;
        Ok(tenants.into_iter().find(|t| t.subdomain == subdomain))
    }

    async fn get_tenant_by_virtual_host(&self, host: &str) -> Result<Option<Tenant>, Error> {
        let tenants: Vec<Tenant> = self.load_all(collections::TENANTS).await?;
        Ok(tenants.into_iter().find(|t| t.virtual_host.as_deref() == Some(host)))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, Error> {
        self.load_all(collections::TENANTS).await
    }

    async fn upsert_principal(&self, principal: Principal) -> Result<(), Error> {
        let id = doc_id(&[&principal.tenant_id, &principal.principal_id]);
        self.put(collections::PRINCIPALS, &id, &principal).await
    }

    async fn get_principal(&self, tenant_id: &str, principal_id: &str) -> Result<Option<Principal>, Error> {
        self.fetch(collections::PRINCIPALS, &doc_id(&[tenant_id, principal_id]))
            .await
    }

    async fn count_principals(&self, tenant_id: &str) -> Result<usize, Error> {
        let principals: Vec<Principal> = self.load_all(collections::PRINCIPALS).await?;
        Ok(principals.iter().filter(|p| p.tenant_id == tenant_id).count())
    }

    async fn find_principal_by_token(&self, tenant_id: &str, token: &str) -> Result<Option<Principal>, Error> {
        let principals: Vec<Principal> = self.load_all(collections::PRINCIPALS).await?;
        Ok(principals
            .into_iter()
            .find(|p| p.tenant_id == tenant_id && p.access_token == token))
    }

    async fn find_principal_by_token_global(&self, token: &str) -> Result<Option<Principal>, Error> {
        let principals: Vec<Principal> = self.load_all(collections::PRINCIPALS).await?;
        Ok(principals.into_iter().find(|p| p.access_token == token))
    }

    async fn upsert_product(&self, product: Product) -> Result<(), Error> {
        let id = doc_id(&[&product.tenant_id, &product.product_id]);
        self.put(collections::PRODUCTS, &id, &product).await
    }

    async fn get_product(&self, tenant_id: &str, product_id: &str) -> Result<Option<Product>, Error> {
        self.fetch(collections::PRODUCTS, &doc_id(&[tenant_id, product_id])).await
    }

    async fn list_products(&self, tenant_id: &str) -> Result<Vec<Product>, Error> {
        let products: Vec<Product> = self.load_all(collections::PRODUCTS).await?;
        let mut products: Vec<Product> = products
            .into_iter()
            .filter(|p| p.tenant_id == tenant_id)
            .collect();
        products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(products)
    }

    async fn upsert_currency_limit(&self, limit: CurrencyLimit) -> Result<(), Error> {
        let id = doc_id(&[&limit.tenant_id, &limit.currency]);
        self.put(collections::CURRENCY_LIMITS, &id, &limit).await
    }

    async fn get_currency_limit(&self, tenant_id: &str, currency: &str) -> Result<Option<CurrencyLimit>, Error> {
        self.fetch(collections::CURRENCY_LIMITS, &doc_id(&[tenant_id, currency]))
            .await
    }

    async fn count_currency_limits(&self, tenant_id: &str) -> Result<usize, Error> {
        let limits: Vec<CurrencyLimit> = self.load_all(collections::CURRENCY_LIMITS).await?;
        Ok(limits.iter().filter(|l| l.tenant_id == tenant_id).count())
    }

    async fn insert_media_buy(&self, buy: MediaBuy) -> Result<(), Error> {
        let id = doc_id(&[&buy.tenant_id, &buy.media_buy_id]);
        self.put(collections::MEDIA_BUYS, &id, &buy).await
    }

    async fn update_media_buy(&self, buy: MediaBuy) -> Result<(), Error> {
        self.insert_media_buy(buy).await
    }

    async fn get_media_buy(&self, tenant_id: &str, media_buy_id: &str) -> Result<Option<MediaBuy>, Error> {
        self.fetch(collections::MEDIA_BUYS, &doc_id(&[tenant_id, media_buy_id]))
            .await
    }

    async fn list_media_buys(&self, tenant_id: &str, principal_id: &str) -> Result<Vec<MediaBuy>, Error> {
        let buys: Vec<MediaBuy> = self.load_all(collections::MEDIA_BUYS).await?;
        let mut buys: Vec<MediaBuy> = buys
            .into_iter()
            .filter(|b| b.tenant_id == tenant_id && b.principal_id == principal_id)
            .collect();
        buys.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(buys)
    }

    async fn find_media_buy_for_package(
        &self,
        tenant_id: &str,
        package_id: &str,
    ) -> Result<Option<MediaBuy>, Error> {
        let packages: Vec<MediaPackage> = self.load_all(collections::MEDIA_PACKAGES).await?;

        match packages.into_iter().find(|p| p.package_id == package_id) {
            Some(package) => self.get_media_buy(tenant_id, &package.media_buy_id).await,
            None => Ok(None),
        }
    }

    async fn insert_media_packages(&self, packages: Vec<MediaPackage>) -> Result<(), Error> {
        for package in packages {
            let id = doc_id(&[&package.media_buy_id, &package.package_id]);
            self.put(collections::MEDIA_PACKAGES, &id, &package).await?;
        }
        Ok(())
    }

    async fn list_media_packages(&self, media_buy_id: &str) -> Result<Vec<MediaPackage>, Error> {
        let packages: Vec<MediaPackage> = self.load_all(collections::MEDIA_PACKAGES).await?;
        let mut packages: Vec<MediaPackage> = packages
            .into_iter()
            .filter(|p| p.media_buy_id == media_buy_id)
            .collect();
        packages.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        Ok(packages)
    }

    async fn update_media_package(&self, package: MediaPackage) -> Result<(), Error> {
        let id = doc_id(&[&package.media_buy_id, &package.package_id]);
        self.put(collections::MEDIA_PACKAGES, &id, &package).await
    }

    async fn upsert_creative(&self, creative: Creative) -> Result<(), Error> {
        let id = doc_id(&[&creative.tenant_id, &creative.principal_id, &creative.creative_id]);
        self.put(collections::CREATIVES, &id, &creative).await
    }

    async fn get_creative(
        &self,
        tenant_id: &str,
        principal_id: &str,
        creative_id: &str,
    ) -> Result<Option<Creative>, Error> {
        self.fetch(collections::CREATIVES, &doc_id(&[tenant_id, principal_id, creative_id]))
            .await
    }

    async fn query_creatives(
        &self,
        tenant_id: &str,
        principal_id: &str,
        query: &ListCreativesRequest,
    ) -> Result<(Vec<Creative>, usize), Error> {
        let creatives: Vec<Creative> = self.load_all(collections::CREATIVES).await?;
        let assignments: Vec<CreativeAssignment> = if query.media_buy_id.is_some() || query.buyer_ref.is_some() {
            self.load_all(collections::ASSIGNMENTS).await?
        } else {
            Vec::new()
        };
        let buyer_ref_buys: Vec<String> = match query.buyer_ref.as_deref() {
            Some(buyer_ref) => {
                let buys: Vec<MediaBuy> = self.load_all(collections::MEDIA_BUYS).await?;
                buys.into_iter()
                    .filter(|b| b.tenant_id == tenant_id && b.buyer_ref == buyer_ref)
                    .map(|b| b.media_buy_id)
                    .collect()
            }
            None => Vec::new(),
        };

        let assigned = |creative_id: &str, media_buy_ids: &[String]| {
            assignments.iter().any(|a| {
                a.tenant_id == tenant_id
                    && a.creative_id == creative_id
                    && media_buy_ids.contains(&a.media_buy_id)
            })
        };

        let mut matched: Vec<Creative> = creatives
            .into_iter()
            .filter(|c| c.tenant_id == tenant_id && c.principal_id == principal_id)
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
                if !query.tags.is_empty() {
                    let name = c.name.to_lowercase();
                    if !query.tags.iter().all(|t| name.contains(&t.to_lowercase())) {
                        return false;
                    }
                }
                if let Some(media_buy_id) = &query.media_buy_id
                    && !assigned(&c.creative_id, std::slice::from_ref(media_buy_id))
                {
                    return false;
                }
                if query.buyer_ref.is_some() && !assigned(&c.creative_id, &buyer_ref_buys) {
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
        let page = matched
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn insert_assignment(&self, assignment: CreativeAssignment) -> Result<(), Error> {
        let id = doc_id(&[&assignment.tenant_id, &assignment.assignment_id]);
        self.put(collections::ASSIGNMENTS, &id, &assignment).await
    }

    async fn list_assignments_for_media_buy(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error> {
        let assignments: Vec<CreativeAssignment> = self.load_all(collections::ASSIGNMENTS).await?;
        let mut assignments: Vec<CreativeAssignment> = assignments
            .into_iter()
            .filter(|a| a.tenant_id == tenant_id && a.media_buy_id == media_buy_id)
            .collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(assignments)
    }

    async fn list_assignments_for_creative(
        &self,
        tenant_id: &str,
        creative_id: &str,
    ) -> Result<Vec<CreativeAssignment>, Error> {
        let assignments: Vec<CreativeAssignment> = self.load_all(collections::ASSIGNMENTS).await?;
        Ok(assignments
            .into_iter()
            .filter(|a| a.tenant_id == tenant_id && a.creative_id == creative_id)
            .collect())
    }

    async fn insert_context(&self, context: WorkflowContext) -> Result<(), Error> {
        let id = doc_id(&[&context.tenant_id, &context.context_id]);
        self.put(collections::CONTEXTS, &id, &context).await
    }

    async fn get_context(&self, tenant_id: &str, context_id: &str) -> Result<Option<WorkflowContext>, Error> {
        self.fetch(collections::CONTEXTS, &doc_id(&[tenant_id, context_id]))
            .await
    }

    async fn insert_step(&self, step: WorkflowStep) -> Result<(), Error> {
        let id = doc_id(&[&step.tenant_id, &step.step_id]);
        self.put(collections::STEPS, &id, &step).await
    }

    async fn update_step(&self, step: WorkflowStep) -> Result<(), Error> {
        self.insert_step(step).await
    }

    async fn get_step(&self, tenant_id: &str, step_id: &str) -> Result<Option<WorkflowStep>, Error> {
        self.fetch(collections::STEPS, &doc_id(&[tenant_id, step_id])).await
    }

    async fn query_steps(
        &self,
        tenant_id: &str,
        query: &ListTasksRequest,
    ) -> Result<(Vec<WorkflowStep>, usize), Error> {
        let steps: Vec<WorkflowStep> = self.load_all(collections::STEPS).await?;
        let needs_mappings = query.object_type.is_some() || query.object_id.is_some();
        let mappings: Vec<ObjectWorkflowMapping> = if needs_mappings {
            self.load_all(collections::MAPPINGS).await?
        } else {
            Vec::new()
        };

        let mut matched: Vec<WorkflowStep> = steps
            .into_iter()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| {
                if let Some(status) = &query.status
                    && s.status.to_string() != *status
                {
                    return false;
                }
                if needs_mappings {
                    let hit = mappings.iter().any(|m| {
                        m.step_id == s.step_id
                            && query
                                .object_type
                                .as_deref()
                                .map(|t| m.object_type.to_string() == t)
                                .unwrap_or(true)
                            && query
                                .object_id
                                .as_deref()
                                .map(|id| m.object_id == id)
                                .unwrap_or(true)
                    });
                    if !hit {
                        return false;
                    }
                }
                true
            })
            .collect();

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
        let id = doc_id(&[
            &mapping.step_id,
            &mapping.object_type.to_string(),
            &mapping.object_id,
        ]);
        self.put(collections::MAPPINGS, &id, &mapping).await
    }

    async fn mappings_for_step(&self, step_id: &str) -> Result<Vec<ObjectWorkflowMapping>, Error> {
        let mappings: Vec<ObjectWorkflowMapping> = self.load_all(collections::MAPPINGS).await?;
        let mut mappings: Vec<ObjectWorkflowMapping> = mappings
            .into_iter()
            .filter(|m| m.step_id == step_id)
            .collect();
        mappings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(mappings)
    }

    async fn upsert_push_config(&self, push_config: PushNotificationConfig) -> Result<(), Error> {
        let id = doc_id(&[&push_config.tenant_id, &push_config.principal_id, &push_config.id]);
        self.put(collections::PUSH_CONFIGS, &id, &push_config).await
    }

    async fn push_configs_for(
        &self,
        tenant_id: &str,
        principal_id: &str,
    ) -> Result<Vec<PushNotificationConfig>, Error> {
        let push_configs: Vec<PushNotificationConfig> = self.load_all(collections::PUSH_CONFIGS).await?;
        Ok(push_configs
            .into_iter()
            .filter(|c| c.tenant_id == tenant_id && c.principal_id == principal_id && c.is_active)
            .collect())
    }

    async fn upsert_property(&self, property: AuthorizedProperty) -> Result<(), Error> {
        let id = doc_id(&[&property.tenant_id, &property.property_id]);
        self.put(collections::PROPERTIES, &id, &property).await
    }

    async fn list_properties(&self, tenant_id: &str) -> Result<Vec<AuthorizedProperty>, Error> {
        let properties: Vec<AuthorizedProperty> = self.load_all(collections::PROPERTIES).await?;
        Ok(properties
            .into_iter()
            .filter(|p| p.tenant_id == tenant_id)
            .collect())
    }

    async fn upsert_property_tag(&self, tag: PropertyTag) -> Result<(), Error> {
        let id = doc_id(&[&tag.tenant_id, &tag.tag_id]);
        self.put(collections::PROPERTY_TAGS, &id, &tag).await
    }

    async fn list_property_tags(&self, tenant_id: &str) -> Result<Vec<PropertyTag>, Error> {
        let tags: Vec<PropertyTag> = self.load_all(collections::PROPERTY_TAGS).await?;
        Ok(tags.into_iter().filter(|t| t.tenant_id == tenant_id).collect())
    }

    async fn upsert_creative_format(&self, tenant_id: &str, format: Format) -> Result<(), Error> {
        let id = doc_id(&[tenant_id, &format.format_id]);
        self.put(collections::CREATIVE_FORMATS, &id, &format).await
    }

    async fn list_creative_formats(&self, tenant_id: &str) -> Result<Vec<Format>, Error> {
        let docs = self
            .db
            .fluent()
            .select()
            .from(collections::CREATIVE_FORMATS)
            .query()
            .await?;

        let prefix = format!("{}__", tenant_id);
        let mut formats = Vec::new();
        for doc in docs {
            let id = doc.name.rsplit('/').next().unwrap_or(&doc.name);
            if !id.starts_with(&prefix) {
                continue;
            }
            match FirestoreDb::deserialize_doc_to::<Format>(&doc) {
                Ok(format) => formats.push(format),
                Err(err) => warn!("Failed to deserialize creative format {}: {}", doc.name, err),
            }
        }

        Ok(formats)
    }

    async fn upsert_format_metrics(&self, metrics: FormatPerformanceMetrics) -> Result<(), Error> {
        let id = doc_id(&[
            &metrics.tenant_id,
            metrics.country_code.as_deref().unwrap_or("all"),
            &metrics.creative_size,
            &metrics.period_start.to_string(),
        ]);
        self.put(collections::FORMAT_METRICS, &id, &metrics).await
    }

    async fn query_format_metrics(
        &self,
        tenant_id: &str,
        country_code: Option<&str>,
        creative_sizes: &[String],
        cutoff: NaiveDate,
    ) -> Result<Vec<FormatPerformanceMetrics>, Error> {
        let metrics: Vec<FormatPerformanceMetrics> = self.load_all(collections::FORMAT_METRICS).await?;
        Ok(metrics
            .into_iter()
            .filter(|m| {
                m.tenant_id == tenant_id
                    && m.period_start >= cutoff
                    && creative_sizes.contains(&m.creative_size)
                    && (country_code.is_none() || m.country_code.as_deref() == country_code)
            })
            .collect())
    }
}
