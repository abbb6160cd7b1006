use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::AsyncTask;
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use tracing::info;

/// Loads config-declared tenants (with their principals, products,
/// limits, and properties) into the store. Existing tenants are left
/// untouched so a restart never clobbers admin edits.
pub struct SeedLoadTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for SeedLoadTask {
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config.get().ok_or(anyhow!("Config missing during seed load"))?;
        let store = context.store.get().ok_or(anyhow!("Store missing during seed load"))?;

        for seed in &config.seed {
            let tenant_id = seed.tenant.tenant_id.clone();

            if store.get_tenant(&tenant_id).await?.is_some() {
                info!("Tenant {} already present, skipping seed", tenant_id);
                continue;
            }

            store.upsert_tenant(seed.tenant.clone()).await?;

            for principal in &seed.principals {
                store.upsert_principal(principal.clone()).await?;
            }
            for product in &seed.products {
                store.upsert_product(product.clone()).await?;
            }
            for limit in &seed.currency_limits {
                store.upsert_currency_limit(limit.clone()).await?;
            }
            for property in &seed.properties {
                store.upsert_property(property.clone()).await?;
            }
            for tag in &seed.property_tags {
                store.upsert_property_tag(tag.clone()).await?;
            }
            for format in &seed.creative_formats {
                store.upsert_creative_format(&tenant_id, format.clone()).await?;
            }
            for creative in &seed.creatives {
                store.upsert_creative(creative.clone()).await?;
            }
            for metrics in &seed.format_metrics {
                store.upsert_format_metrics(metrics.clone()).await?;
            }

            info!(
                "Seeded tenant {} ({} principals, {} products)",
                tenant_id,
                seed.principals.len(),
                seed.products.len()
            );
        }

        Ok(())
    }
}
