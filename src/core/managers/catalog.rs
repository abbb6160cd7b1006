use crate::core::models::product::Product;
use crate::core::spec::formats::dimensions_from_format_id;
use crate::core::spec::requests::ProductFilters;
use crate::core::store::Store;
use anyhow::Error;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Discovery-time pricing enrichment from rolling delivery metrics.
/// Floor and recommended CPMs are impression-weighted p25/p75 over the
/// last 30 days for the product's creative sizes; failures degrade to
/// no enrichment rather than failing discovery.
pub struct DynamicPricingService {
    store: Arc<dyn Store>,
}

impl DynamicPricingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        DynamicPricingService { store }
    }

    pub async fn enrich_products(
        &self,
        products: &mut [Product],
        tenant_id: &str,
        country_code: Option<&str>,
    ) {
        let cutoff = (Utc::now() - Duration::days(30)).date_naive();

        for product in products.iter_mut() {
            let sizes: Vec<String> = product
                .formats
                .iter()
                .filter_map(|f| dimensions_from_format_id(&f.id))
                .map(|(w, h)| format!("{}x{}", w, h))
                .collect();

            if sizes.is_empty() {
                continue;
            }

            let metrics = match self
                .store
                .query_format_metrics(tenant_id, country_code, &sizes, cutoff)
                .await
            {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!("Pricing metrics unavailable for {}: {}", product.product_id, e);
                    continue;
                }
            };

            if metrics.is_empty() {
                continue;
            }

            let total_impressions: u64 = metrics.iter().map(|m| m.total_impressions).sum();
            if total_impressions == 0 {
                continue;
            }

            let weighted = |extract: fn(&crate::core::models::metrics::FormatPerformanceMetrics) -> Option<f64>| {
                let mut weight = 0u64;
                let mut sum = 0.0;
                for metric in &metrics {
                    if let Some(value) = extract(metric) {
                        weight += metric.total_impressions;
                        sum += value * metric.total_impressions as f64;
                    }
                }
                (weight > 0).then(|| sum / weight as f64)
            };

            product.floor_cpm = weighted(|m| m.p25_cpm);
            product.recommended_cpm = weighted(|m| m.p75_cpm).or(weighted(|m| Some(m.average_cpm)));
            product.estimated_exposures = Some(total_impressions);

            debug!(
                "Product {} enriched: floor={:?} recommended={:?} exposures={:?}",
                product.product_id, product.floor_cpm, product.recommended_cpm, product.estimated_exposures
            );
        }
    }
}

/// Store-backed product catalog with the discovery filter set.
pub struct ProductCatalog {
    store: Arc<dyn Store>,
    pricing: DynamicPricingService,
}

impl ProductCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ProductCatalog {
            pricing: DynamicPricingService::new(store.clone()),
            store,
        }
    }

    pub async fn products_for_request(
        &self,
        tenant_id: &str,
        filters: Option<&ProductFilters>,
        min_exposures: Option<u64>,
    ) -> Result<Vec<Product>, Error> {
        let mut products = self.store.list_products(tenant_id).await?;

        self.pricing.enrich_products(&mut products, tenant_id, None).await;

        if let Some(filters) = filters {
            products.retain(|p| Self::matches(p, filters));
        }

        if let Some(min_exposures) = min_exposures {
            products.retain(|p| {
                match p.delivery_type {
                    crate::core::models::product::DeliveryType::Guaranteed => p
                        .estimated_exposures
                        .map(|e| e >= min_exposures)
                        .unwrap_or(false),
                    // Non-guaranteed products are kept; exposure
                    // estimates are advisory there.
                    crate::core::models::product::DeliveryType::NonGuaranteed => true,
                }
            });
        }

        Ok(products)
    }

    fn matches(product: &Product, filters: &ProductFilters) -> bool {
        if let Some(delivery_type) = &filters.delivery_type
            && product.delivery_type.to_string() != *delivery_type
        {
            return false;
        }

        if let Some(is_fixed) = filters.is_fixed_price {
            let has_fixed = product.pricing_options.iter().any(|o| o.is_fixed);
            if has_fixed != is_fixed {
                return false;
            }
        }

        if let Some(format_ids) = &filters.format_ids
            && !product.formats.iter().any(|f| format_ids.contains(&f.id))
        {
            return false;
        }

        if let Some(format_types) = &filters.format_types {
            let product_types: Vec<String> = product
                .formats
                .iter()
                .filter_map(|f| f.id.split('_').next().map(|t| t.to_string()))
                .collect();
            if !format_types.iter().any(|t| product_types.contains(t)) {
                return false;
            }
        }

        if filters.standard_formats_only {
            let standard = product.formats.iter().all(|f| {
                f.id.starts_with("display_")
                    || f.id.starts_with("video_")
                    || f.id.starts_with("audio_")
                    || f.id.starts_with("native_")
            });
            if !standard {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::metrics::FormatPerformanceMetrics;
    use crate::core::models::product::{DeliveryType, ProductBuilder};
    use crate::core::spec::formats::FormatRef;
    use crate::core::store::LocalStore;

    fn product(id: &str, delivery: DeliveryType, format: &str) -> Product {
        ProductBuilder::default()
            .tenant_id("acme".to_string())
            .product_id(id.to_string())
            .name(id.to_string())
            .delivery_type(delivery)
            .formats(vec![FormatRef::standard(format)])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_filters_by_delivery_type_and_format() {
        let store = Arc::new(LocalStore::new());
        store
            .upsert_product(product("p_display", DeliveryType::Guaranteed, "display_300x250_image"))
            .await
            .unwrap();
        store
            .upsert_product(product("p_video", DeliveryType::NonGuaranteed, "video_1920x1080_30s"))
            .await
            .unwrap();

        let catalog = ProductCatalog::new(store);

        let filters = ProductFilters {
            delivery_type: Some("guaranteed".to_string()),
            ..Default::default()
        };
        let products = catalog
            .products_for_request("acme", Some(&filters), None)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "p_display");

        let filters = ProductFilters {
            format_types: Some(vec!["video".to_string()]),
            ..Default::default()
        };
        let products = catalog
            .products_for_request("acme", Some(&filters), None)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "p_video");
    }

    #[tokio::test]
    async fn test_enrichment_from_metrics() {
        let store = Arc::new(LocalStore::new());
        store
            .upsert_product(product("p_display", DeliveryType::Guaranteed, "display_300x250_image"))
            .await
            .unwrap();
        store
            .upsert_format_metrics(FormatPerformanceMetrics {
                tenant_id: "acme".to_string(),
                country_code: None,
                creative_size: "300x250".to_string(),
                period_start: Utc::now().date_naive(),
                total_impressions: 1_000_000,
                average_cpm: 6.0,
                p25_cpm: Some(4.0),
                p75_cpm: Some(9.0),
            })
            .await
            .unwrap();

        let catalog = ProductCatalog::new(store);
        let products = catalog.products_for_request("acme", None, None).await.unwrap();

        assert_eq!(products[0].floor_cpm, Some(4.0));
        assert_eq!(products[0].recommended_cpm, Some(9.0));
        assert_eq!(products[0].estimated_exposures, Some(1_000_000));

        // min_exposures above the estimate drops the guaranteed product.
        let products = catalog
            .products_for_request("acme", None, Some(2_000_000))
            .await
            .unwrap();
        assert!(products.is_empty());
    }
}
