use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::adapters::AdapterPackageSpec;
use crate::core::managers::FormatLibrary;
use crate::core::models::media_buy::{new_media_buy_id, new_package_id};
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Issues the permanent media buy and package ids, builds the adapter
/// package specs, and writes the generated ids back into the request
/// so the stored raw request round-trips them. These ids are final
/// whether the buy is held for approval or created immediately.
pub struct BuildPackagesTask {
    formats: Arc<FormatLibrary>,
}

impl BuildPackagesTask {
    pub fn new(formats: Arc<FormatLibrary>) -> Self {
        BuildPackagesTask { formats }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for BuildPackagesTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let products = context.products.get().expect("products resolved before package build");
        let packages = context.req.read().packages.clone();

        // Requested formats must both exist on a registered agent and
        // be offered by the product, before any ids are issued.
        for package in &packages {
            let Some(requested) = package.format_ids.as_ref().filter(|f| !f.is_empty()) else {
                continue;
            };
            let product = package
                .product_id
                .as_deref()
                .and_then(|id| products.get(id))
                .expect("products loaded for every package");

            for format in requested {
                if let Err(e) = self.formats.validate_reference(&context.tenant, format).await {
                    let error = e.downcast::<AdcpError>().unwrap_or_else(|other| {
                        AdcpError::new(ErrorCode::FormatValidationError, other.to_string())
                    });
                    return Err(context.fail(error));
                }

                if !product.formats.iter().any(|f| f.key() == format.key()) {
                    let offered: Vec<String> = product.formats.iter().map(|f| f.id.clone()).collect();
                    return Err(context.fail(AdcpError::validation(format!(
                        "Product '{}' ({}) does not support requested format {}. \
                         Supported formats: {}",
                        product.name,
                        product.product_id,
                        format.id,
                        offered.join(", ")
                    ))));
                }
            }
        }

        let media_buy_id = new_media_buy_id();
        let pricing_by_index = context.pricing_by_index.lock().clone();

        let mut specs = Vec::with_capacity(packages.len());
        {
            let mut req = context.req.write();
            for (idx, package) in req.packages.iter_mut().enumerate() {
                let product_id = package
                    .product_id
                    .clone()
                    .expect("packages validated before package build");
                let product = products.get(&product_id).expect("products loaded for every package");

                let format_ids = match package.format_ids.as_ref().filter(|f| !f.is_empty()) {
                    Some(requested) => requested.clone(),
                    None => product.formats.clone(),
                };

                let package_id = new_package_id(&product_id, idx + 1);
                let pricing = pricing_by_index.get(&idx);

                let cpm = pricing
                    .map(|p| p.effective_rate())
                    .filter(|rate| *rate > 0.0)
                    .or_else(|| product.pricing_options.first().and_then(|o| o.rate))
                    .unwrap_or(10.0);

                let budget = package.budget_total();
                let impressions = package
                    .impressions
                    .unwrap_or_else(|| (budget.unwrap_or(0.0) / cpm * 1000.0).max(0.0) as u64);

                specs.push(AdapterPackageSpec {
                    package_id: package_id.clone(),
                    name: format!("{} - Package {}", product_id, idx + 1),
                    product_id,
                    delivery_type: product.delivery_type,
                    cpm,
                    impressions,
                    format_ids,
                    targeting_overlay: package.targeting_overlay.clone(),
                    buyer_ref: package.buyer_ref.clone(),
                    budget,
                    creative_ids: package.creative_ids.clone().unwrap_or_default(),
                });

                // Round-trip the permanent id through the stored request.
                package.package_id = Some(package_id);
            }
        }

        {
            let mut pricing_by_package = context.pricing_by_package.lock();
            for (idx, spec) in specs.iter().enumerate() {
                if let Some(pricing) = pricing_by_index.get(&idx) {
                    pricing_by_package.insert(spec.package_id.clone(), pricing.clone());
                }
            }
        }

        debug!("Issued media buy id {} with {} packages", media_buy_id, specs.len());

        *context.package_specs.lock() = specs;
        let _ = context.media_buy_id.set(media_buy_id);

        Ok(())
    }
}
