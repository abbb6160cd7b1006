use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Loads the targeted products and fixes the campaign currency:
/// first package's chosen pricing option, then the product's options,
/// then the request fields, then USD. The tenant must carry a currency
/// limit row for the result.
pub struct ResolveCurrencyTask {
    store: Arc<dyn Store>,
}

impl ResolveCurrencyTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ResolveCurrencyTask { store }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for ResolveCurrencyTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let product_ids = context.req.read().product_ids();

        let mut products = HashMap::new();
        for product_id in &product_ids {
            match self.store.get_product(&context.tenant.tenant_id, product_id).await? {
                Some(product) => {
                    products.insert(product_id.clone(), product);
                }
                None => {
                    return Err(context.fail(AdcpError::validation(format!(
                        "Product {} not found for this publisher",
                        product_id
                    ))));
                }
            }
        }

        let currency = {
            let req = context.req.read();

            let from_first_package = req.packages.first().and_then(|package| {
                let product = package.product_id.as_deref().and_then(|id| products.get(id))?;

                if let Some(model) = package.pricing_model
                    && let Some(option) = product.pricing_options.iter().find(|o| o.pricing_model == model)
                {
                    return Some(option.currency.clone());
                }

                product.pricing_options.first().map(|o| o.currency.clone())
            });

            from_first_package
                .or_else(|| req.currency.clone())
                .or_else(|| req.budget.as_ref().and_then(|b| b.currency().map(String::from)))
                .or_else(|| {
                    req.packages
                        .first()
                        .and_then(|p| p.budget.as_ref())
                        .and_then(|b| b.currency().map(String::from))
                })
                .unwrap_or_else(|| "USD".to_string())
        };

        debug!("Campaign currency resolved to {}", currency);

        let limit = self
            .store
            .get_currency_limit(&context.tenant.tenant_id, &currency)
            .await?;

        let Some(limit) = limit else {
            return Err(context.fail(AdcpError::new(
                ErrorCode::CurrencyNotSupported,
                format!(
                    "Currency {} is not supported by this publisher. Contact the publisher \
                     to add support for this currency.",
                    currency
                ),
            )));
        };

        let _ = context.products.set(products);
        let _ = context.currency.set(currency);
        let _ = context.currency_limit.set(limit);

        Ok(())
    }
}
