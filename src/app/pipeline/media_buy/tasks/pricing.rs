use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::pipeline::BlockingTask;
use crate::core::pricing::{check_currency_limits, resolve_package_pricing};
use crate::core::spec::errors::AdcpError;
use anyhow::Error;

/// Validates every package's pricing selection and the tenant's
/// currency guardrails. The resolved pricing is kept per request
/// index for later remapping onto permanent package ids.
pub struct PricingTask;

impl BlockingTask<CreateMediaBuyContext, Error> for PricingTask {
    fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let req = context.req.read();
        let products = context.products.get().expect("products resolved before pricing");
        let currency = context.currency.get().expect("currency resolved before pricing");
        let limit = context.currency_limit.get().expect("currency limit resolved before pricing");

        {
            let mut by_index = context.pricing_by_index.lock();
            for (idx, package) in req.packages.iter().enumerate() {
                let Some(product) = package.product_id.as_deref().and_then(|id| products.get(id)) else {
                    continue;
                };

                match resolve_package_pricing(package, product, currency) {
                    Ok(pricing) => {
                        by_index.insert(idx, pricing);
                    }
                    Err(error) => {
                        drop(by_index);
                        return Err(context.fail(error));
                    }
                }
            }
        }

        let start = *context.start_time.get().expect("start resolved before pricing");
        let end = *context.end_time.get().expect("end resolved before pricing");
        let flight_days = (end - start).num_days();
        let total_budget = *context.total_budget.get().expect("budget validated before pricing");

        let product_list: Vec<_> = products.values().cloned().collect();
        if let Err(error) = check_currency_limits(
            &req.packages,
            total_budget,
            limit,
            &product_list,
            flight_days,
            currency,
        ) {
            return Err(context.fail(error));
        }

        if let Some(overlay) = &req.targeting_overlay
            && let Err(error) = validate_overlay_targeting(overlay)
        {
            return Err(context.fail(error));
        }

        Ok(())
    }
}

/// Targeting overlays may not use managed-only dimensions; those are
/// reserved for the publisher's own line item setup.
pub fn validate_overlay_targeting(overlay: &serde_json::Value) -> Result<(), AdcpError> {
    const MANAGED_ONLY: &[&str] = &["key_value_pairs", "inventory_targeting", "custom_targeting_keys"];

    if let Some(object) = overlay.as_object() {
        for key in MANAGED_ONLY {
            if object.contains_key(*key) {
                return Err(AdcpError::validation(format!(
                    "Targeting validation failed: dimension '{}' is managed by the publisher",
                    key
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_rejects_managed_dimensions() {
        assert!(validate_overlay_targeting(&json!({"geo_country_any_of": ["US"]})).is_ok());
        assert!(validate_overlay_targeting(&json!({"key_value_pairs": {"a": "b"}})).is_err());
    }
}
