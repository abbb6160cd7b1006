use crate::core::models::media_buy::PricingInfo;
use crate::core::models::product::{CurrencyLimit, Product};
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::spec::requests::PackageRequest;

/// Resolves and validates the pricing selection of one package against
/// its product's pricing options.
///
/// Selection order: explicit `pricing_option_id` (composite
/// `{model}_{currency}_{fixed|auction}`, case-insensitive), then the
/// legacy `(pricing_model, currency)` pair, then the product's first
/// option matching the campaign currency.
pub fn resolve_package_pricing(
    package: &PackageRequest,
    product: &Product,
    campaign_currency: &str,
) -> Result<PricingInfo, AdcpError> {
    if product.pricing_options.is_empty() {
        return Err(AdcpError::pricing(format!(
            "Product {} has no pricing_options configured. This is a data integrity error.",
            product.product_id
        )));
    }

    let selected = if package.pricing_option_id.is_none() && package.pricing_model.is_none() {
        product
            .first_option_for_currency(campaign_currency)
            .or_else(|| product.pricing_options.first())
    } else {
        product.pricing_options.iter().find(|option| {
            if let Some(option_id) = &package.pricing_option_id {
                return option_id.eq_ignore_ascii_case(&option.option_id());
            }

            if let Some(model) = package.pricing_model {
                return option.pricing_model == model && option.currency == campaign_currency;
            }

            false
        })
    };

    let Some(option) = selected else {
        let available: Vec<String> = product
            .pricing_options
            .iter()
            .map(|o| format!("{} ({} {})", o.option_id(), o.pricing_model, o.currency))
            .collect();

        let mut message = format!("Product {} does not offer ", product.product_id);
        if let Some(option_id) = &package.pricing_option_id {
            message.push_str(&format!("pricing_option_id '{}'", option_id));
        } else if let Some(model) = package.pricing_model {
            message.push_str(&format!("pricing model '{}' in currency {}", model, campaign_currency));
        }
        message.push_str(&format!(". Available options: {}", available.join(", ")));

        return Err(AdcpError::pricing(message));
    };

    if !option.is_fixed {
        let Some(bid_price) = package.bid_price else {
            return Err(AdcpError::pricing(format!(
                "Package requires bid_price for auction-based {} pricing. Floor price: {}",
                option.pricing_model,
                option.floor()
            )));
        };

        if bid_price < option.floor() {
            return Err(AdcpError::pricing(format!(
                "Bid price {} is below floor price {} for {} pricing",
                bid_price,
                option.floor(),
                option.pricing_model
            )));
        }
    }

    if option.is_fixed && option.rate.is_none() {
        return Err(AdcpError::pricing(format!(
            "Product {} pricing option has is_fixed=true but no rate specified",
            product.product_id
        )));
    }

    if let Some(min_spend) = option.min_spend_per_package
        && let Some(budget) = package.budget_total()
        && budget < min_spend
    {
        return Err(AdcpError::pricing(format!(
            "Package budget {} {} is below minimum spend {} {} for {}",
            budget, option.currency, min_spend, option.currency, option.pricing_model
        )));
    }

    Ok(PricingInfo {
        pricing_model: option.pricing_model,
        rate: option.rate,
        currency: option.currency.clone(),
        is_fixed: option.is_fixed,
        bid_price: package.bid_price,
    })
}

/// Enforces the tenant's per-currency spend guardrails against every
/// package in the request. Always runs, independent of the pricing
/// option resolution.
///
/// The daily cap is checked per package against
/// `package_budget / flight_days` and never aggregated, so neither
/// budget-splitting nor flight-lengthening can route around it.
pub fn check_currency_limits(
    packages: &[PackageRequest],
    total_budget: f64,
    limit: &CurrencyLimit,
    products: &[Product],
    flight_days: i64,
    currency: &str,
) -> Result<(), AdcpError> {
    let flight_days = flight_days.max(1) as f64;
    let legacy_mode = !packages.is_empty() && packages.iter().all(|p| p.budget.is_none());

    if let Some(min_budget) = limit.min_package_budget {
        if legacy_mode || packages.is_empty() {
            let floor = products
                .iter()
                .map(|p| product_min_spend(p, limit, currency))
                .fold(min_budget, f64::max);

            if total_budget < floor {
                return Err(AdcpError::new(
                    ErrorCode::InvalidBudget,
                    format!(
                        "Total budget ({} {}) does not meet minimum spend requirement ({} {}) \
                         for the selected products",
                        total_budget, currency, floor, currency
                    ),
                ));
            }
        } else {
            for package in packages {
                let Some(budget) = package.budget_total() else {
                    continue;
                };

                let floor = package
                    .product_id
                    .as_deref()
                    .and_then(|pid| products.iter().find(|p| p.product_id == pid))
                    .map(|p| product_min_spend(p, limit, currency))
                    .unwrap_or(min_budget);

                if budget < floor {
                    return Err(AdcpError::new(
                        ErrorCode::InvalidBudget,
                        format!(
                            "Package budget ({} {}) does not meet minimum spend requirement \
                             ({} {}) for products in this package",
                            budget, currency, floor, currency
                        ),
                    ));
                }
            }
        }
    }

    if let Some(max_daily) = limit.max_daily_package_spend {
        if legacy_mode || packages.is_empty() {
            let daily = total_budget / flight_days;
            if daily > max_daily {
                return Err(AdcpError::new(
                    ErrorCode::BudgetLimitExceeded,
                    format!(
                        "Daily budget ({:.2} {}) exceeds maximum daily spend ({} {}). \
                         This protects against accidental large budgets.",
                        daily, currency, max_daily, currency
                    ),
                ));
            }
        } else {
            for package in packages {
                let Some(budget) = package.budget_total() else {
                    continue;
                };

                let daily = budget / flight_days;
                if daily > max_daily {
                    return Err(AdcpError::new(
                        ErrorCode::BudgetLimitExceeded,
                        format!(
                            "Package daily budget ({:.2} {}) exceeds maximum daily spend per \
                             package ({} {}). This protects against accidental large budgets \
                             and line item proliferation.",
                            daily, currency, max_daily, currency
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Minimum spend for a product: the pricing option matching the
/// request currency overrides the tenant-wide floor.
fn product_min_spend(product: &Product, limit: &CurrencyLimit, currency: &str) -> f64 {
    product
        .pricing_options
        .iter()
        .find(|o| o.currency == currency)
        .and_then(|o| o.min_spend_per_package)
        .or(product.min_spend)
        .or(limit.min_package_budget)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::product::{
        DeliveryType, PriceGuidance, PricingModel, PricingOption,
    };
    use crate::core::spec::requests::BudgetInput;

    fn option(model: PricingModel, currency: &str, fixed: bool, rate: Option<f64>, floor: Option<f64>) -> PricingOption {
        PricingOption {
            pricing_model: model,
            currency: currency.to_string(),
            is_fixed: fixed,
            rate,
            price_guidance: floor.map(|f| PriceGuidance {
                floor: f,
                ..Default::default()
            }),
            min_spend_per_package: None,
            parameters: None,
            supported: None,
            unsupported_reason: None,
        }
    }

    fn product(options: Vec<PricingOption>) -> Product {
        Product {
            tenant_id: "acme".to_string(),
            product_id: "prod_cpm_fixed".to_string(),
            name: "Fixed CPM".to_string(),
            delivery_type: DeliveryType::Guaranteed,
            min_spend: None,
            formats: Vec::new(),
            pricing_options: options,
            auto_create_enabled: true,
            implementation_config: None,
            floor_cpm: None,
            recommended_cpm: None,
            estimated_exposures: None,
        }
    }

    fn package(model: Option<PricingModel>, bid: Option<f64>, budget: Option<f64>) -> PackageRequest {
        PackageRequest {
            product_id: Some("prod_cpm_fixed".to_string()),
            pricing_model: model,
            bid_price: bid,
            budget: budget.map(BudgetInput::Total),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_selection_uses_first_matching_currency() {
        let product = product(vec![
            option(PricingModel::Cpm, "EUR", true, Some(9.0), None),
            option(PricingModel::Cpm, "USD", true, Some(12.0), None),
        ]);

        let info = resolve_package_pricing(&package(None, None, Some(1000.0)), &product, "USD").unwrap();
        assert_eq!(info.currency, "USD");
        assert_eq!(info.rate, Some(12.0));
        assert!(info.is_fixed);
    }

    #[test]
    fn test_option_id_resolution_case_insensitive() {
        let product = product(vec![option(PricingModel::Cpm, "USD", false, None, Some(8.0))]);
        let mut pkg = package(None, Some(9.0), Some(1000.0));
        pkg.pricing_option_id = Some("CPM_USD_AUCTION".to_string());

        let info = resolve_package_pricing(&pkg, &product, "USD").unwrap();
        assert!(!info.is_fixed);
        assert_eq!(info.bid_price, Some(9.0));
    }

    #[test]
    fn test_bid_below_floor_rejected() {
        let product = product(vec![option(PricingModel::Cpm, "USD", false, None, Some(8.0))]);
        let err = resolve_package_pricing(
            &package(Some(PricingModel::Cpm), Some(5.0), Some(1000.0)),
            &product,
            "USD",
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::PricingError);
        assert!(err.message.contains("below floor price"));
    }

    #[test]
    fn test_auction_requires_bid_price() {
        let product = product(vec![option(PricingModel::Cpm, "USD", false, None, Some(8.0))]);
        let err = resolve_package_pricing(
            &package(Some(PricingModel::Cpm), None, Some(1000.0)),
            &product,
            "USD",
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::PricingError);
        assert!(err.message.contains("bid_price"));
    }

    #[test]
    fn test_fixed_without_rate_rejected() {
        let product = product(vec![option(PricingModel::Cpm, "USD", true, None, None)]);
        let err = resolve_package_pricing(
            &package(Some(PricingModel::Cpm), None, Some(1000.0)),
            &product,
            "USD",
        )
        .unwrap_err();

        assert!(err.message.contains("no rate"));
    }

    #[test]
    fn test_unknown_model_lists_available_options() {
        let product = product(vec![option(PricingModel::Cpm, "USD", true, Some(12.0), None)]);
        let err = resolve_package_pricing(
            &package(Some(PricingModel::Cpcv), None, Some(1000.0)),
            &product,
            "USD",
        )
        .unwrap_err();

        assert!(err.message.contains("does not offer"));
        assert!(err.message.contains("cpm_usd_fixed"));
    }

    #[test]
    fn test_min_spend_boundary_exact_budget_accepted() {
        let mut opt = option(PricingModel::Cpm, "USD", true, Some(12.0), None);
        opt.min_spend_per_package = Some(1000.0);
        let product = product(vec![opt]);

        // Equal to the minimum passes.
        assert!(
            resolve_package_pricing(&package(Some(PricingModel::Cpm), None, Some(1000.0)), &product, "USD").is_ok()
        );

        // Strictly below is rejected.
        let err = resolve_package_pricing(
            &package(Some(PricingModel::Cpm), None, Some(999.99)),
            &product,
            "USD",
        )
        .unwrap_err();
        assert!(err.message.contains("below minimum spend"));
    }

    #[test]
    fn test_daily_cap_is_per_package() {
        let limit = CurrencyLimit {
            tenant_id: "acme".to_string(),
            currency: "USD".to_string(),
            min_package_budget: None,
            max_daily_package_spend: Some(1000.0),
        };

        // Two packages each within the cap: total would exceed the cap
        // if it were aggregated, but per-package enforcement passes.
        let packages = vec![
            package(None, None, Some(9000.0)),
            package(None, None, Some(9000.0)),
        ];
        assert!(check_currency_limits(&packages, 18000.0, &limit, &[], 10, "USD").is_ok());

        // One package over the cap fails even with a compliant sibling.
        let packages = vec![
            package(None, None, Some(500.0)),
            package(None, None, Some(30000.0)),
        ];
        let err = check_currency_limits(&packages, 30500.0, &limit, &[], 10, "USD").unwrap_err();
        assert_eq!(err.code, ErrorCode::BudgetLimitExceeded);
        assert!(err.message.contains("maximum daily spend"));
    }

    #[test]
    fn test_daily_cap_short_flight_rejected() {
        let limit = CurrencyLimit {
            tenant_id: "acme".to_string(),
            currency: "USD".to_string(),
            min_package_budget: None,
            max_daily_package_spend: Some(1000.0),
        };

        // 30,000 over 30 days is fine; the same budget over 5 days is not.
        let packages = vec![package(None, None, Some(30000.0))];
        assert!(check_currency_limits(&packages, 30000.0, &limit, &[], 30, "USD").is_ok());
        assert!(check_currency_limits(&packages, 30000.0, &limit, &[], 5, "USD").is_err());
    }

    #[test]
    fn test_flight_days_floor_at_one() {
        let limit = CurrencyLimit {
            tenant_id: "acme".to_string(),
            currency: "USD".to_string(),
            min_package_budget: None,
            max_daily_package_spend: Some(1000.0),
        };

        let packages = vec![package(None, None, Some(500.0))];
        assert!(check_currency_limits(&packages, 500.0, &limit, &[], 0, "USD").is_ok());
    }
}
