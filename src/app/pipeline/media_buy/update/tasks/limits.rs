use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Re-validates the tenant's currency limits against the *proposed*
/// state of the buy: new budgets and, critically, the new flight
/// duration. Shortening a flight under an unchanged budget cannot be
/// used to sneak past the daily cap, and neither can extending it to
/// dilute a later increase.
pub struct ValidateLimitsTask {
    store: Arc<dyn Store>,
}

impl ValidateLimitsTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ValidateLimitsTask { store }
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for ValidateLimitsTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let buy = context.media_buy.get().expect("buy loaded before limit validation");
        let req = &context.req;

        // Mid-flight currency changes are rejected outright; the
        // consequences for already-validated packages are undefined.
        if let Some(currency) = &req.currency
            && currency != &buy.currency
        {
            return Err(context.fail(AdcpError::new(
                ErrorCode::CurrencyNotSupported,
                format!(
                    "Currency of media buy {} cannot be changed from {} to {}",
                    buy.media_buy_id, buy.currency, currency
                ),
            )));
        }

        if let Some(budget) = req.budget
            && budget <= 0.0
        {
            return Err(context.fail(AdcpError::new(
                ErrorCode::InvalidBudget,
                format!("Invalid budget: {}. Budget must be positive.", budget),
            )));
        }

        let touches_limits = req.start_time.is_some()
            || req.end_time.is_some()
            || req.budget.is_some()
            || req
                .packages
                .as_ref()
                .map(|p| p.iter().any(|u| u.budget.is_some()))
                .unwrap_or(false);
        if !touches_limits {
            return Ok(());
        }

        let limit = self
            .store
            .get_currency_limit(&context.tenant.tenant_id, &buy.currency)
            .await?;
        let Some(limit) = limit else {
            return Err(context.fail(AdcpError::new(
                ErrorCode::CurrencyNotSupported,
                format!("Currency {} is not supported by this publisher.", buy.currency),
            )));
        };

        let Some(max_daily) = limit.max_daily_package_spend else {
            return Ok(());
        };

        let start = req
            .start_time
            .as_ref()
            .map(|s| s.resolve(context.now))
            .unwrap_or(buy.start_time);
        let end = req.end_time.unwrap_or(buy.end_time);
        let flight_days = (end - start).num_days().max(1) as f64;

        // Proposed per-package budgets: explicit updates override the
        // persisted rows; untouched packages are re-checked against
        // the new duration too.
        let packages = self.store.list_media_packages(&buy.media_buy_id).await?;
        for package in &packages {
            let updated = req
                .packages
                .as_ref()
                .and_then(|updates| updates.iter().find(|u| u.package_id == package.package_id))
                .and_then(|u| u.budget);

            let Some(budget) = updated.or(package.budget) else {
                continue;
            };

            let daily = budget / flight_days;
            if daily > max_daily {
                return Err(context.fail(AdcpError::new(
                    ErrorCode::BudgetLimitExceeded,
                    format!(
                        "Updated package daily budget ({:.2} {}) exceeds maximum daily spend \
                         per package ({} {}). Flight date changes are not allowed to bypass \
                         daily maximums.",
                        daily, buy.currency, max_daily, buy.currency
                    ),
                )));
            }
        }

        // Campaign-level fallback when the buy has no package rows.
        if packages.is_empty() {
            let budget = req.budget.unwrap_or(buy.budget);
            let daily = budget / flight_days;
            if daily > max_daily {
                return Err(context.fail(AdcpError::new(
                    ErrorCode::BudgetLimitExceeded,
                    format!(
                        "Updated daily budget ({:.2} {}) exceeds maximum daily spend ({} {}).",
                        daily, buy.currency, max_daily, buy.currency
                    ),
                )));
            }
        }

        Ok(())
    }
}
