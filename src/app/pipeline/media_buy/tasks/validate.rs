use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::pipeline::BlockingTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::Error;
use std::collections::HashMap;

/// Request-shape validation: positive budget, sane flight window
/// (resolving the `asap` literal), at least one product, and no
/// product reused across packages.
pub struct ValidateRequestTask;

impl BlockingTask<CreateMediaBuyContext, Error> for ValidateRequestTask {
    fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let req = context.req.read();

        let total_budget = req.total_budget();
        if total_budget <= 0.0 {
            return Err(context.fail(AdcpError::new(
                ErrorCode::InvalidBudget,
                format!("Invalid budget: {}. Budget must be positive.", total_budget),
            )));
        }

        let start_time = req.start_time.resolve(context.now);
        if !req.start_time.is_asap() && start_time < context.now {
            return Err(context.fail(AdcpError::new(
                ErrorCode::InvalidDatetime,
                format!(
                    "Invalid start time: {}. Start time cannot be in the past.",
                    start_time
                ),
            )));
        }

        if req.end_time <= start_time {
            return Err(context.fail(AdcpError::new(
                ErrorCode::InvalidDatetime,
                format!(
                    "Invalid time range: end time ({}) must be after start time ({}).",
                    req.end_time, start_time
                ),
            )));
        }

        if req.packages.is_empty() || req.product_ids().is_empty() {
            return Err(context.fail(AdcpError::validation("At least one product is required.")));
        }

        for package in &req.packages {
            if package.product_id.is_none() {
                return Err(context.fail(AdcpError::validation(format!(
                    "Package {} must specify product_id.",
                    package.buyer_ref.as_deref().unwrap_or("(no buyer_ref)")
                ))));
            }
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for package in &req.packages {
            if let Some(product_id) = package.product_id.as_deref() {
                *counts.entry(product_id).or_default() += 1;
            }
        }
        let mut duplicates: Vec<&str> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort();
            return Err(context.fail(AdcpError::validation(format!(
                "Duplicate product_id(s) found in packages: {}. Each product can only be \
                 used once per media buy.",
                duplicates.join(", ")
            ))));
        }

        let _ = context.start_time.set(start_time);
        let _ = context.end_time.set(req.end_time);
        let _ = context.total_budget.set(total_budget);

        Ok(())
    }
}
