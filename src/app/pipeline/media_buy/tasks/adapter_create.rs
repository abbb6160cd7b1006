use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::adapters::{AdapterBuyRequest, call_with_timeout};
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::Error;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

/// Runs the adapter's create call under the configured timeout. Every
/// returned package must carry its package id; a missing id is an
/// adapter bug and fails the step loudly rather than being papered
/// over with a fallback.
pub struct AdapterCreateTask {
    timeout: Duration,
}

impl AdapterCreateTask {
    pub fn new(timeout: Duration) -> Self {
        AdapterCreateTask { timeout }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for AdapterCreateTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let adapter = context.adapter.get().expect("adapter built before create");
        let media_buy_id = context
            .media_buy_id
            .get()
            .expect("permanent ids issued before create")
            .clone();

        let request = {
            let req = context.req.read();
            AdapterBuyRequest {
                media_buy_id: media_buy_id.clone(),
                buyer_ref: req.buyer_ref.clone(),
                po_number: req.po_number.clone(),
                order_name: req
                    .po_number
                    .clone()
                    .unwrap_or_else(|| format!("Order-{}", media_buy_id)),
                total_budget: *context.total_budget.get().expect("budget validated"),
                currency: context.currency.get().expect("currency resolved").clone(),
                targeting_overlay: req.targeting_overlay.clone(),
                already_approved: req.already_approved,
            }
        };

        let specs = context.package_specs.lock().clone();
        let pricing = context.pricing_by_package.lock().clone();
        let start = *context.start_time.get().expect("start resolved");
        let end = *context.end_time.get().expect("end resolved");

        let result = call_with_timeout(
            self.timeout,
            "create_media_buy",
            adapter.create_media_buy(&request, &specs, start, end, &pricing),
        )
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!("Adapter create_media_buy failed: {}", e);
                let error = e.downcast::<AdcpError>().unwrap_or_else(|other| {
                    AdcpError::new(
                        ErrorCode::MediaBuyCreationError,
                        format!("Failed to create media buy: {}", other),
                    )
                });
                return Err(context.fail(error));
            }
        };

        if let Some(first_error) = result.errors.first() {
            return Err(context.fail(AdcpError::new(
                ErrorCode::MediaBuyCreationError,
                format!("Adapter rejected the media buy: {}", first_error.message),
            )));
        }

        for (i, package) in result.packages.iter().enumerate() {
            if package.package_id.as_deref().map(str::is_empty).unwrap_or(true) {
                return Err(context.fail(AdcpError::new(
                    ErrorCode::MediaBuyCreationError,
                    format!(
                        "Adapter did not return package_id for package {}. This is a critical \
                         bug in the adapter.",
                        i
                    ),
                )));
            }
        }

        info!(
            "Adapter created {} with {} packages",
            result.media_buy_id,
            result.packages.len()
        );
        let _ = context.adapter_result.set(result);

        Ok(())
    }
}
