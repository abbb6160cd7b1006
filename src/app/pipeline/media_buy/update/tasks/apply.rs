use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::adapters::{UpdateAction, call_with_timeout};
use crate::core::delivery::DeliveryCache;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Forwards each requested change to the adapter as a discrete
/// action; the first failure aborts the remainder. Budget changes
/// write through to the persisted buy.
pub struct ApplyUpdatesTask {
    store: Arc<dyn Store>,
    cache: Arc<DeliveryCache>,
    timeout: Duration,
}

impl ApplyUpdatesTask {
    pub fn new(store: Arc<dyn Store>, cache: Arc<DeliveryCache>, timeout: Duration) -> Self {
        ApplyUpdatesTask {
            store,
            cache,
            timeout,
        }
    }

    async fn adapter_action(
        &self,
        context: &UpdateMediaBuyContext,
        action: UpdateAction,
        package_id: Option<&str>,
        budget: Option<f64>,
    ) -> Result<(), Error> {
        let adapter = context.adapter.get().expect("adapter built before applying updates");

        let outcome = call_with_timeout(
            self.timeout,
            "update_media_buy",
            adapter.update_media_buy(&context.req.media_buy_id, action, package_id, budget, context.now),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = e.downcast::<AdcpError>().unwrap_or_else(|other| {
                    AdcpError::new(ErrorCode::ToolError, format!("Adapter update failed: {}", other))
                });
                return Err(context.fail(error));
            }
        };

        if !outcome.success {
            return Err(context.fail(AdcpError::new(
                ErrorCode::ToolError,
                outcome
                    .detail
                    .unwrap_or_else(|| format!("Adapter rejected {}", action)),
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for ApplyUpdatesTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let req = &context.req;

        if let Some(active) = req.active {
            let action = if active {
                UpdateAction::ResumeMediaBuy
            } else {
                UpdateAction::PauseMediaBuy
            };
            self.adapter_action(context, action, None, None).await?;
        }

        if let Some(updates) = &req.packages {
            for update in updates {
                if let Some(active) = update.active {
                    let action = if active {
                        UpdateAction::ResumePackage
                    } else {
                        UpdateAction::PausePackage
                    };
                    self.adapter_action(context, action, Some(&update.package_id), None)
                        .await?;
                }

                if let Some(impressions) = update.impressions {
                    self.adapter_action(
                        context,
                        UpdateAction::UpdatePackageImpressions,
                        Some(&update.package_id),
                        Some(impressions as f64),
                    )
                    .await?;
                } else if let Some(budget) = update.budget {
                    self.adapter_action(
                        context,
                        UpdateAction::UpdatePackageBudget,
                        Some(&update.package_id),
                        Some(budget),
                    )
                    .await?;
                }
            }
        }

        if req.start_time.is_some() || req.end_time.is_some() {
            self.adapter_action(context, UpdateAction::UpdateFlightDates, None, None)
                .await?;
        }

        // Write-through of the accepted changes.
        let needs_write = req.budget.is_some()
            || req.buyer_ref.is_some()
            || req.start_time.is_some()
            || req.end_time.is_some();
        if needs_write {
            let mut buy = context.media_buy.get().expect("buy loaded").clone();

            if let Some(budget) = req.budget {
                buy.budget = budget;
            }
            if let Some(buyer_ref) = &req.buyer_ref {
                buy.buyer_ref = buyer_ref.clone();
            }
            if let Some(start) = &req.start_time {
                buy.start_time = start.resolve(context.now);
            }
            if let Some(end) = req.end_time {
                buy.end_time = end;
            }
            buy.updated_at = context.now;

            self.store.update_media_buy(buy.clone()).await?;
            self.cache.insert(buy);

            info!("Media buy {} updated", req.media_buy_id);
        }

        Ok(())
    }
}
