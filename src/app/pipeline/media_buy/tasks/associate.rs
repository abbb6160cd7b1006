use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::pipeline::AsyncTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::{info, warn};

/// Associates uploaded creatives with the adapter's line items. Runs
/// only for pairs where both ids are known; failures are logged, the
/// buy itself already exists.
pub struct AssociateCreativesTask;

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for AssociateCreativesTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        let queued = std::mem::take(&mut *context.associations.lock());
        if queued.is_empty() {
            return Ok(());
        }

        let adapter = context.adapter.get().expect("adapter built before association");

        for (line_item_id, platform_creative_ids) in queued {
            match adapter
                .associate_creatives(std::slice::from_ref(&line_item_id), &platform_creative_ids)
                .await
            {
                Ok(results) => {
                    for result in results {
                        if result.success {
                            info!(
                                "Associated creative {} with line item {}",
                                result.creative_id, result.line_item_id
                            );
                        } else {
                            warn!(
                                "Failed to associate creative {} with line item {}: {}",
                                result.creative_id,
                                result.line_item_id,
                                result.error.as_deref().unwrap_or("unknown error")
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!("Creative association with line item {} failed: {}", line_item_id, e);
                }
            }
        }

        Ok(())
    }
}
