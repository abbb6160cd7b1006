use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::core::models::creative::CreativeAssignment;
use crate::core::models::media_buy::new_assignment_id;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::AdcpError;
use crate::core::spec::requests::ValidationMode;
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Applies the `{creative_id: [package_id]}` assignment map. Each
/// package is resolved to its owning media buy, which must belong to
/// the calling principal. Unknown or foreign packages fail the call in
/// strict mode and are skipped in lenient mode.
pub struct AssignCreativesTask {
    store: Arc<dyn Store>,
}

impl AssignCreativesTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AssignCreativesTask { store }
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for AssignCreativesTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let Some(assignments) = context.req.assignments.clone() else {
            return Ok(());
        };

        let strict = context.req.validation_mode == ValidationMode::Strict;

        for (creative_id, package_ids) in assignments {
            for package_id in package_ids {
                let media_buy = self
                    .store
                    .find_media_buy_for_package(&context.tenant.tenant_id, &package_id)
                    .await?;

                let media_buy = match media_buy {
                    Some(buy) if buy.principal_id == context.principal_id => buy,
                    Some(_) | None => {
                        if strict {
                            return Err(context
                                .fail(AdcpError::validation(format!("Package not found: {}", package_id))));
                        }
                        warn!("Package not found during assignment: {}, skipping", package_id);
                        continue;
                    }
                };

                if context.req.dry_run {
                    *context.assignments_created.lock() += 1;
                    continue;
                }

                self.store
                    .insert_assignment(CreativeAssignment {
                        assignment_id: new_assignment_id(),
                        tenant_id: context.tenant.tenant_id.clone(),
                        media_buy_id: media_buy.media_buy_id.clone(),
                        package_id,
                        creative_id: creative_id.clone(),
                        weight: 100,
                        created_at: context.now,
                    })
                    .await?;

                *context.assignments_created.lock() += 1;
            }
        }

        Ok(())
    }
}
