use crate::app::pipeline::creatives::context::{ApprovalCandidate, SyncCreativesContext};
use crate::core::creatives::{apply_creative_update, creative_from_input, validate_creative_input};
use crate::core::managers::FormatLibrary;
use crate::core::models::creative::CreativeStatus;
use crate::core::models::tenant::ApprovalMode;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::requests::CreativeInput;
use crate::core::spec::responses::{SyncAction, SyncCreativeResult};
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Upserts the batch, one creative at a time with independent
/// atomicity: structural and registry validation run before anything
/// is written, and a failing creative records a failed result without
/// touching its siblings.
pub struct UpsertCreativesTask {
    store: Arc<dyn Store>,
    formats: Arc<FormatLibrary>,
}

impl UpsertCreativesTask {
    pub fn new(store: Arc<dyn Store>, formats: Arc<FormatLibrary>) -> Self {
        UpsertCreativesTask { store, formats }
    }

    async fn sync_one(
        &self,
        context: &SyncCreativesContext,
        input: &CreativeInput,
    ) -> SyncCreativeResult {
        let creative_id = input.creative_id.clone().unwrap_or_else(|| "unknown".to_string());

        if let Err(message) = validate_creative_input(input) {
            return SyncCreativeResult {
                creative_id,
                action: SyncAction::Failed,
                status: None,
                changes: Vec::new(),
                errors: vec![message],
            };
        }

        // Registry validation happens before the write: a creative the
        // agent cannot render is rejected, not persisted.
        let format = input.format_id.as_ref().expect("format checked above");
        if let Err(e) = self.formats.validate_reference(&context.tenant, format).await {
            return SyncCreativeResult {
                creative_id,
                action: SyncAction::Failed,
                status: None,
                changes: Vec::new(),
                errors: vec![e.to_string()],
            };
        }

        let existing = match input.creative_id.as_deref() {
            Some(id) => match self
                .store
                .get_creative(&context.tenant.tenant_id, &context.principal_id, id)
                .await
            {
                Ok(existing) => existing,
                Err(e) => {
                    return SyncCreativeResult {
                        creative_id,
                        action: SyncAction::Failed,
                        status: None,
                        changes: Vec::new(),
                        errors: vec![e.to_string()],
                    };
                }
            },
            None => None,
        };

        let approval_mode = context.tenant.approval_mode;

        match existing {
            Some(mut creative) => {
                let changes = apply_creative_update(&mut creative, input, context.req.patch, context.now);

                let action = if changes.is_empty() {
                    SyncAction::Unchanged
                } else {
                    // A changed payload re-enters the approval flow.
                    creative.status = match approval_mode {
                        ApprovalMode::AutoApprove => CreativeStatus::Approved,
                        ApprovalMode::RequireHuman | ApprovalMode::AiPowered => CreativeStatus::Pending,
                    };
                    SyncAction::Updated
                };

                if action == SyncAction::Updated && !context.req.dry_run {
                    if let Err(e) = self.store.upsert_creative(creative.clone()).await {
                        return SyncCreativeResult {
                            creative_id,
                            action: SyncAction::Failed,
                            status: None,
                            changes,
                            errors: vec![e.to_string()],
                        };
                    }

                    if creative.status == CreativeStatus::Pending {
                        context.needing_approval.lock().push(ApprovalCandidate {
                            creative_id: creative.creative_id.clone(),
                            name: creative.name.clone(),
                            format_id: creative.format.as_ref().map(|f| f.id.clone()),
                        });
                    }
                }

                SyncCreativeResult {
                    creative_id: creative.creative_id,
                    action,
                    status: Some(creative.status),
                    changes,
                    errors: Vec::new(),
                }
            }
            None => {
                let mut creative = creative_from_input(
                    &context.tenant.tenant_id,
                    &context.principal_id,
                    input,
                    context.now,
                );

                creative.status = match approval_mode {
                    ApprovalMode::AutoApprove => CreativeStatus::Approved,
                    ApprovalMode::RequireHuman | ApprovalMode::AiPowered => CreativeStatus::Pending,
                };

                if !context.req.dry_run {
                    if let Err(e) = self.store.upsert_creative(creative.clone()).await {
                        return SyncCreativeResult {
                            creative_id: creative.creative_id,
                            action: SyncAction::Failed,
                            status: None,
                            changes: Vec::new(),
                            errors: vec![e.to_string()],
                        };
                    }

                    if creative.status == CreativeStatus::Pending {
                        context.needing_approval.lock().push(ApprovalCandidate {
                            creative_id: creative.creative_id.clone(),
                            name: creative.name.clone(),
                            format_id: creative.format.as_ref().map(|f| f.id.clone()),
                        });
                    }
                }

                SyncCreativeResult {
                    creative_id: creative.creative_id,
                    action: SyncAction::Created,
                    status: Some(creative.status),
                    changes: Vec::new(),
                    errors: Vec::new(),
                }
            }
        }
    }
}

#[async_trait]
impl AsyncTask<SyncCreativesContext, Error> for UpsertCreativesTask {
    async fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        let creatives = context.req.creatives.clone();

        for input in &creatives {
            let result = self.sync_one(context, input).await;
            debug!("Creative {}: {}", result.creative_id, result.action);
            context.results.lock().push(result);
        }

        Ok(())
    }
}
