use crate::app::pipeline::media_buy::update::context::UpdateMediaBuyContext;
use crate::core::observability::AuditLogger;
use crate::core::pipeline::AsyncTask;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use crate::core::store::Store;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Loads the media buy and enforces principal ownership. A write
/// attempt against another principal's buy is a security event: it is
/// audited as such and fails without touching any state.
pub struct VerifyOwnershipTask {
    store: Arc<dyn Store>,
}

impl VerifyOwnershipTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        VerifyOwnershipTask { store }
    }
}

#[async_trait]
impl AsyncTask<UpdateMediaBuyContext, Error> for VerifyOwnershipTask {
    async fn run(&self, context: &UpdateMediaBuyContext) -> Result<(), Error> {
        let buy = self
            .store
            .get_media_buy(&context.tenant.tenant_id, &context.req.media_buy_id)
            .await?;

        let Some(buy) = buy else {
            return Err(context.fail(AdcpError::validation(format!(
                "Media buy {} not found",
                context.req.media_buy_id
            ))));
        };

        if buy.principal_id != context.principal_id {
            AuditLogger::new(&context.tenant.tenant_id).log_security_violation(
                "update_media_buy",
                Some(&context.principal_id),
                &format!(
                    "Principal attempted to modify media buy {} owned by {}",
                    buy.media_buy_id, buy.principal_id
                ),
            );

            return Err(context.fail(AdcpError::new(
                ErrorCode::AuthenticationError,
                format!(
                    "Principal {} does not own media buy {}",
                    context.principal_id, context.req.media_buy_id
                ),
            )));
        }

        let principal = self
            .store
            .get_principal(&context.tenant.tenant_id, &context.principal_id)
            .await?;
        let Some(principal) = principal else {
            return Err(context.fail(AdcpError::new(
                ErrorCode::AuthenticationError,
                format!("Principal {} not found", context.principal_id),
            )));
        };

        let _ = context.media_buy.set(buy);
        let _ = context.principal.set(principal);

        Ok(())
    }
}
