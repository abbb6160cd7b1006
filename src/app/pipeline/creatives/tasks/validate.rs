use crate::app::pipeline::creatives::context::SyncCreativesContext;
use crate::core::pipeline::BlockingTask;
use crate::core::spec::errors::AdcpError;
use anyhow::Error;

/// Batch-level request validation.
pub struct ValidateBatchTask;

impl BlockingTask<SyncCreativesContext, Error> for ValidateBatchTask {
    fn run(&self, context: &SyncCreativesContext) -> Result<(), Error> {
        // Deleting creatives absent from the payload is not supported;
        // refusing it loudly beats silently ignoring the flag.
        if context.req.delete_missing {
            return Err(context.fail(AdcpError::validation(
                "delete_missing=true is not supported; creatives are never deleted through sync",
            )));
        }

        if context.req.creatives.is_empty() && context.req.assignments.is_none() {
            return Err(context.fail(AdcpError::validation(
                "sync_creatives requires creatives or assignments",
            )));
        }

        Ok(())
    }
}
