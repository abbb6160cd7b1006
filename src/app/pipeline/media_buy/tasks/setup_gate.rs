use crate::app::pipeline::media_buy::context::CreateMediaBuyContext;
use crate::core::pipeline::AsyncTask;
use crate::core::policy::SetupChecklist;
use crate::core::spec::errors::{AdcpError, ErrorCode};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Refuses media buys for tenants with incomplete critical setup.
/// Dry runs and test sessions pass through so the response shape can
/// still be exercised against a half-configured tenant.
pub struct SetupGateTask {
    setup: Arc<SetupChecklist>,
}

impl SetupGateTask {
    pub fn new(setup: Arc<SetupChecklist>) -> Self {
        SetupGateTask { setup }
    }
}

#[async_trait]
impl AsyncTask<CreateMediaBuyContext, Error> for SetupGateTask {
    async fn run(&self, context: &CreateMediaBuyContext) -> Result<(), Error> {
        if context.testing.is_test_session() {
            return Ok(());
        }

        match self.setup.validate_setup_complete(&context.tenant).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let error = match e.downcast::<AdcpError>() {
                    Ok(adcp) => adcp,
                    Err(other) => AdcpError::new(ErrorCode::ToolError, other.to_string()),
                };
                Err(context.fail(error))
            }
        }
    }
}
