use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::AsyncTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::info;

/// Gracefully stops the http listener so in-flight requests drain.
pub struct StopServerTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for StopServerTask {
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        if let Some(handle) = context.server.get() {
            handle.stop(true).await;
            info!("Http server stopped");
        }

        Ok(())
    }
}
