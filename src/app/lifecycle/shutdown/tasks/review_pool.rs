use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::BlockingTask;
use anyhow::Error;
use tracing::info;

/// Signals the creative review workers to stop after their current
/// job. Pending reviews stay pending and surface again as unresolved
/// workflow steps.
pub struct StopReviewPoolTask;

impl BlockingTask<StartupContext, Error> for StopReviewPoolTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        if let Some(app) = context.app.get() {
            app.review.shutdown();
            info!("Review pool stopped");
        }

        Ok(())
    }
}
