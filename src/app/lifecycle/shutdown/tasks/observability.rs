use crate::app::lifecycle::context::StartupContext;
use crate::core::observability;
use crate::core::pipeline::BlockingTask;
use anyhow::Error;

/// Flushes and shuts down the OTLP exporter, if one was configured.
/// Runs last so the rest of shutdown is still traced.
pub struct ShutdownObservabilityTask;

impl BlockingTask<StartupContext, Error> for ShutdownObservabilityTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        if let Some(provider) = context.otel_provider.lock().take() {
            observability::shutdown(&provider)?;
        }

        Ok(())
    }
}
