use crate::app::lifecycle::context::StartupContext;
use crate::core::observability;
use crate::core::pipeline::BlockingTask;
use anyhow::{Error, anyhow};

/// Wires the tracing subscriber from config. Anything logged before
/// this task goes nowhere, which is why only config loading precedes
/// it.
pub struct ConfigureObservabilityTask;

impl BlockingTask<StartupContext, Error> for ConfigureObservabilityTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context
            .config
            .get()
            .ok_or(anyhow!("Config missing while configuring observability"))?;

        let provider = observability::init(&config.logging)?;
        *context.otel_provider.lock() = provider;

        Ok(())
    }
}
