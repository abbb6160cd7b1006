use crate::app::lifecycle::context::StartupContext;
use crate::app::state::AppState;
use crate::core::pipeline::BlockingTask;
use anyhow::{Error, anyhow};
use tracing::info;

/// Assembles the shared application state and the tool pipelines.
pub struct BuildAppTask;

impl BlockingTask<StartupContext, Error> for BuildAppTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config.get().ok_or(anyhow!("Config missing while building app state"))?;
        let store = context.store.get().ok_or(anyhow!("Store missing while building app state"))?;

        let app = AppState::build(config, store.clone())?;

        context
            .app
            .set(app)
            .map_err(|_| anyhow!("App state already set on startup context"))?;

        info!("Application state and tool pipelines built");

        Ok(())
    }
}
