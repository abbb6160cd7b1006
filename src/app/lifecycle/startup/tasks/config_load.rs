use crate::app::lifecycle::context::StartupContext;
use crate::core::config_manager::ConfigManager;
use crate::core::pipeline::BlockingTask;
use anyhow::{Error, anyhow};
use std::sync::Arc;

/// Loads the config file and snapshots it onto the startup context.
/// Runs in the bootloader, before logging exists.
pub struct ConfigLoadTask {
    config_manager: Arc<ConfigManager>,
}

impl ConfigLoadTask {
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        ConfigLoadTask { config_manager }
    }
}

impl BlockingTask<StartupContext, Error> for ConfigLoadTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        self.config_manager.start()?;

        context
            .config
            .set(self.config_manager.get().clone())
            .map_err(|_| anyhow!("Config already set on startup context"))?;

        Ok(())
    }
}
