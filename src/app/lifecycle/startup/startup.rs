use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::startup::tasks::build_app::BuildAppTask;
use crate::app::lifecycle::startup::tasks::config_load::ConfigLoadTask;
use crate::app::lifecycle::startup::tasks::observability::ConfigureObservabilityTask;
use crate::app::lifecycle::startup::tasks::seed_load::SeedLoadTask;
use crate::app::lifecycle::startup::tasks::start_server::StartServerTask;
use crate::app::span::WrappedPipelineTask;
use crate::core::config_manager::ConfigManager;
use crate::core::pipeline::{Pipeline, PipelineBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Span, info_span};

/// Builds the graceful ordering of startup tasks: config and logging
/// first (the bootloader, unobserved), then storage, seed data, the
/// application state, and finally the http server.
pub fn build_start_pipeline(cfg_path: PathBuf) -> Pipeline<StartupContext, anyhow::Error> {
    let cfg_manager = Arc::new(ConfigManager::new(cfg_path));

    // Config and observability come up before anything can log.
    let boot_loader = PipelineBuilder::new()
        .with_blocking(Box::new(ConfigLoadTask::new(cfg_manager.clone())))
        .with_blocking(Box::new(ConfigureObservabilityTask))
        .build()
        .expect("Bootloader should have tasks!");

    let start_pipeline = PipelineBuilder::new()
        .with_async(Box::new(crate::app::lifecycle::startup::tasks::store_init::StoreInitTask))
        .with_async(Box::new(SeedLoadTask))
        .with_blocking(Box::new(BuildAppTask))
        .with_async(Box::new(StartServerTask))
        .build()
        .expect("Startup pipeline should have tasks!");

    let nop_bootloader_pipeline = WrappedPipelineTask::new(boot_loader, || Span::none());

    let observed_startup_pipeline =
        WrappedPipelineTask::new(start_pipeline, || info_span!("start_pipeline"));

    PipelineBuilder::new()
        .with_async(Box::new(nop_bootloader_pipeline))
        .with_async(Box::new(observed_startup_pipeline))
        .build()
        .expect("Pipeline should have tasks!")
}
