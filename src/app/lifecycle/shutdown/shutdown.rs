use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::shutdown::tasks::observability::ShutdownObservabilityTask;
use crate::app::lifecycle::shutdown::tasks::review_pool::StopReviewPoolTask;
use crate::app::lifecycle::shutdown::tasks::stop_server::StopServerTask;
use crate::core::pipeline::{Pipeline, PipelineBuilder};

/// Tear-down ordering: stop accepting requests, stop the background
/// workers, flush telemetry.
pub fn build_shutdown_pipeline() -> Pipeline<StartupContext, anyhow::Error> {
    PipelineBuilder::new()
        .with_async(Box::new(StopServerTask))
        .with_blocking(Box::new(StopReviewPoolTask))
        .with_blocking(Box::new(ShutdownObservabilityTask))
        .build()
        .expect("Shutdown pipeline should have tasks!")
}
