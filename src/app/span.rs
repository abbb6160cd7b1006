use crate::core::pipeline::{AsyncTask, Pipeline};
use anyhow::Error;
use async_trait::async_trait;
use tracing::{Instrument, Span};

/// Wraps a pipeline as a single task executing under a span from the
/// provider, which may be a plain span or the output of
/// [`sample_or_attach_root_span!`](crate::sample_or_attach_root_span)
/// for pre-filtered sampling.
pub struct WrappedPipelineTask<T: Send + Sync> {
    pipeline: Pipeline<T, Error>,
    span_provider: Box<dyn Fn() -> Span + Send + Sync>,
}

impl<T: Send + Sync> WrappedPipelineTask<T> {
    pub fn new<F>(pipeline: Pipeline<T, Error>, span_provider: F) -> Self
    where
        F: Fn() -> Span + Sync + Send + 'static,
    {
        WrappedPipelineTask {
            pipeline,
            span_provider: Box::new(span_provider),
        }
    }
}

#[async_trait]
impl<T: Send + Sync> AsyncTask<T, Error> for WrappedPipelineTask<T> {
    async fn run(&self, context: &T) -> Result<(), Error> {
        let span = (self.span_provider)();

        self.pipeline.run(context).instrument(span).await
    }
}
