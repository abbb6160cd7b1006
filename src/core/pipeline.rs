use async_trait::async_trait;

/// A synchronous task within a pipeline. Intended for quick,
/// non-blocking work such as validation or context mutation.
pub trait BlockingTask<C, E>: Send + Sync {
    fn run(&self, context: &C) -> Result<(), E>;
}

/// An asynchronous task within a pipeline, e.g. anything which
/// touches the store, an adapter, or an outbound socket.
#[async_trait]
pub trait AsyncTask<C, E>: Send + Sync {
    async fn run(&self, context: &C) -> Result<(), E>;
}

enum Stage<C, E> {
    Blocking(Box<dyn BlockingTask<C, E>>),
    Async(Box<dyn AsyncTask<C, E>>),
}

/// An ordered sequence of tasks sharing a single context value.
///
/// # Behavior
/// Tasks run strictly in registration order. The first task to return
/// an error aborts the remainder of the pipeline and the error is
/// returned to the caller. Tasks communicate exclusively through the
/// shared context, which is expected to use interior mutability.
pub struct Pipeline<C, E> {
    stages: Vec<Stage<C, E>>,
}

impl<C: Send + Sync, E: Send> Pipeline<C, E> {
    pub async fn run(&self, context: &C) -> Result<(), E> {
        for stage in &self.stages {
            match stage {
                Stage::Blocking(task) => task.run(context)?,
                Stage::Async(task) => task.run(context).await?,
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builder for a [`Pipeline`]. Returns `None` from [`build`](Self::build)
/// when no tasks were registered, so optional pipelines can be skipped
/// entirely by their owners.
pub struct PipelineBuilder<C, E> {
    stages: Vec<Stage<C, E>>,
}

impl<C: Send + Sync, E: Send> PipelineBuilder<C, E> {
    pub fn new() -> Self {
        PipelineBuilder { stages: Vec::new() }
    }

    pub fn with_blocking(mut self, task: Box<dyn BlockingTask<C, E>>) -> Self {
        self.stages.push(Stage::Blocking(task));
        self
    }

    pub fn with_async(mut self, task: Box<dyn AsyncTask<C, E>>) -> Self {
        self.stages.push(Stage::Async(task));
        self
    }

    pub fn add_blocking(&mut self, task: Box<dyn BlockingTask<C, E>>) {
        self.stages.push(Stage::Blocking(task));
    }

    pub fn add_async(&mut self, task: Box<dyn AsyncTask<C, E>>) {
        self.stages.push(Stage::Async(task));
    }

    pub fn build(self) -> Option<Pipeline<C, E>> {
        if self.stages.is_empty() {
            return None;
        }

        Some(Pipeline { stages: self.stages })
    }
}

impl<C: Send + Sync, E: Send> Default for PipelineBuilder<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Error, anyhow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    struct IncrementTask;

    impl BlockingTask<Counter, Error> for IncrementTask {
        fn run(&self, context: &Counter) -> Result<(), Error> {
            context.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailTask;

    impl BlockingTask<Counter, Error> for FailTask {
        fn run(&self, _context: &Counter) -> Result<(), Error> {
            Err(anyhow!("boom"))
        }
    }

    struct AsyncIncrementTask;

    #[async_trait]
    impl AsyncTask<Counter, Error> for AsyncIncrementTask {
        async fn run(&self, context: &Counter) -> Result<(), Error> {
            context.0.fetch_add(10, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(IncrementTask))
            .with_async(Box::new(AsyncIncrementTask))
            .with_blocking(Box::new(IncrementTask))
            .build()
            .unwrap();

        let ctx = Counter(AtomicUsize::new(0));
        pipeline.run(&ctx).await.unwrap();

        assert_eq!(ctx.0.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_error_aborts_remaining_tasks() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(IncrementTask))
            .with_blocking(Box::new(FailTask))
            .with_blocking(Box::new(IncrementTask))
            .build()
            .unwrap();

        let ctx = Counter(AtomicUsize::new(0));
        let result = pipeline.run(&ctx).await;

        assert!(result.is_err());
        assert_eq!(ctx.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_builder_yields_none() {
        let builder: PipelineBuilder<Counter, Error> = PipelineBuilder::new();
        assert!(builder.build().is_none());
    }
}
