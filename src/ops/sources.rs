use futures::{Stream, StreamExt};

use super::spawn_stage;
use crate::channel::{Cancellable, DEFAULT_CAPACITY, Source, channel};
use crate::pipeline::{BoxError, Pipeline, PipelineError};

/// Emit every item of `items`, then close
pub fn from_iter<I>(pipeline: &Pipeline, items: I) -> Source<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);
    let items = items.into_iter();

    spawn_stage(pipeline, "from_iter", async move {
        let mut sent = 0u64;
        for item in items {
            if output.send(item).await.is_err() {
                break;
            }
            sent += 1;
        }
        tracing::debug!(sent, "Source done");
    });

    source
}

/// Emit every item of an async stream, then close
pub fn from_stream<S>(pipeline: &Pipeline, stream: S) -> Source<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);
    let mut stream = Box::pin(Cancellable::new(pipeline, stream));

    spawn_stage(pipeline, "from_stream", async move {
        let mut sent = 0u64;
        while let Some(item) = stream.next().await {
            if output.send(item).await.is_err() {
                break;
            }
            sent += 1;
        }
        tracing::debug!(sent, "Source done");
    });

    source
}

/// Emit items from `supplier` until it returns `Ok(None)`
///
/// An error from the supplier cancels the pipeline.
pub fn generate<T, F, E>(pipeline: &Pipeline, mut supplier: F) -> Source<T>
where
    T: Send + 'static,
    F: FnMut() -> Result<Option<T>, E> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "generate", async move {
        let mut sent = 0u64;
        loop {
            let item = match supplier() {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    output
                        .pipeline()
                        .cancel_with_error(PipelineError::stage("generate", e));
                    break;
                }
            };
            if output.send(item).await.is_err() {
                break;
            }
            sent += 1;
        }
        tracing::debug!(sent, "Source done");
    });

    source
}

/// A source that is already closed
pub fn empty<T>(pipeline: &Pipeline) -> Source<T> {
    let (_, source) = channel(pipeline, DEFAULT_CAPACITY);
    source
}
