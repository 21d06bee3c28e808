use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::worker_group::WorkerGroup;
use crate::channel::{DEFAULT_CAPACITY, SendError, Source, channel};
use crate::ordering::{Tagged, reassemble, sequence};
use crate::pipeline::{BoxError, GroupOptions, Pipeline};

/// Apply `f` to every item on a worker group, emitting results as they finish
///
/// Output order follows completion order. An error from `f` cancels the
/// pipeline and the output closes early. Dropping the output stops the group
/// and its input without cancelling the pipeline.
pub fn map_unordered<T, R, F, Fut, E>(
    pipeline: &Pipeline,
    input: Source<T>,
    f: F,
    options: GroupOptions,
) -> Source<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);
    let f = Arc::new(f);
    let stop = CancellationToken::new();

    let processor = {
        let stop = stop.clone();
        move |item: T| {
            let f = Arc::clone(&f);
            let output = output.clone();
            let stop = stop.clone();
            async move {
                let mapped = f(item).await.map_err(Into::into)?;
                if let Err(SendError::Closed(_)) = output.send(mapped).await {
                    // Nobody reads the output any more; stop pulling input
                    stop.cancel();
                }
                Ok::<_, BoxError>(())
            }
        }
    };

    // Output closes when the group drops the processor on shutdown
    let group = WorkerGroup::start(pipeline, input, processor, options, None, stop);
    tokio::spawn(async move {
        let group_id = group.id();
        if let Err(e) = group.join().await {
            tracing::debug!(group_id, error = %e, "Map ended early");
        }
    });

    source
}

/// Apply `f` to every item on a worker group, emitting results in input order
///
/// Items are sequenced before dispatch and reassembled afterwards, so a
/// slow item holds back every result behind it.
///
/// # Example
/// ```rust,ignore
/// let doubled = map_ordered(&pipeline, input, |n: u64| async move {
///     Ok::<_, BoxError>(n * 2)
/// }, GroupOptions::default().with_max_workers(4));
/// ```
pub fn map_ordered<T, R, F, Fut, E>(
    pipeline: &Pipeline,
    input: Source<T>,
    f: F,
    options: GroupOptions,
) -> Source<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<BoxError>,
{
    let f = Arc::new(f);
    let tagged = sequence(pipeline, input);

    let mapped = map_unordered(
        pipeline,
        tagged,
        move |item: Tagged<T>| {
            let f = Arc::clone(&f);
            async move {
                let Tagged { sequence, value } = item;
                let mapped = f(value).await.map_err(Into::into)?;
                Ok::<_, BoxError>(Tagged::new(sequence, mapped))
            }
        },
        options,
    );

    reassemble(pipeline, mapped)
}
