use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::channel::Source;
use crate::parallel::pool::{Pool, Worker};
use crate::pipeline::{BoxError, GroupOptions, Pipeline, PipelineError};

const STAGE: &str = "collector";

type Supplier<A> = Arc<dyn Fn() -> Result<A, BoxError> + Send + Sync>;
type Accumulator<A, T> = Arc<dyn Fn(&mut A, T) -> Result<(), BoxError> + Send + Sync>;
type Combiner<A> = Box<dyn Fn(A, A) -> Result<A, BoxError> + Send + Sync>;
type Finisher<A, R> = Box<dyn FnOnce(A) -> Result<R, BoxError> + Send>;

/// Fork-join reduction of a source on an elastic worker pool
///
/// Every worker folds the items it receives into its own container, created
/// by the supplier on its first item. Containers are merged by the combiner
/// as workers retire, starting from a seed container, and the finisher turns
/// the merged container into the result.
///
/// The combiner must be associative. Workers receive items in no particular
/// order, so a combiner that is not also commutative gives results that
/// depend on scheduling.
///
/// # Example
/// ```rust,ignore
/// let total = Collector::new(
///     || Ok::<_, BoxError>(0u64),
///     |sum: &mut u64, n: u64| { *sum += n; Ok(()) },
///     |a, b| Ok(a + b),
///     Ok,
/// )
/// .with_max_workers(4)
/// .collect(&pipeline, input)
/// .await?;
/// ```
pub struct Collector<T, A, R> {
    supplier: Supplier<A>,
    accumulator: Accumulator<A, T>,
    combiner: Combiner<A>,
    finisher: Finisher<A, R>,
    options: GroupOptions,
}

impl<T, A, R> Collector<T, A, R>
where
    T: Send + 'static,
    A: Send + 'static,
{
    pub fn new<S, Acc, C, F, E>(supplier: S, accumulator: Acc, combiner: C, finisher: F) -> Self
    where
        S: Fn() -> Result<A, E> + Send + Sync + 'static,
        Acc: Fn(&mut A, T) -> Result<(), E> + Send + Sync + 'static,
        C: Fn(A, A) -> Result<A, E> + Send + Sync + 'static,
        F: FnOnce(A) -> Result<R, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            supplier: Arc::new(move || supplier().map_err(Into::into)),
            accumulator: Arc::new(move |acc, item| accumulator(acc, item).map_err(Into::into)),
            combiner: Box::new(move |a, b| combiner(a, b).map_err(Into::into)),
            finisher: Box::new(move |acc| finisher(acc).map_err(Into::into)),
            options: GroupOptions::default().parallel(),
        }
    }

    pub fn with_options(mut self, options: GroupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.options.max_workers = max_workers;
        self
    }

    /// Consume `input` and reduce it
    ///
    /// Returns `None` when nothing was accumulated. The finisher still runs on
    /// the seed in that case so its errors surface. Any callback error cancels
    /// the pipeline and is returned; partial containers are discarded. If the
    /// pipeline is cancelled from outside, its error (or `Cancelled`) is
    /// returned instead of a partial result.
    pub async fn collect(self, pipeline: &Pipeline, input: Source<T>) -> Result<Option<R>, PipelineError> {
        let Collector {
            supplier,
            accumulator,
            combiner,
            finisher,
            options,
        } = self;
        let options = options.sanitise();
        let id = pipeline.next_id();
        let span = pipeline.stage_span(STAGE, id);

        let seed = (*supplier)().map_err(|e| pipeline.cancel_with_error(PipelineError::stage(STAGE, e)))?;
        let (partial_tx, partials) = mpsc::unbounded_channel();

        let combine = tokio::spawn(combine_partials(pipeline.clone(), seed, partials, combiner).instrument(span.clone()));
        let spawned = dispatch(pipeline, input, &options, supplier, accumulator, partial_tx)
            .instrument(span.clone())
            .await;

        let combined = combine
            .await
            .map_err(|_| pipeline.cancel_with_error(PipelineError::Panicked { stage: STAGE }))?;

        let (merged, partials) = match combined {
            Some(combined) if !pipeline.is_done() => combined,
            _ => return Err(pipeline.error_or_cancelled()),
        };

        let result = finisher(merged).map_err(|e| pipeline.cancel_with_error(PipelineError::stage(STAGE, e)))?;
        span.in_scope(|| tracing::debug!(workers_spawned = spawned, partials, "Collected"));

        Ok((partials > 0).then_some(result))
    }
}

/// Feed `input` to workers; returns once every worker has handed over its container
async fn dispatch<T, A>(
    pipeline: &Pipeline,
    mut input: Source<T>,
    options: &GroupOptions,
    supplier: Supplier<A>,
    accumulator: Accumulator<A, T>,
    partial_tx: mpsc::UnboundedSender<A>,
) -> u64
where
    T: Send + 'static,
    A: Send + 'static,
{
    let mut pool = Pool::new(pipeline, STAGE, options);

    let spawn = move |mut worker: Worker<T>| {
        let supplier = Arc::clone(&supplier);
        let accumulator = Arc::clone(&accumulator);
        let partial_tx = partial_tx.clone();

        async move {
            let mut container = None;
            let mut handled = 0u64;

            while let Some(item) = worker.next().await {
                let mut current = match container.take() {
                    Some(current) => current,
                    None => match (*supplier)() {
                        Ok(current) => current,
                        Err(e) => {
                            worker.pipeline().cancel_with_error(PipelineError::stage(STAGE, e));
                            return;
                        }
                    },
                };

                if let Err(e) = (*accumulator)(&mut current, item) {
                    tracing::debug!(worker_id = worker.id(), error = %e, "Accumulate failed");
                    worker.pipeline().cancel_with_error(PipelineError::stage(STAGE, e));
                    return;
                }
                container = Some(current);
                handled += 1;
            }

            let worker_id = worker.id();
            // Free the pool slot before handing the container over
            drop(worker);

            if let Some(container) = container {
                tracing::debug!(worker_id, handled, "Handing over partial result");
                // Fails only after the combiner gave up on a failed or cancelled pipeline
                let _ = partial_tx.send(container);
            }
        }
    };

    while let Some(item) = input.recv().await {
        if pool.dispatch(item, &spawn).await.is_err() {
            break;
        }
    }

    let spawned = pool.shutdown().await;
    // Last sender goes with the closure, ending the combiner's input
    drop(spawn);
    spawned
}

/// Merge partial containers into the seed; `None` if the pipeline failed
async fn combine_partials<A>(
    pipeline: Pipeline,
    seed: A,
    mut partials: mpsc::UnboundedReceiver<A>,
    combiner: Combiner<A>,
) -> Option<(A, u64)> {
    let mut merged = seed;
    let mut count = 0u64;

    while let Some(partial) = partials.recv().await {
        if pipeline.is_done() {
            return None;
        }
        match combiner(merged, partial) {
            Ok(next) => merged = next,
            Err(e) => {
                tracing::debug!(error = %e, "Combine failed");
                pipeline.cancel_with_error(PipelineError::stage(STAGE, e));
                return None;
            }
        }
        count += 1;
    }

    Some((merged, count))
}

/// Collect every item into a `Vec`, in no particular order
pub fn to_vec_unordered<T: Send + 'static>() -> Collector<T, Vec<T>, Vec<T>> {
    Collector::new(
        || Ok::<_, BoxError>(Vec::new()),
        |items: &mut Vec<T>, item| {
            items.push(item);
            Ok(())
        },
        |mut left, mut right| {
            left.append(&mut right);
            Ok(left)
        },
        Ok,
    )
}
