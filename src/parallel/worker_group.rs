use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::pool::{Pool, PoolCounters, Worker};
use crate::channel::{DEFAULT_CAPACITY, SendError, Source, channel};
use crate::pipeline::{BoxError, GroupOptions, Pipeline, PipelineError};

const STAGE: &str = "worker_group";

/// Per-item work run by a worker group
///
/// Implemented for any `Fn(T) -> impl Future<Output = Result<(), E>>`.
#[async_trait]
pub trait Processor<T: Send + 'static>: Send + Sync + 'static {
    async fn process(&self, item: T) -> Result<(), BoxError>;
}

#[async_trait]
impl<T, F, Fut, E> Processor<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    async fn process(&self, item: T) -> Result<(), BoxError> {
        (self)(item).await.map_err(Into::into)
    }
}

/// An item a worker finished processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress<T> {
    pub group_id: u64,
    pub worker_id: u64,
    pub item: T,
}

/// Totals reported when a worker group finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    pub group_id: u64,
    pub workers_spawned: u64,
    pub items_dispatched: u64,
}

/// Elastic group of workers processing one input
///
/// Workers are spawned on demand up to `max_workers` and retire after
/// `idle_duration` without work. Started through
/// [`WorkerGroup::run_with_progress`], every processed
/// item is passed through on the progress source, which the caller must
/// drain; otherwise the workers block and the group stalls. Dropping the
/// progress side (for example through [`WorkerGroup::join`]) makes workers
/// skip progress instead.
///
/// # Example
/// ```rust,ignore
/// let group = WorkerGroup::run(&pipeline, input, |n: u32| async move {
///     store(n).await
/// }, GroupOptions::default().parallel());
///
/// let stats = group.join().await?;
/// ```
pub struct WorkerGroup<T> {
    id: u64,
    pipeline: Pipeline,
    progress: Source<Progress<T>>,
    counters: Arc<PoolCounters>,
    handle: JoinHandle<GroupStats>,
}

impl<T: Send + 'static> WorkerGroup<T> {
    /// Start dispatching `input` to workers running `processor`
    ///
    /// Emits no progress; `emit_progress` needs [`WorkerGroup::run_with_progress`].
    pub fn run<P>(pipeline: &Pipeline, input: Source<T>, processor: P, options: GroupOptions) -> Self
    where
        P: Processor<T>,
    {
        if options.emit_progress {
            tracing::warn!("Progress requested without run_with_progress; ignored");
        }
        Self::start(pipeline, input, processor, options, None, CancellationToken::new())
    }

    /// Start a group; `observe` copies an item for the progress channel
    ///
    /// Cancelling `stop` ends dispatch without cancelling the pipeline.
    pub(crate) fn start<P>(
        pipeline: &Pipeline,
        input: Source<T>,
        processor: P,
        options: GroupOptions,
        observe: Option<fn(&T) -> T>,
        stop: CancellationToken,
    ) -> Self
    where
        P: Processor<T>,
    {
        let options = options.sanitise();
        let id = pipeline.next_id();
        let (progress_tx, progress) = channel(pipeline, DEFAULT_CAPACITY);
        let mut pool = Pool::new(pipeline, STAGE, &options);
        let counters = pool.counters();
        let processor = Arc::new(processor);
        let group_pipeline = pipeline.clone();

        let dispatcher = async move {
            tracing::debug!(?options, "Start");

            let spawn = |mut worker: Worker<T>| {
                let processor = Arc::clone(&processor);
                let progress_tx = observe.map(|copy| (copy, progress_tx.clone()));

                async move {
                    let mut handled = 0u64;
                    while let Some(item) = worker.next().await {
                        handled += 1;
                        let observed = progress_tx.as_ref().map(|(copy, _)| copy(&item));

                        if let Err(e) = processor.process(item).await {
                            tracing::debug!(worker_id = worker.id(), error = %e, "Process failed");
                            worker
                                .pipeline()
                                .cancel_with_error(PipelineError::stage(STAGE, e));
                            break;
                        }

                        if let (Some((_, tx)), Some(item)) = (&progress_tx, observed) {
                            let progress = Progress {
                                group_id: id,
                                worker_id: worker.id(),
                                item,
                            };
                            match tx.send(progress).await {
                                Ok(()) | Err(SendError::Closed(_)) => {}
                                Err(SendError::Cancelled(_)) => break,
                            }
                        }
                    }
                    tracing::debug!(worker_id = worker.id(), handled, "Worker done");
                }
            };

            let mut input = input;
            loop {
                let item = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    item = input.recv() => item,
                };
                let Some(item) = item else { break };
                if pool.dispatch(item, &spawn).await.is_err() {
                    break;
                }
            }
            // Upstream stops as soon as nothing reads it
            drop(input);

            if group_pipeline.is_done() {
                tracing::debug!("Pipeline done");
            } else if stop.is_cancelled() {
                tracing::debug!("Stopped");
            } else {
                tracing::debug!("Input closed");
            }

            let items_dispatched = pool.counters().dispatched();
            let workers_spawned = pool.shutdown().await;
            drop(progress_tx);

            tracing::debug!(workers_spawned, items_dispatched, "Metrics");
            GroupStats {
                group_id: id,
                workers_spawned,
                items_dispatched,
            }
        };

        let handle = tokio::spawn(dispatcher.instrument(pipeline.stage_span(STAGE, id)));

        Self {
            id,
            pipeline: pipeline.clone(),
            progress,
            counters,
            handle,
        }
    }
}

impl<T: Clone + Send + 'static> WorkerGroup<T> {
    /// Like [`WorkerGroup::run`], also passing every processed item through
    /// the progress source
    pub fn run_with_progress<P>(
        pipeline: &Pipeline,
        input: Source<T>,
        processor: P,
        options: GroupOptions,
    ) -> Self
    where
        P: Processor<T>,
    {
        let options = options.with_progress();
        Self::start(
            pipeline,
            input,
            processor,
            options,
            Some(T::clone as fn(&T) -> T),
            CancellationToken::new(),
        )
    }
}

impl<T> WorkerGroup<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Workers currently alive
    pub fn active_workers(&self) -> usize {
        self.counters.active()
    }

    /// Workers spawned so far
    pub fn spawned_workers(&self) -> u64 {
        self.counters.spawned()
    }

    /// Progress side channel; empty unless progress is enabled
    pub fn progress(&mut self) -> &mut Source<Progress<T>> {
        &mut self.progress
    }

    /// Wait for the group to finish
    ///
    /// Drops the progress side first so undrained progress cannot stall the
    /// group. Returns the pipeline's first error if one was recorded.
    pub async fn join(self) -> Result<GroupStats, PipelineError> {
        let WorkerGroup {
            pipeline,
            progress,
            handle,
            ..
        } = self;
        drop(progress);

        let stats = handle
            .await
            .map_err(|_| pipeline.cancel_with_error(PipelineError::Panicked { stage: STAGE }))?;

        match pipeline.error() {
            Some(error) => Err(error),
            None => Ok(stats),
        }
    }
}

impl<T> Stream for WorkerGroup<T> {
    type Item = Progress<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.progress).poll_next(cx)
    }
}
