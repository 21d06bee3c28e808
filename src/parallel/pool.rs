use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::pipeline::{GroupOptions, Pipeline, PipelineError};

/// Worker counters shared between a pool and its workers
#[derive(Debug, Default)]
pub struct PoolCounters {
    active: AtomicUsize,
    spawned: AtomicU64,
    dispatched: AtomicU64,
}

impl PoolCounters {
    /// Workers currently alive (busy or waiting)
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Workers spawned over the pool's lifetime
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Acquire)
    }

    /// Items handed to a worker
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Claim a worker slot if fewer than `max` are alive
    fn try_reserve(&self, max: usize) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }
}

/// A waiting worker's mailbox for exactly one item
type Slot<T> = oneshot::Sender<T>;

/// Spawn-on-demand pool shared by worker groups and collectors
///
/// Hand-off is a rendezvous: a worker publishes a one-shot slot when it is
/// ready and the dispatcher delivers into live slots only, so an item is never
/// left with a worker that has just retired.
pub(crate) struct Pool<T> {
    pipeline: Pipeline,
    stage: &'static str,
    max_workers: usize,
    idle_duration: Duration,
    counters: Arc<PoolCounters>,
    ready_tx: mpsc::UnboundedSender<Slot<T>>,
    ready_rx: mpsc::UnboundedReceiver<Slot<T>>,
    retired: Arc<Notify>,
    workers: JoinSet<()>,
}

impl<T: Send + 'static> Pool<T> {
    pub(crate) fn new(pipeline: &Pipeline, stage: &'static str, options: &GroupOptions) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            pipeline: pipeline.clone(),
            stage,
            max_workers: options.max_workers.max(1),
            idle_duration: options.idle_duration,
            counters: Arc::new(PoolCounters::default()),
            ready_tx,
            ready_rx,
            retired: Arc::new(Notify::new()),
            workers: JoinSet::new(),
        }
    }

    pub(crate) fn counters(&self) -> Arc<PoolCounters> {
        Arc::clone(&self.counters)
    }

    /// Deliver `item` to a worker, spawning one through `spawn` when none is ready
    ///
    /// Hands the item back if the pipeline is cancelled first.
    pub(crate) async fn dispatch<F, Fut>(&mut self, mut item: T, spawn: &F) -> Result<(), T>
    where
        F: Fn(Worker<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            // Non-blocking hand-off to a worker that is already waiting
            while let Ok(slot) = self.ready_rx.try_recv() {
                match slot.send(item) {
                    Ok(()) => {
                        self.delivered();
                        return Ok(());
                    }
                    Err(returned) => item = returned,
                }
            }

            if self.counters.try_reserve(self.max_workers) {
                self.spawn_worker(spawn);
            }

            tokio::select! {
                biased;
                _ = self.pipeline.done() => return Err(item),
                slot = self.ready_rx.recv() => {
                    let Some(slot) = slot else { return Err(item) };
                    match slot.send(item) {
                        Ok(()) => {
                            self.delivered();
                            return Ok(());
                        }
                        Err(returned) => item = returned,
                    }
                }
                // A worker left; re-check whether a replacement may be spawned
                _ = self.retired.notified() => {}
            }
        }
    }

    fn delivered(&self) {
        self.counters.dispatched.fetch_add(1, Ordering::AcqRel);
    }

    fn spawn_worker<F, Fut>(&mut self, spawn: &F)
    where
        F: Fn(Worker<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let worker_id = self.counters.spawned.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(worker_id, active = self.counters.active(), "New worker");

        let worker = Worker {
            id: worker_id,
            pipeline: self.pipeline.clone(),
            idle_duration: self.idle_duration,
            ready_tx: self.ready_tx.clone(),
            counters: Arc::clone(&self.counters),
            retired: Arc::clone(&self.retired),
        };
        let span = tracing::debug_span!(parent: self.pipeline.span(), "worker", stage = self.stage, worker_id);
        self.workers.spawn(spawn(worker).instrument(span));
    }

    /// Stop handing out items and wait for every worker to exit
    ///
    /// Returns the number of workers spawned over the pool's lifetime.
    pub(crate) async fn shutdown(self) -> u64 {
        let Pool {
            pipeline,
            stage,
            counters,
            ready_tx,
            ready_rx,
            mut workers,
            ..
        } = self;

        // Dropping the queue fails every published slot, waking idle workers
        drop(ready_tx);
        drop(ready_rx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::warn!(stage, "Worker panicked");
                pipeline.cancel_with_error(PipelineError::Panicked { stage });
            }
        }

        counters.spawned()
    }
}

/// Handle owned by one worker task
///
/// Dropping it frees the worker's slot in the pool.
pub(crate) struct Worker<T> {
    id: u64,
    pipeline: Pipeline,
    idle_duration: Duration,
    ready_tx: mpsc::UnboundedSender<Slot<T>>,
    counters: Arc<PoolCounters>,
    retired: Arc<Notify>,
}

impl<T> Worker<T> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Wait for the next item
    ///
    /// `None` means the worker must exit: it sat idle for the idle duration,
    /// the pool shut down, or the pipeline was cancelled.
    pub(crate) async fn next(&mut self) -> Option<T> {
        let (slot_tx, mut slot_rx) = oneshot::channel();
        if self.ready_tx.send(slot_tx).is_err() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.pipeline.done() => None,
            item = &mut slot_rx => item.ok(),
            _ = tokio::time::sleep(self.idle_duration) => {
                // An item delivered at the same instant is still ours
                slot_rx.close();
                match slot_rx.try_recv() {
                    Ok(item) => Some(item),
                    Err(_) => {
                        tracing::debug!(worker_id = self.id, "Idle duration reached");
                        None
                    }
                }
            }
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        self.retired.notify_one();
    }
}
