use tokio::sync::mpsc;
use tracing::Instrument;

use super::error::ConsistencyError;
use super::sequencer::{FIRST_SEQUENCE, Tagged};
use crate::channel::{DEFAULT_CAPACITY, Emitter, Source, channel};
use crate::pipeline::{Pipeline, PipelineError};

struct Node<T> {
    item: Tagged<T>,
    next: Option<usize>,
}

/// Sorted list of out-of-order items waiting for their turn
///
/// Nodes live in an arena of slots linked by index, ascending by sequence
/// with no two nodes sharing a sequence. `next_expected` only moves forward.
pub struct ReorderBuffer<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    next_expected: u64,
    len: usize,
    pruned: u64,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::starting_at(FIRST_SEQUENCE)
    }

    /// Buffer whose first emitted item has sequence `next_expected`
    pub fn starting_at(next_expected: u64) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            next_expected,
            len: 0,
            pruned: 0,
        }
    }

    /// Sequence the buffer is waiting for
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Items held
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Items discarded because the cursor moved past them
    pub fn pruned(&self) -> u64 {
        self.pruned
    }

    /// Sequences currently held, ascending
    pub fn pending(&self) -> Vec<u64> {
        let mut sequences = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|idx| self.slots[idx].as_ref()) {
            sequences.push(node.item.sequence);
            cursor = node.next;
        }
        sequences
    }

    /// Add an item at its sorted position
    ///
    /// Nodes the cursor has passed are pruned first. An item whose sequence
    /// is already held, or already behind the cursor, is rejected.
    pub fn insert(&mut self, item: Tagged<T>) -> Result<(), ConsistencyError> {
        self.prune();

        let sequence = item.sequence;
        if sequence < self.next_expected {
            return Err(ConsistencyError::Duplicate(sequence));
        }

        let mut previous = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.slots[idx].as_ref() else {
                break;
            };
            if node.item.sequence == sequence {
                return Err(ConsistencyError::Duplicate(sequence));
            }
            if node.item.sequence > sequence {
                break;
            }
            previous = Some(idx);
            cursor = node.next;
        }

        let idx = self.alloc(Node { item, next: cursor });
        match previous.and_then(|p| self.slots[p].as_mut()) {
            Some(previous) => previous.next = Some(idx),
            None => self.head = Some(idx),
        }
        self.len += 1;
        Ok(())
    }

    /// Remove the head if it is the item the cursor is waiting for
    pub fn pop_ready(&mut self) -> Option<T> {
        if self.head_sequence()? != self.next_expected {
            return None;
        }
        let node = self.pop_head()?;
        self.next_expected += 1;
        Some(node.item.value)
    }

    /// Remove the consecutive run starting at the cursor, stopping at the first gap
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(value) = self.pop_ready() {
            ready.push(value);
        }
        ready
    }

    /// Move the cursor forward, giving up on every sequence before `sequence`
    ///
    /// Nodes left behind are pruned lazily on the next insert or on finish.
    pub fn advance_to(&mut self, sequence: u64) {
        self.next_expected = self.next_expected.max(sequence);
    }

    /// Discard every node behind the cursor, returning how many were dropped
    pub fn prune(&mut self) -> usize {
        let mut dropped = 0;
        while self
            .head_sequence()
            .is_some_and(|sequence| sequence < self.next_expected)
        {
            self.pop_head();
            dropped += 1;
        }
        self.pruned += dropped as u64;
        dropped
    }

    /// Final check once input has ended; the buffer must be empty
    pub fn finish(mut self) -> Result<(), ConsistencyError> {
        self.prune();
        match self.head_sequence() {
            None => Ok(()),
            Some(first_pending) => Err(ConsistencyError::Pending {
                next_expected: self.next_expected,
                first_pending,
                remaining: self.len,
            }),
        }
    }

    fn head_sequence(&self) -> Option<u64> {
        let idx = self.head?;
        self.slots[idx].as_ref().map(|node| node.item.sequence)
    }

    fn pop_head(&mut self) -> Option<Node<T>> {
        let idx = self.head?;
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.head = node.next;
        self.len -= 1;
        Some(node)
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restore original order from a stream of tagged items
///
/// Emits the values of sequences 1, 2, 3, ... in order whatever order they
/// arrive in. Runs as two tasks: the insert role owns the buffer and, after
/// every insertion, hands the run that became ready to the emit role, which
/// sends it downstream. If the input ends with items still buffered (a lost
/// or duplicated sequence upstream) the pipeline is cancelled with a
/// consistency error before the output closes.
pub fn reassemble<T: Send + 'static>(pipeline: &Pipeline, input: Source<Tagged<T>>) -> Source<T> {
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let id = pipeline.next_id();
    let span = pipeline.stage_span("reassemble", id);

    let insert = tokio::spawn(insert_role(pipeline.clone(), input, ready_tx).instrument(span.clone()));
    let emit = tokio::spawn(emit_role(ready_rx, output).instrument(span.clone()));

    let pipeline = pipeline.clone();
    let finalize = async move {
        let buffer = insert.await;
        let emitted = emit.await;

        // Output stays open until the check is done so consumers see the error
        let (output, emitted) = match emitted {
            Ok(emitted) => emitted,
            Err(_) => {
                pipeline.cancel_with_error(PipelineError::Panicked { stage: "reassemble" });
                return;
            }
        };

        match buffer {
            Ok(buffer) => {
                tracing::debug!(
                    emitted,
                    next_expected = buffer.next_expected(),
                    remaining = buffer.len(),
                    "Reassembly done"
                );
                if pipeline.is_done() || output.is_closed() {
                    return;
                }
                if let Err(e) = buffer.finish() {
                    tracing::warn!(error = %e, "Inconsistent sequence before source closed");
                    pipeline.cancel_with_error(e.into());
                }
            }
            Err(_) => {
                pipeline.cancel_with_error(PipelineError::Panicked { stage: "reassemble" });
            }
        }
        drop(output);
    };
    tokio::spawn(finalize.instrument(span));

    source
}

async fn insert_role<T>(
    pipeline: Pipeline,
    mut input: Source<Tagged<T>>,
    ready: mpsc::Sender<Vec<T>>,
) -> ReorderBuffer<T> {
    let mut buffer = ReorderBuffer::new();
    let mut received = 0u64;

    loop {
        // The emit role leaves once the consumer is gone
        let item = tokio::select! {
            biased;
            _ = ready.closed() => break,
            item = input.recv() => item,
        };
        let Some(item) = item else { break };
        received += 1;
        if let Err(e) = buffer.insert(item) {
            tracing::warn!(error = %e, "Rejected item");
            pipeline.cancel_with_error(e.into());
            break;
        }

        // Checked after every insert, not only when the head changes
        let run = buffer.drain_ready();
        if run.is_empty() {
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = pipeline.done() => break,
            sent = ready.send(run) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    tracing::debug!(received, pruned = buffer.pruned(), "Insert done");
    buffer
}

async fn emit_role<T>(mut ready: mpsc::Receiver<Vec<T>>, output: Emitter<T>) -> (Emitter<T>, u64) {
    let mut emitted = 0u64;

    'runs: loop {
        let run = tokio::select! {
            biased;
            _ = output.pipeline().done() => break,
            run = ready.recv() => run,
        };
        let Some(run) = run else { break };

        for value in run {
            if output.send(value).await.is_err() {
                break 'runs;
            }
            emitted += 1;
        }
    }

    (output, emitted)
}
