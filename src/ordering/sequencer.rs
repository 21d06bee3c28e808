use tracing::Instrument;

use crate::channel::{DEFAULT_CAPACITY, Source, channel};
use crate::pipeline::Pipeline;

/// Sequence number given to the first item of a stream
pub const FIRST_SEQUENCE: u64 = 1;

/// A value paired with its position in the original stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub sequence: u64,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn new(sequence: u64, value: T) -> Self {
        Self { sequence, value }
    }

    /// Replace the value, keeping the sequence number
    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Tagged<R> {
        Tagged {
            sequence: self.sequence,
            value: f(self.value),
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Hands out `1, 2, 3, ...` with no gaps
#[derive(Debug)]
pub struct Sequencer {
    next: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            next: FIRST_SEQUENCE,
        }
    }

    pub fn tag<T>(&mut self, value: T) -> Tagged<T> {
        let tagged = Tagged::new(self.next, value);
        self.next += 1;
        tagged
    }

    /// Number of sequence numbers handed out so far
    pub fn assigned(&self) -> u64 {
        self.next - FIRST_SEQUENCE
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag every item of `input` with its position, in input order
///
/// Ends when the input closes or the pipeline is cancelled.
pub fn sequence<T: Send + 'static>(pipeline: &Pipeline, input: Source<T>) -> Source<Tagged<T>> {
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);
    let id = pipeline.next_id();

    let task = async move {
        let mut input = input;
        let mut sequencer = Sequencer::new();

        while let Some(value) = input.recv().await {
            if output.send(sequencer.tag(value)).await.is_err() {
                break;
            }
        }

        tracing::debug!(assigned = sequencer.assigned(), "Sequencer done");
    };
    tokio::spawn(task.instrument(pipeline.stage_span("sequence", id)));

    source
}
