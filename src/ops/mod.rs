//! Single-task stages and terminals for building pipelines
//!
//! Every stage runs as its own task inside the pipeline's span, stops at the
//! first cancellation and closes its output exactly once.

pub mod sources;
pub mod terminal;
pub mod transform;

use std::future::Future;

use tracing::Instrument;

use crate::pipeline::Pipeline;

// Re-export commonly used functions
pub use sources::{empty, from_iter, from_stream, generate};
pub use terminal::{count, drain, for_each, group_by, max, min, to_vec};
pub use transform::{filter, limit, map, peek, receive_timeout, throttle, until};

fn spawn_stage<F>(pipeline: &Pipeline, stage: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let id = pipeline.next_id();
    tokio::spawn(task.instrument(pipeline.stage_span(stage, id)));
}
