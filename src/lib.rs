//! Concurrent stream processing on tokio
//!
//! Stages are connected by bounded channels and share one [`Pipeline`]
//! that carries cancellation and the first error raised anywhere in it.
//! Items can be fanned out over an elastic worker group, put back into input
//! order with a sequencer and reorder buffer, or reduced in parallel with a
//! [`Collector`].
//!
//! [`Pipeline`]: pipeline::Pipeline
//! [`Collector`]: collect::Collector

pub mod app;
pub mod channel;
pub mod collect;
pub mod io;
pub mod ops;
pub mod ordering;
pub mod parallel;
pub mod pipeline;
pub mod prelude;
