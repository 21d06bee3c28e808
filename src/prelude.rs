//! Prelude module for convenient imports
//!
//! Import everything you need with: `use flow::prelude::*;`

// Pipeline types
pub use crate::pipeline::{BoxError, ConfigError, GroupOptions, MAX_WORKERS_ENV, Pipeline, PipelineError};

// Channel types
pub use crate::channel::{DEFAULT_CAPACITY, Emitter, SendError, SharedSource, Source, channel};

// Parallel types
pub use crate::parallel::{GroupStats, Processor, Progress, WorkerGroup, map_ordered, map_unordered};

// Ordering types
pub use crate::ordering::{ConsistencyError, ReorderBuffer, Tagged, reassemble, sequence};

// Collector types
pub use crate::collect::{Collector, Summary};

// Operators
pub use crate::ops;

// IO types
pub use crate::io::{CsvRecordStream, IoError, RawRecord, Record, write_records};

// App types
pub use crate::app::{AppError, CliApp, FlowReport, parse_args, run_flow};
