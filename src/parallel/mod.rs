pub mod mapper;
pub(crate) mod pool;
pub mod worker_group;

// Re-export commonly used types
pub use mapper::{map_ordered, map_unordered};
pub use pool::PoolCounters;
pub use worker_group::{GroupStats, Processor, Progress, WorkerGroup};
