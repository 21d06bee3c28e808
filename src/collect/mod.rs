pub mod collector;
pub mod summary;

// Re-export commonly used types
pub use collector::{Collector, to_vec_unordered};
pub use summary::{Summary, summary};
