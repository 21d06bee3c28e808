pub mod error;
pub mod reorder;
pub mod sequencer;

// Re-export commonly used types
pub use error::ConsistencyError;
pub use reorder::{ReorderBuffer, reassemble};
pub use sequencer::{FIRST_SEQUENCE, Sequencer, Tagged, sequence};
