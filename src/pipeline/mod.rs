pub mod control;
pub mod error;
pub mod options;

// Re-export commonly used types
pub use control::Pipeline;
pub use error::{BoxError, ConfigError, PipelineError};
pub use options::{GroupOptions, MAX_WORKERS_ENV};
