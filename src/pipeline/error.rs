use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::ordering::ConsistencyError;

/// Boxed error returned by user callbacks
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Pipeline-wide errors
///
/// Cloneable so the first captured error can be handed to every stage that
/// asks for it.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Pipeline deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Stage {stage} panicked")]
    Panicked { stage: &'static str },
}

impl PipelineError {
    /// Wrap a callback error raised inside the named stage
    pub fn stage(stage: &'static str, error: impl Into<BoxError>) -> Self {
        PipelineError::Stage {
            stage,
            source: Arc::from(error.into()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

/// Configuration errors for group options
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("{key} must be at least 1")]
    ZeroWorkers { key: &'static str },
}
