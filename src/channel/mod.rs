pub mod cancellable;
pub mod source;

// Re-export commonly used types
pub use cancellable::Cancellable;
pub use source::{DEFAULT_CAPACITY, Emitter, SendError, SharedSource, Source, channel};
