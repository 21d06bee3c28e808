pub mod cli;
pub mod error;
pub mod flow;

// Re-export commonly used types
pub use cli::{CliApp, exit_code};
pub use error::AppError;
pub use flow::{FlowReport, parse_args, run_flow};
