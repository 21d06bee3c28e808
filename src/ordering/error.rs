use thiserror::Error;

/// Sequencing contract violations detected by the reorder buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Sequence {0} was already received or emitted")]
    Duplicate(u64),

    #[error(
        "Input closed with {remaining} item(s) buffered; waiting for sequence {next_expected}, first buffered {first_pending}"
    )]
    Pending {
        next_expected: u64,
        first_pending: u64,
        remaining: usize,
    },
}
