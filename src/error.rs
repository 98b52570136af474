//! Error taxonomy for the screening core.
//!
//! Every variant is a rejected operation: no shared state is mutated before
//! an error is returned, so callers can retry with corrected input.

use thiserror::Error;

/// Result alias for screening operations.
pub type Result<T> = std::result::Result<T, ScreeningError>;

/// Errors raised by the embedding, index, scoring and federated components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScreeningError {
    /// Malformed caller input (missing description, non-finite amount, ...).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// An entry with this id is already indexed and the policy rejects overwrites.
    #[error("duplicate transaction id: {0}")]
    DuplicateId(String),

    /// No entry with this id exists.
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// Vector length does not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Federated round had no clients or zero total samples.
    #[error("federated round has no samples to merge ({clients} clients)")]
    EmptyRound { clients: usize },
}

impl ScreeningError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ScreeningError::InvalidRecord(msg.into())
    }
}
