//! Error types for the validation run store.

use rpki_kv::KvError;

use crate::run::RunStatus;

/// Errors that can occur during validation run store operations.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Transaction or index failure, including corruption.
    #[error("storage error: {0}")]
    Kv(#[from] KvError),

    /// A run refers to a trust anchor that is not registered.
    #[error("unknown trust anchor: {0}")]
    UnknownTrustAnchor(u64),

    /// No run with this id exists.
    #[error("validation run not found: {0}")]
    RunNotFound(u64),

    /// A status change that the run lifecycle does not allow.
    #[error("validation run {id} cannot move from {from} to {to}")]
    InvalidTransition { id: u64, from: RunStatus, to: RunStatus },
}

/// Convenience alias for run store results.
pub type RunResult<T> = Result<T, RunError>;
