//! Error types for the object store.

use rpki_kv::KvError;
use rpki_types::Key;

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// Transaction or index failure, including corruption.
    #[error("storage error: {0}")]
    Kv(#[from] KvError),

    /// An operation required an object that is not stored.
    #[error("object not found: {0}")]
    NotFound(Key),

    /// A write would break an invariant of the stored data.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl ObjectError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Kv(e) if e.is_corruption())
    }
}

/// A stored payload could not be decoded into the requested shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Convenience alias for object store results.
pub type ObjectResult<T> = Result<T, ObjectError>;
