use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Kv(#[from] rpki_kv::KvError),

    #[error("object store error: {0}")]
    Object(#[from] rpki_objects::ObjectError),

    #[error("validation run store error: {0}")]
    Run(#[from] rpki_runs::RunError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns `true` if the error reports damaged stored data.
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Kv(e) => e.is_corruption(),
            Self::Object(e) => e.is_corruption(),
            Self::Run(rpki_runs::RunError::Kv(e)) => e.is_corruption(),
            _ => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
