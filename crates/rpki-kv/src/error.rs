/// Errors from the transaction substrate and index maps.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Failure reported by the embedded storage engine.
    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),

    /// Filesystem failure while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value failed its checksum or could not be decoded.
    #[error("corrupt value in table {table}: {reason}")]
    Corruption { table: String, reason: String },

    /// A value could not be serialized for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A transaction was opened while another one is open on the same thread.
    #[error("a transaction is already open on this thread")]
    NestedTransaction,

    /// A key does not have the width the table was declared with.
    #[error("key of width {actual} used with table {table}, expected width {expected}")]
    InvalidKey {
        table: String,
        expected: usize,
        actual: usize,
    },
}

impl KvError {
    /// Returns `true` if this error signals damaged stored data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KvError {
                fn from(e: $ty) -> Self {
                    Self::Engine(redb::Error::from(e))
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result alias for substrate operations.
pub type KvResult<T> = Result<T, KvError>;
