use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The adapter refused the value before writing it.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored row could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend itself failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}
