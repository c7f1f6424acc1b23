use rysto_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    /// A required field is missing or empty.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Refused by ownership rules. Never distinguishes "missing" from "not yours".
    #[error("{0}")]
    Forbidden(String),

    /// The acceptance slot already holds another continuation.
    #[error("{0}")]
    Conflict(String),

    /// The story slot was claimed but the continuation could not be marked.
    #[error("continuation acceptance only partially applied (story slot rolled back: {rolled_back})")]
    PartialAcceptance { rolled_back: bool },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ContentResult<T> = Result<T, ContentError>;
