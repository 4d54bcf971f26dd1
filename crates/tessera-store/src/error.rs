/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested object or payload does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An object with this id already exists.
    #[error("object already exists: {0}")]
    Conflict(String),

    /// A payload byte range is outside the payload or inverted.
    #[error("invalid range for {id}/{payload}: {reason}")]
    InvalidRange {
        id: String,
        payload: String,
        reason: String,
    },

    /// A stored payload reference points at bytes the backend does not hold.
    #[error("missing bytes for payload {payload} of {id}")]
    MissingPayloadBytes { id: String, payload: String },

    /// Backend I/O or availability failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
