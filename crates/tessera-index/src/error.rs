/// Errors from index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The backend rejected or failed a write.
    #[error("index write failed for {id}: {reason}")]
    WriteFailed { id: String, reason: String },

    /// A query could not be executed.
    #[error("query failed: {0}")]
    Query(String),

    /// Reading payload bytes for indexing failed.
    #[error("payload read failed: {0}")]
    PayloadRead(String),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
