/// Errors from schema compilation and pointer manipulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A JSON pointer is syntactically invalid.
    #[error("invalid JSON pointer: {0}")]
    InvalidPointer(String),

    /// A pointer's parent location does not exist or cannot hold children.
    #[error("no container at {0}")]
    MissingParent(String),

    /// The schema document itself is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
