/// Errors from constructing or parsing foundation types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// A handle does not follow the `prefix/suffix` shape.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A timestamp could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
