/// Errors from cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// A stored hash record is malformed.
    #[error("malformed hash record: {0}")]
    MalformedRecord(String),

    /// Serialization failure while canonicalizing.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
