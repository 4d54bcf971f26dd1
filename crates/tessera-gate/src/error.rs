use tessera_crypto::CryptoError;
use tessera_schema::SchemaError;

/// Errors raised by the field pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A field violates a schema-declared invariant.
    #[error("{message}")]
    Invalid {
        pointer: Option<String>,
        message: String,
    },

    /// A lookup collaborator (index, storage, schema registry) failed.
    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("secret hashing failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("document rewrite failed: {0}")]
    Pointer(#[from] SchemaError),
}

impl GateError {
    /// Validation failure at a document location.
    pub fn invalid_at(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            pointer: Some(pointer.into()),
            message: message.into(),
        }
    }

    /// Validation failure not tied to one location.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            pointer: None,
            message: message.into(),
        }
    }

    /// JSON pointer of the offending field, if any.
    pub fn pointer(&self) -> Option<&str> {
        match self {
            Self::Invalid { pointer, .. } => pointer.as_deref(),
            _ => None,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
