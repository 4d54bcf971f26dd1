use tessera_crypto::CryptoError;
use tessera_gate::GateError;
use tessera_index::IndexError;
use tessera_ledger::LedgerError;
use tessera_schema::SchemaError;
use tessera_store::StoreError;
use tessera_sync::SyncError;
use tessera_types::TypeError;

/// Errors returned by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The id is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Schema or field-processor validation failed.
    #[error("{message}")]
    Invalid {
        pointer: Option<String>,
        message: String,
    },

    /// A version operation was attempted on the wrong kind of object.
    #[error("version error: {0}")]
    Version(String),

    #[error("repository is read-only")]
    ReadOnly,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RepoError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            pointer: None,
            message: message.into(),
        }
    }

    pub fn invalid_at(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            pointer: Some(pointer.into()),
            message: message.into(),
        }
    }

    /// JSON pointer of a validation failure.
    pub fn pointer(&self) -> Option<&str> {
        match self {
            Self::Invalid { pointer, .. } => pointer.as_deref(),
            _ => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(id) => Self::Conflict(format!("Object already exists: {id}")),
            e @ StoreError::InvalidRange { .. } => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<GateError> for RepoError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Invalid { pointer, message } => Self::Invalid { pointer, message },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SchemaError> for RepoError {
    fn from(e: SchemaError) -> Self {
        Self::invalid(e.to_string())
    }
}

impl From<TypeError> for RepoError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidHandle(h) => Self::BadRequest(format!("Invalid handle: {h}")),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<IndexError> for RepoError {
    fn from(e: IndexError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<LedgerError> for RepoError {
    fn from(e: LedgerError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<SyncError> for RepoError {
    fn from(e: SyncError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<CryptoError> for RepoError {
    fn from(e: CryptoError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization: {e}"))
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        assert!(matches!(
            RepoError::from(StoreError::Conflict("t/1".into())),
            RepoError::Conflict(_)
        ));
        assert!(matches!(
            RepoError::from(StoreError::NotFound("t/1".into())),
            RepoError::NotFound(_)
        ));
        let range = StoreError::InvalidRange {
            id: "t/1".into(),
            payload: "p".into(),
            reason: "start 5 is after end 4".into(),
        };
        assert!(matches!(RepoError::from(range), RepoError::BadRequest(_)));
        assert!(matches!(
            RepoError::from(StoreError::Backend("down".into())),
            RepoError::Internal(_)
        ));
    }

    #[test]
    fn gate_validation_keeps_pointer() {
        let e = RepoError::from(GateError::invalid_at("/username", "Username bob is not unique."));
        assert_eq!(e.pointer(), Some("/username"));
        assert_eq!(e.to_string(), "Username bob is not unique.");
    }

    #[test]
    fn bad_handles_are_bad_requests() {
        let e = RepoError::from(TypeError::InvalidHandle("noslash".into()));
        assert!(matches!(e, RepoError::BadRequest(m) if m == "Invalid handle: noslash"));
    }
}
