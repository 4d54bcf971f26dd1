use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("coordination service error: {0}")]
    Coordination(String),

    #[error("signal channel closed")]
    ChannelClosed,
}

pub type SyncResult<T> = Result<T, SyncError>;
