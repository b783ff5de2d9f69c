//! Errors surfaced by the history engines

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("No backups have been made yet")]
    NoHistory,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Could not find a backup named {0}")]
    NotFound(String),
    #[error("Restore failed, working tree left as it was: {0}")]
    RestoreFailed(String),
    #[error("Could not rewrite history, nothing was changed: {0}")]
    RewriteConflict(String),
    #[error("Save is busy: {0}")]
    Busy(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

impl HistoryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        HistoryError::InvalidRequest(message.into())
    }
}
