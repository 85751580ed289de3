use thiserror::Error;

use crate::types::SyncState;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("parse error: {0}")]
    Parse(#[from] syncml_wire::ParserError),

    #[error("codec error: {0}")]
    Wire(#[from] syncml_wire::WireError),

    #[error("database error: {0}")]
    Database(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("session aborted in state {state:?}: {reason}")]
    Aborted { state: SyncState, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SyncError {
    fn from(error: rusqlite::Error) -> Self {
        SyncError::Database(error.to_string())
    }
}
