//! Error types for the chat core.

use thiserror::Error;

/// Errors returned by a message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before touching storage.
    #[error("validation error: {0}")]
    Validation(String),
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
    /// Blocking task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Join(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

/// Errors surfaced to a single connection. None of these affect other
/// connections or the presence registry.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Empty text, blank identifier, missing recipient.
    #[error("{0}")]
    Validation(String),
    /// The connection has no bound identity.
    #[error("connection has no bound identity")]
    Unauthenticated,
    /// Store write or read failed; nothing was fanned out.
    #[error("failed to persist message: {0}")]
    Persistence(String),
    /// Frame could not be decoded into a known event.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl ChatError {
    /// Wire name carried in the `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated => "unauthenticated",
            Self::Persistence(_) => "persistence",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Persistence(other.to_string()),
        }
    }
}
