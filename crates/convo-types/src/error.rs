use std::time::Duration;

use thiserror::Error;

/// Errors from repository operations (used by trait definitions in convo-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors from the upstream inference backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("upstream deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// The stream ended before a terminal event. Recoverable: whatever
    /// fragments were received get persisted as a partial response.
    #[error("stream interrupted: {0}")]
    Interrupted(String),

    #[error("failed to decode upstream payload: {0}")]
    Decode(String),
}

/// Turn-level errors surfaced to callers of the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("session not found")]
    SessionNotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream deadline exceeded after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream error: {0}")]
    UpstreamFailed(String),

    /// Store access failed before anything was sent to the client.
    #[error("storage error: {0}")]
    Storage(String),

    /// The assistant message (or the session touch) could not be persisted
    /// after the response was already committed to the client. Logged as a
    /// consistency warning; cannot be rolled back at the transport level.
    #[error("persistence failed after response delivery: {0}")]
    Persistence(String),
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ChatError::SessionNotFound,
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ChatError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Unavailable(msg) => ChatError::UpstreamUnavailable(msg),
            UpstreamError::Timeout(d) => ChatError::UpstreamTimeout(d),
            UpstreamError::Status { code, message } => {
                ChatError::UpstreamFailed(format!("HTTP {code}: {message}"))
            }
            UpstreamError::Interrupted(msg) => {
                ChatError::UpstreamFailed(format!("stream interrupted: {msg}"))
            }
            UpstreamError::Decode(msg) => ChatError::UpstreamFailed(msg),
        }
    }
}
