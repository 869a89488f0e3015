//! Error types for disco-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The snapshot store has no object under this key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Outbox, interpreter or store I/O failed. Retried or surfaced, never fatal to the worker.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("stale reply: expected state {expected}, but workflow is in {actual}")]
    StaleReply { expected: String, actual: String },

    /// The persisted snapshot could not be loaded or decoded at startup.
    #[error("recovery failed: {0}")]
    Recovery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine worker has exited and can no longer answer.
    #[error("workflow engine has shut down")]
    Shutdown,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
