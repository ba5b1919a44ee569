//! Error tree for the engine. Sub-errors convert into [`MindSyncError`] via `#[from]`.

mod merge_error;
mod storage_error;
mod transport_error;
mod validation_error;

pub use merge_error::MergeError;
pub use storage_error::StorageError;
pub use transport_error::TransportError;
pub use validation_error::ValidationError;

/// Top-level error type for every MindSync crate.
#[derive(Debug, thiserror::Error)]
pub enum MindSyncError {
    #[error("validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("merge failure: {0}")]
    MergeFailure(#[from] MergeError),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    #[error("conflict not found: {id}")]
    ConflictNotFound { id: String },

    #[error("invalid conflict state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A resolution for this conflict is running or has already finished.
    #[error("conflict {id} is already {status}")]
    ConflictAlreadyHandled { id: String, status: String },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for MindSyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result alias used throughout the workspace.
pub type MindSyncResult<T> = Result<T, MindSyncError>;
