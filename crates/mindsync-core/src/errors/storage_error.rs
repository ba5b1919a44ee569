/// Errors surfaced by the injected persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("compare-and-swap retries exhausted for {resource_id} after {attempts} attempts")]
    RetriesExhausted { resource_id: String, attempts: u32 },

    #[error("stored state for {resource_id} is corrupt: {details}")]
    CorruptState { resource_id: String, details: String },
}
