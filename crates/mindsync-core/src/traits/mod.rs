//! Collaborator contracts. The engine receives implementations at construction.

pub mod storage;
pub mod transport;

pub use storage::{CasOutcome, IStateStore, VersionConflict, VersionConflictReason, VersionedState};
pub use transport::ITransport;
