//! # mindsync-core
//!
//! Foundation crate for the MindSync therapeutic state-consistency engine.
//! Defines the shared models, collaborator traits, errors, config, and
//! constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::MindSyncConfig;
pub use errors::{MindSyncError, MindSyncResult};
pub use models::{ClinicalPayload, ClinicalType, DeviceId, Operation, PriorityLevel, VectorClock};
