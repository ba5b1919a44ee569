//! # mindsync-sync
//!
//! The engine's public surface. [`SyncCoordinator`] sequences
//! apply → detect → resolve → commit → audit → push over injected storage and
//! transport collaborators. Also ships an in-memory reference store, the
//! cancellable resolution scheduler, and tracing setup.

pub mod audit;
pub mod coordinator;
pub mod memory_store;
pub mod replay;
pub mod scheduler;
pub mod statistics;
pub mod telemetry;

pub use audit::AuditLog;
pub use coordinator::{LocalApplyOutcome, RemoteOutcome, SyncCoordinator};
pub use memory_store::MemoryStateStore;
pub use replay::ProcessedOperations;
pub use scheduler::ResolutionScheduler;
pub use statistics::ResolutionStatistics;
pub use telemetry::init_tracing;
