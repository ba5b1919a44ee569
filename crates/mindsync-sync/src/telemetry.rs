//! Tracing setup and span definitions for the engine's hot paths.
//!
//! Spans carry ids and classifications only. Payload values are never
//! recorded.

use mindsync_core::config::ObservabilityConfig;
use mindsync_core::{MindSyncError, MindSyncResult};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `MINDSYNC_LOG` overrides `config.log_level`. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> MindSyncResult<()> {
    let filter = EnvFilter::try_from_env("MINDSYNC_LOG")
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| MindSyncError::ConfigError(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json_logs {
        builder
            .json()
            .with_file(true)
            .with_line_number(true)
            .try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| MindSyncError::ConfigError(e.to_string()))
}

/// Span around one conflict resolution attempt.
#[macro_export]
macro_rules! resolution_span {
    ($conflict_id:expr, $strategy:expr) => {
        tracing::info_span!("mindsync.resolution", conflict_id = %$conflict_id, strategy = %$strategy)
    };
}

/// Span around a CRDT merge of a remote snapshot.
#[macro_export]
macro_rules! merge_span {
    ($resource_id:expr, $source_device:expr) => {
        tracing::info_span!("mindsync.merge", resource_id = %$resource_id, source_device = %$source_device)
    };
}

/// Span around conflict detection for one rejected write.
#[macro_export]
macro_rules! detection_span {
    ($resource_id:expr) => {
        tracing::info_span!("mindsync.detection", resource_id = %$resource_id)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const RESOLUTION: &str = "mindsync.resolution";
    pub const MERGE: &str = "mindsync.merge";
    pub const DETECTION: &str = "mindsync.detection";
}
