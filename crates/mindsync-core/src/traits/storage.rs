use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::errors::MindSyncResult;
use crate::models::{AuditEntry, CrdtState};

/// A stored snapshot with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u64,
    pub state: CrdtState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionConflictReason {
    /// Someone else committed since the caller read.
    StaleVersion,
    /// The record's access boundary changed under the caller.
    PermissionChanged,
}

/// The signal that triggers conflict detection: a rejected compare-and-swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConflict {
    pub resource_id: String,
    pub expected_version: Option<u64>,
    pub actual_version: Option<u64>,
    pub reason: VersionConflictReason,
}

impl VersionConflict {
    pub fn is_version_mismatch(&self) -> bool {
        self.expected_version != self.actual_version
    }
}

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Committed { version: u64 },
    Conflict(VersionConflict),
}

/// Persistence collaborator (encrypted at rest by the implementation).
///
/// `expected_version = None` means "create; the record must not exist yet".
pub trait IStateStore: Send + Sync {
    fn get(&self, id: &str) -> impl Future<Output = MindSyncResult<Option<VersionedState>>> + Send;

    /// Unconditional write. Returns the new version.
    fn put(&self, id: &str, state: &CrdtState) -> impl Future<Output = MindSyncResult<u64>> + Send;

    fn compare_and_swap(
        &self,
        id: &str,
        expected_version: Option<u64>,
        state: &CrdtState,
    ) -> impl Future<Output = MindSyncResult<CasOutcome>> + Send;

    /// Append to a namespace's audit log. Implementations cap the log length.
    fn append_audit(
        &self,
        namespace: &str,
        entry: &AuditEntry,
    ) -> impl Future<Output = MindSyncResult<()>> + Send;

    fn audit_log(
        &self,
        namespace: &str,
    ) -> impl Future<Output = MindSyncResult<Vec<AuditEntry>>> + Send;
}
