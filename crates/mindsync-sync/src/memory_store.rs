//! In-process reference implementation of [`IStateStore`].

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mindsync_core::constants::AUDIT_LOG_CAPACITY;
use mindsync_core::errors::StorageError;
use mindsync_core::models::{AuditEntry, CrdtState};
use mindsync_core::traits::{
    CasOutcome, IStateStore, VersionConflict, VersionConflictReason, VersionedState,
};
use mindsync_core::MindSyncResult;
use tracing::debug;

use crate::audit::AuditLog;

/// Versioned snapshots and capped audit logs held in `DashMap`s.
///
/// Versions start at 1 and increase by one per successful write.
#[derive(Debug)]
pub struct MemoryStateStore {
    states: DashMap<String, VersionedState>,
    audit: DashMap<String, AuditLog>,
    audit_capacity: usize,
    unavailable: AtomicBool,
}

impl MemoryStateStore {
    pub fn new(audit_capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            audit: DashMap::new(),
            audit_capacity,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current version of `id`, if stored.
    pub fn version_of(&self, id: &str) -> Option<u64> {
        self.states.get(id).map(|s| s.version)
    }

    /// Snapshot of `id` without going through the async contract.
    pub fn get_state(&self, id: &str) -> Option<VersionedState> {
        self.states.get(id).map(|s| s.clone())
    }

    fn check_available(&self) -> MindSyncResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                message: "memory store switched off".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(AUDIT_LOG_CAPACITY)
    }
}

impl IStateStore for MemoryStateStore {
    async fn get(&self, id: &str) -> MindSyncResult<Option<VersionedState>> {
        self.check_available()?;
        Ok(self.states.get(id).map(|s| s.value().clone()))
    }

    async fn put(&self, id: &str, state: &CrdtState) -> MindSyncResult<u64> {
        self.check_available()?;
        let mut entry = self.states.entry(id.to_string()).or_insert(VersionedState {
            version: 0,
            state: state.clone(),
        });
        entry.version += 1;
        entry.state = state.clone();
        Ok(entry.version)
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: Option<u64>,
        state: &CrdtState,
    ) -> MindSyncResult<CasOutcome> {
        self.check_available()?;
        let outcome = match self.states.entry(id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let actual = occupied.get().version;
                if expected_version == Some(actual) {
                    let stored = occupied.get_mut();
                    stored.version += 1;
                    stored.state = state.clone();
                    CasOutcome::Committed {
                        version: stored.version,
                    }
                } else {
                    CasOutcome::Conflict(VersionConflict {
                        resource_id: id.to_string(),
                        expected_version,
                        actual_version: Some(actual),
                        reason: VersionConflictReason::StaleVersion,
                    })
                }
            }
            Entry::Vacant(vacant) => {
                if expected_version.is_none() {
                    vacant.insert(VersionedState {
                        version: 1,
                        state: state.clone(),
                    });
                    CasOutcome::Committed { version: 1 }
                } else {
                    CasOutcome::Conflict(VersionConflict {
                        resource_id: id.to_string(),
                        expected_version,
                        actual_version: None,
                        reason: VersionConflictReason::StaleVersion,
                    })
                }
            }
        };
        debug!(resource_id = id, ?expected_version, ?outcome, "compare-and-swap");
        Ok(outcome)
    }

    async fn append_audit(&self, namespace: &str, entry: &AuditEntry) -> MindSyncResult<()> {
        self.check_available()?;
        self.audit
            .entry(namespace.to_string())
            .or_insert_with(|| AuditLog::new(self.audit_capacity))
            .push(entry.clone());
        Ok(())
    }

    async fn audit_log(&self, namespace: &str) -> MindSyncResult<Vec<AuditEntry>> {
        self.check_available()?;
        Ok(self
            .audit
            .get(namespace)
            .map(|log| log.entries())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindsync_core::models::{AuditAction, ClinicalPayload, DeviceId};
    use test_fixtures::{preferences, state_for};

    fn state() -> CrdtState {
        state_for(
            "p-1",
            ClinicalPayload::UserPreference(preferences(&[], "phone-1")),
            "phone-1",
        )
    }

    #[tokio::test]
    async fn create_then_stale_write_conflicts() {
        let store = MemoryStateStore::default();
        let created = store.compare_and_swap("p-1", None, &state()).await.unwrap();
        assert_eq!(created, CasOutcome::Committed { version: 1 });

        let again = store.compare_and_swap("p-1", None, &state()).await.unwrap();
        assert!(matches!(
            again,
            CasOutcome::Conflict(VersionConflict {
                actual_version: Some(1),
                ..
            })
        ));

        let next = store.compare_and_swap("p-1", Some(1), &state()).await.unwrap();
        assert_eq!(next, CasOutcome::Committed { version: 2 });
    }

    #[tokio::test]
    async fn update_of_missing_record_conflicts() {
        let store = MemoryStateStore::default();
        let outcome = store.compare_and_swap("p-1", Some(3), &state()).await.unwrap();
        assert!(matches!(
            outcome,
            CasOutcome::Conflict(VersionConflict {
                actual_version: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn audit_log_is_capped_per_namespace() {
        let store = MemoryStateStore::new(2);
        for _ in 0..3 {
            let entry = AuditEntry::new("p-1", AuditAction::OperationApplied, DeviceId::from("d"));
            store.append_audit("resource:p-1", &entry).await.unwrap();
        }
        assert_eq!(store.audit_log("resource:p-1").await.unwrap().len(), 2);
        assert!(store.audit_log("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryStateStore::default();
        store.set_unavailable(true);
        assert!(store.get("p-1").await.is_err());
    }
}
