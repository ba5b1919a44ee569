//! Per-conflict lifecycle record.

use chrono::{DateTime, Utc};
use mindsync_core::models::{ConflictDescription, ConflictStatus, ResolutionResult};
use mindsync_core::{MindSyncError, MindSyncResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One recorded status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ConflictStatus,
    pub to: ConflictStatus,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// A conflict plus everything that happened to it since detection.
///
/// Terminal records are immutable. A later divergence on the same resource
/// gets a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub description: ConflictDescription,
    pub history: Vec<StatusChange>,
    pub result: Option<ResolutionResult>,
    /// Resolution attempts so far, successful or not.
    pub attempts: u32,
}

impl ConflictRecord {
    pub fn new(description: ConflictDescription) -> Self {
        Self {
            description,
            history: Vec::new(),
            result: None,
            attempts: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.description.conflict_id
    }

    pub fn status(&self) -> ConflictStatus {
        self.description.status
    }

    pub fn transition(
        &mut self,
        to: ConflictStatus,
        reason: impl Into<String>,
    ) -> MindSyncResult<()> {
        let from = self.status();
        if !from.can_transition_to(to) {
            return Err(MindSyncError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let reason = reason.into();
        debug!(conflict_id = %self.id(), %from, %to, %reason, "conflict status changed");
        self.history.push(StatusChange {
            from,
            to,
            at: Utc::now(),
            reason,
        });
        self.description.status = to;
        Ok(())
    }

    /// Pending or analyzing.
    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn requires_user_input(&self) -> bool {
        self.is_active() && self.description.requires_user_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mindsync_core::models::{ClinicalPayload, VectorClock};
    use test_fixtures::{phq9_consistent, stale_signal, state_for, stored, update_op};

    use crate::ConflictDetector;

    fn record() -> ConflictRecord {
        let local = ClinicalPayload::AssessmentScore(phq9_consistent(
            "a-1",
            &[1, 1, 1, 1, 1, 1, 1, 1, 0],
        ));
        let remote = ClinicalPayload::AssessmentScore(phq9_consistent(
            "a-1",
            &[2, 1, 1, 1, 1, 1, 1, 1, 1],
        ));
        let op = update_op("a-1", local, "phone-1", VectorClock::new());
        let server = stored(2, state_for("a-1", remote, "tablet-1"));
        let description = ConflictDetector::default()
            .detect_conflict(
                &op,
                Some(&server),
                Some(&stale_signal("a-1", Some(1), Some(2))),
            )
            .expect("signal present");
        ConflictRecord::new(description)
    }

    #[test]
    fn happy_path_records_history() {
        let mut rec = record();
        rec.transition(ConflictStatus::Analyzing, "scheduled").unwrap();
        rec.transition(ConflictStatus::ResolvedAutomatic, "therapeutic_priority")
            .unwrap();
        assert_eq!(rec.status(), ConflictStatus::ResolvedAutomatic);
        assert_eq!(rec.history.len(), 2);
        assert!(!rec.is_active());
    }

    #[test]
    fn terminal_record_rejects_transitions() {
        let mut rec = record();
        rec.transition(ConflictStatus::Failed, "storage down").unwrap();
        let err = rec.transition(ConflictStatus::Pending, "retry").unwrap_err();
        assert!(matches!(err, MindSyncError::InvalidStateTransition { .. }));
        assert_eq!(rec.history.len(), 1);
    }

    #[test]
    fn failed_merge_returns_to_pending() {
        let mut rec = record();
        rec.transition(ConflictStatus::Analyzing, "attempt").unwrap();
        rec.transition(ConflictStatus::Pending, "merge failed").unwrap();
        assert!(rec.is_active());
    }

    #[test]
    fn skipping_analysis_is_rejected() {
        let mut rec = record();
        assert!(rec
            .transition(ConflictStatus::ResolvedManual, "too early")
            .is_err());
    }
}
