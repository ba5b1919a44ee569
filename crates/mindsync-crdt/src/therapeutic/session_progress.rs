//! Exercise/session progress. Completed steps and practice time only grow;
//! the position never regresses.

use std::cmp::Ordering;

use chrono::Duration;
use mindsync_core::errors::{MergeError, MindSyncResult};
use mindsync_core::models::{
    ClinicalPayload, ConstraintValidationResult, CrdtState, Operation, OperationType, RiskLevel,
    SessionProgress, TherapeuticConstraintKind,
};

use super::common::{
    commit, ensure_same_resource, merged_state, precheck, recency_cmp, reject_if_blocked,
};
use super::{MergeResult, MergeWinner, OperationResult, TherapeuticCrdt};
use crate::primitives::{GCounter, GSet};

const PROGRESS_CLOCK_SKEW_MINUTES: i64 = 5;

/// Combine two progress snapshots. `base` supplies the last-writer fields
/// (`is_active`, `notes`, identifiers); everything else grows.
fn combine(base: &SessionProgress, other: &SessionProgress) -> SessionProgress {
    let mut steps = GSet::from_set(base.completed_steps.clone());
    steps.merge(&GSet::from_set(other.completed_steps.clone()));

    let mut practice = GCounter::from_counts(base.practice_seconds.clone());
    practice.merge(&GCounter::from_counts(other.practice_seconds.clone()));

    SessionProgress {
        current_step: base.current_step.max(other.current_step),
        total_steps: base.total_steps.max(other.total_steps),
        completed_steps: steps.into_set(),
        practice_seconds: practice.into_counts(),
        updated_at: base.updated_at.max(other.updated_at),
        ..base.clone()
    }
}

fn progress_of(state: &CrdtState) -> MindSyncResult<&SessionProgress> {
    match &state.value {
        ClinicalPayload::SessionProgress(progress) => Ok(progress),
        other => Err(MergeError::ShapeMismatch {
            resource_id: state.id.clone(),
            details: format!("expected session_progress, found {}", other.clinical_type()),
        }
        .into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgressCrdt {
    state: CrdtState,
}

impl SessionProgressCrdt {
    pub fn progress(&self) -> MindSyncResult<&SessionProgress> {
        progress_of(&self.state)
    }

    /// Total practice time across devices.
    pub fn total_practice_seconds(&self) -> MindSyncResult<u64> {
        let progress = self.progress()?;
        Ok(GCounter::from_counts(progress.practice_seconds.clone()).value())
    }
}

impl TherapeuticCrdt for SessionProgressCrdt {
    fn from_state(state: CrdtState) -> MindSyncResult<Self> {
        progress_of(&state)?;
        Ok(Self { state })
    }

    fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult> {
        ensure_same_resource(&self.state, &remote.state)?;
        let local = self.progress()?;
        let theirs = remote.progress()?;

        let (base_state, base, other, side) =
            if recency_cmp(&self.state, &remote.state) == Ordering::Less {
                (&remote.state, theirs, local, MergeWinner::Remote)
            } else {
                (&self.state, local, theirs, MergeWinner::Local)
            };

        let merged = combine(base, other);
        let winner = if &merged == base {
            side
        } else {
            MergeWinner::Combined
        };
        let notes = vec![format!(
            "merged progress: step {}, {} completed steps",
            merged.current_step,
            merged.completed_steps.len()
        )];

        let state = merged_state(
            &self.state,
            &remote.state,
            ClinicalPayload::SessionProgress(merged),
            base_state.last_writer.clone(),
            1.0,
        );
        Ok(MergeResult {
            state,
            winner,
            notes,
        })
    }

    fn validate_therapeutic_constraints(&self, op: &Operation) -> ConstraintValidationResult {
        let mut result = ConstraintValidationResult::passed();
        let ClinicalPayload::SessionProgress(candidate) = &op.operation_data else {
            return result;
        };
        let constraints = &self.state.constraints;

        if constraints.validate_clinical_sequence {
            if candidate.current_step > candidate.total_steps {
                result.push(
                    TherapeuticConstraintKind::ValidateClinicalSequence,
                    RiskLevel::Critical,
                    format!(
                        "step {} is beyond the exercise's {} steps",
                        candidate.current_step, candidate.total_steps
                    ),
                    "reload the exercise definition",
                );
            }
            if candidate
                .completed_steps
                .iter()
                .any(|&step| step > candidate.total_steps)
            {
                result.push(
                    TherapeuticConstraintKind::ValidateClinicalSequence,
                    RiskLevel::High,
                    "completed step outside the exercise",
                    "drop completion marks for unknown steps",
                );
            }
            if let Ok(current) = self.progress() {
                if op.operation_type == OperationType::Update
                    && current.session_id != candidate.session_id
                {
                    result.push(
                        TherapeuticConstraintKind::ValidateClinicalSequence,
                        RiskLevel::Critical,
                        "operation targets a different session",
                        "start a separate session record",
                    );
                }
            }
        }

        if constraints.ensure_therapeutic_timing {
            if let Ok(current) = self.progress() {
                if candidate.current_step < current.current_step {
                    result.push(
                        TherapeuticConstraintKind::EnsureTherapeuticTiming,
                        RiskLevel::Low,
                        "progress would move backwards",
                        "the furthest step reached is kept",
                    );
                }
            }
            let skew_limit = op.timestamp + Duration::minutes(PROGRESS_CLOCK_SKEW_MINUTES);
            if candidate.updated_at > skew_limit {
                result.push(
                    TherapeuticConstraintKind::EnsureTherapeuticTiming,
                    RiskLevel::Low,
                    "progress update time is ahead of the device clock",
                    "resynchronize the device clock",
                );
            }
        }

        result
    }

    fn apply_operation(&mut self, op: &Operation) -> MindSyncResult<OperationResult> {
        if let Some(duplicate) = precheck(&self.state, op)? {
            return Ok(duplicate);
        }
        let validation = self.validate_therapeutic_constraints(op);
        reject_if_blocked(&self.state, &validation)?;

        let value = match (&op.operation_data, self.progress()) {
            (ClinicalPayload::SessionProgress(candidate), Ok(current)) => {
                ClinicalPayload::SessionProgress(combine(candidate, current))
            }
            (other, _) => other.clone(),
        };
        Ok(commit(&mut self.state, op, value, validation, 1.0))
    }

    fn current_state(&self) -> &CrdtState {
        &self.state
    }

    fn into_state(self) -> CrdtState {
        self.state
    }
}
