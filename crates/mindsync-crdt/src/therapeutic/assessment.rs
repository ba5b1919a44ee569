//! PHQ-9 / GAD-7 results. Merge keeps the clinically more accurate candidate.

use std::cmp::Ordering;

use chrono::Duration;
use mindsync_core::constants::{
    INCOMPLETE_RESPONSES_ACCURACY_CAP, MAX_ITEM_SCORE, MISMATCHED_TOTAL_ACCURACY_CAP,
};
use mindsync_core::errors::{MergeError, MindSyncResult};
use mindsync_core::models::{
    AssessmentScore, ClinicalPayload, ConstraintValidationResult, CrdtState, Operation,
    OperationType, RiskLevel, TherapeuticConstraintKind, UserIntent,
};

use super::common::{
    commit, ensure_same_resource, merged_state, precheck, recency_cmp, reject_if_blocked,
};
use super::{MergeResult, MergeWinner, OperationResult, TherapeuticCrdt};

/// Allowed gap between a completion timestamp and the submitting device's clock.
const COMPLETION_CLOCK_SKEW_MINUTES: i64 = 5;

/// Clinical accuracy of a scored assessment, in [0, 1].
///
/// Out-of-range answers or an impossible total score 0.0. A wrong number of
/// answers caps accuracy at 0.3, and a stored total that disagrees with the
/// answers caps it at 0.5.
pub fn assessment_accuracy(score: &AssessmentScore) -> f64 {
    let instrument = score.assessment_type;
    let out_of_range = score.responses.iter().any(|&r| r > MAX_ITEM_SCORE)
        || score.total_score > instrument.max_total();
    if out_of_range {
        return 0.0;
    }

    let mut accuracy: f64 = 1.0;
    if score.responses.len() != instrument.question_count() {
        accuracy = accuracy.min(INCOMPLETE_RESPONSES_ACCURACY_CAP);
    }
    if score.computed_total() != score.total_score {
        accuracy = accuracy.min(MISMATCHED_TOTAL_ACCURACY_CAP);
    }
    accuracy
}

fn score_of(state: &CrdtState) -> MindSyncResult<&AssessmentScore> {
    match &state.value {
        ClinicalPayload::AssessmentScore(score) => Ok(score),
        other => Err(MergeError::ShapeMismatch {
            resource_id: state.id.clone(),
            details: format!("expected assessment_score, found {}", other.clinical_type()),
        }
        .into()),
    }
}

/// Register over one assessment result.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentScoreCrdt {
    state: CrdtState,
}

impl AssessmentScoreCrdt {
    pub fn score(&self) -> MindSyncResult<&AssessmentScore> {
        score_of(&self.state)
    }

    pub fn accuracy(&self) -> MindSyncResult<f64> {
        self.score().map(assessment_accuracy)
    }
}

impl TherapeuticCrdt for AssessmentScoreCrdt {
    fn from_state(state: CrdtState) -> MindSyncResult<Self> {
        score_of(&state)?;
        Ok(Self { state })
    }

    fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult> {
        ensure_same_resource(&self.state, &remote.state)?;
        let local_accuracy = self.accuracy()?;
        let remote_accuracy = remote.accuracy()?;

        let remote_wins = match local_accuracy.total_cmp(&remote_accuracy) {
            Ordering::Greater => false,
            Ordering::Less => true,
            Ordering::Equal => recency_cmp(&self.state, &remote.state) == Ordering::Less,
        };
        let (source, winner, accuracy) = if remote_wins {
            (&remote.state, MergeWinner::Remote, remote_accuracy)
        } else {
            (&self.state, MergeWinner::Local, local_accuracy)
        };

        let note = format!(
            "kept candidate with accuracy {accuracy:.2} (local {local_accuracy:.2}, remote {remote_accuracy:.2})"
        );
        let state = merged_state(
            &self.state,
            &remote.state,
            source.value.clone(),
            source.last_writer.clone(),
            accuracy,
        );
        Ok(MergeResult {
            state,
            winner,
            notes: vec![note],
        })
    }

    fn validate_therapeutic_constraints(&self, op: &Operation) -> ConstraintValidationResult {
        let mut result = ConstraintValidationResult::passed();
        let ClinicalPayload::AssessmentScore(candidate) = &op.operation_data else {
            return result;
        };
        let constraints = &self.state.constraints;
        let instrument = candidate.assessment_type;

        if constraints.preserve_assessment_scores {
            if candidate.responses.iter().any(|&r| r > MAX_ITEM_SCORE)
                || candidate.total_score > instrument.max_total()
            {
                result.push(
                    TherapeuticConstraintKind::PreserveAssessmentScores,
                    RiskLevel::Critical,
                    "answer or total outside the instrument's range",
                    "re-administer the assessment",
                );
            }
            if candidate.responses.len() != instrument.question_count() {
                result.push(
                    TherapeuticConstraintKind::PreserveAssessmentScores,
                    RiskLevel::High,
                    format!(
                        "{} answers recorded for a {}-item instrument",
                        candidate.responses.len(),
                        instrument.question_count()
                    ),
                    "complete every item before submitting",
                );
            }
            if candidate.computed_total() != candidate.total_score {
                result.push(
                    TherapeuticConstraintKind::PreserveAssessmentScores,
                    RiskLevel::High,
                    "stored total does not match the recorded answers",
                    "recompute the total from the answers",
                );
            }
        }

        if constraints.validate_clinical_sequence && op.operation_type == OperationType::Update {
            if let Ok(current) = self.score() {
                if current.assessment_id != candidate.assessment_id {
                    result.push(
                        TherapeuticConstraintKind::ValidateClinicalSequence,
                        RiskLevel::Critical,
                        "update targets a different assessment",
                        "record the result as a new assessment",
                    );
                } else if candidate.completed_at < current.completed_at
                    && op.user_intent != UserIntent::Correct
                {
                    result.push(
                        TherapeuticConstraintKind::ValidateClinicalSequence,
                        RiskLevel::Medium,
                        "older completion would overwrite a newer result",
                        "mark the operation as a correction",
                    );
                }
            }
        }

        let skew_limit = op.timestamp + Duration::minutes(COMPLETION_CLOCK_SKEW_MINUTES);
        if constraints.ensure_therapeutic_timing && candidate.completed_at > skew_limit {
            result.push(
                TherapeuticConstraintKind::EnsureTherapeuticTiming,
                RiskLevel::Low,
                "completion time is ahead of the device clock",
                "resynchronize the device clock",
            );
        }

        result
    }

    fn apply_operation(&mut self, op: &Operation) -> MindSyncResult<OperationResult> {
        if let Some(duplicate) = precheck(&self.state, op)? {
            return Ok(duplicate);
        }
        let validation = self.validate_therapeutic_constraints(op);
        reject_if_blocked(&self.state, &validation)?;

        let accuracy = match (&op.operation_data, op.operation_type) {
            (_, OperationType::Tombstone) => self.state.clinical_metadata.clinical_accuracy,
            (ClinicalPayload::AssessmentScore(score), _) => assessment_accuracy(score),
            _ => self.state.clinical_metadata.clinical_accuracy,
        };
        Ok(commit(
            &mut self.state,
            op,
            op.operation_data.clone(),
            validation,
            accuracy,
        ))
    }

    fn current_state(&self) -> &CrdtState {
        &self.state
    }

    fn into_state(self) -> CrdtState {
        self.state
    }
}
