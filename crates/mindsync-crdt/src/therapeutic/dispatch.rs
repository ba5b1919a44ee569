//! Closed dispatch over the therapeutic CRDT family.

use mindsync_core::errors::{MergeError, MindSyncResult};
use mindsync_core::models::{
    ClinicalPayload, ClinicalType, ConstraintValidationResult, CrdtState, Operation,
};
use tracing::debug;

use super::{
    AssessmentScoreCrdt, CrisisPlanCrdt, MergeResult, OperationResult, SessionProgressCrdt,
    TherapeuticCrdt, UserPreferenceCrdt,
};

/// A replicated record of any clinical type.
#[derive(Debug, Clone, PartialEq)]
pub enum ClinicalCrdt {
    Assessment(AssessmentScoreCrdt),
    CrisisPlan(CrisisPlanCrdt),
    SessionProgress(SessionProgressCrdt),
    Preference(UserPreferenceCrdt),
}

impl ClinicalCrdt {
    /// Pick the CRDT matching the snapshot's payload variant.
    pub fn from_state(state: CrdtState) -> MindSyncResult<Self> {
        Ok(match state.value {
            ClinicalPayload::AssessmentScore(_) => {
                Self::Assessment(AssessmentScoreCrdt::from_state(state)?)
            }
            ClinicalPayload::CrisisSafetyPlan(_) => {
                Self::CrisisPlan(CrisisPlanCrdt::from_state(state)?)
            }
            ClinicalPayload::SessionProgress(_) => {
                Self::SessionProgress(SessionProgressCrdt::from_state(state)?)
            }
            ClinicalPayload::UserPreference(_) => {
                Self::Preference(UserPreferenceCrdt::from_state(state)?)
            }
        })
    }

    pub fn clinical_type(&self) -> ClinicalType {
        self.current_state().clinical_type()
    }

    /// Merge a remote snapshot of the same type. Different variants cannot merge.
    pub fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult> {
        let result = match (self, remote) {
            (Self::Assessment(a), Self::Assessment(b)) => a.merge(b),
            (Self::CrisisPlan(a), Self::CrisisPlan(b)) => a.merge(b),
            (Self::SessionProgress(a), Self::SessionProgress(b)) => a.merge(b),
            (Self::Preference(a), Self::Preference(b)) => a.merge(b),
            (local, remote) => Err(MergeError::ShapeMismatch {
                resource_id: local.current_state().id.clone(),
                details: format!(
                    "cannot merge {} into {}",
                    remote.clinical_type(),
                    local.clinical_type()
                ),
            }
            .into()),
        }?;
        debug!(
            resource_id = %result.state.id,
            winner = ?result.winner,
            "merged replicas"
        );
        Ok(result)
    }

    pub fn validate_therapeutic_constraints(&self, op: &Operation) -> ConstraintValidationResult {
        match self {
            Self::Assessment(c) => c.validate_therapeutic_constraints(op),
            Self::CrisisPlan(c) => c.validate_therapeutic_constraints(op),
            Self::SessionProgress(c) => c.validate_therapeutic_constraints(op),
            Self::Preference(c) => c.validate_therapeutic_constraints(op),
        }
    }

    pub fn apply_operation(&mut self, op: &Operation) -> MindSyncResult<OperationResult> {
        match self {
            Self::Assessment(c) => c.apply_operation(op),
            Self::CrisisPlan(c) => c.apply_operation(op),
            Self::SessionProgress(c) => c.apply_operation(op),
            Self::Preference(c) => c.apply_operation(op),
        }
    }

    pub fn current_state(&self) -> &CrdtState {
        match self {
            Self::Assessment(c) => c.current_state(),
            Self::CrisisPlan(c) => c.current_state(),
            Self::SessionProgress(c) => c.current_state(),
            Self::Preference(c) => c.current_state(),
        }
    }

    pub fn into_state(self) -> CrdtState {
        match self {
            Self::Assessment(c) => c.into_state(),
            Self::CrisisPlan(c) => c.into_state(),
            Self::SessionProgress(c) => c.into_state(),
            Self::Preference(c) => c.into_state(),
        }
    }
}
