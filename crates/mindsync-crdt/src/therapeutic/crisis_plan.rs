//! Crisis/safety plans. Merges are additive: no contact, warning sign, or
//! coping strategy seen by either replica is dropped, and the canonical
//! hotline is always present.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::Duration;
use mindsync_core::constants::CRISIS_HOTLINE;
use mindsync_core::errors::{MergeError, MindSyncResult};
use mindsync_core::models::{
    ClinicalPayload, ConstraintValidationResult, CrdtState, CrisisSafetyPlan, EmergencyContact,
    Operation, OperationType, RiskLevel, TherapeuticConstraintKind,
};

use super::common::{
    commit, ensure_same_resource, merged_state, precheck, recency_cmp, reject_if_blocked,
};
use super::{MergeResult, MergeWinner, OperationResult, TherapeuticCrdt};

const PLAN_CLOCK_SKEW_MINUTES: i64 = 5;

/// Fold `sources` into `plan` and pin the hotline.
///
/// Contacts are deduplicated by [`EmergencyContact::identity`], first
/// occurrence wins, so entries already in `plan` keep their position and
/// wording. The canonical hotline contact is appended when missing and
/// `crisis_hotline` is reset to the canonical number.
pub fn enforce_safety_invariants(plan: &mut CrisisSafetyPlan, sources: &[&CrisisSafetyPlan]) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let candidates: Vec<EmergencyContact> = std::mem::take(&mut plan.emergency_contacts)
        .into_iter()
        .chain(
            sources
                .iter()
                .flat_map(|source| source.emergency_contacts.iter().cloned()),
        )
        .collect();
    for contact in candidates {
        if seen.insert(contact.identity()) {
            plan.emergency_contacts.push(contact);
        }
    }
    dedupe(&mut plan.warning_signs);
    dedupe(&mut plan.coping_strategies);
    for source in sources {
        union_into(&mut plan.warning_signs, &source.warning_signs);
        union_into(&mut plan.coping_strategies, &source.coping_strategies);
    }
    if !plan.has_hotline_contact() {
        plan.emergency_contacts.push(EmergencyContact::crisis_hotline());
    }
    plan.crisis_hotline = CRISIS_HOTLINE.to_string();
}

fn dedupe(items: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

fn union_into(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn plan_of(state: &CrdtState) -> MindSyncResult<&CrisisSafetyPlan> {
    match &state.value {
        ClinicalPayload::CrisisSafetyPlan(plan) => Ok(plan),
        other => Err(MergeError::ShapeMismatch {
            resource_id: state.id.clone(),
            details: format!("expected crisis_safety_plan, found {}", other.clinical_type()),
        }
        .into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrisisPlanCrdt {
    state: CrdtState,
}

impl CrisisPlanCrdt {
    pub fn plan(&self) -> MindSyncResult<&CrisisSafetyPlan> {
        plan_of(&self.state)
    }
}

impl TherapeuticCrdt for CrisisPlanCrdt {
    fn from_state(state: CrdtState) -> MindSyncResult<Self> {
        plan_of(&state)?;
        Ok(Self { state })
    }

    fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult> {
        ensure_same_resource(&self.state, &remote.state)?;
        let local_plan = self.plan()?;
        let remote_plan = remote.plan()?;

        let (base_state, base, other, side) =
            if recency_cmp(&self.state, &remote.state) == Ordering::Less {
                (&remote.state, remote_plan, local_plan, MergeWinner::Remote)
            } else {
                (&self.state, local_plan, remote_plan, MergeWinner::Local)
            };

        let mut merged = base.clone();
        enforce_safety_invariants(&mut merged, &[other]);
        let winner = if &merged == base {
            side
        } else {
            MergeWinner::Combined
        };
        let notes = vec![format!(
            "merged safety plan: {} contacts, {} warning signs, {} coping strategies",
            merged.emergency_contacts.len(),
            merged.warning_signs.len(),
            merged.coping_strategies.len()
        )];

        let state = merged_state(
            &self.state,
            &remote.state,
            ClinicalPayload::CrisisSafetyPlan(merged),
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
        let ClinicalPayload::CrisisSafetyPlan(candidate) = &op.operation_data else {
            return result;
        };
        let constraints = &self.state.constraints;

        if constraints.maintain_crisis_thresholds {
            if candidate.crisis_hotline != CRISIS_HOTLINE {
                result.push(
                    TherapeuticConstraintKind::MaintainCrisisThresholds,
                    RiskLevel::Critical,
                    "crisis hotline differs from the canonical number",
                    "restore the canonical crisis hotline",
                );
            }
            if !candidate.has_hotline_contact() {
                result.push(
                    TherapeuticConstraintKind::MaintainCrisisThresholds,
                    RiskLevel::Medium,
                    "hotline contact missing from emergency contacts",
                    "the hotline contact is restored automatically",
                );
            }
            if candidate
                .emergency_contacts
                .iter()
                .all(EmergencyContact::is_crisis_hotline)
            {
                result.push(
                    TherapeuticConstraintKind::MaintainCrisisThresholds,
                    RiskLevel::Medium,
                    "no personal emergency contact on the plan",
                    "encourage adding a trusted contact",
                );
            }
            if let Ok(current) = self.plan() {
                let removed = current
                    .contact_identities()
                    .difference(&candidate.contact_identities())
                    .count();
                if removed > 0 && op.operation_type == OperationType::Update {
                    result.push(
                        TherapeuticConstraintKind::MaintainCrisisThresholds,
                        RiskLevel::Medium,
                        format!("{removed} emergency contact(s) removed"),
                        "confirm the removal with the user",
                    );
                }
            }
        }

        if constraints.validate_clinical_sequence {
            if candidate.plan_id.trim().is_empty() {
                result.push(
                    TherapeuticConstraintKind::ValidateClinicalSequence,
                    RiskLevel::Critical,
                    "safety plan has no plan id",
                    "regenerate the plan identifier",
                );
            } else if let Ok(current) = self.plan() {
                if current.plan_id != candidate.plan_id {
                    result.push(
                        TherapeuticConstraintKind::ValidateClinicalSequence,
                        RiskLevel::Critical,
                        "operation targets a different safety plan",
                        "create a separate safety plan record",
                    );
                }
            }
        }

        let skew_limit = op.timestamp + Duration::minutes(PLAN_CLOCK_SKEW_MINUTES);
        if constraints.ensure_therapeutic_timing && candidate.updated_at > skew_limit {
            result.push(
                TherapeuticConstraintKind::EnsureTherapeuticTiming,
                RiskLevel::Low,
                "plan update time is ahead of the device clock",
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

        let value = match &op.operation_data {
            ClinicalPayload::CrisisSafetyPlan(plan) => {
                let mut plan = plan.clone();
                enforce_safety_invariants(&mut plan, &[]);
                ClinicalPayload::CrisisSafetyPlan(plan)
            }
            other => other.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan(contacts: Vec<EmergencyContact>) -> CrisisSafetyPlan {
        CrisisSafetyPlan {
            plan_id: "plan-1".to_string(),
            warning_signs: vec!["isolating".to_string()],
            coping_strategies: Vec::new(),
            emergency_contacts: contacts,
            crisis_hotline: CRISIS_HOTLINE.to_string(),
            notes: String::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn invariants_dedupe_by_phone_digits() {
        let mut base = plan(vec![EmergencyContact::new("Mom", "555-0100")]);
        let other = plan(vec![EmergencyContact::new("Mother", "(555) 0100")]);
        enforce_safety_invariants(&mut base, &[&other]);
        let personal: Vec<_> = base
            .emergency_contacts
            .iter()
            .filter(|c| !c.is_crisis_hotline())
            .collect();
        assert_eq!(personal.len(), 1);
        assert_eq!(personal[0].name, "Mom");
        assert!(base.has_hotline_contact());
    }

    #[test]
    fn invariants_pin_the_hotline() {
        let mut tampered = plan(Vec::new());
        tampered.crisis_hotline = "911".to_string();
        enforce_safety_invariants(&mut tampered, &[]);
        assert_eq!(tampered.crisis_hotline, CRISIS_HOTLINE);
        assert_eq!(tampered.emergency_contacts.len(), 1);
    }
}
