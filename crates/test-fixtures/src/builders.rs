//! Builders for payloads, snapshots, and operations.

use chrono::{DateTime, Duration, Utc};
use mindsync_core::constants::CRISIS_HOTLINE;
use mindsync_core::models::{
    AssessmentScore, AssessmentType, ClinicalPayload, CrdtState, CrisisSafetyPlan, DeviceId,
    EmergencyContact, EntityType, Operation, OperationType, PreferenceEntry, PriorityLevel,
    SessionProgress, UserPreference, VectorClock,
};
use mindsync_core::traits::{VersionConflict, VersionConflictReason, VersionedState};

/// A fixed instant `secs` seconds after 2024-01-01T00:00:00Z, so ordering in
/// tests never depends on the wall clock.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        + Duration::seconds(secs)
}

/// PHQ-9 with an explicit stored total (which may disagree with the answers).
pub fn phq9(assessment_id: &str, responses: &[u8], total_score: u32) -> AssessmentScore {
    AssessmentScore {
        assessment_id: assessment_id.to_string(),
        assessment_type: AssessmentType::Phq9,
        responses: responses.to_vec(),
        total_score,
        completed_at: at(0),
    }
}

/// PHQ-9 whose stored total equals the sum of its answers.
pub fn phq9_consistent(assessment_id: &str, responses: &[u8]) -> AssessmentScore {
    let total = responses.iter().map(|&r| u32::from(r)).sum();
    phq9(assessment_id, responses, total)
}

pub fn gad7_consistent(assessment_id: &str, responses: &[u8]) -> AssessmentScore {
    AssessmentScore {
        assessment_type: AssessmentType::Gad7,
        ..phq9_consistent(assessment_id, responses)
    }
}

/// A safety plan with the hotline contact plus `(name, phone)` contacts.
pub fn safety_plan(plan_id: &str, contacts: &[(&str, &str)]) -> CrisisSafetyPlan {
    let mut emergency_contacts = vec![EmergencyContact::crisis_hotline()];
    emergency_contacts.extend(
        contacts
            .iter()
            .map(|(name, phone)| EmergencyContact::new(*name, *phone)),
    );
    CrisisSafetyPlan {
        plan_id: plan_id.to_string(),
        warning_signs: vec!["withdrawing from friends".to_string()],
        coping_strategies: vec!["paced breathing".to_string()],
        emergency_contacts,
        crisis_hotline: CRISIS_HOTLINE.to_string(),
        notes: String::new(),
        updated_at: at(0),
    }
}

pub fn session_progress(session_id: &str, current_step: u32, total_steps: u32) -> SessionProgress {
    SessionProgress {
        session_id: session_id.to_string(),
        exercise_id: "breathing-101".to_string(),
        current_step,
        total_steps,
        completed_steps: (1..current_step).collect(),
        practice_seconds: Default::default(),
        is_active: true,
        notes: String::new(),
        updated_at: at(0),
    }
}

pub fn preferences(entries: &[(&str, serde_json::Value)], device: &str) -> UserPreference {
    UserPreference {
        entries: entries
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    PreferenceEntry {
                        value: value.clone(),
                        updated_at: at(0),
                        device_id: DeviceId::from(device),
                    },
                )
            })
            .collect(),
        updated_at: at(0),
    }
}

/// The entity type that carries a payload.
pub fn entity_for(payload: &ClinicalPayload) -> EntityType {
    match payload {
        ClinicalPayload::AssessmentScore(_) => EntityType::Assessment,
        ClinicalPayload::CrisisSafetyPlan(_) => EntityType::CrisisPlan,
        ClinicalPayload::SessionProgress(_) => EntityType::SessionProgress,
        ClinicalPayload::UserPreference(_) => EntityType::UserPreference,
    }
}

/// A fresh snapshot written by `device`.
pub fn state_for(resource_id: &str, payload: ClinicalPayload, device: &str) -> CrdtState {
    CrdtState::new(resource_id, payload, device)
}

/// An update operation on `resource_id` from `device`, stamped at [`at`]`(0)`.
pub fn update_op(
    resource_id: &str,
    payload: ClinicalPayload,
    device: &str,
    clock: VectorClock,
) -> Operation {
    op(OperationType::Update, resource_id, payload, device, clock)
}

pub fn op(
    operation_type: OperationType,
    resource_id: &str,
    payload: ClinicalPayload,
    device: &str,
    clock: VectorClock,
) -> Operation {
    let priority = if payload.is_crisis() {
        PriorityLevel::CrisisEmergency
    } else if payload.is_therapeutic() {
        PriorityLevel::TherapeuticHigh
    } else {
        PriorityLevel::UserMedium
    };
    let mut operation = Operation::new(
        operation_type,
        entity_for(&payload),
        resource_id,
        payload,
        device,
        clock,
        priority,
    );
    operation.timestamp = at(0);
    operation
}

/// A stored snapshot at `version`.
pub fn stored(version: u64, state: CrdtState) -> VersionedState {
    VersionedState { version, state }
}

/// The compare-and-swap rejection a stale writer receives.
pub fn stale_signal(
    resource_id: &str,
    expected: Option<u64>,
    actual: Option<u64>,
) -> VersionConflict {
    VersionConflict {
        resource_id: resource_id.to_string(),
        expected_version: expected,
        actual_version: actual,
        reason: VersionConflictReason::StaleVersion,
    }
}
