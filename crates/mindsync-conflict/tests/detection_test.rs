//! Conflict classification, severity, urgency, and recommendations.

use chrono::Duration;
use mindsync_conflict::ConflictDetector;
use mindsync_core::models::{
    ClinicalPayload, ConflictDescription, ConflictSeverity, ConflictStatus, ConflictType,
    ConflictUrgency, EntityType, FieldPriority, MergeRule, Operation, ResolutionStrategy,
    VectorClock,
};
use mindsync_core::traits::{VersionConflict, VersionConflictReason};
use serde_json::json;
use test_fixtures::{
    phq9, phq9_consistent, preferences, safety_plan, session_progress, stale_signal, state_for,
    stored, update_op,
};

fn assessment(responses: &[u8]) -> ClinicalPayload {
    ClinicalPayload::AssessmentScore(phq9_consistent("a-1", responses))
}

fn prefs(theme: &str, device: &str) -> ClinicalPayload {
    ClinicalPayload::UserPreference(preferences(&[("theme", json!(theme))], device))
}

fn detect_with(
    detector: &ConflictDetector,
    op: &Operation,
    server: Option<ClinicalPayload>,
    signal: &VersionConflict,
) -> ConflictDescription {
    let server =
        server.map(|payload| stored(2, state_for(&op.resource_id, payload, "tablet-1")));
    detector
        .detect_conflict(op, server.as_ref(), Some(signal))
        .expect("a signal always produces a conflict")
}

fn detect(op: &Operation, server: Option<ClinicalPayload>) -> ConflictDescription {
    detect_with(
        &ConflictDetector::default(),
        op,
        server,
        &stale_signal(&op.resource_id, Some(1), Some(2)),
    )
}

// ── Signal gating ──────────────────────────────────────────────────────────

#[test]
fn no_signal_means_no_conflict() {
    let op = update_op("a-1", assessment(&[1; 9]), "phone-1", VectorClock::new());
    let server = stored(2, state_for("a-1", assessment(&[2; 9]), "tablet-1"));
    assert!(ConflictDetector::default()
        .detect_conflict(&op, Some(&server), None)
        .is_none());
}

// ── Classification ─────────────────────────────────────────────────────────

#[test]
fn assessment_divergence_is_therapeutic() {
    let local = assessment(&[1, 1, 1, 1, 1, 1, 1, 1, 0]);
    let remote = ClinicalPayload::AssessmentScore(phq9("a-1", &[2, 1, 1, 1, 1, 1, 1, 1, 1], 12));
    let op = update_op("a-1", local, "phone-1", VectorClock::new());
    let conflict = detect(&op, Some(remote));

    assert_eq!(conflict.conflict_type, ConflictType::TherapeuticDataConflict);
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert_eq!(conflict.urgency, ConflictUrgency::High);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::TherapeuticPriority);
    assert!(conflict.auto_resolution_possible);
    assert!(conflict.therapeutic_context.involves_assessment);
    assert_eq!(conflict.status, ConflictStatus::Pending);
    assert_eq!(
        conflict.resolution_deadline - conflict.detected_at,
        Duration::seconds(300)
    );

    let fields: Vec<&str> = conflict.field_conflicts.iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields, vec!["responses", "total_score"]);
    assert!(conflict
        .field_conflicts
        .iter()
        .all(|f| f.priority == FieldPriority::Critical && !f.mergeable));
}

#[test]
fn crisis_plan_divergence_is_immediate() {
    let local = ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Mom", "555-0100")]));
    let remote =
        ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Therapist", "555-0199")]));
    let op = update_op("plan-1", local, "phone-1", VectorClock::new());
    let conflict = detect(&op, Some(remote));

    assert_eq!(conflict.conflict_type, ConflictType::CrisisStateConflict);
    assert_eq!(conflict.severity, ConflictSeverity::Critical);
    assert_eq!(conflict.urgency, ConflictUrgency::Immediate);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::CrisisOverride);
    assert!(conflict.crisis_context.involves_crisis_data);
    assert!(conflict.crisis_context.requires_immediate);
    assert_eq!(conflict.crisis_context.safety_fields, vec!["emergency_contacts"]);
    assert_eq!(
        conflict.resolution_deadline - conflict.detected_at,
        Duration::seconds(30)
    );
}

#[test]
fn crisis_flag_wins_over_every_other_classification() {
    let mut op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    op.crisis_flag = true;
    let conflict = detect(&op, Some(prefs("light", "tablet-1")));
    assert_eq!(conflict.conflict_type, ConflictType::CrisisStateConflict);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::CrisisOverride);
}

#[test]
fn missing_server_record_is_deleted_on_server() {
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let conflict = detect(&op, None);

    assert_eq!(conflict.conflict_type, ConflictType::DeletedOnServer);
    assert_eq!(conflict.severity, ConflictSeverity::Medium);
    assert_eq!(conflict.urgency, ConflictUrgency::Medium);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::ServerWins);
    assert!(conflict.server.tombstoned);
    assert!(conflict.field_conflicts.iter().all(|f| f.server_value.is_null()));
}

#[test]
fn tombstoned_server_record_is_deleted_on_server() {
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let mut state = state_for("p-1", prefs("light", "tablet-1"), "tablet-1");
    state.tombstoned = true;
    let conflict = ConflictDetector::default()
        .detect_conflict(
            &op,
            Some(&stored(3, state)),
            Some(&stale_signal("p-1", Some(2), Some(3))),
        )
        .unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::DeletedOnServer);
}

#[test]
fn different_clinical_types_are_a_schema_mismatch() {
    let op = update_op("r-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let conflict = detect(
        &op,
        Some(ClinicalPayload::SessionProgress(session_progress("s-1", 2, 5))),
    );

    assert_eq!(conflict.conflict_type, ConflictType::SchemaMismatch);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::UserChoice);
    assert!(!conflict.auto_resolution_possible);
    assert!(conflict.requires_user_input());
    assert!(conflict.severity >= ConflictSeverity::Medium);
}

#[test]
fn version_mismatch_on_preferences_smart_merges() {
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let conflict = detect(&op, Some(prefs("light", "tablet-1")));

    assert_eq!(conflict.conflict_type, ConflictType::DataVersionConflict);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::SmartMerge);
    assert_eq!(conflict.severity, ConflictSeverity::Low);
    assert!(conflict.auto_resolution_possible);
    assert_eq!(conflict.field_conflicts.len(), 1);
    assert_eq!(conflict.field_conflicts[0].field, "entries");
    assert_eq!(conflict.field_conflicts[0].merge_rule, MergeRule::ObjectMerge);
}

#[test]
fn same_version_race_is_simultaneous_modification() {
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let conflict = detect_with(
        &ConflictDetector::default(),
        &op,
        Some(prefs("light", "tablet-1")),
        &stale_signal("p-1", Some(2), Some(2)),
    );
    assert_eq!(conflict.conflict_type, ConflictType::SimultaneousModification);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::TimestampBased);
}

#[test]
fn permission_change_prefers_server() {
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let signal = VersionConflict {
        resource_id: "p-1".to_string(),
        expected_version: Some(2),
        actual_version: Some(2),
        reason: VersionConflictReason::PermissionChanged,
    };
    let conflict = detect_with(
        &ConflictDetector::default(),
        &op,
        Some(prefs("light", "tablet-1")),
        &signal,
    );
    assert_eq!(conflict.conflict_type, ConflictType::PermissionChanged);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::ServerWins);
}

#[test]
fn billing_entities_classify_before_deletion() {
    let mut payment = update_op("pay-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    payment.entity_type = EntityType::Payment;
    let conflict = detect(&payment, None);
    assert_eq!(conflict.conflict_type, ConflictType::PaymentStateConflict);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::ServerWins);

    let mut tier = update_op("sub-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    tier.entity_type = EntityType::Subscription;
    let conflict = detect(&tier, Some(prefs("light", "tablet-1")));
    assert_eq!(conflict.conflict_type, ConflictType::SubscriptionTierConflict);
    assert_eq!(conflict.severity, ConflictSeverity::High);
}

// ── Urgency ────────────────────────────────────────────────────────────────

#[test]
fn bypass_queue_is_immediate() {
    let mut op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    op.bypass_queue = true;
    let conflict = detect(&op, Some(prefs("light", "tablet-1")));
    assert_eq!(conflict.urgency, ConflictUrgency::Immediate);
}

#[test]
fn low_priority_background_writes_are_low_urgency() {
    let mut op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    op.priority_level = mindsync_core::models::PriorityLevel::SyncLow;
    let conflict = detect(&op, Some(prefs("light", "tablet-1")));
    assert_eq!(conflict.urgency, ConflictUrgency::Low);
    assert_eq!(
        conflict.resolution_deadline - conflict.detected_at,
        Duration::hours(2)
    );
}

// ── Recorded preferences ───────────────────────────────────────────────────

#[test]
fn recorded_preference_replaces_the_table() {
    let detector = ConflictDetector::default();
    detector.record_user_preference(
        ConflictType::DataVersionConflict,
        EntityType::UserPreference,
        ResolutionStrategy::ClientWins,
    );
    let op = update_op("p-1", prefs("dark", "phone-1"), "phone-1", VectorClock::new());
    let conflict = detect_with(
        &detector,
        &op,
        Some(prefs("light", "tablet-1")),
        &stale_signal("p-1", Some(1), Some(2)),
    );
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::ClientWins);
}

#[test]
fn recorded_preference_cannot_displace_crisis_override() {
    let detector = ConflictDetector::default();
    detector.record_user_preference(
        ConflictType::CrisisStateConflict,
        EntityType::CrisisPlan,
        ResolutionStrategy::ServerWins,
    );
    let op = update_op(
        "plan-1",
        ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Mom", "555-0100")])),
        "phone-1",
        VectorClock::new(),
    );
    let conflict = detect_with(
        &detector,
        &op,
        Some(ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[]))),
        &stale_signal("plan-1", Some(1), Some(2)),
    );
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::CrisisOverride);
}

#[test]
fn smart_merge_preference_escalates_on_unmergeable_clinical_fields() {
    let detector = ConflictDetector::default();
    detector.record_user_preference(
        ConflictType::TherapeuticDataConflict,
        EntityType::Assessment,
        ResolutionStrategy::SmartMerge,
    );
    let op = update_op("a-1", assessment(&[1; 9]), "phone-1", VectorClock::new());
    let conflict = detect_with(
        &detector,
        &op,
        Some(assessment(&[2; 9])),
        &stale_signal("a-1", Some(1), Some(2)),
    );
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::TherapeuticPriority);
}
