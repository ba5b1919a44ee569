//! End-to-end coordinator tests over the in-memory store and a recording transport.

use std::time::Duration;

use mindsync_conflict::ConflictRecord;
use mindsync_core::models::{
    AuditAction, ClinicalPayload, ConflictStatus, ConflictType, ConflictUrgency, DeviceId,
    FieldChoice, FollowUpAction, OperationType, ResolutionStrategy, SyncEnvelope,
    UserConflictChoice, VectorClock,
};
use mindsync_core::{MindSyncConfig, MindSyncError};
use mindsync_sync::audit::{resource_namespace, RESOLUTION_NAMESPACE};
use mindsync_sync::{LocalApplyOutcome, MemoryStateStore, RemoteOutcome, SyncCoordinator};
use serde_json::json;
use test_fixtures::{
    op, phq9_consistent, preferences, safety_plan, session_progress, state_for, update_op,
    RecordingTransport,
};

type Coordinator = SyncCoordinator<MemoryStateStore, RecordingTransport>;

fn coordinator_with(grace_ms: u64, audit_capacity: usize, replay_capacity: usize) -> Coordinator {
    let mut config = MindSyncConfig::default();
    config.sync.device_id = "phone-1".to_string();
    config.resolution.grace_window_ms = grace_ms;
    config.sync.processed_operation_capacity = replay_capacity;
    SyncCoordinator::new(
        MemoryStateStore::new(audit_capacity),
        RecordingTransport::new(),
        config,
    )
}

fn coordinator(grace_ms: u64) -> Coordinator {
    coordinator_with(grace_ms, 100, 10_000)
}

async fn wait_for_status(
    coordinator: &Coordinator,
    conflict_id: &str,
    status: ConflictStatus,
) -> ConflictRecord {
    for _ in 0..300 {
        if let Some(record) = coordinator.conflict(conflict_id) {
            if record.status() == status {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("conflict {conflict_id} never reached {status}");
}

async fn wait_until_settled(coordinator: &Coordinator, conflict_id: &str) -> ConflictRecord {
    for _ in 0..300 {
        if let Some(record) = coordinator.conflict(conflict_id) {
            if record.status().is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("conflict {conflict_id} never settled");
}

async fn create(coordinator: &Coordinator, resource_id: &str, payload: ClinicalPayload) {
    let outcome = coordinator
        .apply_local_operation(op(
            OperationType::Create,
            resource_id,
            payload,
            "phone-1",
            VectorClock::new(),
        ))
        .await
        .unwrap();
    assert!(matches!(outcome, LocalApplyOutcome::Applied { version: 1, .. }));
}

fn expect_conflict(outcome: LocalApplyOutcome) -> mindsync_core::models::ConflictDescription {
    match outcome {
        LocalApplyOutcome::Conflict(description) => description,
        other => panic!("expected a conflict, got {other:?}"),
    }
}

fn prefs(theme: &str) -> ClinicalPayload {
    ClinicalPayload::UserPreference(preferences(&[("theme", json!(theme))], "phone-1"))
}

// ── Local apply ──

#[tokio::test]
async fn crisis_plan_create_commits_audits_and_pushes() {
    let coordinator = coordinator(20);
    let plan = ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Mom", "555-0100")]));
    create(&coordinator, "plan-1", plan).await;

    assert_eq!(coordinator.store().version_of("plan-1"), Some(1));
    assert_eq!(coordinator.transport().pushed_count(), 1);
    let pushed = coordinator.transport().pushed();
    assert_eq!(pushed[0].state.id, "plan-1");
    assert!(pushed[0].operation.is_some());

    let audit = coordinator
        .audit_log(&resource_namespace("plan-1"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::OperationApplied);
}

#[tokio::test]
async fn preferences_propagate_lazily() {
    let coordinator = coordinator(20);
    create(&coordinator, "prefs-1", prefs("light")).await;
    assert_eq!(coordinator.transport().pushed_count(), 0);
}

#[tokio::test]
async fn offline_transport_keeps_the_local_commit() {
    let coordinator = coordinator(20);
    coordinator.transport().set_offline(true);
    let plan = ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Mom", "555-0100")]));
    let outcome = coordinator
        .apply_local_operation(op(
            OperationType::Create,
            "plan-1",
            plan,
            "phone-1",
            VectorClock::new(),
        ))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        LocalApplyOutcome::Applied {
            version: 1,
            pushed: false,
            ..
        }
    ));
    assert_eq!(coordinator.store().version_of("plan-1"), Some(1));
}

#[tokio::test]
async fn duplicate_delivery_applies_once() {
    let coordinator = coordinator(20);
    let first = op(
        OperationType::Create,
        "prefs-1",
        prefs("light"),
        "phone-1",
        VectorClock::new(),
    );
    let outcome = coordinator.apply_local_operation(first.clone()).await.unwrap();
    assert!(matches!(outcome, LocalApplyOutcome::Applied { version: 1, .. }));

    let replay = coordinator.apply_local_operation(first).await.unwrap();
    assert_eq!(replay, LocalApplyOutcome::Duplicate);
    assert_eq!(coordinator.store().version_of("prefs-1"), Some(1));
    let audit = coordinator
        .audit_log(&resource_namespace("prefs-1"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn replay_is_caught_by_the_state_after_the_replay_window_evicts() {
    let coordinator = coordinator_with(20, 100, 1);
    let first = op(
        OperationType::Create,
        "prefs-1",
        prefs("light"),
        "phone-1",
        VectorClock::new(),
    );
    coordinator.apply_local_operation(first.clone()).await.unwrap();
    let second = update_op("prefs-1", prefs("dark"), "phone-1", VectorClock::new());
    coordinator.apply_local_operation(second).await.unwrap();

    let replay = coordinator.apply_local_operation(first).await.unwrap();
    assert_eq!(replay, LocalApplyOutcome::Duplicate);
    assert_eq!(coordinator.store().version_of("prefs-1"), Some(2));
}

#[tokio::test]
async fn audit_log_is_capped() {
    let coordinator = coordinator_with(20, 3, 10_000);
    create(&coordinator, "prefs-1", prefs("light")).await;
    for theme in ["dark", "sepia", "contrast", "light"] {
        let outcome = coordinator
            .apply_local_operation(update_op(
                "prefs-1",
                prefs(theme),
                "phone-1",
                VectorClock::new(),
            ))
            .await
            .unwrap();
        assert!(matches!(outcome, LocalApplyOutcome::Applied { .. }));
    }
    assert_eq!(coordinator.store().version_of("prefs-1"), Some(5));
    let audit = coordinator
        .audit_log(&resource_namespace("prefs-1"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 3);
}

// ── Conflicts ──

#[tokio::test]
async fn stale_write_becomes_a_conflict_and_auto_resolves_after_the_grace_window() {
    let coordinator = coordinator(20);
    create(&coordinator, "prefs-1", prefs("light")).await;

    let stale = update_op("prefs-1", prefs("dark"), "phone-1", VectorClock::new());
    let outcome = coordinator
        .apply_local_operation_at(stale, Some(0))
        .await
        .unwrap();
    let conflict = expect_conflict(outcome);
    assert_eq!(conflict.conflict_type, ConflictType::DataVersionConflict);
    assert_eq!(conflict.recommended_strategy, ResolutionStrategy::SmartMerge);
    assert!(conflict.auto_resolution_possible);
    assert!(coordinator.is_resolution_scheduled(&conflict.conflict_id));

    let record = wait_for_status(
        &coordinator,
        &conflict.conflict_id,
        ConflictStatus::ResolvedAutomatic,
    )
    .await;
    assert_eq!(record.attempts, 1);
    assert!(record.result.is_some_and(|r| r.resolved));
    assert_eq!(coordinator.store().version_of("prefs-1"), Some(2));

    let stored = coordinator.store().get_state("prefs-1").unwrap();
    match stored.state.value {
        ClinicalPayload::UserPreference(p) => {
            assert_eq!(p.entries["theme"].value, json!("dark"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let audit = coordinator.audit_log(RESOLUTION_NAMESPACE).await.unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::ConflictDetected, AuditAction::ConflictResolved]
    );
}

#[tokio::test]
async fn user_choice_pre_empts_the_scheduled_resolution() {
    let coordinator = coordinator(10_000);
    create(&coordinator, "prefs-1", prefs("light")).await;
    let stale = update_op("prefs-1", prefs("dark"), "phone-1", VectorClock::new());
    let conflict = expect_conflict(
        coordinator
            .apply_local_operation_at(stale, Some(0))
            .await
            .unwrap(),
    );
    assert!(coordinator.is_resolution_scheduled(&conflict.conflict_id));

    let choice = UserConflictChoice {
        field_choices: [("entries".to_string(), FieldChoice::Server)]
            .into_iter()
            .collect(),
        remember_preference: Some(ResolutionStrategy::ServerWins),
    };
    let result = coordinator
        .submit_user_choice(&conflict.conflict_id, choice)
        .await
        .unwrap();
    assert!(result.resolved);
    assert!(!coordinator.is_resolution_scheduled(&conflict.conflict_id));

    let record = coordinator.conflict(&conflict.conflict_id).unwrap();
    assert_eq!(record.status(), ConflictStatus::ResolvedManual);
    let transitions: Vec<ConflictStatus> = record.history.iter().map(|c| c.to).collect();
    assert_eq!(
        transitions,
        vec![ConflictStatus::Analyzing, ConflictStatus::ResolvedManual]
    );

    // The remembered preference applies to the next conflict of the same kind.
    let again = update_op("prefs-1", prefs("sepia"), "phone-1", VectorClock::new());
    let next = expect_conflict(
        coordinator
            .apply_local_operation_at(again, Some(0))
            .await
            .unwrap(),
    );
    assert_eq!(next.recommended_strategy, ResolutionStrategy::ServerWins);
}

#[tokio::test]
async fn crisis_conflict_resolves_while_an_unrelated_choice_waits() {
    let coordinator = coordinator(20);

    let plan = safety_plan("plan-1", &[("Mom", "555-0100")]);
    create(
        &coordinator,
        "plan-1",
        ClinicalPayload::CrisisSafetyPlan(plan.clone()),
    )
    .await;
    create(
        &coordinator,
        "mixed-1",
        ClinicalPayload::SessionProgress(session_progress("s-1", 2, 5)),
    )
    .await;

    // Waits for the user: a preference written over a session record.
    let schema = expect_conflict(
        coordinator
            .apply_local_operation(update_op(
                "mixed-1",
                prefs("dark"),
                "phone-1",
                VectorClock::new(),
            ))
            .await
            .unwrap(),
    );
    assert_eq!(schema.conflict_type, ConflictType::SchemaMismatch);
    assert!(!schema.auto_resolution_possible);

    let updated = safety_plan("plan-1", &[("Mom", "555-0100"), ("Therapist", "555-0199")]);
    let crisis = expect_conflict(
        coordinator
            .apply_local_operation_at(
                update_op(
                    "plan-1",
                    ClinicalPayload::CrisisSafetyPlan(updated),
                    "phone-1",
                    VectorClock::new(),
                ),
                Some(0),
            )
            .await
            .unwrap(),
    );
    assert_eq!(crisis.conflict_type, ConflictType::CrisisStateConflict);
    assert_eq!(crisis.urgency, ConflictUrgency::Immediate);

    let active = coordinator.get_active_conflicts();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].conflict_id, crisis.conflict_id);

    wait_for_status(
        &coordinator,
        &crisis.conflict_id,
        ConflictStatus::ResolvedAutomatic,
    )
    .await;
    let stored = coordinator.store().get_state("plan-1").unwrap();
    match stored.state.value {
        ClinicalPayload::CrisisSafetyPlan(resolved) => {
            assert!(resolved.has_hotline_contact());
            let names: Vec<&str> = resolved
                .emergency_contacts
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            assert!(names.contains(&"Mom"));
            assert!(names.contains(&"Therapist"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let waiting = coordinator.get_conflicts_requiring_user_input();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].conflict_id, schema.conflict_id);
    assert_eq!(
        coordinator.conflict(&schema.conflict_id).unwrap().status(),
        ConflictStatus::Pending
    );

    let stats = coordinator.get_resolution_statistics();
    assert_eq!(stats.total_conflicts, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.awaiting_user_input, 1);
    assert_eq!(stats.resolved_automatic, 1);
    assert_eq!(
        stats.by_strategy.get(&ResolutionStrategy::CrisisOverride),
        Some(&1)
    );
    assert_eq!(stats.by_conflict_type.get(&ConflictType::SchemaMismatch), Some(&1));
}

#[tokio::test]
async fn resolving_without_a_required_choice_leaves_the_conflict_pending() {
    let coordinator = coordinator(20);
    create(
        &coordinator,
        "mixed-1",
        ClinicalPayload::SessionProgress(session_progress("s-1", 2, 5)),
    )
    .await;
    let schema = expect_conflict(
        coordinator
            .apply_local_operation(update_op(
                "mixed-1",
                prefs("dark"),
                "phone-1",
                VectorClock::new(),
            ))
            .await
            .unwrap(),
    );

    let result = coordinator
        .resolve_conflict(&schema.conflict_id, None)
        .await
        .unwrap();
    assert!(!result.resolved);
    assert_eq!(result.follow_up_actions, vec![FollowUpAction::AwaitUserChoice]);

    let record = coordinator.conflict(&schema.conflict_id).unwrap();
    assert_eq!(record.status(), ConflictStatus::Pending);
    assert_eq!(record.attempts, 1);
    assert_eq!(coordinator.store().version_of("mixed-1"), Some(1));

    // Keeping the stored session record resolves it.
    let result = coordinator
        .submit_user_choice(&schema.conflict_id, UserConflictChoice::default())
        .await
        .unwrap();
    assert!(result.resolved);
    assert_eq!(
        coordinator.conflict(&schema.conflict_id).unwrap().status(),
        ConflictStatus::ResolvedManual
    );
    assert_eq!(coordinator.store().version_of("mixed-1"), Some(2));
}

#[tokio::test]
async fn assessment_auto_resolution_is_escalated_for_review() {
    let coordinator = coordinator(20);
    create(
        &coordinator,
        "phq-1",
        ClinicalPayload::AssessmentScore(phq9_consistent("phq-1", &[1; 9])),
    )
    .await;

    let stale = update_op(
        "phq-1",
        ClinicalPayload::AssessmentScore(phq9_consistent("phq-1", &[2; 9])),
        "phone-1",
        VectorClock::new(),
    );
    let conflict = expect_conflict(
        coordinator
            .apply_local_operation_at(stale, Some(0))
            .await
            .unwrap(),
    );
    assert_eq!(conflict.conflict_type, ConflictType::TherapeuticDataConflict);

    let record = wait_for_status(&coordinator, &conflict.conflict_id, ConflictStatus::Escalated)
        .await;
    assert!(record
        .result
        .is_some_and(|r| r.validation_required && r.resolved));

    let audit = coordinator.audit_log(RESOLUTION_NAMESPACE).await.unwrap();
    assert_eq!(
        audit.last().map(|e| e.action),
        Some(AuditAction::ConflictEscalated)
    );
}

#[tokio::test]
async fn unknown_conflict_is_an_error() {
    let coordinator = coordinator(20);
    let err = coordinator
        .resolve_conflict("missing", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        mindsync_core::MindSyncError::ConflictNotFound { .. }
    ));
}

#[tokio::test]
async fn detect_without_a_signal_records_nothing() {
    let coordinator = coordinator(20);
    let operation = update_op("prefs-1", prefs("dark"), "phone-1", VectorClock::new());
    let detected = coordinator
        .detect_conflict(&operation, None, None)
        .await
        .unwrap();
    assert!(detected.is_none());
    assert!(coordinator.get_active_conflicts().is_empty());
}

#[tokio::test]
async fn late_user_choice_after_auto_resolution_is_reported() {
    let coordinator = coordinator(20);
    create(&coordinator, "prefs-1", prefs("light")).await;
    let stale = update_op("prefs-1", prefs("dark"), "phone-1", VectorClock::new());
    let conflict = expect_conflict(
        coordinator
            .apply_local_operation_at(stale, Some(0))
            .await
            .unwrap(),
    );
    wait_for_status(
        &coordinator,
        &conflict.conflict_id,
        ConflictStatus::ResolvedAutomatic,
    )
    .await;

    let choice = UserConflictChoice {
        field_choices: [("entries".to_string(), FieldChoice::Server)]
            .into_iter()
            .collect(),
        remember_preference: None,
    };
    let err = coordinator
        .submit_user_choice(&conflict.conflict_id, choice)
        .await
        .unwrap_err();
    match err {
        MindSyncError::ConflictAlreadyHandled { id, status } => {
            assert_eq!(id, conflict.conflict_id);
            assert_eq!(status, "resolved_automatic");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(coordinator.store().version_of("prefs-1"), Some(2));
    assert_eq!(
        coordinator.conflict(&conflict.conflict_id).unwrap().status(),
        ConflictStatus::ResolvedAutomatic
    );
}

// ── Writes landing during the grace window ──

#[tokio::test]
async fn crisis_resolution_keeps_contacts_merged_during_the_grace_window() {
    let coordinator = coordinator(200);
    create(
        &coordinator,
        "plan-1",
        ClinicalPayload::CrisisSafetyPlan(safety_plan("plan-1", &[("Mom", "555-0100")])),
    )
    .await;

    let updated = safety_plan("plan-1", &[("Mom", "555-0100"), ("Therapist", "555-0199")]);
    let crisis = expect_conflict(
        coordinator
            .apply_local_operation_at(
                update_op(
                    "plan-1",
                    ClinicalPayload::CrisisSafetyPlan(updated),
                    "phone-1",
                    VectorClock::new(),
                ),
                Some(0),
            )
            .await
            .unwrap(),
    );
    assert!(coordinator.is_resolution_scheduled(&crisis.conflict_id));

    let tablet_plan = safety_plan("plan-1", &[("Mom", "555-0100"), ("Sister", "555-0142")]);
    let envelope = SyncEnvelope::new(
        DeviceId::from("tablet-1"),
        state_for(
            "plan-1",
            ClinicalPayload::CrisisSafetyPlan(tablet_plan),
            "tablet-1",
        ),
        None,
    );
    let outcome = coordinator.receive_remote(envelope).await.unwrap();
    assert!(matches!(outcome, RemoteOutcome::Merged { version: 2, .. }));

    wait_for_status(
        &coordinator,
        &crisis.conflict_id,
        ConflictStatus::ResolvedAutomatic,
    )
    .await;
    assert_eq!(coordinator.store().version_of("plan-1"), Some(3));

    let stored = coordinator.store().get_state("plan-1").unwrap();
    match &stored.state.value {
        ClinicalPayload::CrisisSafetyPlan(resolved) => {
            assert!(resolved.has_hotline_contact());
            let names: Vec<&str> = resolved
                .emergency_contacts
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            for name in ["Mom", "Therapist", "Sister"] {
                assert!(names.contains(&name), "{name} missing from {names:?}");
            }
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Peers receive the combined plan.
    let pushed = coordinator.transport().pushed();
    let last = pushed.last().unwrap();
    assert_eq!(last.state.value, stored.state.value);
}

#[tokio::test]
async fn practice_time_recorded_during_the_grace_window_survives_resolution() {
    let coordinator = coordinator(200);
    let mut initial = session_progress("s-1", 2, 5);
    initial
        .practice_seconds
        .insert(DeviceId::from("phone-1"), 60);
    create(
        &coordinator,
        "session-1",
        ClinicalPayload::SessionProgress(initial),
    )
    .await;

    let mut local = session_progress("s-1", 3, 5);
    local.practice_seconds.insert(DeviceId::from("phone-1"), 90);
    let conflict = expect_conflict(
        coordinator
            .apply_local_operation_at(
                update_op(
                    "session-1",
                    ClinicalPayload::SessionProgress(local),
                    "phone-1",
                    VectorClock::new(),
                ),
                Some(0),
            )
            .await
            .unwrap(),
    );
    assert!(conflict.auto_resolution_possible);

    let mut tablet = session_progress("s-1", 2, 5);
    tablet
        .practice_seconds
        .insert(DeviceId::from("tablet-1"), 120);
    let envelope = SyncEnvelope::new(
        DeviceId::from("tablet-1"),
        state_for(
            "session-1",
            ClinicalPayload::SessionProgress(tablet),
            "tablet-1",
        ),
        None,
    );
    coordinator.receive_remote(envelope).await.unwrap();

    let record = wait_until_settled(&coordinator, &conflict.conflict_id).await;
    assert!(record.result.is_some_and(|r| r.resolved));

    let stored = coordinator.store().get_state("session-1").unwrap();
    match stored.state.value {
        ClinicalPayload::SessionProgress(progress) => {
            assert_eq!(
                progress.practice_seconds.get(&DeviceId::from("tablet-1")),
                Some(&120)
            );
            assert!(progress.practice_seconds[&DeviceId::from("phone-1")] >= 60);
            assert!(progress.current_step >= 2);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}
