//! Bookkeeping shared by every therapeutic CRDT: resource checks, the
//! deterministic recency order, merged metadata, and the apply commit path.

use std::cmp::Ordering;

use mindsync_core::errors::{MergeError, MindSyncResult, ValidationError};
use mindsync_core::models::{
    AuditAction, AuditEntry, ClinicalMetadata, ClinicalPayload, ClinicalType,
    ConstraintValidationResult, CrdtState, DeviceId, Operation, OperationType,
};
use tracing::{debug, warn};

use super::OperationResult;
use crate::clock::VectorClockManager;

/// Two snapshots can only merge when they describe the same resource and payload type.
pub(crate) fn ensure_same_resource(local: &CrdtState, remote: &CrdtState) -> MindSyncResult<()> {
    if local.id != remote.id {
        return Err(MergeError::ShapeMismatch {
            resource_id: local.id.clone(),
            details: format!("remote snapshot belongs to {}", remote.id),
        }
        .into());
    }
    if local.clinical_type() != remote.clinical_type() {
        return Err(MergeError::ShapeMismatch {
            resource_id: local.id.clone(),
            details: format!(
                "cannot merge {} into {}",
                remote.clinical_type(),
                local.clinical_type()
            ),
        }
        .into());
    }
    Ok(())
}

/// Total order on snapshots: payload timestamp, then writer id, then the
/// canonical serialized payload. Identical on every replica.
pub(crate) fn recency_cmp(a: &CrdtState, b: &CrdtState) -> Ordering {
    (a.value.timestamp(), &a.last_writer)
        .cmp(&(b.value.timestamp(), &b.last_writer))
        .then_with(|| canonical(a).cmp(&canonical(b)))
}

fn canonical(state: &CrdtState) -> String {
    serde_json::to_string(&state.value).unwrap_or_default()
}

/// Later of two writers by the recency order.
pub(crate) fn later_writer(local: &CrdtState, remote: &CrdtState) -> DeviceId {
    if recency_cmp(local, remote) == Ordering::Less {
        remote.last_writer.clone()
    } else {
        local.last_writer.clone()
    }
}

/// Everything except the value: merged clock, unioned constraints, operation
/// history, and metadata.
pub(crate) fn merged_state(
    local: &CrdtState,
    remote: &CrdtState,
    value: ClinicalPayload,
    last_writer: DeviceId,
    clinical_accuracy: f64,
) -> CrdtState {
    let mut safety_implications = local.clinical_metadata.safety_implications.clone();
    safety_implications.extend(remote.clinical_metadata.safety_implications.iter().cloned());

    let mut applied_operations = local.applied_operations.clone();
    applied_operations.extend(remote.applied_operations.iter().cloned());

    CrdtState {
        id: local.id.clone(),
        kind: local.kind,
        value,
        vector_clock: VectorClockManager::merge(&[
            local.vector_clock.clone(),
            remote.vector_clock.clone(),
        ]),
        constraints: local.constraints.union(&remote.constraints),
        clinical_metadata: ClinicalMetadata {
            clinical_type: local.clinical_type(),
            clinical_accuracy,
            safety_implications,
            requires_audit: local.clinical_metadata.requires_audit
                || remote.clinical_metadata.requires_audit,
            validated: local.clinical_metadata.validated && remote.clinical_metadata.validated,
        },
        last_writer,
        applied_operations,
        tombstoned: local.tombstoned || remote.tombstoned,
    }
}

/// Early exits before validation. `Ok(Some(_))` is a duplicate replay.
pub(crate) fn precheck(
    state: &CrdtState,
    op: &Operation,
) -> MindSyncResult<Option<OperationResult>> {
    if state.has_applied(&op.operation_id) {
        debug!(
            resource_id = %state.id,
            operation_id = %op.operation_id,
            "operation already applied"
        );
        return Ok(Some(OperationResult::duplicate(state.clone())));
    }
    if op.resource_id != state.id {
        return Err(ValidationError::PayloadMismatch {
            resource_id: state.id.clone(),
            expected: state.id.clone(),
            found: op.resource_id.clone(),
        }
        .into());
    }
    let found = op.operation_data.clinical_type();
    if found != state.clinical_type() {
        return Err(ValidationError::PayloadMismatch {
            resource_id: state.id.clone(),
            expected: state.clinical_type().to_string(),
            found: found.to_string(),
        }
        .into());
    }
    if state.tombstoned {
        return Err(ValidationError::Tombstoned {
            resource_id: state.id.clone(),
        }
        .into());
    }
    Ok(None)
}

/// Fail closed on a critical, non-overridable violation.
pub(crate) fn reject_if_blocked(
    state: &CrdtState,
    validation: &ConstraintValidationResult,
) -> MindSyncResult<()> {
    if !validation.must_reject() {
        return Ok(());
    }
    match validation.blocking_violation() {
        Some(violation) => {
            warn!(
                resource_id = %state.id,
                constraint = %violation.constraint,
                "operation rejected by therapeutic constraint"
            );
            Err(ValidationError::ConstraintViolated {
                resource_id: state.id.clone(),
                constraint: violation.constraint,
                message: violation.message.clone(),
            }
            .into())
        }
        None => Ok(()),
    }
}

/// Fold a validated operation into the state.
pub(crate) fn commit(
    state: &mut CrdtState,
    op: &Operation,
    value: ClinicalPayload,
    validation: ConstraintValidationResult,
    clinical_accuracy: f64,
) -> OperationResult {
    let action = match op.operation_type {
        OperationType::Tombstone => {
            state.tombstoned = true;
            AuditAction::OperationTombstoned
        }
        OperationType::Create | OperationType::Update => {
            state.value = value;
            AuditAction::OperationApplied
        }
    };

    state.vector_clock.observe(&op.vector_clock);
    state.vector_clock = VectorClockManager::increment(&state.vector_clock, &op.device_id);
    state.applied_operations.insert(op.operation_id.clone());
    state.last_writer = op.device_id.clone();
    state.clinical_metadata.clinical_accuracy = clinical_accuracy;
    state.clinical_metadata.validated = validation.valid;
    if op.is_crisis() {
        state
            .clinical_metadata
            .safety_implications
            .insert("crisis_flow".to_string());
    }

    let audit_entry = AuditEntry::new(state.id.clone(), action, op.device_id.clone())
        .with_operation(op.operation_id.clone())
        .with_risk(validation.risk_level);

    debug!(
        resource_id = %state.id,
        operation_id = %op.operation_id,
        risk = ?validation.risk_level,
        "operation applied"
    );

    OperationResult {
        state: state.clone(),
        applied: true,
        duplicate: false,
        propagation_required: state.clinical_type() != ClinicalType::UserPreference,
        validation,
        audit_entry: Some(audit_entry),
    }
}
