//! Conflict detection: classify a rejected local operation against the
//! stored snapshot.
//!
//! Detection only fires when the storage layer surfaced a version-conflict
//! signal. Everything else about the conflict (type, field diff, severity,
//! urgency, deadline, recommended strategy) is derived here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mindsync_core::config::ResolutionConfig;
use mindsync_core::models::{
    ClientSnapshot, ClinicalPayload, ClinicalType, ConflictDescription, ConflictSeverity,
    ConflictStatus, ConflictType, ConflictUrgency, CrisisContext, EntityType, FieldConflict,
    FieldPriority, Operation, PrecedenceTier, PriorityLevel, ResolutionStrategy, ServerSnapshot,
    TherapeuticContext, VectorClock,
};
use mindsync_core::traits::{VersionConflict, VersionConflictReason, VersionedState};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::schema::field_spec;

/// Classifies divergence and recommends a resolution strategy.
///
/// Remembers per-user strategy preferences keyed by
/// `(conflict type, resource type)`.
#[derive(Debug)]
pub struct ConflictDetector {
    config: ResolutionConfig,
    preferences: DashMap<(ConflictType, EntityType), ResolutionStrategy>,
}

impl ConflictDetector {
    pub fn new(config: ResolutionConfig) -> Self {
        Self {
            config,
            preferences: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Remember a preferred strategy for future conflicts of this kind.
    pub fn record_user_preference(
        &self,
        conflict_type: ConflictType,
        resource_type: EntityType,
        strategy: ResolutionStrategy,
    ) {
        debug!(
            %conflict_type,
            %resource_type,
            %strategy,
            "recorded strategy preference"
        );
        self.preferences
            .insert((conflict_type, resource_type), strategy);
    }

    pub fn preference_for(
        &self,
        conflict_type: ConflictType,
        resource_type: EntityType,
    ) -> Option<ResolutionStrategy> {
        self.preferences
            .get(&(conflict_type, resource_type))
            .map(|entry| *entry.value())
    }

    /// Build a conflict description when `signal` is present.
    ///
    /// `server` is the stored snapshot at detection time; `None` means the
    /// record no longer exists. Returns `None` only when there is no signal.
    pub fn detect_conflict(
        &self,
        op: &Operation,
        server: Option<&VersionedState>,
        signal: Option<&VersionConflict>,
    ) -> Option<ConflictDescription> {
        match signal {
            Some(signal) => Some(self.describe(op, server, signal)),
            None => {
                debug!(operation_id = %op.operation_id, "no version conflict signal; nothing to detect");
                None
            }
        }
    }

    /// Classify the divergence behind a rejected write.
    #[instrument(
        skip(self, op, server, signal),
        fields(resource_id = %op.resource_id, operation_id = %op.operation_id)
    )]
    pub fn describe(
        &self,
        op: &Operation,
        server: Option<&VersionedState>,
        signal: &VersionConflict,
    ) -> ConflictDescription {
        let server_payload = server.map(|s| &s.state.value);
        let server_tombstoned = server.is_some_and(|s| s.state.tombstoned);
        let conflict_type = classify(op, server_payload, server_tombstoned, signal);

        let field_conflicts = diff_fields(&op.operation_data, server_payload);
        let clinical_type = op.operation_data.clinical_type();
        let precedence_tier = precedence_tier(&op.operation_data, server_payload);

        let crisis_context = crisis_context(op, server_payload, conflict_type, &field_conflicts);
        let therapeutic_context =
            therapeutic_context(&op.operation_data, server_payload, &field_conflicts);

        let severity = severity(conflict_type, &field_conflicts);
        let urgency = self.urgency(op, conflict_type);

        let mut recommended = recommend(conflict_type, precedence_tier);
        if let Some(preferred) = self.preference_for(conflict_type, op.entity_type) {
            recommended = preferred;
        }
        if crisis_context.requires_immediate {
            recommended = ResolutionStrategy::CrisisOverride;
        }

        let detected_at = Utc::now();
        let mut description = ConflictDescription {
            conflict_id: uuid::Uuid::new_v4().to_string(),
            resource_id: op.resource_id.clone(),
            resource_type: op.entity_type,
            clinical_type,
            conflict_type,
            severity,
            urgency,
            precedence_tier,
            field_conflicts,
            recommended_strategy: recommended,
            auto_resolution_possible: false,
            crisis_context,
            therapeutic_context,
            client: ClientSnapshot {
                operation_id: op.operation_id.clone(),
                device_id: op.device_id.clone(),
                payload: op.operation_data.clone(),
                vector_clock: op.vector_clock.clone(),
                priority_level: op.priority_level,
                timestamp: op.timestamp,
            },
            server: server_snapshot(server),
            status: ConflictStatus::Pending,
            detected_at,
            resolution_deadline: deadline(detected_at, self.config.deadline_for(urgency)),
        };

        if description.recommended_strategy == ResolutionStrategy::SmartMerge
            && description.has_unmergeable_critical_therapeutic_field()
        {
            warn!(
                conflict_id = %description.conflict_id,
                "smart merge would drop critical therapeutic fields; escalating"
            );
            description.recommended_strategy = ResolutionStrategy::TherapeuticPriority;
        }
        description.auto_resolution_possible = auto_resolution_possible(&description);

        info!(
            conflict_id = %description.conflict_id,
            conflict_type = %description.conflict_type,
            severity = ?description.severity,
            urgency = ?description.urgency,
            strategy = %description.recommended_strategy,
            fields = description.field_conflicts.len(),
            auto = description.auto_resolution_possible,
            "conflict detected"
        );
        description
    }

    fn urgency(&self, op: &Operation, conflict_type: ConflictType) -> ConflictUrgency {
        if conflict_type == ConflictType::CrisisStateConflict || op.is_crisis() || op.bypass_queue
        {
            ConflictUrgency::Immediate
        } else if conflict_type == ConflictType::TherapeuticDataConflict
            || op.priority_level.value() >= self.config.high_urgency_priority_threshold
        {
            ConflictUrgency::High
        } else if op.priority_level >= PriorityLevel::UserMedium {
            ConflictUrgency::Medium
        } else {
            ConflictUrgency::Low
        }
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(ResolutionConfig::default())
    }
}

fn classify(
    op: &Operation,
    server: Option<&ClinicalPayload>,
    server_tombstoned: bool,
    signal: &VersionConflict,
) -> ConflictType {
    if op.is_crisis() || server.is_some_and(ClinicalPayload::is_crisis) {
        ConflictType::CrisisStateConflict
    } else if op.operation_data.is_therapeutic() {
        ConflictType::TherapeuticDataConflict
    } else if op.entity_type == EntityType::Payment {
        ConflictType::PaymentStateConflict
    } else if op.entity_type == EntityType::Subscription {
        ConflictType::SubscriptionTierConflict
    } else if server.is_none() || server_tombstoned {
        ConflictType::DeletedOnServer
    } else if server.is_some_and(|s| s.clinical_type() != op.operation_data.clinical_type()) {
        ConflictType::SchemaMismatch
    } else if signal.reason == VersionConflictReason::PermissionChanged {
        ConflictType::PermissionChanged
    } else if signal.is_version_mismatch() {
        ConflictType::DataVersionConflict
    } else {
        ConflictType::SimultaneousModification
    }
}

fn fields_of(payload: &ClinicalPayload) -> Map<String, Value> {
    match payload.to_fields() {
        Ok(fields) => fields,
        Err(err) => {
            warn!(error = %err, "payload could not be flattened for diffing");
            Map::new()
        }
    }
}

/// Every key of either side whose serialized value differs.
fn diff_fields(client: &ClinicalPayload, server: Option<&ClinicalPayload>) -> Vec<FieldConflict> {
    let client_fields = fields_of(client);
    let server_fields = server.map(fields_of).unwrap_or_default();

    let mut types = vec![client.clinical_type()];
    if let Some(server) = server {
        types.push(server.clinical_type());
    }

    let keys: BTreeSet<&String> = client_fields.keys().chain(server_fields.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let client_value = client_fields.get(key).cloned().unwrap_or(Value::Null);
            let server_value = server_fields.get(key).cloned().unwrap_or(Value::Null);
            if client_value == server_value {
                return None;
            }
            let sample = if client_value.is_null() {
                &server_value
            } else {
                &client_value
            };
            let (priority, merge_rule, therapeutic_impact) = field_spec(&types, key, sample);
            Some(FieldConflict {
                field: key.clone(),
                client_value,
                server_value,
                mergeable: merge_rule.is_mergeable(),
                merge_rule,
                priority,
                therapeutic_impact,
            })
        })
        .collect()
}

/// Highest tier of either side.
fn precedence_tier(client: &ClinicalPayload, server: Option<&ClinicalPayload>) -> PrecedenceTier {
    let client_tier = client.clinical_type().precedence_tier();
    server
        .map(|s| s.clinical_type().precedence_tier())
        .map_or(client_tier, |server_tier| server_tier.max(client_tier))
}

fn crisis_context(
    op: &Operation,
    server: Option<&ClinicalPayload>,
    conflict_type: ConflictType,
    fields: &[FieldConflict],
) -> CrisisContext {
    let involves_crisis_data = op.is_crisis() || server.is_some_and(ClinicalPayload::is_crisis);
    CrisisContext {
        involves_crisis_data,
        requires_immediate: conflict_type == ConflictType::CrisisStateConflict,
        safety_fields: if involves_crisis_data {
            fields
                .iter()
                .filter(|f| f.priority == FieldPriority::Critical)
                .map(|f| f.field.clone())
                .collect()
        } else {
            Vec::new()
        },
    }
}

fn therapeutic_context(
    client: &ClinicalPayload,
    server: Option<&ClinicalPayload>,
    fields: &[FieldConflict],
) -> TherapeuticContext {
    let active =
        |p: &ClinicalPayload| matches!(p, ClinicalPayload::SessionProgress(s) if s.is_active);
    let assessment = |p: &ClinicalPayload| p.clinical_type() == ClinicalType::AssessmentScore;
    TherapeuticContext {
        session_active: active(client) || server.is_some_and(active),
        involves_assessment: assessment(client) || server.is_some_and(assessment),
        therapeutic_fields: fields
            .iter()
            .filter(|f| f.therapeutic_impact)
            .map(|f| f.field.clone())
            .collect(),
    }
}

fn severity(conflict_type: ConflictType, fields: &[FieldConflict]) -> ConflictSeverity {
    match conflict_type {
        ConflictType::CrisisStateConflict => ConflictSeverity::Critical,
        ConflictType::TherapeuticDataConflict | ConflictType::SubscriptionTierConflict => {
            ConflictSeverity::High
        }
        _ => {
            let critical = fields
                .iter()
                .filter(|f| f.priority == FieldPriority::Critical)
                .count();
            let high = fields
                .iter()
                .filter(|f| f.priority == FieldPriority::High)
                .count();
            let scaled = if critical > 0 {
                ConflictSeverity::High
            } else if high > 0 {
                ConflictSeverity::Medium
            } else {
                ConflictSeverity::Low
            };
            match conflict_type {
                ConflictType::DeletedOnServer | ConflictType::SchemaMismatch => {
                    scaled.max(ConflictSeverity::Medium)
                }
                _ => scaled,
            }
        }
    }
}

/// Precedence table.
fn recommend(conflict_type: ConflictType, tier: PrecedenceTier) -> ResolutionStrategy {
    match conflict_type {
        ConflictType::CrisisStateConflict => ResolutionStrategy::CrisisOverride,
        ConflictType::TherapeuticDataConflict => ResolutionStrategy::TherapeuticPriority,
        ConflictType::PaymentStateConflict
        | ConflictType::SubscriptionTierConflict
        | ConflictType::PermissionChanged => ResolutionStrategy::ServerWins,
        ConflictType::DeletedOnServer => {
            if tier == PrecedenceTier::UserPreference {
                ResolutionStrategy::ServerWins
            } else {
                ResolutionStrategy::ClientWins
            }
        }
        ConflictType::SchemaMismatch => ResolutionStrategy::UserChoice,
        ConflictType::DataVersionConflict => ResolutionStrategy::SmartMerge,
        ConflictType::SimultaneousModification => {
            if tier == PrecedenceTier::UserPreference {
                ResolutionStrategy::TimestampBased
            } else {
                ResolutionStrategy::SmartMerge
            }
        }
    }
}

fn auto_resolution_possible(conflict: &ConflictDescription) -> bool {
    match conflict.recommended_strategy {
        ResolutionStrategy::CrisisOverride
        | ResolutionStrategy::TherapeuticPriority
        | ResolutionStrategy::ServerWins
        | ResolutionStrategy::ClientWins
        | ResolutionStrategy::TimestampBased => true,
        ResolutionStrategy::SmartMerge => conflict
            .field_conflicts
            .iter()
            .all(|f| f.mergeable || f.priority != FieldPriority::Critical),
        ResolutionStrategy::UserChoice => false,
    }
}

fn server_snapshot(server: Option<&VersionedState>) -> ServerSnapshot {
    match server {
        Some(stored) => ServerSnapshot {
            payload: Some(stored.state.value.clone()),
            vector_clock: stored.state.vector_clock.clone(),
            version: stored.version,
            tombstoned: stored.state.tombstoned,
            last_writer: Some(stored.state.last_writer.clone()),
        },
        None => ServerSnapshot {
            payload: None,
            vector_clock: VectorClock::new(),
            version: 0,
            tombstoned: true,
            last_writer: None,
        },
    }
}

fn deadline(detected_at: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    detected_at
        .checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
