//! Resolution strategies under the fixed safety precedence.
//!
//! Crisis safety outranks clinical accuracy, which outranks therapeutic
//! continuity, which outranks user preference. Every strategy works on the
//! flattened field maps of both sides and rebuilds a typed payload at the end,
//! after which the crisis and assessment invariants are re-applied.

use chrono::Utc;
use mindsync_core::config::ResolutionConfig;
use mindsync_core::errors::MergeError;
use mindsync_core::models::{
    AppliedChange, ChangeSource, ClinicalPayload, ClinicalType, ConflictDescription,
    CrisisSafetyPlan, FieldChoice, FieldConflict, FieldPriority, FollowUpAction, ResolutionResult,
    ResolutionStrategy, ResolvedBy, UserConflictChoice,
};
use mindsync_core::{MindSyncError, MindSyncResult};
use mindsync_crdt::{assessment_accuracy, enforce_safety_invariants, VectorClockManager};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::merge_rules::{apply_rule, is_preserved};

type Fields = Map<String, Value>;

/// Applies a resolution strategy to a detected conflict. Holds no state
/// between calls.
#[derive(Debug, Clone, Default)]
pub struct ResolutionStrategyEngine {
    config: ResolutionConfig,
}

impl ResolutionStrategyEngine {
    pub fn new(config: ResolutionConfig) -> Self {
        Self { config }
    }

    /// The strategy that will actually run for `requested`.
    ///
    /// Crisis override is mandatory when the conflict requires immediate
    /// handling. Smart merge is never used when it would pick a side for a
    /// critical, non-mergeable therapeutic field; it escalates to therapeutic
    /// priority instead.
    pub fn effective_strategy(
        conflict: &ConflictDescription,
        requested: ResolutionStrategy,
    ) -> ResolutionStrategy {
        if conflict.crisis_context.requires_immediate {
            return ResolutionStrategy::CrisisOverride;
        }
        if requested == ResolutionStrategy::SmartMerge
            && conflict.has_unmergeable_critical_therapeutic_field()
        {
            return ResolutionStrategy::TherapeuticPriority;
        }
        requested
    }

    /// Advisory confidence for a strategy on this conflict.
    pub fn confidence(strategy: ResolutionStrategy, conflict: &ConflictDescription) -> f64 {
        match strategy {
            ResolutionStrategy::CrisisOverride | ResolutionStrategy::TherapeuticPriority => 0.95,
            ResolutionStrategy::ServerWins => 0.85,
            ResolutionStrategy::UserChoice => 0.9,
            ResolutionStrategy::SmartMerge => {
                let total = conflict.field_conflicts.len();
                if total == 0 {
                    0.8
                } else {
                    conflict.mergeable_field_count() as f64 / total as f64 * 0.8
                }
            }
            ResolutionStrategy::ClientWins | ResolutionStrategy::TimestampBased => 0.7,
        }
    }

    /// Resolve `conflict` with `requested` (subject to [`Self::effective_strategy`]).
    ///
    /// `choice` is required for user choice. When crisis override is forced,
    /// a supplied choice still applies to fields that are not critical.
    #[instrument(
        skip(self, conflict, choice),
        fields(conflict_id = %conflict.conflict_id, requested = %requested)
    )]
    pub fn resolve(
        &self,
        conflict: &ConflictDescription,
        requested: ResolutionStrategy,
        choice: Option<&UserConflictChoice>,
    ) -> MindSyncResult<ResolutionResult> {
        let strategy = Self::effective_strategy(conflict, requested);
        if strategy != requested {
            info!(%requested, effective = %strategy, "resolution strategy overridden");
        }

        let client_payload = &conflict.client.payload;
        let server_payload = conflict.server.payload.as_ref();
        let client_fields = client_payload.to_fields()?;
        let server_fields = server_payload
            .map(ClinicalPayload::to_fields)
            .transpose()?;

        let mut user_applied = false;
        let draft = match strategy {
            ResolutionStrategy::ServerWins => server_fields
                .clone()
                .zip(server_payload.map(ClinicalPayload::clinical_type)),
            ResolutionStrategy::ClientWins => {
                Some((client_fields.clone(), client_payload.clinical_type()))
            }
            ResolutionStrategy::CrisisOverride => {
                let mut draft =
                    self.crisis_override(conflict, &client_fields, server_fields.as_ref());
                if let Some(choice) = choice {
                    user_applied |= apply_choices(
                        &mut draft.0,
                        choice,
                        conflict,
                        &client_fields,
                        server_fields.as_ref(),
                        |f| f.priority != FieldPriority::Critical,
                    );
                }
                Some(draft)
            }
            ResolutionStrategy::TherapeuticPriority => {
                Some(self.therapeutic_priority(conflict, &client_fields, server_fields.as_ref()))
            }
            ResolutionStrategy::SmartMerge => {
                Some(self.smart_merge(conflict, &client_fields, server_fields.as_ref()))
            }
            ResolutionStrategy::TimestampBased => {
                let server_later = server_payload
                    .is_some_and(|server| server.timestamp() >= client_payload.timestamp());
                if server_later {
                    server_fields
                        .clone()
                        .zip(server_payload.map(ClinicalPayload::clinical_type))
                } else {
                    Some((client_fields.clone(), client_payload.clinical_type()))
                }
            }
            ResolutionStrategy::UserChoice => {
                let Some(choice) = choice else {
                    return Err(MergeError::UserChoiceRequired {
                        conflict_id: conflict.conflict_id.clone(),
                    }
                    .into());
                };
                let mut draft = base_side(
                    client_payload,
                    &client_fields,
                    server_payload,
                    server_fields.as_ref(),
                );
                apply_choices(
                    &mut draft.0,
                    choice,
                    conflict,
                    &client_fields,
                    server_fields.as_ref(),
                    |_| true,
                );
                user_applied = true;
                Some(draft)
            }
        };

        let (pre_invariant, resolved) = match draft {
            Some((fields, clinical_type)) => {
                let payload = ClinicalPayload::from_fields(clinical_type, fields.clone())
                    .map_err(|err| rebuild_failed(conflict, err))?;
                let payload = self.enforce_invariants(conflict, strategy, payload);
                (Some(fields), Some(payload))
            }
            None => (None, None),
        };
        let resolved_fields = resolved.as_ref().map(ClinicalPayload::to_fields).transpose()?;

        let applied_changes = applied_changes(
            conflict,
            server_fields.as_ref(),
            &client_fields,
            pre_invariant.as_ref(),
            resolved_fields.as_ref(),
            user_applied,
        );
        let lost = lost_data(conflict, resolved_fields.as_ref());
        let crisis_data_preserved = crisis_preserved(conflict, resolved.as_ref(), &lost);
        let therapeutic_data_preserved = conflict
            .field_conflicts
            .iter()
            .filter(|f| f.therapeutic_impact)
            .all(|f| !was_lost(&lost, &f.field));
        let priority_data_preserved = conflict
            .field_conflicts
            .iter()
            .filter(|f| f.priority == FieldPriority::Critical)
            .all(|f| !was_lost(&lost, &f.field));

        let data_loss = !lost.is_empty();
        let validation_required = conflict.precedence_tier.validation_required();
        let mut follow_up_actions = Vec::new();
        if validation_required {
            follow_up_actions.push(FollowUpAction::ClinicalValidation);
        }
        if data_loss {
            warn!(lost_fields = lost.len(), "resolution discarded data");
            follow_up_actions.push(FollowUpAction::NotifyUser);
        }

        let result = ResolutionResult {
            conflict_id: conflict.conflict_id.clone(),
            resource_id: conflict.resource_id.clone(),
            strategy,
            resolved: true,
            resolved_data: resolved,
            merged_clock: Some(VectorClockManager::merge(&[
                conflict.client.vector_clock.clone(),
                conflict.server.vector_clock.clone(),
            ])),
            applied_changes,
            confidence: Self::confidence(strategy, conflict),
            data_loss,
            lost_data: (!lost.is_empty()).then_some(lost),
            therapeutic_data_preserved,
            crisis_data_preserved,
            priority_data_preserved,
            validation_required,
            follow_up_actions,
            resolved_by: if user_applied || strategy == ResolutionStrategy::UserChoice {
                ResolvedBy::User
            } else {
                ResolvedBy::Automatic
            },
            resolved_at: Utc::now(),
        };
        debug!(
            changes = result.applied_changes.len(),
            confidence = result.confidence,
            data_loss = result.data_loss,
            "conflict resolved"
        );
        Ok(result)
    }

    /// Start from the crisis-bearing side (client first) and merge in every
    /// critical field of the other side.
    fn crisis_override(
        &self,
        conflict: &ConflictDescription,
        client: &Fields,
        server: Option<&Fields>,
    ) -> (Fields, ClinicalType) {
        let client_payload = &conflict.client.payload;
        let server_payload = conflict.server.payload.as_ref();
        let base_is_server =
            !client_payload.is_crisis() && server_payload.is_some_and(ClinicalPayload::is_crisis);

        let (mut fields, clinical_type) = match (base_is_server, server, server_payload) {
            (true, Some(server), Some(payload)) => (server.clone(), payload.clinical_type()),
            _ => (client.clone(), client_payload.clinical_type()),
        };
        for field in &conflict.field_conflicts {
            if field.priority != FieldPriority::Critical {
                continue;
            }
            let value = if field.mergeable {
                apply_rule(
                    field.merge_rule,
                    &field.server_value,
                    &field.client_value,
                    &self.config.text_merge_separator,
                )
            } else if base_is_server {
                field.server_value.clone()
            } else {
                field.client_value.clone()
            };
            set_field(&mut fields, &field.field, value);
        }
        (fields, clinical_type)
    }

    /// Server base with every therapeutic field taken from the client.
    fn therapeutic_priority(
        &self,
        conflict: &ConflictDescription,
        client: &Fields,
        server: Option<&Fields>,
    ) -> (Fields, ClinicalType) {
        let (mut fields, clinical_type) = base_side(
            &conflict.client.payload,
            client,
            conflict.server.payload.as_ref(),
            server,
        );
        for field in conflict.field_conflicts.iter().filter(|f| f.therapeutic_impact) {
            set_field(&mut fields, &field.field, field.client_value.clone());
        }
        (fields, clinical_type)
    }

    /// Server base; mergeable fields follow their rule, non-mergeable
    /// therapeutic or critical fields take the client value.
    fn smart_merge(
        &self,
        conflict: &ConflictDescription,
        client: &Fields,
        server: Option<&Fields>,
    ) -> (Fields, ClinicalType) {
        let (mut fields, clinical_type) = base_side(
            &conflict.client.payload,
            client,
            conflict.server.payload.as_ref(),
            server,
        );
        for field in &conflict.field_conflicts {
            if field.mergeable {
                let value = apply_rule(
                    field.merge_rule,
                    &field.server_value,
                    &field.client_value,
                    &self.config.text_merge_separator,
                );
                set_field(&mut fields, &field.field, value);
            } else if field.therapeutic_impact || field.priority == FieldPriority::Critical {
                set_field(&mut fields, &field.field, field.client_value.clone());
            }
        }
        (fields, clinical_type)
    }

    /// Crisis plans always carry every input contact and the canonical
    /// hotline. Automatic strategies never lower assessment accuracy.
    fn enforce_invariants(
        &self,
        conflict: &ConflictDescription,
        strategy: ResolutionStrategy,
        payload: ClinicalPayload,
    ) -> ClinicalPayload {
        match payload {
            ClinicalPayload::CrisisSafetyPlan(mut plan) => {
                let sources: Vec<&CrisisSafetyPlan> = [
                    Some(&conflict.client.payload),
                    conflict.server.payload.as_ref(),
                ]
                .into_iter()
                .flatten()
                .filter_map(|p| match p {
                    ClinicalPayload::CrisisSafetyPlan(plan) => Some(plan),
                    _ => None,
                })
                .collect();
                enforce_safety_invariants(&mut plan, &sources);
                ClinicalPayload::CrisisSafetyPlan(plan)
            }
            ClinicalPayload::AssessmentScore(score)
                if strategy != ResolutionStrategy::UserChoice =>
            {
                let resolved_accuracy = assessment_accuracy(&score);
                let best = [Some(&conflict.client.payload), conflict.server.payload.as_ref()]
                    .into_iter()
                    .flatten()
                    .filter_map(|p| match p {
                        ClinicalPayload::AssessmentScore(s) => Some(s),
                        _ => None,
                    })
                    .max_by(|a, b| assessment_accuracy(a).total_cmp(&assessment_accuracy(b)));
                match best {
                    Some(best) if assessment_accuracy(best) > resolved_accuracy => {
                        warn!(
                            resolved_accuracy,
                            "resolved assessment less accurate than an input; keeping the input"
                        );
                        ClinicalPayload::AssessmentScore(best.clone())
                    }
                    _ => ClinicalPayload::AssessmentScore(score),
                }
            }
            other => other,
        }
    }
}

/// Server fields when the server still has a payload, client fields otherwise.
fn base_side(
    client_payload: &ClinicalPayload,
    client: &Fields,
    server_payload: Option<&ClinicalPayload>,
    server: Option<&Fields>,
) -> (Fields, ClinicalType) {
    match (server, server_payload) {
        (Some(fields), Some(payload)) => (fields.clone(), payload.clinical_type()),
        _ => (client.clone(), client_payload.clinical_type()),
    }
}

fn set_field(fields: &mut Fields, name: &str, value: Value) {
    if value.is_null() {
        fields.remove(name);
    } else {
        fields.insert(name.to_string(), value);
    }
}

/// Apply per-field user choices to fields accepted by `allowed`. Returns
/// whether any choice was applied.
fn apply_choices(
    fields: &mut Fields,
    choice: &UserConflictChoice,
    conflict: &ConflictDescription,
    client: &Fields,
    server: Option<&Fields>,
    allowed: impl Fn(&FieldConflict) -> bool,
) -> bool {
    let mut applied = false;
    for (name, pick) in &choice.field_choices {
        let permitted = conflict
            .field_conflicts
            .iter()
            .find(|f| &f.field == name)
            .map_or(true, |f| allowed(f));
        if !permitted {
            debug!(field = %name, "user choice ignored for critical field");
            continue;
        }
        let value = match pick {
            FieldChoice::Client => client.get(name).cloned().unwrap_or(Value::Null),
            FieldChoice::Server => server
                .and_then(|s| s.get(name))
                .cloned()
                .unwrap_or(Value::Null),
            FieldChoice::Custom(value) => value.clone(),
        };
        set_field(fields, name, value);
        applied = true;
    }
    applied
}

fn rebuild_failed(conflict: &ConflictDescription, err: MindSyncError) -> MindSyncError {
    MergeError::RebuildFailed {
        resource_id: conflict.resource_id.clone(),
        reason: err.to_string(),
    }
    .into()
}

/// Field-level changes relative to the server value.
fn applied_changes(
    conflict: &ConflictDescription,
    server: Option<&Fields>,
    client: &Fields,
    pre_invariant: Option<&Fields>,
    resolved: Option<&Fields>,
    user_applied: bool,
) -> Vec<AppliedChange> {
    let Some(resolved) = resolved else {
        return Vec::new();
    };
    let empty = Fields::new();
    let server = server.unwrap_or(&empty);
    resolved
        .iter()
        .filter_map(|(name, value)| {
            let previous = server.get(name).cloned().unwrap_or(Value::Null);
            if &previous == value {
                return None;
            }
            let drafted = pre_invariant.and_then(|p| p.get(name));
            let from_client = client.get(name) == Some(value);
            let (source, reason) = if drafted.is_some_and(|d| d != value) {
                (ChangeSource::SafetyInvariant, "safety invariant enforced")
            } else if user_applied && !from_client {
                (ChangeSource::User, "user choice")
            } else if from_client {
                (ChangeSource::Client, "client value kept")
            } else {
                (ChangeSource::Merged, "merged from both sides")
            };
            Some(AppliedChange {
                field: name.clone(),
                previous,
                value: value.clone(),
                source,
                reason: format!("{reason} ({})", conflict.conflict_type),
            })
        })
        .collect()
}

/// Side values not carried by the resolved payload, keyed `client.<field>`
/// or `server.<field>`.
fn lost_data(conflict: &ConflictDescription, resolved: Option<&Fields>) -> Fields {
    let mut lost = Fields::new();
    for field in &conflict.field_conflicts {
        let resolved_value = resolved
            .and_then(|r| r.get(&field.field))
            .cloned()
            .unwrap_or(Value::Null);
        if !field.client_value.is_null() && !is_preserved(&field.client_value, &resolved_value) {
            lost.insert(format!("client.{}", field.field), field.client_value.clone());
        }
        if !field.server_value.is_null() && !is_preserved(&field.server_value, &resolved_value) {
            lost.insert(format!("server.{}", field.field), field.server_value.clone());
        }
    }
    lost
}

fn was_lost(lost: &Fields, field: &str) -> bool {
    lost.contains_key(&format!("client.{field}")) || lost.contains_key(&format!("server.{field}"))
}

fn crisis_preserved(
    conflict: &ConflictDescription,
    resolved: Option<&ClinicalPayload>,
    lost: &Fields,
) -> bool {
    if !conflict.crisis_context.involves_crisis_data {
        return true;
    }
    let safety_kept = conflict
        .crisis_context
        .safety_fields
        .iter()
        .all(|f| !was_lost(lost, f));
    let plan_ok = match resolved {
        Some(ClinicalPayload::CrisisSafetyPlan(plan)) => {
            let identities = plan.contact_identities();
            let inputs_covered = [Some(&conflict.client.payload), conflict.server.payload.as_ref()]
                .into_iter()
                .flatten()
                .all(|p| match p {
                    ClinicalPayload::CrisisSafetyPlan(input) => {
                        input.contact_identities().is_subset(&identities)
                    }
                    _ => true,
                });
            inputs_covered && plan.has_hotline_contact()
        }
        _ => true,
    };
    safety_kept && plan_ok
}
