//! User preferences: one last-writer-wins register per key. Preferences
//! propagate lazily.

use std::collections::BTreeMap;

use chrono::Duration;
use mindsync_core::errors::{MergeError, MindSyncResult};
use mindsync_core::models::{
    ClinicalPayload, ConstraintValidationResult, CrdtState, Operation, PreferenceEntry,
    RiskLevel, TherapeuticConstraintKind, UserPreference,
};

use super::common::{
    commit, ensure_same_resource, later_writer, merged_state, precheck, reject_if_blocked,
};
use super::{MergeResult, MergeWinner, OperationResult, TherapeuticCrdt};
use crate::primitives::LWWRegister;

const PREFERENCE_CLOCK_SKEW_MINUTES: i64 = 5;

/// Keys whose enablement widens who can see the user's data.
const SHARING_KEY_PREFIX: &str = "share_";

fn register(entry: &PreferenceEntry) -> LWWRegister<serde_json::Value> {
    LWWRegister::new(entry.value.clone(), entry.updated_at, entry.device_id.clone())
}

/// Per-key LWW merge of two preference maps.
fn combine(left: &UserPreference, right: &UserPreference) -> UserPreference {
    let mut entries: BTreeMap<String, PreferenceEntry> = left.entries.clone();
    for (key, incoming) in &right.entries {
        let merged = match entries.get(key) {
            // Same writer and instant: fall back to the serialized value so
            // both replicas agree.
            Some(existing)
                if existing.updated_at == incoming.updated_at
                    && existing.device_id == incoming.device_id =>
            {
                if incoming.value.to_string() > existing.value.to_string() {
                    incoming.clone()
                } else {
                    existing.clone()
                }
            }
            Some(existing) => {
                let mut reg = register(existing);
                reg.merge(&register(incoming));
                PreferenceEntry {
                    updated_at: reg.timestamp(),
                    device_id: reg.device().clone(),
                    value: reg.into_value(),
                }
            }
            None => incoming.clone(),
        };
        entries.insert(key.clone(), merged);
    }
    UserPreference {
        entries,
        updated_at: left.updated_at.max(right.updated_at),
    }
}

fn preferences_of(state: &CrdtState) -> MindSyncResult<&UserPreference> {
    match &state.value {
        ClinicalPayload::UserPreference(prefs) => Ok(prefs),
        other => Err(MergeError::ShapeMismatch {
            resource_id: state.id.clone(),
            details: format!("expected user_preference, found {}", other.clinical_type()),
        }
        .into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPreferenceCrdt {
    state: CrdtState,
}

impl UserPreferenceCrdt {
    pub fn preferences(&self) -> MindSyncResult<&UserPreference> {
        preferences_of(&self.state)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.preferences()
            .ok()
            .and_then(|prefs| prefs.entries.get(key))
            .map(|entry| &entry.value)
    }
}

impl TherapeuticCrdt for UserPreferenceCrdt {
    fn from_state(state: CrdtState) -> MindSyncResult<Self> {
        preferences_of(&state)?;
        Ok(Self { state })
    }

    fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult> {
        ensure_same_resource(&self.state, &remote.state)?;
        let local = self.preferences()?;
        let theirs = remote.preferences()?;

        let merged = combine(local, theirs);
        let winner = if &merged == local {
            MergeWinner::Local
        } else if &merged == theirs {
            MergeWinner::Remote
        } else {
            MergeWinner::Combined
        };
        let notes = vec![format!("merged {} preference keys", merged.entries.len())];

        let state = merged_state(
            &self.state,
            &remote.state,
            ClinicalPayload::UserPreference(merged),
            later_writer(&self.state, &remote.state),
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
        let ClinicalPayload::UserPreference(candidate) = &op.operation_data else {
            return result;
        };
        let constraints = &self.state.constraints;

        if constraints.protect_privacy_boundaries {
            let enables_sharing = candidate.entries.iter().any(|(key, entry)| {
                key.starts_with(SHARING_KEY_PREFIX) && entry.value == serde_json::Value::Bool(true)
            });
            if enables_sharing {
                result.push(
                    TherapeuticConstraintKind::ProtectPrivacyBoundaries,
                    RiskLevel::Low,
                    "preference enables data sharing",
                    "confirm sharing consent with the user",
                );
            }
        }

        let skew_limit = op.timestamp + Duration::minutes(PREFERENCE_CLOCK_SKEW_MINUTES);
        if constraints.ensure_therapeutic_timing
            && candidate.entries.values().any(|e| e.updated_at > skew_limit)
        {
            result.push(
                TherapeuticConstraintKind::EnsureTherapeuticTiming,
                RiskLevel::Low,
                "preference timestamp is ahead of the device clock",
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

        let value = match (&op.operation_data, self.preferences()) {
            (ClinicalPayload::UserPreference(candidate), Ok(current)) => {
                ClinicalPayload::UserPreference(combine(current, candidate))
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mindsync_core::models::DeviceId;
    use serde_json::json;

    fn prefs(key: &str, value: serde_json::Value, secs: i64, device: &str) -> UserPreference {
        let at = chrono::DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs);
        UserPreference {
            entries: [(
                key.to_string(),
                PreferenceEntry {
                    value,
                    updated_at: at,
                    device_id: DeviceId::from(device),
                },
            )]
            .into_iter()
            .collect(),
            updated_at: at,
        }
    }

    #[test]
    fn later_key_wins_regardless_of_order() {
        let a = prefs("theme", json!("light"), 10, "phone-1");
        let b = prefs("theme", json!("dark"), 20, "tablet-1");
        assert_eq!(combine(&a, &b), combine(&b, &a));
        assert_eq!(combine(&a, &b).entries["theme"].value, json!("dark"));
    }

    #[test]
    fn disjoint_keys_union() {
        let a = prefs("theme", json!("light"), 10, "phone-1");
        let b = prefs("reminders", json!(true), 5, "tablet-1");
        let merged = combine(&a, &b);
        assert_eq!(merged.entries.len(), 2);
        assert_eq!(merged.updated_at, a.updated_at);
    }
}
