//! Clinical payloads carried by every replicated record.
//!
//! The payload is a closed set of variants, so choosing a merge rule is a
//! `match` on [`ClinicalPayload`] rather than a lookup by type name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::DeviceId;
use crate::constants::{CRISIS_HOTLINE, CRISIS_HOTLINE_NAME, MAX_ITEM_SCORE};
use crate::errors::{MergeError, MindSyncResult};

/// Replicated clinical data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "clinical_type", content = "data", rename_all = "snake_case")]
pub enum ClinicalPayload {
    AssessmentScore(AssessmentScore),
    CrisisSafetyPlan(CrisisSafetyPlan),
    SessionProgress(SessionProgress),
    UserPreference(UserPreference),
}

impl ClinicalPayload {
    pub fn clinical_type(&self) -> ClinicalType {
        match self {
            Self::AssessmentScore(_) => ClinicalType::AssessmentScore,
            Self::CrisisSafetyPlan(_) => ClinicalType::CrisisSafetyPlan,
            Self::SessionProgress(_) => ClinicalType::SessionProgress,
            Self::UserPreference(_) => ClinicalType::UserPreference,
        }
    }

    /// The payload's own notion of "when was this written".
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::AssessmentScore(a) => a.completed_at,
            Self::CrisisSafetyPlan(p) => p.updated_at,
            Self::SessionProgress(s) => s.updated_at,
            Self::UserPreference(u) => u.updated_at,
        }
    }

    pub fn is_crisis(&self) -> bool {
        matches!(self, Self::CrisisSafetyPlan(_))
    }

    /// Assessment scores and session progress form the therapeutic domain.
    pub fn is_therapeutic(&self) -> bool {
        matches!(self, Self::AssessmentScore(_) | Self::SessionProgress(_))
    }

    /// The variant's fields as a JSON object, keyed by field name.
    pub fn to_fields(&self) -> MindSyncResult<serde_json::Map<String, serde_json::Value>> {
        let value = match self {
            Self::AssessmentScore(a) => serde_json::to_value(a)?,
            Self::CrisisSafetyPlan(p) => serde_json::to_value(p)?,
            Self::SessionProgress(s) => serde_json::to_value(s)?,
            Self::UserPreference(u) => serde_json::to_value(u)?,
        };
        match value {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(MergeError::ShapeMismatch {
                resource_id: String::new(),
                details: format!("payload serialized to non-object {other}"),
            }
            .into()),
        }
    }

    /// Rebuild a payload of `clinical_type` from a field map.
    pub fn from_fields(
        clinical_type: ClinicalType,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> MindSyncResult<Self> {
        let value = serde_json::Value::Object(fields);
        Ok(match clinical_type {
            ClinicalType::AssessmentScore => Self::AssessmentScore(serde_json::from_value(value)?),
            ClinicalType::CrisisSafetyPlan => {
                Self::CrisisSafetyPlan(serde_json::from_value(value)?)
            }
            ClinicalType::SessionProgress => Self::SessionProgress(serde_json::from_value(value)?),
            ClinicalType::UserPreference => Self::UserPreference(serde_json::from_value(value)?),
        })
    }
}

/// Tag for each payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalType {
    AssessmentScore,
    CrisisSafetyPlan,
    SessionProgress,
    UserPreference,
}

impl ClinicalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssessmentScore => "assessment_score",
            Self::CrisisSafetyPlan => "crisis_safety_plan",
            Self::SessionProgress => "session_progress",
            Self::UserPreference => "user_preference",
        }
    }

    pub fn precedence_tier(self) -> PrecedenceTier {
        match self {
            Self::CrisisSafetyPlan => PrecedenceTier::CrisisSafety,
            Self::AssessmentScore => PrecedenceTier::ClinicalAccuracy,
            Self::SessionProgress => PrecedenceTier::TherapeuticContinuity,
            Self::UserPreference => PrecedenceTier::UserPreference,
        }
    }
}

impl fmt::Display for ClinicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed safety precedence, highest first: crisis safety, clinical accuracy,
/// therapeutic continuity, user preference. Ordering follows that precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceTier {
    UserPreference,
    TherapeuticContinuity,
    ClinicalAccuracy,
    CrisisSafety,
}

impl PrecedenceTier {
    /// Whether a resolved value must be re-validated before it is committed.
    pub fn validation_required(self) -> bool {
        !matches!(self, Self::UserPreference)
    }

    /// Whether the tier may be resolved without a human in the loop.
    /// Crisis data is auto-resolvable only through the crisis override.
    pub fn auto_resolution_allowed(self) -> bool {
        !matches!(self, Self::ClinicalAccuracy)
    }
}

/// Standardized screening instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    Phq9,
    Gad7,
}

impl AssessmentType {
    pub fn question_count(self) -> usize {
        match self {
            Self::Phq9 => 9,
            Self::Gad7 => 7,
        }
    }

    pub fn max_total(self) -> u32 {
        self.question_count() as u32 * u32::from(MAX_ITEM_SCORE)
    }
}

/// A completed screening with its per-question answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentScore {
    pub assessment_id: String,
    pub assessment_type: AssessmentType,
    pub responses: Vec<u8>,
    pub total_score: u32,
    pub completed_at: DateTime<Utc>,
}

impl AssessmentScore {
    /// Sum of the stored answers.
    pub fn computed_total(&self) -> u32 {
        self.responses.iter().map(|&r| u32::from(r)).sum()
    }
}

/// A person to call in a crisis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
}

impl EmergencyContact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            relationship: None,
        }
    }

    /// The canonical hotline entry present on every plan.
    pub fn crisis_hotline() -> Self {
        Self {
            name: CRISIS_HOTLINE_NAME.to_string(),
            phone: CRISIS_HOTLINE.to_string(),
            relationship: Some("crisis_line".to_string()),
        }
    }

    /// Identity used for deduplication: digits of the phone number, falling
    /// back to the lowercased name when no digits are present.
    pub fn identity(&self) -> String {
        let digits: String = self.phone.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            self.name.trim().to_lowercase()
        } else {
            digits
        }
    }

    pub fn is_crisis_hotline(&self) -> bool {
        self.identity() == CRISIS_HOTLINE
    }
}

/// A crisis/safety plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisSafetyPlan {
    pub plan_id: String,
    #[serde(default)]
    pub warning_signs: Vec<String>,
    #[serde(default)]
    pub coping_strategies: Vec<String>,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    pub crisis_hotline: String,
    #[serde(default)]
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

impl CrisisSafetyPlan {
    pub fn has_hotline_contact(&self) -> bool {
        self.emergency_contacts
            .iter()
            .any(EmergencyContact::is_crisis_hotline)
    }

    /// Contact identities, for superset checks.
    pub fn contact_identities(&self) -> BTreeSet<String> {
        self.emergency_contacts
            .iter()
            .map(EmergencyContact::identity)
            .collect()
    }
}

/// Progress through a guided therapeutic exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: String,
    pub exercise_id: String,
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default)]
    pub completed_steps: BTreeSet<u32>,
    /// Seconds practiced, per device that recorded them.
    #[serde(default)]
    pub practice_seconds: BTreeMap<DeviceId, u64>,
    pub is_active: bool,
    #[serde(default)]
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

/// One user setting with its write metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub device_id: DeviceId,
}

/// Non-clinical UI and app settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    #[serde(default)]
    pub entries: BTreeMap<String, PreferenceEntry>,
    pub updated_at: DateTime<Utc>,
}
