//! Static per-clinical-type field schema: priority, merge rule, and
//! therapeutic impact for every payload field.

use mindsync_core::models::{ClinicalType, FieldPriority, MergeRule};

/// Classification of one payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub priority: FieldPriority,
    pub merge_rule: MergeRule,
    pub therapeutic_impact: bool,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        priority: FieldPriority,
        merge_rule: MergeRule,
        therapeutic_impact: bool,
    ) -> Self {
        Self {
            name,
            priority,
            merge_rule,
            therapeutic_impact,
        }
    }
}

/// All fields of one clinical type plus the field that orders its versions.
#[derive(Debug)]
pub struct ClinicalSchema {
    pub clinical_type: ClinicalType,
    pub fields: &'static [FieldSpec],
    pub timestamp_field: &'static str,
}

impl ClinicalSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

use FieldPriority::{Critical, High, Low, Medium};
use MergeRule as R;

static ASSESSMENT: ClinicalSchema = ClinicalSchema {
    clinical_type: ClinicalType::AssessmentScore,
    fields: &[
        FieldSpec::new("assessment_id", Critical, R::None, true),
        FieldSpec::new("assessment_type", Critical, R::None, true),
        FieldSpec::new("responses", Critical, R::None, true),
        FieldSpec::new("total_score", Critical, R::None, true),
        FieldSpec::new("completed_at", High, R::None, true),
    ],
    timestamp_field: "completed_at",
};

static CRISIS_PLAN: ClinicalSchema = ClinicalSchema {
    clinical_type: ClinicalType::CrisisSafetyPlan,
    fields: &[
        FieldSpec::new("plan_id", Critical, R::PreferServer, false),
        FieldSpec::new("warning_signs", Critical, R::ArrayUnion, true),
        FieldSpec::new("coping_strategies", Critical, R::ArrayUnion, true),
        FieldSpec::new("emergency_contacts", Critical, R::ArrayUnion, true),
        FieldSpec::new("crisis_hotline", Critical, R::PreferServer, false),
        FieldSpec::new("notes", Medium, R::TextConcatenate, true),
        FieldSpec::new("updated_at", Low, R::Maximum, false),
    ],
    timestamp_field: "updated_at",
};

static SESSION_PROGRESS: ClinicalSchema = ClinicalSchema {
    clinical_type: ClinicalType::SessionProgress,
    fields: &[
        FieldSpec::new("session_id", High, R::None, true),
        FieldSpec::new("exercise_id", High, R::None, true),
        FieldSpec::new("current_step", High, R::Maximum, true),
        FieldSpec::new("total_steps", High, R::Maximum, true),
        FieldSpec::new("completed_steps", High, R::ArrayUnion, true),
        FieldSpec::new("practice_seconds", Medium, R::ObjectMerge, true),
        FieldSpec::new("is_active", Medium, R::PreferClient, true),
        FieldSpec::new("notes", Low, R::TextConcatenate, true),
        FieldSpec::new("updated_at", Low, R::Maximum, false),
    ],
    timestamp_field: "updated_at",
};

static USER_PREFERENCE: ClinicalSchema = ClinicalSchema {
    clinical_type: ClinicalType::UserPreference,
    fields: &[
        FieldSpec::new("entries", Medium, R::ObjectMerge, false),
        FieldSpec::new("updated_at", Low, R::Maximum, false),
    ],
    timestamp_field: "updated_at",
};

pub fn schema_for(clinical_type: ClinicalType) -> &'static ClinicalSchema {
    match clinical_type {
        ClinicalType::AssessmentScore => &ASSESSMENT,
        ClinicalType::CrisisSafetyPlan => &CRISIS_PLAN,
        ClinicalType::SessionProgress => &SESSION_PROGRESS,
        ClinicalType::UserPreference => &USER_PREFERENCE,
    }
}

const CRITICAL_HINTS: [&str; 3] = ["crisis_plan", "emergency_contacts", "safety_data"];
const THERAPEUTIC_HINTS: [&str; 3] = ["assessment_scores", "therapeutic_data", "mood_data"];
const PREFERENCE_HINTS: [&str; 2] = ["preference", "setting"];
const TEXT_HINTS: [&str; 2] = ["note", "comment"];

/// Classify `name` for the given types, looking in each schema in order and
/// falling back to name hints for fields no schema declares. `sample` is one
/// of the field's values; its JSON shape decides mergeability for unknown fields.
pub fn field_spec(
    types: &[ClinicalType],
    name: &str,
    sample: &serde_json::Value,
) -> (FieldPriority, MergeRule, bool) {
    if let Some(spec) = types
        .iter()
        .find_map(|&t| schema_for(t).field(name))
    {
        return (spec.priority, spec.merge_rule, spec.therapeutic_impact);
    }

    let lowered = name.to_lowercase();
    let matches = |hints: &[&str]| hints.iter().any(|h| lowered.contains(h));

    let (priority, therapeutic) = if matches(&CRITICAL_HINTS[..]) {
        (Critical, true)
    } else if matches(&THERAPEUTIC_HINTS[..]) {
        (High, true)
    } else if matches(&PREFERENCE_HINTS[..]) {
        (Medium, false)
    } else {
        (Low, false)
    };

    let rule = if matches(&TEXT_HINTS[..]) && sample.is_string() {
        R::TextConcatenate
    } else if sample.is_array() {
        R::ArrayUnion
    } else if sample.is_object() {
        R::ObjectMerge
    } else {
        R::None
    };

    (priority, rule, therapeutic)
}
