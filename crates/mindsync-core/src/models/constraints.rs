//! Therapeutic constraints every merge and operation must honor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of constraint switches carried by every replicated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TherapeuticConstraints {
    pub preserve_assessment_scores: bool,
    pub maintain_crisis_thresholds: bool,
    pub ensure_therapeutic_timing: bool,
    pub validate_clinical_sequence: bool,
    pub protect_privacy_boundaries: bool,
}

impl TherapeuticConstraints {
    /// Whether a given constraint is switched on.
    pub fn is_enabled(&self, kind: TherapeuticConstraintKind) -> bool {
        match kind {
            TherapeuticConstraintKind::PreserveAssessmentScores => self.preserve_assessment_scores,
            TherapeuticConstraintKind::MaintainCrisisThresholds => self.maintain_crisis_thresholds,
            TherapeuticConstraintKind::EnsureTherapeuticTiming => self.ensure_therapeutic_timing,
            TherapeuticConstraintKind::ValidateClinicalSequence => self.validate_clinical_sequence,
            TherapeuticConstraintKind::ProtectPrivacyBoundaries => self.protect_privacy_boundaries,
        }
    }

    /// Union of two constraint sets. A constraint enabled on either side stays enabled.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            preserve_assessment_scores: self.preserve_assessment_scores
                || other.preserve_assessment_scores,
            maintain_crisis_thresholds: self.maintain_crisis_thresholds
                || other.maintain_crisis_thresholds,
            ensure_therapeutic_timing: self.ensure_therapeutic_timing
                || other.ensure_therapeutic_timing,
            validate_clinical_sequence: self.validate_clinical_sequence
                || other.validate_clinical_sequence,
            protect_privacy_boundaries: self.protect_privacy_boundaries
                || other.protect_privacy_boundaries,
        }
    }
}

impl Default for TherapeuticConstraints {
    fn default() -> Self {
        Self {
            preserve_assessment_scores: true,
            maintain_crisis_thresholds: true,
            ensure_therapeutic_timing: true,
            validate_clinical_sequence: true,
            protect_privacy_boundaries: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TherapeuticConstraintKind {
    PreserveAssessmentScores,
    MaintainCrisisThresholds,
    EnsureTherapeuticTiming,
    ValidateClinicalSequence,
    ProtectPrivacyBoundaries,
}

impl TherapeuticConstraintKind {
    /// Violations of these constraints can never be waived by the caller.
    pub fn is_overridable(self) -> bool {
        matches!(
            self,
            Self::EnsureTherapeuticTiming | Self::ProtectPrivacyBoundaries
        )
    }
}

impl fmt::Display for TherapeuticConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreserveAssessmentScores => "preserve_assessment_scores",
            Self::MaintainCrisisThresholds => "maintain_crisis_thresholds",
            Self::EnsureTherapeuticTiming => "ensure_therapeutic_timing",
            Self::ValidateClinicalSequence => "validate_clinical_sequence",
            Self::ProtectPrivacyBoundaries => "protect_privacy_boundaries",
        };
        f.write_str(s)
    }
}

/// Ordered risk scale reported by constraint validation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub constraint: TherapeuticConstraintKind,
    pub risk: RiskLevel,
    pub message: String,
    pub overridable: bool,
}

/// Outcome of validating an operation against a record's constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintValidationResult {
    pub valid: bool,
    pub risk_level: RiskLevel,
    pub violations: Vec<ConstraintViolation>,
    pub mitigations: Vec<String>,
}

impl ConstraintValidationResult {
    /// A passing result with no findings.
    pub fn passed() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    /// Record a violation, raising the overall risk and validity accordingly.
    pub fn push(
        &mut self,
        constraint: TherapeuticConstraintKind,
        risk: RiskLevel,
        message: impl Into<String>,
        mitigation: impl Into<String>,
    ) {
        self.violations.push(ConstraintViolation {
            constraint,
            risk,
            message: message.into(),
            overridable: constraint.is_overridable(),
        });
        self.mitigations.push(mitigation.into());
        self.risk_level = self.risk_level.max(risk);
        if risk >= RiskLevel::High {
            self.valid = false;
        }
    }

    /// Critical risk backed by at least one violation the caller cannot waive.
    pub fn must_reject(&self) -> bool {
        self.risk_level == RiskLevel::Critical
            && self
                .violations
                .iter()
                .any(|v| v.risk == RiskLevel::Critical && !v.overridable)
    }

    /// The first blocking violation, if any.
    pub fn blocking_violation(&self) -> Option<&ConstraintViolation> {
        self.violations
            .iter()
            .find(|v| v.risk == RiskLevel::Critical && !v.overridable)
    }
}
