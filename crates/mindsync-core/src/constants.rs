/// MindSync engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical crisis hotline. Pinned on every crisis plan, never removable.
pub const CRISIS_HOTLINE: &str = "988";

/// Display name of the canonical hotline contact.
pub const CRISIS_HOTLINE_NAME: &str = "988 Suicide & Crisis Lifeline";

/// Audit entries retained per logical namespace.
pub const AUDIT_LOG_CAPACITY: usize = 100;

/// Default grace window before an auto-resolvable conflict is resolved.
pub const DEFAULT_GRACE_WINDOW_MS: u64 = 50;

/// Accuracy ceiling for an assessment whose stored total disagrees with its answers.
pub const MISMATCHED_TOTAL_ACCURACY_CAP: f64 = 0.5;

/// Accuracy ceiling for an assessment with the wrong number of answers.
pub const INCOMPLETE_RESPONSES_ACCURACY_CAP: f64 = 0.3;

/// Highest answer value on PHQ-9 and GAD-7 items.
pub const MAX_ITEM_SCORE: u8 = 3;
