//! Conflict resolution policy knobs.
//!
//! # Examples
//!
//! ```
//! use mindsync_core::config::ResolutionConfig;
//!
//! let config = ResolutionConfig::default();
//! assert_eq!(config.grace_window_ms, 50);
//! assert_eq!(config.immediate_deadline_secs, 30);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_GRACE_WINDOW_MS;
use crate::models::conflict::ConflictUrgency;
use crate::models::operation::PriorityLevel;

/// Policy parameters for detection and resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Delay before an auto-resolvable conflict is resolved, leaving room for
    /// a racing user decision. Default: 50.
    pub grace_window_ms: u64,
    /// Deadline for immediate-urgency conflicts. Default: 30.
    pub immediate_deadline_secs: u64,
    /// Deadline for high-urgency conflicts. Default: 300.
    pub high_deadline_secs: u64,
    /// Deadline for medium-urgency conflicts. Default: 1800.
    pub medium_deadline_secs: u64,
    /// Deadline for low-urgency conflicts. Default: 7200.
    pub low_deadline_secs: u64,
    /// Operations at or above this priority get high urgency. Default: 600.
    pub high_urgency_priority_threshold: u16,
    /// Separator placed between concatenated free-text values. Default: "\n\n".
    pub text_merge_separator: String,
}

impl ResolutionConfig {
    /// Grace window as a `Duration`.
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    /// Resolution deadline for a given urgency.
    pub fn deadline_for(&self, urgency: ConflictUrgency) -> chrono::Duration {
        let secs = match urgency {
            ConflictUrgency::Immediate => self.immediate_deadline_secs,
            ConflictUrgency::High => self.high_deadline_secs,
            ConflictUrgency::Medium => self.medium_deadline_secs,
            ConflictUrgency::Low => self.low_deadline_secs,
        };
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            grace_window_ms: DEFAULT_GRACE_WINDOW_MS,
            immediate_deadline_secs: 30,
            high_deadline_secs: 5 * 60,
            medium_deadline_secs: 30 * 60,
            low_deadline_secs: 2 * 60 * 60,
            high_urgency_priority_threshold: PriorityLevel::TherapeuticHigh.value(),
            text_merge_separator: "\n\n".to_string(),
        }
    }
}
