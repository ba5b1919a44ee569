//! Aggregate resolution statistics. Built from conflict records and the
//! non-identifying analytics view, never from payload values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mindsync_conflict::ConflictRecord;
use mindsync_core::models::{ConflictAnalytics, ConflictStatus, ConflictType, ResolutionStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStatistics {
    pub total_conflicts: usize,
    pub active: usize,
    pub awaiting_user_input: usize,
    /// Active conflicts past their advisory deadline.
    pub overdue: usize,
    pub resolved_automatic: usize,
    pub resolved_manual: usize,
    pub escalated: usize,
    pub failed: usize,
    /// Resolution attempts that ended with `resolved = false`.
    pub merge_failures: u64,
    pub by_conflict_type: BTreeMap<ConflictType, usize>,
    pub by_strategy: BTreeMap<ResolutionStrategy, usize>,
    pub average_confidence: f64,
    pub data_loss_count: usize,
    pub average_resolution_millis: f64,
}

impl ResolutionStatistics {
    pub fn collect<'a>(
        records: impl IntoIterator<Item = &'a ConflictRecord>,
        analytics: impl IntoIterator<Item = &'a ConflictAnalytics>,
        merge_failures: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            merge_failures,
            ..Self::default()
        };

        for record in records {
            stats.total_conflicts += 1;
            *stats
                .by_conflict_type
                .entry(record.description.conflict_type)
                .or_default() += 1;
            match record.status() {
                ConflictStatus::Pending | ConflictStatus::Analyzing => {
                    stats.active += 1;
                    if record.requires_user_input() {
                        stats.awaiting_user_input += 1;
                    }
                    if record.description.is_overdue(now) {
                        stats.overdue += 1;
                    }
                }
                ConflictStatus::ResolvedAutomatic => stats.resolved_automatic += 1,
                ConflictStatus::ResolvedManual => stats.resolved_manual += 1,
                ConflictStatus::Escalated => stats.escalated += 1,
                ConflictStatus::Failed => stats.failed += 1,
            }
        }

        let mut resolved = 0usize;
        let mut confidence = 0.0;
        let mut millis = 0.0;
        for entry in analytics {
            resolved += 1;
            confidence += entry.confidence;
            millis += entry.resolution_millis as f64;
            *stats.by_strategy.entry(entry.strategy).or_default() += 1;
            if entry.data_loss {
                stats.data_loss_count += 1;
            }
        }
        if resolved > 0 {
            stats.average_confidence = confidence / resolved as f64;
            stats.average_resolution_millis = millis / resolved as f64;
        }
        stats
    }
}
