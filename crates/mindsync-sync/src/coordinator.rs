//! SyncCoordinator: the engine's public surface.
//!
//! Local writes go through the CRDT, then a compare-and-swap. A rejected swap
//! becomes a conflict; auto-resolvable conflicts are resolved after a short
//! grace window so a racing user choice can pre-empt them. Remote snapshots
//! are merged, never resolved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mindsync_conflict::{ConflictDetector, ConflictRecord, ResolutionStrategyEngine};
use mindsync_core::errors::{MergeError, StorageError};
use mindsync_core::models::{
    AuditAction, AuditEntry, ClinicalPayload, ConflictAnalytics, ConflictDescription,
    ConflictSeverity, ConflictStatus, ConflictType, CrdtKind, CrdtState, DeviceId, EntityType,
    FollowUpAction, OperationType, ResolutionResult, ResolutionStrategy, ResolvedBy, RiskLevel,
    SyncEnvelope, UserConflictChoice,
};
use mindsync_core::traits::{
    CasOutcome, IStateStore, ITransport, VersionConflict, VersionConflictReason, VersionedState,
};
use mindsync_core::{MindSyncConfig, MindSyncError, MindSyncResult, Operation};
use mindsync_crdt::{
    assessment_accuracy, ClinicalCrdt, MergeWinner, OperationResult, VectorClockManager,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::audit::{resource_namespace, RESOLUTION_NAMESPACE};
use crate::replay::ProcessedOperations;
use crate::scheduler::ResolutionScheduler;
use crate::statistics::ResolutionStatistics;

/// What happened to a local operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalApplyOutcome {
    /// Committed at `version`. `pushed` is false when propagation was lazy or
    /// the transport was unreachable.
    Applied {
        version: u64,
        result: OperationResult,
        pushed: bool,
    },
    /// Already applied; nothing changed.
    Duplicate,
    /// The write was rejected and recorded as a conflict.
    Conflict(ConflictDescription),
}

/// What happened to a remote snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Created { version: u64 },
    Merged { version: u64, winner: MergeWinner },
    /// The merge changed nothing locally.
    Unchanged,
    /// The envelope had already been processed.
    Duplicate,
}

struct Inner<S, T> {
    config: MindSyncConfig,
    device_id: DeviceId,
    store: S,
    transport: T,
    detector: ConflictDetector,
    engine: ResolutionStrategyEngine,
    conflicts: DashMap<String, ConflictRecord>,
    analytics: DashMap<String, ConflictAnalytics>,
    scheduler: ResolutionScheduler,
    processed: Mutex<ProcessedOperations>,
    merge_failures: AtomicU64,
}

/// Orchestrates apply → detect → resolve → commit → audit → push.
///
/// Cheap to clone; clones share all state.
pub struct SyncCoordinator<S, T> {
    inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for SyncCoordinator<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T> SyncCoordinator<S, T>
where
    S: IStateStore + 'static,
    T: ITransport + 'static,
{
    pub fn new(store: S, transport: T, config: MindSyncConfig) -> Self {
        let device_id = DeviceId::new(config.sync.device_id.clone());
        let processed = ProcessedOperations::new(config.sync.processed_operation_capacity);
        Self {
            inner: Arc::new(Inner {
                detector: ConflictDetector::new(config.resolution.clone()),
                engine: ResolutionStrategyEngine::new(config.resolution.clone()),
                device_id,
                store,
                transport,
                conflicts: DashMap::new(),
                analytics: DashMap::new(),
                scheduler: ResolutionScheduler::new(),
                processed: Mutex::new(processed),
                merge_failures: AtomicU64::new(0),
                config,
            }),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    pub fn config(&self) -> &MindSyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // ── Local operations ──

    /// Apply a local operation against the currently stored version.
    #[instrument(
        skip(self, op),
        fields(operation_id = %op.operation_id, resource_id = %op.resource_id)
    )]
    pub async fn apply_local_operation(&self, op: Operation) -> MindSyncResult<LocalApplyOutcome> {
        let current = self.inner.store.get(&op.resource_id).await?;
        let expected = current.as_ref().map(|stored| stored.version);
        self.apply_with(op, current, expected).await
    }

    /// Apply an operation that was written against `base_version`
    /// (`None`: the writer expects to create the record). A stale base
    /// surfaces as a conflict.
    #[instrument(
        skip(self, op),
        fields(operation_id = %op.operation_id, resource_id = %op.resource_id)
    )]
    pub async fn apply_local_operation_at(
        &self,
        op: Operation,
        base_version: Option<u64>,
    ) -> MindSyncResult<LocalApplyOutcome> {
        let current = self.inner.store.get(&op.resource_id).await?;
        self.apply_with(op, current, base_version).await
    }

    async fn apply_with(
        &self,
        op: Operation,
        current: Option<VersionedState>,
        expected: Option<u64>,
    ) -> MindSyncResult<LocalApplyOutcome> {
        if self.inner.processed.lock().await.contains(&op.operation_id) {
            debug!("operation already processed");
            return Ok(LocalApplyOutcome::Duplicate);
        }

        let base = match &current {
            Some(stored)
                if stored.state.tombstoned
                    || stored.state.clinical_type() != op.operation_data.clinical_type() =>
            {
                let signal = stale(&op.resource_id, expected, Some(stored.version));
                return self.conflict_outcome(&op, current.as_ref(), &signal).await;
            }
            Some(stored) => stored.state.clone(),
            None if op.operation_type == OperationType::Create => CrdtState::new(
                op.resource_id.clone(),
                op.operation_data.clone(),
                op.device_id.clone(),
            ),
            None => {
                let signal = stale(&op.resource_id, expected, None);
                return self.conflict_outcome(&op, None, &signal).await;
            }
        };

        let mut crdt = ClinicalCrdt::from_state(base)?;
        let result = crdt.apply_operation(&op)?;
        if result.duplicate {
            self.inner.processed.lock().await.insert(&op.operation_id);
            return Ok(LocalApplyOutcome::Duplicate);
        }

        match self
            .inner
            .store
            .compare_and_swap(&op.resource_id, expected, &result.state)
            .await?
        {
            CasOutcome::Committed { version } => {
                self.inner.processed.lock().await.insert(&op.operation_id);
                if let Some(entry) = &result.audit_entry {
                    self.inner
                        .store
                        .append_audit(&resource_namespace(&op.resource_id), entry)
                        .await?;
                }
                let pushed = if result.propagation_required {
                    let envelope = SyncEnvelope::new(
                        self.inner.device_id.clone(),
                        result.state.clone(),
                        Some(op.clone()),
                    );
                    self.push(&envelope).await
                } else {
                    false
                };
                info!(version, pushed, "local operation committed");
                Ok(LocalApplyOutcome::Applied {
                    version,
                    result,
                    pushed,
                })
            }
            CasOutcome::Conflict(signal) => {
                debug!(
                    expected = ?signal.expected_version,
                    actual = ?signal.actual_version,
                    "write rejected"
                );
                let server = self.inner.store.get(&op.resource_id).await?;
                self.conflict_outcome(&op, server.as_ref(), &signal).await
            }
        }
    }

    async fn conflict_outcome(
        &self,
        op: &Operation,
        server: Option<&VersionedState>,
        signal: &VersionConflict,
    ) -> MindSyncResult<LocalApplyOutcome> {
        self.register_conflict(op, server, signal)
            .await
            .map(LocalApplyOutcome::Conflict)
    }

    // ── Remote snapshots ──

    /// Merge a snapshot received from another device.
    #[instrument(
        skip_all,
        fields(resource_id = %envelope.state.id, source_device = %envelope.source_device)
    )]
    pub async fn receive_remote(&self, envelope: SyncEnvelope) -> MindSyncResult<RemoteOutcome> {
        let key = envelope.dedup_key().to_string();
        if self.inner.processed.lock().await.contains(&key) {
            debug!(dedup_key = %key, "envelope already processed");
            return Ok(RemoteOutcome::Duplicate);
        }

        let resource_id = envelope.state.id.clone();
        let remote = ClinicalCrdt::from_state(envelope.state.clone())?;
        let attempts = self.inner.config.sync.max_cas_retries + 1;

        for attempt in 1..=attempts {
            let outcome = match self.inner.store.get(&resource_id).await? {
                None => match self
                    .inner
                    .store
                    .compare_and_swap(&resource_id, None, &envelope.state)
                    .await?
                {
                    CasOutcome::Committed { version } => Some(RemoteOutcome::Created { version }),
                    CasOutcome::Conflict(_) => None,
                },
                Some(stored) => {
                    let local = ClinicalCrdt::from_state(stored.state.clone())?;
                    let merged = crate::merge_span!(resource_id, envelope.source_device)
                        .in_scope(|| local.merge(&remote))
                        .inspect_err(|_| {
                            self.inner.merge_failures.fetch_add(1, Ordering::Relaxed);
                        })?;
                    if merged.state.converged_with(&stored.state) {
                        Some(RemoteOutcome::Unchanged)
                    } else {
                        match self
                            .inner
                            .store
                            .compare_and_swap(&resource_id, Some(stored.version), &merged.state)
                            .await?
                        {
                            CasOutcome::Committed { version } => Some(RemoteOutcome::Merged {
                                version,
                                winner: merged.winner,
                            }),
                            CasOutcome::Conflict(_) => None,
                        }
                    }
                }
            };

            if let Some(outcome) = outcome {
                self.inner.processed.lock().await.insert(&key);
                if outcome != RemoteOutcome::Unchanged {
                    let mut entry = AuditEntry::new(
                        &resource_id,
                        AuditAction::RemoteMerged,
                        envelope.source_device.clone(),
                    );
                    if let Some(op) = &envelope.operation {
                        entry = entry.with_operation(&op.operation_id);
                    }
                    self.inner
                        .store
                        .append_audit(&resource_namespace(&resource_id), &entry)
                        .await?;
                }
                info!(?outcome, "remote snapshot processed");
                return Ok(outcome);
            }
            debug!(attempt, "remote merge raced a local write; retrying");
        }

        Err(StorageError::RetriesExhausted {
            resource_id,
            attempts,
        }
        .into())
    }

    /// Decode a wire envelope, then [`Self::receive_remote`].
    pub async fn receive_remote_bytes(&self, bytes: &[u8]) -> MindSyncResult<RemoteOutcome> {
        let envelope = SyncEnvelope::decode(bytes)?;
        self.receive_remote(envelope).await
    }

    // ── Conflicts ──

    /// Record a conflict for a rejected write. Returns `None` without a
    /// version-conflict signal.
    ///
    /// Auto-resolvable conflicts are scheduled after the configured grace
    /// window; everything else waits for [`Self::resolve_conflict`].
    pub async fn detect_conflict(
        &self,
        op: &Operation,
        server: Option<&VersionedState>,
        signal: Option<&VersionConflict>,
    ) -> MindSyncResult<Option<ConflictDescription>> {
        match signal {
            Some(signal) => self.register_conflict(op, server, signal).await.map(Some),
            None => Ok(None),
        }
    }

    async fn register_conflict(
        &self,
        op: &Operation,
        server: Option<&VersionedState>,
        signal: &VersionConflict,
    ) -> MindSyncResult<ConflictDescription> {
        let description = crate::detection_span!(op.resource_id)
            .in_scope(|| self.inner.detector.describe(op, server, signal));
        let conflict_id = description.conflict_id.clone();
        self.inner
            .conflicts
            .insert(conflict_id.clone(), ConflictRecord::new(description.clone()));

        let mut entry = AuditEntry::new(
            &description.resource_id,
            AuditAction::ConflictDetected,
            op.device_id.clone(),
        )
        .with_operation(&op.operation_id)
        .with_risk(risk_for(description.severity));
        entry.conflict_id = Some(conflict_id.clone());
        self.inner
            .store
            .append_audit(RESOLUTION_NAMESPACE, &entry)
            .await?;

        debug!(%conflict_id, "conflict registered");

        if description.auto_resolution_possible {
            let coordinator = self.clone();
            let id = conflict_id.clone();
            self.inner.scheduler.schedule(
                &conflict_id,
                self.inner.config.resolution.grace_window(),
                async move {
                    if let Err(err) = coordinator.run_resolution(&id, None).await {
                        warn!(conflict_id = %id, error = %err, "scheduled resolution failed");
                    }
                },
            );
        }
        Ok(description)
    }

    /// Resolve a conflict now, pre-empting any scheduled auto-resolution.
    /// With a `choice` the user's field picks are applied.
    ///
    /// Fails with [`MindSyncError::ConflictAlreadyHandled`] when the grace
    /// task has already started or finished; the choice is not applied and
    /// [`Self::conflict`] shows what was committed.
    #[instrument(skip(self, choice))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        choice: Option<UserConflictChoice>,
    ) -> MindSyncResult<ResolutionResult> {
        if self.inner.scheduler.cancel(conflict_id) {
            debug!("scheduled auto-resolution pre-empted");
        }
        if let Some(strategy) = choice.as_ref().and_then(|c| c.remember_preference) {
            let key = self.inner.conflicts.get(conflict_id).map(|record| {
                (
                    record.description.conflict_type,
                    record.description.resource_type,
                )
            });
            if let Some((conflict_type, resource_type)) = key {
                self.inner
                    .detector
                    .record_user_preference(conflict_type, resource_type, strategy);
            }
        }
        self.run_resolution(conflict_id, choice.as_ref()).await
    }

    pub async fn submit_user_choice(
        &self,
        conflict_id: &str,
        choice: UserConflictChoice,
    ) -> MindSyncResult<ResolutionResult> {
        self.resolve_conflict(conflict_id, Some(choice)).await
    }

    pub fn record_user_preference(
        &self,
        conflict_type: ConflictType,
        resource_type: EntityType,
        strategy: ResolutionStrategy,
    ) {
        self.inner
            .detector
            .record_user_preference(conflict_type, resource_type, strategy);
    }

    async fn run_resolution(
        &self,
        conflict_id: &str,
        choice: Option<&UserConflictChoice>,
    ) -> MindSyncResult<ResolutionResult> {
        let description = self.begin_analysis(conflict_id)?;
        let requested = match choice {
            Some(_) => ResolutionStrategy::UserChoice,
            None => description.recommended_strategy,
        };
        let span = crate::resolution_span!(conflict_id, requested);

        async {
            match self.inner.engine.resolve(&description, requested, choice) {
                Ok(result) => {
                    if let Err(err) = self.commit_resolution(&description, &result).await {
                        self.return_to_pending(conflict_id, "commit failed");
                        return Err(err);
                    }
                    self.finish(&description, result).await
                }
                Err(MindSyncError::MergeFailure(err)) => {
                    let follow_ups = match err {
                        MergeError::UserChoiceRequired { .. } => {
                            vec![FollowUpAction::AwaitUserChoice]
                        }
                        _ => {
                            self.inner.merge_failures.fetch_add(1, Ordering::Relaxed);
                            vec![
                                FollowUpAction::ManualReviewRequired,
                                FollowUpAction::ContactSupport,
                            ]
                        }
                    };
                    warn!(error = %err, "conflict left pending");
                    self.return_to_pending(conflict_id, &err.to_string());
                    let resolved_by = match choice {
                        Some(_) => ResolvedBy::User,
                        None => ResolvedBy::Automatic,
                    };
                    let result = ResolutionResult::unresolved(
                        conflict_id,
                        &description.resource_id,
                        requested,
                        follow_ups,
                        resolved_by,
                    );
                    if let Some(mut record) = self.inner.conflicts.get_mut(conflict_id) {
                        record.result = Some(result.clone());
                    }
                    Ok(result)
                }
                Err(err) => {
                    self.return_to_pending(conflict_id, "resolution error");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn begin_analysis(&self, conflict_id: &str) -> MindSyncResult<ConflictDescription> {
        let mut record = self.inner.conflicts.get_mut(conflict_id).ok_or_else(|| {
            MindSyncError::ConflictNotFound {
                id: conflict_id.to_string(),
            }
        })?;
        let status = record.status();
        if status != ConflictStatus::Pending {
            return Err(MindSyncError::ConflictAlreadyHandled {
                id: conflict_id.to_string(),
                status: status.to_string(),
            });
        }
        record.transition(ConflictStatus::Analyzing, "resolution started")?;
        record.attempts += 1;
        Ok(record.description.clone())
    }

    fn return_to_pending(&self, conflict_id: &str, reason: &str) {
        if let Some(mut record) = self.inner.conflicts.get_mut(conflict_id) {
            if let Err(err) = record.transition(ConflictStatus::Pending, reason) {
                warn!(conflict_id, error = %err, "could not return conflict to pending");
            }
        }
    }

    /// Write the resolved payload. A resolution without data (the record was
    /// deleted and the server side won) leaves the store untouched.
    async fn commit_resolution(
        &self,
        description: &ConflictDescription,
        result: &ResolutionResult,
    ) -> MindSyncResult<()> {
        let Some(payload) = &result.resolved_data else {
            debug!("resolution keeps the stored record");
            return Ok(());
        };

        let attempts = self.inner.config.sync.max_cas_retries + 1;
        for attempt in 1..=attempts {
            let current = self.inner.store.get(&description.resource_id).await?;
            let state = self.resolved_state(description, result, payload, current.as_ref())?;
            match self
                .inner
                .store
                .compare_and_swap(
                    &description.resource_id,
                    current.as_ref().map(|stored| stored.version),
                    &state,
                )
                .await?
            {
                CasOutcome::Committed { version } => {
                    info!(version, "resolved state committed");
                    let envelope = SyncEnvelope::new(self.inner.device_id.clone(), state, None);
                    self.push(&envelope).await;
                    return Ok(());
                }
                CasOutcome::Conflict(_) => {
                    debug!(attempt, "resolution commit raced a write; retrying");
                }
            }
        }

        Err(StorageError::RetriesExhausted {
            resource_id: description.resource_id.clone(),
            attempts,
        }
        .into())
    }

    /// The snapshot to commit. Writes that reached the store after detection
    /// are merged in, so the resolution never drops them.
    fn resolved_state(
        &self,
        description: &ConflictDescription,
        result: &ResolutionResult,
        payload: &ClinicalPayload,
        current: Option<&VersionedState>,
    ) -> MindSyncResult<CrdtState> {
        let mut state = match current {
            Some(stored) => {
                let mut state = stored.state.clone();
                state.value = payload.clone();
                if moved_since_detection(description, stored, payload) {
                    let resolved = ClinicalCrdt::from_state(state)?;
                    let concurrent = ClinicalCrdt::from_state(stored.state.clone())?;
                    let span =
                        crate::merge_span!(description.resource_id, stored.state.last_writer);
                    let merged = span.in_scope(|| resolved.merge(&concurrent))?;
                    debug!(
                        stored_version = stored.version,
                        detected_version = description.server.version,
                        winner = ?merged.winner,
                        "folded writes made after detection into the resolution"
                    );
                    merged.state
                } else {
                    state
                }
            }
            None => CrdtState::new(
                description.resource_id.clone(),
                payload.clone(),
                description.client.device_id.clone(),
            ),
        };

        let mut clocks = vec![state.vector_clock.clone()];
        clocks.extend(result.merged_clock.clone());
        let merged = VectorClockManager::merge(&clocks);
        state.vector_clock = VectorClockManager::increment(&merged, &self.inner.device_id);

        let clinical_type = payload.clinical_type();
        state.kind = CrdtKind::for_clinical_type(clinical_type);
        state.clinical_metadata.clinical_type = clinical_type;
        if let ClinicalPayload::AssessmentScore(score) = &state.value {
            state.clinical_metadata.clinical_accuracy = assessment_accuracy(score);
        }
        state.clinical_metadata.validated = !result.validation_required;
        state.clinical_metadata.requires_audit |= result.validation_required;
        if description.crisis_context.involves_crisis_data {
            state
                .clinical_metadata
                .safety_implications
                .insert("crisis_conflict_resolved".to_string());
        }

        state.last_writer = self.inner.device_id.clone();
        state
            .applied_operations
            .insert(description.client.operation_id.clone());
        state.tombstoned = false;
        Ok(state)
    }

    async fn finish(
        &self,
        description: &ConflictDescription,
        result: ResolutionResult,
    ) -> MindSyncResult<ResolutionResult> {
        let conflict_id = description.conflict_id.as_str();
        let status = if result.resolved_by == ResolvedBy::User {
            ConflictStatus::ResolvedManual
        } else if !description.precedence_tier.auto_resolution_allowed() {
            ConflictStatus::Escalated
        } else {
            ConflictStatus::ResolvedAutomatic
        };

        {
            let mut record = self.inner.conflicts.get_mut(conflict_id).ok_or_else(|| {
                MindSyncError::ConflictNotFound {
                    id: conflict_id.to_string(),
                }
            })?;
            record.transition(status, result.strategy.as_str())?;
            record.result = Some(result.clone());
            let analytics = ConflictAnalytics::from_resolution(&record.description, &result);
            self.inner
                .analytics
                .insert(conflict_id.to_string(), analytics);
        }

        let action = match status {
            ConflictStatus::Escalated => AuditAction::ConflictEscalated,
            _ => AuditAction::ConflictResolved,
        };
        let entry = AuditEntry::new(&description.resource_id, action, self.inner.device_id.clone())
            .with_operation(&description.client.operation_id)
            .with_risk(risk_for(description.severity))
            .with_resolution(result.clone());
        self.inner
            .store
            .append_audit(RESOLUTION_NAMESPACE, &entry)
            .await?;
        self.inner
            .processed
            .lock()
            .await
            .insert(&description.client.operation_id);

        info!(
            %status,
            strategy = %result.strategy,
            confidence = result.confidence,
            data_loss = result.data_loss,
            "conflict resolved"
        );
        Ok(result)
    }

    // ── Queries ──

    pub fn conflict(&self, conflict_id: &str) -> Option<ConflictRecord> {
        self.inner
            .conflicts
            .get(conflict_id)
            .map(|record| record.clone())
    }

    /// Pending and analyzing conflicts, most urgent first.
    pub fn get_active_conflicts(&self) -> Vec<ConflictDescription> {
        let mut active: Vec<ConflictDescription> = self
            .inner
            .conflicts
            .iter()
            .filter(|record| record.is_active())
            .map(|record| record.description.clone())
            .collect();
        active.sort_by(|a, b| {
            b.urgency
                .cmp(&a.urgency)
                .then(a.detected_at.cmp(&b.detected_at))
        });
        active
    }

    pub fn get_conflicts_requiring_user_input(&self) -> Vec<ConflictDescription> {
        let mut waiting: Vec<ConflictDescription> = self
            .inner
            .conflicts
            .iter()
            .filter(|record| record.requires_user_input())
            .map(|record| record.description.clone())
            .collect();
        waiting.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        waiting
    }

    pub fn is_resolution_scheduled(&self, conflict_id: &str) -> bool {
        self.inner.scheduler.is_scheduled(conflict_id)
    }

    pub fn get_resolution_statistics(&self) -> ResolutionStatistics {
        let records: Vec<ConflictRecord> = self
            .inner
            .conflicts
            .iter()
            .map(|record| record.clone())
            .collect();
        let analytics: Vec<ConflictAnalytics> = self
            .inner
            .analytics
            .iter()
            .map(|entry| entry.clone())
            .collect();
        ResolutionStatistics::collect(
            &records,
            &analytics,
            self.inner.merge_failures.load(Ordering::Relaxed),
            Utc::now(),
        )
    }

    /// Audit entries for a namespace: [`RESOLUTION_NAMESPACE`] or
    /// [`resource_namespace`].
    pub async fn audit_log(&self, namespace: &str) -> MindSyncResult<Vec<AuditEntry>> {
        self.inner.store.audit_log(namespace).await
    }

    async fn push(&self, envelope: &SyncEnvelope) -> bool {
        match self.inner.transport.push(envelope).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    error = %err,
                    "push failed; state stays committed locally"
                );
                false
            }
        }
    }
}

fn stale(resource_id: &str, expected: Option<u64>, actual: Option<u64>) -> VersionConflict {
    VersionConflict {
        resource_id: resource_id.to_string(),
        expected_version: expected,
        actual_version: actual,
        reason: VersionConflictReason::StaleVersion,
    }
}

fn risk_for(severity: ConflictSeverity) -> RiskLevel {
    match severity {
        ConflictSeverity::Low => RiskLevel::Low,
        ConflictSeverity::Medium => RiskLevel::Medium,
        ConflictSeverity::High => RiskLevel::High,
        ConflictSeverity::Critical => RiskLevel::Critical,
    }
}

/// The stored record changed after the conflict was detected and can still
/// be merged with the resolved payload.
fn moved_since_detection(
    description: &ConflictDescription,
    stored: &VersionedState,
    payload: &ClinicalPayload,
) -> bool {
    stored.version != description.server.version
        && !stored.state.tombstoned
        && stored.state.clinical_type() == payload.clinical_type()
}
