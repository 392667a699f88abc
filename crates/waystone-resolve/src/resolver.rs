//! The conflict resolver.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use waystone_cache::StateCache;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::record::{SyncConflict, SyncMetadata};
use waystone_core::repository::SyncRepository;
use waystone_core::state::FieldPath;

use crate::diff::{diff_states, set_value_at, value_at};
use crate::strategy::{
    IncrementalStrategy, ResolutionStrategy, RuleBasedStrategy, StructuralMergeStrategy,
};
use crate::table::{StrategyKind, StrategyTable};

/// Advisory-lock parameters for per-pair serialization.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lock time-to-live; a crashed holder frees the pair after this.
    pub ttl: Duration,
    /// Spacing between acquisition attempts.
    pub retry_delay: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            retry_delay: Duration::from_millis(100),
            max_retries: 3,
        }
    }
}

/// What one campaign-update resolution produced.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// The character state after the merge.
    pub resolved_state: Value,
    /// Fields where only the remote side changed, applied directly.
    pub applied_fields: Vec<FieldPath>,
    /// Conflict records created by this pass, resolved and not.
    pub conflicts: Vec<SyncConflict>,
}

impl ResolutionOutcome {
    /// How many of this pass's conflicts remain unresolved.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }
}

/// What a retry pass over queued conflicts produced.
#[derive(Debug, Clone, Copy)]
pub struct PendingOutcome {
    /// Conflicts a strategy resolved this pass.
    pub resolved: usize,
    /// Conflicts still waiting on an operator or a later retry.
    pub remaining: usize,
}

/// Merges incoming remote state into local state via three-way diff
/// and per-field strategies, recording every conflict durably.
///
/// Resolution is idempotent: identical `(character_id, remote_state,
/// remote_version, campaign_id)` inputs never create duplicate
/// conflict records and always produce the same resolved state.
pub struct ConflictResolver {
    cache: Arc<StateCache>,
    repository: Arc<dyn SyncRepository>,
    clock: Arc<dyn Clock>,
    table: StrategyTable,
    rule_based: RuleBasedStrategy,
    incremental: IncrementalStrategy,
    structural: StructuralMergeStrategy,
    lock: LockConfig,
}

impl ConflictResolver {
    /// Creates a resolver with the default strategy table and lock
    /// parameters.
    #[must_use]
    pub fn new(
        cache: Arc<StateCache>,
        repository: Arc<dyn SyncRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            repository,
            clock,
            table: StrategyTable::default(),
            rule_based: RuleBasedStrategy::default(),
            incremental: IncrementalStrategy,
            structural: StructuralMergeStrategy,
            lock: LockConfig::default(),
        }
    }

    /// Overrides the advisory-lock parameters.
    #[must_use]
    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Overrides the strategy dispatch table.
    #[must_use]
    pub fn with_strategy_table(mut self, table: StrategyTable) -> Self {
        self.table = table;
        self
    }

    fn strategy_for(&self, path: &FieldPath) -> &dyn ResolutionStrategy {
        match self.table.kind_for(path) {
            StrategyKind::RuleBased => &self.rule_based,
            StrategyKind::Incremental => &self.incremental,
            StrategyKind::Structural => &self.structural,
        }
    }

    /// Merges a campaign-side state push into the character state.
    ///
    /// Serialized per pair by the advisory lock; pairs resolve
    /// concurrently. An update whose version the pair has already
    /// absorbed returns the current state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Sync`] when the lock stays busy past its
    /// retries or the durable store fails. Cache failures degrade to
    /// repository reads and never fail the resolution.
    pub async fn resolve_campaign_update(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        remote_state: &Value,
        remote_version: i64,
    ) -> Result<ResolutionOutcome, SyncError> {
        let lock_name = format!("sync:{character_id}:{campaign_id}");
        if !self
            .cache
            .get_lock(
                &lock_name,
                self.lock.ttl,
                self.lock.retry_delay,
                self.lock.max_retries,
            )
            .await?
        {
            return Err(SyncError::Sync(format!(
                "sync lock busy for pair {character_id}/{campaign_id}"
            )));
        }

        let result = self
            .resolve_locked(character_id, campaign_id, remote_state, remote_version)
            .await;

        if let Err(err) = self.cache.release_lock(&lock_name).await {
            tracing::warn!(lock = %lock_name, error = %err, "failed to release sync lock");
        }
        result
    }

    async fn resolve_locked(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        remote_state: &Value,
        remote_version: i64,
    ) -> Result<ResolutionOutcome, SyncError> {
        let now = self.clock.now();
        let mut metadata = self
            .repository
            .get_metadata(character_id, campaign_id)
            .await?
            .unwrap_or_else(|| SyncMetadata::new(character_id, campaign_id, now));

        if remote_version <= metadata.campaign_version {
            tracing::debug!(
                %character_id,
                %campaign_id,
                remote_version,
                campaign_version = metadata.campaign_version,
                "campaign update already absorbed"
            );
            let resolved_state = self.load_local_state(character_id).await?;
            return Ok(ResolutionOutcome {
                resolved_state,
                applied_fields: Vec::new(),
                conflicts: Vec::new(),
            });
        }

        let local_state = self.load_local_state(character_id).await?;
        let base = self
            .repository
            .get_base_snapshot(character_id, campaign_id, metadata.campaign_version)
            .await?
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let local_diff = diff_states(&base, &local_state);
        let remote_diff = diff_states(&base, remote_state);

        let mut resolved_state = local_state;
        let mut applied_fields = Vec::new();
        let mut conflicts = Vec::new();

        for (path, remote_change) in &remote_diff {
            let Some(local_change) = local_diff.get(path) else {
                set_value_at(&mut resolved_state, path, remote_change.new_value.clone());
                applied_fields.push(path.clone());
                continue;
            };
            if local_change.new_value == remote_change.new_value {
                // Both sides reached the same value independently.
                continue;
            }

            let detected = SyncConflict::unresolved(
                character_id,
                campaign_id,
                path.clone(),
                local_change.new_value.clone(),
                remote_change.new_value.clone(),
                metadata.character_version,
                metadata.campaign_version,
                now,
            );
            let strategy = self.strategy_for(path);
            let record = match strategy.resolve(
                path,
                value_at(&base, path),
                &local_change.new_value,
                &remote_change.new_value,
            ) {
                Ok(resolution) => {
                    set_value_at(&mut resolved_state, path, resolution.value.clone());
                    detected.into_resolved(resolution.strategy, resolution.value, now)
                }
                Err(SyncError::Conflict { reason, .. }) => {
                    tracing::warn!(
                        %character_id,
                        field = %path,
                        strategy = strategy.name(),
                        reason,
                        "conflict left unresolved, keeping local value"
                    );
                    detected
                }
                Err(other) => return Err(other),
            };
            if self.repository.insert_conflict(&record).await? {
                conflicts.push(record);
            }
        }

        self.repository
            .upsert_character_state(character_id, &resolved_state)
            .await?;
        metadata.campaign_version = remote_version;
        metadata.last_sync = now;
        self.repository.upsert_metadata(&metadata).await?;
        self.repository
            .upsert_base_snapshot(character_id, campaign_id, remote_version, &resolved_state)
            .await?;

        if let Err(err) = self.cache.set_state(character_id, &resolved_state).await {
            tracing::warn!(%character_id, error = %err, "state cache refresh failed");
        }
        if let Err(err) = self.cache.set_metadata(&metadata).await {
            tracing::warn!(%character_id, error = %err, "metadata cache refresh failed");
        }
        if !conflicts.is_empty()
            && let Err(err) = self
                .cache
                .set_conflicts(character_id, campaign_id, &conflicts)
                .await
        {
            tracing::warn!(%character_id, error = %err, "conflict cache refresh failed");
        }

        tracing::info!(
            %character_id,
            %campaign_id,
            remote_version,
            applied = applied_fields.len(),
            conflicts = conflicts.len(),
            "campaign update resolved"
        );

        Ok(ResolutionOutcome {
            resolved_state,
            applied_fields,
            conflicts,
        })
    }

    /// Retries previously-queued unresolved conflicts, reconstructing
    /// each one's historical base from its recorded campaign version.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Sync`] when the lock stays busy past its
    /// retries or the durable store fails.
    pub async fn resolve_pending(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<PendingOutcome, SyncError> {
        let lock_name = format!("sync:{character_id}:{campaign_id}");
        if !self
            .cache
            .get_lock(
                &lock_name,
                self.lock.ttl,
                self.lock.retry_delay,
                self.lock.max_retries,
            )
            .await?
        {
            return Err(SyncError::Sync(format!(
                "sync lock busy for pair {character_id}/{campaign_id}"
            )));
        }

        let result = self.resolve_pending_locked(character_id, campaign_id).await;

        if let Err(err) = self.cache.release_lock(&lock_name).await {
            tracing::warn!(lock = %lock_name, error = %err, "failed to release sync lock");
        }
        result
    }

    async fn resolve_pending_locked(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<PendingOutcome, SyncError> {
        let pending = self
            .repository
            .list_unresolved_conflicts(character_id, campaign_id)
            .await?;
        if pending.is_empty() {
            return Ok(PendingOutcome {
                resolved: 0,
                remaining: 0,
            });
        }

        let now = self.clock.now();
        let mut current_state = self.load_local_state(character_id).await?;
        let mut resolved = 0;
        let mut remaining = 0;

        for conflict in pending {
            let base = self
                .repository
                .get_base_snapshot(character_id, campaign_id, conflict.campaign_version)
                .await?
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            let strategy = self.strategy_for(&conflict.field_path);
            match strategy.resolve(
                &conflict.field_path,
                value_at(&base, &conflict.field_path),
                &conflict.character_value,
                &conflict.campaign_value,
            ) {
                Ok(resolution) => {
                    self.repository
                        .mark_conflict_resolved(
                            conflict.id,
                            resolution.strategy,
                            &resolution.value,
                            now,
                        )
                        .await?;
                    set_value_at(&mut current_state, &conflict.field_path, resolution.value);
                    resolved += 1;
                }
                Err(SyncError::Conflict { reason, .. }) => {
                    tracing::warn!(
                        %character_id,
                        field = %conflict.field_path,
                        reason,
                        "queued conflict still unresolvable"
                    );
                    remaining += 1;
                }
                Err(other) => return Err(other),
            }
        }

        if resolved > 0 {
            self.repository
                .upsert_character_state(character_id, &current_state)
                .await?;
            if let Err(err) = self.cache.set_state(character_id, &current_state).await {
                tracing::warn!(%character_id, error = %err, "state cache refresh failed");
            }
        }

        Ok(PendingOutcome {
            resolved,
            remaining,
        })
    }

    /// Local state from cache when possible, repository otherwise. A
    /// cache failure degrades to the repository read.
    async fn load_local_state(&self, character_id: Uuid) -> Result<Value, SyncError> {
        match self.cache.get_state(character_id).await {
            Ok(Some(state)) => return Ok(state),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%character_id, error = %err, "state cache read failed, using repository");
            }
        }
        Ok(self
            .repository
            .get_character_state(character_id)
            .await?
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}
