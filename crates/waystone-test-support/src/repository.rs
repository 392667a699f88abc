//! Test repositories — mock `SyncRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use waystone_core::error::SyncError;
use waystone_core::record::{SyncConflict, SyncMetadata, SyncSubscription};
use waystone_core::repository::SyncRepository;

#[derive(Debug, Default)]
struct Inner {
    metadata: HashMap<(Uuid, Uuid), SyncMetadata>,
    conflicts: Vec<SyncConflict>,
    subscriptions: HashMap<(Uuid, Uuid), SyncSubscription>,
    states: HashMap<Uuid, Value>,
    snapshots: HashMap<(Uuid, Uuid, i64), Value>,
}

/// A fully functional in-memory `SyncRepository`. Honors the
/// insert-if-absent conflict contract, so idempotence tests behave
/// exactly like the durable store.
#[derive(Debug, Default)]
pub struct InMemorySyncRepository {
    inner: Mutex<Inner>,
}

impl InMemorySyncRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every conflict record, resolved or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn all_conflicts(&self) -> Vec<SyncConflict> {
        self.inner.lock().unwrap().conflicts.clone()
    }

    /// Seeds a character state document.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_state(&self, character_id: Uuid, state: Value) {
        self.inner.lock().unwrap().states.insert(character_id, state);
    }

    /// Seeds a base snapshot at a campaign version.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
        state: Value,
    ) {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .insert((character_id, campaign_id, campaign_version), state);
    }

    /// Seeds sync metadata for a pair.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_metadata(&self, metadata: SyncMetadata) {
        self.inner
            .lock()
            .unwrap()
            .metadata
            .insert((metadata.character_id, metadata.campaign_id), metadata);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, SyncError> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Sync("repository mutex poisoned".into()))
    }
}

#[async_trait]
impl SyncRepository for InMemorySyncRepository {
    async fn get_metadata(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncMetadata>, SyncError> {
        Ok(self
            .lock()?
            .metadata
            .get(&(character_id, campaign_id))
            .cloned())
    }

    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<(), SyncError> {
        self.lock()?
            .metadata
            .insert((metadata.character_id, metadata.campaign_id), metadata.clone());
        Ok(())
    }

    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<bool, SyncError> {
        let mut inner = self.lock()?;
        let exists = inner.conflicts.iter().any(|c| {
            c.character_id == conflict.character_id
                && c.field_path == conflict.field_path
                && c.character_version == conflict.character_version
                && c.campaign_version == conflict.campaign_version
        });
        if exists {
            return Ok(false);
        }
        inner.conflicts.push(conflict.clone());
        Ok(true)
    }

    async fn list_unresolved_conflicts(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        Ok(self
            .lock()?
            .conflicts
            .iter()
            .filter(|c| {
                !c.resolved && c.character_id == character_id && c.campaign_id == campaign_id
            })
            .cloned()
            .collect())
    }

    async fn mark_conflict_resolved(
        &self,
        conflict_id: Uuid,
        strategy: &str,
        resolved_value: &Value,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let mut inner = self.lock()?;
        if let Some(conflict) = inner
            .conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id && !c.resolved)
        {
            conflict.resolved = true;
            conflict.resolution_strategy = Some(strategy.to_owned());
            conflict.resolved_value = Some(resolved_value.clone());
            conflict.resolved_at = Some(resolved_at);
        }
        Ok(())
    }

    async fn get_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncSubscription>, SyncError> {
        Ok(self
            .lock()?
            .subscriptions
            .get(&(character_id, campaign_id))
            .cloned())
    }

    async fn upsert_subscription(
        &self,
        subscription: &SyncSubscription,
    ) -> Result<(), SyncError> {
        self.lock()?.subscriptions.insert(
            (subscription.character_id, subscription.campaign_id),
            subscription.clone(),
        );
        Ok(())
    }

    async fn delete_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), SyncError> {
        self.lock()?
            .subscriptions
            .remove(&(character_id, campaign_id));
        Ok(())
    }

    async fn list_subscriptions_for_character(
        &self,
        character_id: Uuid,
    ) -> Result<Vec<SyncSubscription>, SyncError> {
        let mut subscriptions: Vec<SyncSubscription> = self
            .lock()?
            .subscriptions
            .values()
            .filter(|s| s.character_id == character_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.campaign_id);
        Ok(subscriptions)
    }

    async fn get_character_state(&self, character_id: Uuid) -> Result<Option<Value>, SyncError> {
        Ok(self.lock()?.states.get(&character_id).cloned())
    }

    async fn upsert_character_state(
        &self,
        character_id: Uuid,
        state: &Value,
    ) -> Result<(), SyncError> {
        self.lock()?.states.insert(character_id, state.clone());
        Ok(())
    }

    async fn get_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
    ) -> Result<Option<Value>, SyncError> {
        Ok(self
            .lock()?
            .snapshots
            .get(&(character_id, campaign_id, campaign_version))
            .cloned())
    }

    async fn upsert_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
        state: &Value,
    ) -> Result<(), SyncError> {
        self.lock()?
            .snapshots
            .insert((character_id, campaign_id, campaign_version), state.clone());
        Ok(())
    }
}

/// A repository whose every operation fails with a sync error. Useful
/// for testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingSyncRepository;

fn storage_unavailable() -> SyncError {
    SyncError::Sync("storage unavailable".into())
}

#[async_trait]
impl SyncRepository for FailingSyncRepository {
    async fn get_metadata(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
    ) -> Result<Option<SyncMetadata>, SyncError> {
        Err(storage_unavailable())
    }

    async fn upsert_metadata(&self, _metadata: &SyncMetadata) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }

    async fn insert_conflict(&self, _conflict: &SyncConflict) -> Result<bool, SyncError> {
        Err(storage_unavailable())
    }

    async fn list_unresolved_conflicts(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        Err(storage_unavailable())
    }

    async fn mark_conflict_resolved(
        &self,
        _conflict_id: Uuid,
        _strategy: &str,
        _resolved_value: &Value,
        _resolved_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }

    async fn get_subscription(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
    ) -> Result<Option<SyncSubscription>, SyncError> {
        Err(storage_unavailable())
    }

    async fn upsert_subscription(
        &self,
        _subscription: &SyncSubscription,
    ) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }

    async fn delete_subscription(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
    ) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }

    async fn list_subscriptions_for_character(
        &self,
        _character_id: Uuid,
    ) -> Result<Vec<SyncSubscription>, SyncError> {
        Err(storage_unavailable())
    }

    async fn get_character_state(
        &self,
        _character_id: Uuid,
    ) -> Result<Option<Value>, SyncError> {
        Err(storage_unavailable())
    }

    async fn upsert_character_state(
        &self,
        _character_id: Uuid,
        _state: &Value,
    ) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }

    async fn get_base_snapshot(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
        _campaign_version: i64,
    ) -> Result<Option<Value>, SyncError> {
        Err(storage_unavailable())
    }

    async fn upsert_base_snapshot(
        &self,
        _character_id: Uuid,
        _campaign_id: Uuid,
        _campaign_version: i64,
        _state: &Value,
    ) -> Result<(), SyncError> {
        Err(storage_unavailable())
    }
}
