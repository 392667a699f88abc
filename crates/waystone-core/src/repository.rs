//! Durable store port for synchronization records.
//!
//! The repository is the system of record; the cache in front of it is
//! a hint with an independent lifetime. Implementations keep every
//! operation narrow: get/upsert/list keyed by the ids below, no
//! transactional coupling across operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncError;
use crate::record::{SyncConflict, SyncMetadata, SyncSubscription};

/// Port to the durable synchronization store.
#[async_trait]
pub trait SyncRepository: Send + Sync {
    /// Loads the version bookkeeping for a pair, if any.
    async fn get_metadata(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncMetadata>, SyncError>;

    /// Creates or replaces the version bookkeeping for a pair.
    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<(), SyncError>;

    /// Records a conflict if none exists for its (character_id,
    /// field_path, character_version, campaign_version) key.
    ///
    /// Returns `false` when a record with that key already exists, so
    /// repeated resolution of identical inputs never duplicates
    /// conflicts.
    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<bool, SyncError>;

    /// Lists conflicts for a pair that no strategy has resolved yet.
    async fn list_unresolved_conflicts(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<SyncConflict>, SyncError>;

    /// Marks a recorded conflict resolved. Resolved conflicts are
    /// immutable; re-marking is a no-op.
    async fn mark_conflict_resolved(
        &self,
        conflict_id: Uuid,
        strategy: &str,
        resolved_value: &Value,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), SyncError>;

    /// Loads the subscription for a pair, if any.
    async fn get_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncSubscription>, SyncError>;

    /// Creates or replaces a subscription.
    async fn upsert_subscription(&self, subscription: &SyncSubscription)
    -> Result<(), SyncError>;

    /// Deletes the subscription for a pair. Deleting an absent
    /// subscription is a no-op.
    async fn delete_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), SyncError>;

    /// Lists every subscription a character holds.
    async fn list_subscriptions_for_character(
        &self,
        character_id: Uuid,
    ) -> Result<Vec<SyncSubscription>, SyncError>;

    /// Loads the current character state document, if any.
    async fn get_character_state(&self, character_id: Uuid) -> Result<Option<Value>, SyncError>;

    /// Creates or replaces the current character state document.
    async fn upsert_character_state(
        &self,
        character_id: Uuid,
        state: &Value,
    ) -> Result<(), SyncError>;

    /// Loads the agreed base state for a pair at a campaign version.
    async fn get_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
    ) -> Result<Option<Value>, SyncError>;

    /// Stores the agreed base state for a pair at a campaign version.
    async fn upsert_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
        state: &Value,
    ) -> Result<(), SyncError>;
}
