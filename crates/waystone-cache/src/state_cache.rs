//! The state cache fronting the durable store.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use waystone_core::error::SyncError;
use waystone_core::record::{SyncConflict, SyncMetadata, SyncSubscription};

use crate::backend::CacheBackend;

/// Time-to-live configuration for each cache namespace.
///
/// The state TTL is fixed long (state documents are re-validated
/// against the repository on every resolution); the bookkeeping
/// namespaces inherit the shared default unless overridden.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared default for namespaces without an explicit TTL.
    pub default_ttl: Duration,
    /// TTL for character state documents.
    pub state_ttl: Duration,
    /// TTL for sync metadata, if overridden.
    pub metadata_ttl: Option<Duration>,
    /// TTL for subscriptions, if overridden.
    pub subscription_ttl: Option<Duration>,
    /// TTL for cached conflict lists, if overridden.
    pub conflict_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            state_ttl: Duration::from_secs(3600),
            metadata_ttl: None,
            subscription_ttl: None,
            conflict_ttl: None,
        }
    }
}

impl CacheConfig {
    fn metadata_ttl(&self) -> Duration {
        self.metadata_ttl.unwrap_or(self.default_ttl)
    }

    fn subscription_ttl(&self) -> Duration {
        self.subscription_ttl.unwrap_or(self.default_ttl)
    }

    fn conflict_ttl(&self) -> Duration {
        self.conflict_ttl.unwrap_or(self.default_ttl)
    }
}

fn state_key(character_id: Uuid) -> String {
    format!("character_state:{character_id}")
}

fn metadata_key(character_id: Uuid, campaign_id: Uuid) -> String {
    format!("sync_metadata:{character_id}:{campaign_id}")
}

fn subscription_key(character_id: Uuid, campaign_id: Uuid) -> String {
    format!("sync_subscription:{character_id}:{campaign_id}")
}

fn conflicts_key(character_id: Uuid, campaign_id: Uuid) -> String {
    format!("sync_conflicts:{character_id}:{campaign_id}")
}

fn lock_key(name: &str) -> String {
    format!("sync_lock:{name}")
}

fn encode<T: Serialize>(record: &T) -> Result<Value, SyncError> {
    serde_json::to_value(record).map_err(|e| SyncError::Cache(format!("encode failed: {e}")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|e| SyncError::Cache(format!("decode failed: {e}")))
}

/// TTL'd cache of sync state, metadata, subscriptions, and conflicts,
/// plus the advisory distributed lock.
///
/// Cached entries are hints; the repository stays the source of truth
/// and record lifetime is never tied to cache lifetime.
pub struct StateCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl StateCache {
    /// Creates a cache over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Reads a cached character state document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn get_state(&self, character_id: Uuid) -> Result<Option<Value>, SyncError> {
        self.backend.get(&state_key(character_id)).await
    }

    /// Caches a character state document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn set_state(&self, character_id: Uuid, state: &Value) -> Result<(), SyncError> {
        self.backend
            .set(&state_key(character_id), state.clone(), self.config.state_ttl)
            .await
    }

    /// Drops a cached character state document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn delete_state(&self, character_id: Uuid) -> Result<(), SyncError> {
        self.backend.delete(&state_key(character_id)).await
    }

    /// Reads cached sync metadata for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or decode failure.
    pub async fn get_metadata(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncMetadata>, SyncError> {
        self.backend
            .get(&metadata_key(character_id, campaign_id))
            .await?
            .map(decode)
            .transpose()
    }

    /// Caches sync metadata for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or encode failure.
    pub async fn set_metadata(&self, metadata: &SyncMetadata) -> Result<(), SyncError> {
        self.backend
            .set(
                &metadata_key(metadata.character_id, metadata.campaign_id),
                encode(metadata)?,
                self.config.metadata_ttl(),
            )
            .await
    }

    /// Reads a cached subscription for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or decode failure.
    pub async fn get_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncSubscription>, SyncError> {
        self.backend
            .get(&subscription_key(character_id, campaign_id))
            .await?
            .map(decode)
            .transpose()
    }

    /// Caches a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or encode failure.
    pub async fn set_subscription(
        &self,
        subscription: &SyncSubscription,
    ) -> Result<(), SyncError> {
        self.backend
            .set(
                &subscription_key(subscription.character_id, subscription.campaign_id),
                encode(subscription)?,
                self.config.subscription_ttl(),
            )
            .await
    }

    /// Drops a cached subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn delete_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), SyncError> {
        self.backend
            .delete(&subscription_key(character_id, campaign_id))
            .await
    }

    /// Reads the cached conflict list for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or decode failure.
    pub async fn get_conflicts(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Vec<SyncConflict>>, SyncError> {
        self.backend
            .get(&conflicts_key(character_id, campaign_id))
            .await?
            .map(decode)
            .transpose()
    }

    /// Caches the conflict list for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on transport or encode failure.
    pub async fn set_conflicts(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        conflicts: &[SyncConflict],
    ) -> Result<(), SyncError> {
        self.backend
            .set(
                &conflicts_key(character_id, campaign_id),
                encode(&conflicts)?,
                self.config.conflict_ttl(),
            )
            .await
    }

    /// Reads many raw keys in one round trip, positionally.
    ///
    /// Batch operations are single round trips, not transactions; a
    /// concurrent writer may interleave between entries.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, SyncError> {
        self.backend.get_many(keys).await
    }

    /// Writes many raw keys in one round trip under the shared default
    /// TTL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn set_many(&self, entries: &[(String, Value)]) -> Result<(), SyncError> {
        self.backend.set_many(entries, self.config.default_ttl).await
    }

    /// Deletes many raw keys in one round trip.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn delete_many(&self, keys: &[String]) -> Result<(), SyncError> {
        self.backend.delete_many(keys).await
    }

    /// Acquires the advisory lock `name`, retrying up to `max_retries`
    /// times spaced by `retry_delay`.
    ///
    /// Returns `false` when every attempt found the lock held — the
    /// caller decides whether to back off or fail, nothing blocks
    /// forever. The lock self-expires after `ttl`, so a crashed holder
    /// cannot deadlock others.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn get_lock(
        &self,
        name: &str,
        ttl: Duration,
        retry_delay: Duration,
        max_retries: u32,
    ) -> Result<bool, SyncError> {
        let key = lock_key(name);
        for attempt in 0..=max_retries {
            if self
                .backend
                .set_if_absent(&key, Value::Bool(true), ttl)
                .await?
            {
                return Ok(true);
            }
            if attempt < max_retries {
                tokio::time::sleep(retry_delay).await;
            }
        }
        tracing::debug!(lock = name, "advisory lock exhausted retries");
        Ok(false)
    }

    /// Releases the advisory lock `name` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn release_lock(&self, name: &str) -> Result<(), SyncError> {
        self.backend.delete(&lock_key(name)).await
    }

    /// Drops every cached entry belonging to a character: state,
    /// metadata, subscriptions, and conflict lists across all pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] on any transport failure.
    pub async fn clear_character_cache(&self, character_id: Uuid) -> Result<(), SyncError> {
        let patterns = [
            state_key(character_id),
            format!("sync_metadata:{character_id}:*"),
            format!("sync_subscription:{character_id}:*"),
            format!("sync_conflicts:{character_id}:*"),
        ];
        let mut keys = Vec::new();
        for pattern in &patterns {
            keys.extend(self.backend.scan(pattern).await?);
        }
        if !keys.is_empty() {
            self.backend.delete_many(&keys).await?;
        }
        Ok(())
    }
}
