//! Cache transport port.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use waystone_core::error::SyncError;

/// Port to the cache transport.
///
/// Implementations map every failure — connection loss, timeouts,
/// payload corruption — to [`SyncError::Cache`] so callers need no
/// transport-specific handling. Batch operations are single round
/// trips, not transactions.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads one key. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;

    /// Writes one key with a time-to-live.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), SyncError>;

    /// Deletes one key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), SyncError>;

    /// Reads many keys in one round trip, positionally.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, SyncError>;

    /// Writes many keys in one round trip with a shared time-to-live.
    async fn set_many(&self, entries: &[(String, Value)], ttl: Duration)
    -> Result<(), SyncError>;

    /// Deletes many keys in one round trip.
    async fn delete_many(&self, keys: &[String]) -> Result<(), SyncError>;

    /// Writes a key only if it is absent (or expired). Returns whether
    /// the write happened. This is the primitive under the advisory
    /// lock.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, SyncError>;

    /// Lists live keys matching a pattern. A trailing `*` matches any
    /// suffix; any other pattern matches exactly.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, SyncError>;
}
