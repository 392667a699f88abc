//! Test cache backend — failing `CacheBackend` for error paths.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use waystone_cache::CacheBackend;
use waystone_core::error::SyncError;

fn unavailable() -> SyncError {
    SyncError::Cache("connection refused".into())
}

/// A cache backend whose every operation fails with a cache error.
/// Useful for verifying that cache failures never crash the resolver.
#[derive(Debug, Default)]
pub struct FailingCacheBackend;

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, SyncError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), SyncError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<(), SyncError> {
        Err(unavailable())
    }

    async fn get_many(&self, _keys: &[String]) -> Result<Vec<Option<Value>>, SyncError> {
        Err(unavailable())
    }

    async fn set_many(
        &self,
        _entries: &[(String, Value)],
        _ttl: Duration,
    ) -> Result<(), SyncError> {
        Err(unavailable())
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<(), SyncError> {
        Err(unavailable())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Duration,
    ) -> Result<bool, SyncError> {
        Err(unavailable())
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, SyncError> {
        Err(unavailable())
    }
}
