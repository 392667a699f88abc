//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use waystone_core::error::SyncError;

use crate::backend::CacheBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Process-local [`CacheBackend`] for single-instance deployments and
/// tests. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, SyncError> {
        self.entries
            .lock()
            .map_err(|_| SyncError::Cache("cache mutex poisoned".into()))
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or(pattern == key, |prefix| key.starts_with(prefix))
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), SyncError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock()?.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, SyncError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match entries.get(key) {
                Some(entry) if entry.is_expired(now) => {
                    entries.remove(key);
                    values.push(None);
                }
                Some(entry) => values.push(Some(entry.value.clone())),
                None => values.push(None),
            }
        }
        Ok(values)
    }

    async fn set_many(
        &self,
        batch: &[(String, Value)],
        ttl: Duration,
    ) -> Result<(), SyncError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.lock()?;
        for (key, value) in batch {
            entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), SyncError> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, SyncError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, SyncError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| matches(pattern, key))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let backend = InMemoryBackend::new();

        backend
            .set("character_state:abc", json!({"hp": 20}), Duration::from_secs(60))
            .await
            .unwrap();

        let value = backend.get("character_state:abc").await.unwrap();
        assert_eq!(value, Some(json!({"hp": 20})));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", json!(1), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_many_is_positional() {
        let backend = InMemoryBackend::new();
        backend
            .set("a", json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .set("c", json!(3), Duration::from_secs(60))
            .await
            .unwrap();

        let values = backend
            .get_many(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();

        assert_eq!(values, vec![Some(json!(1)), None, Some(json!(3))]);
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_live_entry() {
        let backend = InMemoryBackend::new();

        assert!(
            backend
                .set_if_absent("lock", json!("a"), Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !backend
                .set_if_absent("lock", json!("b"), Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(backend.get("lock").await.unwrap(), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_set_if_absent_claims_expired_entry() {
        let backend = InMemoryBackend::new();
        backend
            .set_if_absent("lock", json!("a"), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(
            backend
                .set_if_absent("lock", json!("b"), Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_scan_matches_prefix_and_skips_expired() {
        let backend = InMemoryBackend::new();
        backend
            .set("character_state:a", json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .set("character_state:b", json!(2), Duration::from_millis(10))
            .await
            .unwrap();
        backend
            .set("sync_metadata:a:b", json!(3), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let keys = backend.scan("character_state:*").await.unwrap();
        assert_eq!(keys, vec!["character_state:a".to_owned()]);
    }
}
