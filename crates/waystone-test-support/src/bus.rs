//! Test buses — mock `MessageBus` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use waystone_core::bus::MessageBus;
use waystone_core::error::SyncError;

/// A bus that records every publish and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingBus {
    published: Mutex<Vec<(String, Value)>>,
}

impl RecordingBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every (topic, payload) published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }

    /// Returns the payloads published to one topic, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_to(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), SyncError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload));
        Ok(())
    }
}

/// A bus whose every publish fails with a sync error.
#[derive(Debug, Default)]
pub struct FailingBus;

#[async_trait]
impl MessageBus for FailingBus {
    async fn publish(&self, _topic: &str, _payload: Value) -> Result<(), SyncError> {
        Err(SyncError::Sync("bus unavailable".into()))
    }
}

/// A bus that fails a configured number of publishes, then records and
/// succeeds like [`RecordingBus`].
#[derive(Debug)]
pub struct FlakyBus {
    remaining_failures: AtomicU32,
    inner: RecordingBus,
}

impl FlakyBus {
    /// Creates a bus that fails the first `failures` publishes.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            inner: RecordingBus::new(),
        }
    }

    /// Returns a snapshot of every successful (topic, payload) publish.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.inner.published()
    }
}

#[async_trait]
impl MessageBus for FlakyBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), SyncError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Sync("bus unavailable".into()));
        }
        self.inner.publish(topic, payload).await
    }
}
