//! In-process topic bus for single-process deployments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use waystone_core::bus::MessageBus;
use waystone_core::error::SyncError;

/// Topic-keyed fan-out over tokio channels. Publishing to a topic with
/// no live subscribers drops the payload, matching a broker with no
/// bound queue.
#[derive(Debug, Default)]
pub struct InProcessBus {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl InProcessBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<mpsc::UnboundedSender<Value>>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to a topic, receiving every payload published after
    /// this call.
    pub fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics().entry(topic.to_owned()).or_default().push(tx);
        rx
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), SyncError> {
        let mut topics = self.topics();
        let Some(subscribers) = topics.get_mut(topic) else {
            tracing::trace!(topic, "publish to topic without subscribers");
            return Ok(());
        };
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        Ok(())
    }
}
