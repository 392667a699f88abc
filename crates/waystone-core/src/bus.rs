//! Message bus port.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncError;

/// Port to the message transport.
///
/// Delivery is at-least-once; consumers must tolerate redelivery. A
/// failed publish surfaces as [`SyncError::Sync`] and is the caller's
/// to retry.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a JSON payload to a topic.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), SyncError>;
}
