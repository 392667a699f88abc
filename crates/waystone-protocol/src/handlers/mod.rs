//! Message handlers for the four consumed topics.
//!
//! Each handler owns one topic, is idempotent under redelivery, and
//! never lets a failure cross the handler boundary: unrecoverable
//! errors become correlated error messages on the reply topic.

pub mod campaign_state;
pub mod character_state;
pub mod sync_control;
pub mod version_query;

pub use campaign_state::handle_campaign_state_update;
pub use character_state::handle_character_state_change;
pub use sync_control::handle_sync_control;
pub use version_query::handle_version_query;

use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;

use crate::context::SyncContext;
use crate::messages::SyncErrorReply;

/// Publishes a correlated error reply for a failed inbound message.
///
/// # Errors
///
/// Returns [`SyncError::Sync`] when the reply itself cannot be
/// published; the transport layer then redelivers the inbound message.
pub(crate) async fn send_error_reply(
    ctx: &SyncContext,
    topic: &str,
    in_reply_to: Uuid,
    err: &SyncError,
) -> Result<(), SyncError> {
    let reply = SyncErrorReply {
        message_id: Uuid::new_v4(),
        in_reply_to,
        code: err.code().to_owned(),
        message: err.to_string(),
        timestamp: ctx.clock.now(),
    };
    let payload = serde_json::to_value(&reply)
        .map_err(|e| SyncError::Sync(format!("error reply encode failed: {e}")))?;
    ctx.bus.publish(topic, payload).await
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use waystone_cache::{CacheConfig, InMemoryBackend, StateCache};
    use waystone_publish::{EventPublicationManager, PublisherConfig};
    use waystone_resolve::ConflictResolver;
    use waystone_test_support::{FixedClock, InMemorySyncRepository, RecordingBus};

    use crate::context::SyncContext;
    use crate::retry::RetryPolicy;

    pub(crate) struct TestContext {
        pub ctx: SyncContext,
        pub repository: Arc<InMemorySyncRepository>,
        pub bus: Arc<RecordingBus>,
    }

    /// Builds a context whose repository always fails, for verifying
    /// that storage failures surface as correlated error replies.
    pub(crate) fn failing_repository_context() -> (SyncContext, Arc<RecordingBus>) {
        let dyn_repository: Arc<dyn waystone_core::repository::SyncRepository> =
            Arc::new(waystone_test_support::FailingSyncRepository);
        let bus = Arc::new(RecordingBus::new());
        let dyn_bus: Arc<dyn waystone_core::bus::MessageBus> = bus.clone();
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn waystone_core::clock::Clock> = clock.clone();
        let cache = Arc::new(StateCache::new(
            Arc::new(InMemoryBackend::new()),
            CacheConfig::default(),
        ));
        let resolver = Arc::new(ConflictResolver::new(
            Arc::clone(&cache),
            Arc::clone(&dyn_repository),
            Arc::clone(&dyn_clock),
        ));
        let publisher = Arc::new(EventPublicationManager::new(
            Arc::clone(&dyn_bus),
            Arc::clone(&dyn_clock),
            PublisherConfig::default(),
        ));
        let ctx = SyncContext {
            cache,
            resolver,
            repository: dyn_repository,
            bus: dyn_bus,
            publisher,
            clock: dyn_clock,
            retry: RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(1),
            },
        };
        (ctx, bus)
    }

    /// Builds a context over in-memory collaborators with a fast retry
    /// policy.
    pub(crate) fn test_context() -> TestContext {
        let repository = Arc::new(InMemorySyncRepository::new());
        let dyn_repository: Arc<dyn waystone_core::repository::SyncRepository> =
            repository.clone();
        let bus = Arc::new(RecordingBus::new());
        let dyn_bus: Arc<dyn waystone_core::bus::MessageBus> = bus.clone();
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn waystone_core::clock::Clock> = clock.clone();
        let cache = Arc::new(StateCache::new(
            Arc::new(InMemoryBackend::new()),
            CacheConfig::default(),
        ));
        let resolver = Arc::new(ConflictResolver::new(
            Arc::clone(&cache),
            Arc::clone(&dyn_repository),
            Arc::clone(&dyn_clock),
        ));
        let publisher = Arc::new(EventPublicationManager::new(
            Arc::clone(&dyn_bus),
            Arc::clone(&dyn_clock),
            PublisherConfig::default(),
        ));
        let ctx = SyncContext {
            cache,
            resolver,
            repository: dyn_repository,
            bus: dyn_bus,
            publisher,
            clock: dyn_clock,
            retry: RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(1),
            },
        };
        TestContext {
            ctx,
            repository,
            bus,
        }
    }
}
