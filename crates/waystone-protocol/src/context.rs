//! Shared handler dependencies.

use std::sync::Arc;

use waystone_cache::StateCache;
use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::repository::SyncRepository;
use waystone_publish::EventPublicationManager;
use waystone_resolve::ConflictResolver;

use crate::retry::RetryPolicy;

/// Everything a synchronization handler needs, injected once at
/// wiring time.
pub struct SyncContext {
    /// The state cache fronting the repository.
    pub cache: Arc<StateCache>,
    /// The conflict resolver.
    pub resolver: Arc<ConflictResolver>,
    /// The durable system of record.
    pub repository: Arc<dyn SyncRepository>,
    /// The bus handlers reply on.
    pub bus: Arc<dyn MessageBus>,
    /// The outbound publication manager.
    pub publisher: Arc<EventPublicationManager>,
    /// Clock for reply timestamps.
    pub clock: Arc<dyn Clock>,
    /// Retry policy wrapped around every handler body.
    pub retry: RetryPolicy,
}
