//! Shared test mocks and utilities for the Waystone sync engine.

mod bus;
mod cache;
mod clock;
mod repository;

pub use bus::{FailingBus, FlakyBus, RecordingBus};
pub use cache::FailingCacheBackend;
pub use clock::FixedClock;
pub use repository::{FailingSyncRepository, InMemorySyncRepository};
