//! Publication counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the publication counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages published successfully.
    pub published: u64,
    /// Failed publish attempts (each failure, not each message).
    pub publish_failures: u64,
    /// Messages converted to terminal error messages.
    pub dead_lettered: u64,
    /// Batches processed.
    pub batches: u64,
    /// Size of the most recent batch.
    pub last_batch_size: u64,
}

/// Atomic counters exported by the publication manager.
#[derive(Debug, Default)]
pub struct PublisherMetrics {
    published: AtomicU64,
    publish_failures: AtomicU64,
    dead_lettered: AtomicU64,
    batches: AtomicU64,
    last_batch_size: AtomicU64,
}

impl PublisherMetrics {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.last_batch_size.store(size as u64, Ordering::Relaxed);
    }

    /// Reads all counters at once.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            last_batch_size: self.last_batch_size.load(Ordering::Relaxed),
        }
    }
}
