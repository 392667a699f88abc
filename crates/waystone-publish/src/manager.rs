//! The publication manager.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::message::{ErrorPayload, SyncMessage, SyncMessageKind};

use crate::config::PublisherConfig;
use crate::metrics::{MetricsSnapshot, PublisherMetrics};

#[derive(Debug)]
struct QueuedMessage {
    message: SyncMessage,
    retry_count: u32,
}

struct Inner {
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
    config: PublisherConfig,
    metrics: PublisherMetrics,
    queue: Mutex<VecDeque<QueuedMessage>>,
    tracked: Mutex<HashSet<Uuid>>,
    notify: Notify,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<QueuedMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracked(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for the first available message, then opportunistically
    /// drains more until the batch is full or `batch_timeout` has
    /// passed since the first pull.
    async fn collect_batch(&self) -> Vec<QueuedMessage> {
        let first = loop {
            if let Some(message) = self.queue().pop_front() {
                break message;
            }
            self.notify.notified().await;
        };

        let deadline = Instant::now() + self.config.batch_timeout;
        let mut batch = vec![first];
        while batch.len() < self.config.batch_size {
            if let Some(message) = self.queue().pop_front() {
                batch.push(message);
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if tokio::time::timeout(deadline - now, self.notify.notified())
                .await
                .is_err()
            {
                break;
            }
        }
        batch
    }

    async fn process(&self, queued: QueuedMessage) {
        let message_id = queued.message.metadata.message_id;

        if queued.retry_count >= self.config.retry_max_attempts {
            self.metrics.record_dead_letter();
            self.tracked().remove(&message_id);
            tracing::error!(
                %message_id,
                message_type = queued.message.message_type(),
                retries = queued.retry_count,
                "publish retries exhausted, dead-lettering"
            );
            let error_message = SyncMessage::new(
                SyncMessageKind::Error(ErrorPayload {
                    code: "publication_failed".to_owned(),
                    message: format!(
                        "message {message_id} exceeded {} publish attempts",
                        self.config.retry_max_attempts
                    ),
                    related_message_id: Some(message_id),
                }),
                self.clock.now(),
            );
            if let Err(err) = self
                .bus
                .publish(error_message.topic(), error_message.to_payload())
                .await
            {
                tracing::error!(%message_id, error = %err, "failed to publish terminal error message");
            }
            return;
        }

        let delay = self.config.backoff_delay(queued.retry_count);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self
            .bus
            .publish(queued.message.topic(), queued.message.to_payload())
            .await
        {
            Ok(()) => {
                self.tracked().remove(&message_id);
                self.metrics.record_published();
                tracing::debug!(%message_id, topic = queued.message.topic(), "message published");
            }
            Err(err) => {
                self.metrics.record_publish_failure();
                tracing::warn!(
                    %message_id,
                    retry_count = queued.retry_count,
                    error = %err,
                    "publish failed, re-enqueueing"
                );
                self.queue().push_back(QueuedMessage {
                    message: queued.message,
                    retry_count: queued.retry_count + 1,
                });
                self.notify.notify_one();
            }
        }
    }
}

/// Batches, publishes, and retries outbound domain messages.
///
/// Every message moves `queued → in-flight → {acknowledged, retrying,
/// failed}`; the manager owns all in-flight and retry bookkeeping for
/// its own lifetime, so two instances never share state.
pub struct EventPublicationManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventPublicationManager {
    /// Creates a stopped manager over the given bus.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, clock: Arc<dyn Clock>, config: PublisherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                clock,
                config,
                metrics: PublisherMetrics::default(),
                queue: Mutex::new(VecDeque::new()),
                tracked: Mutex::new(HashSet::new()),
                notify: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Queues a message for publication.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Message`] when a message with the same id
    /// is already queued or in flight (at-most-once admission).
    pub fn enqueue(&self, message: SyncMessage) -> Result<(), SyncError> {
        let message_id = message.metadata.message_id;
        if !self.inner.tracked().insert(message_id) {
            return Err(SyncError::Message(format!(
                "message {message_id} is already queued or in flight"
            )));
        }
        self.inner.queue().push_back(QueuedMessage {
            message,
            retry_count: 0,
        });
        self.inner.notify.notify_one();
        tracing::debug!(%message_id, "message enqueued");
        Ok(())
    }

    /// Starts the background consumer. Invoking on a running manager
    /// is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            tracing::info!("publication consumer started");
            loop {
                let batch = inner.collect_batch().await;
                inner.metrics.record_batch(batch.len());
                tracing::debug!(size = batch.len(), "processing publication batch");
                for message in batch {
                    inner.process(message).await;
                }
            }
        }));
    }

    /// Cancels the background consumer and awaits it. The queue is not
    /// drained: unpublished messages stay queued for a later `start`.
    /// Invoking on a stopped manager is a no-op.
    pub async fn stop(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        handle.abort();
        if let Err(err) = handle.await {
            if err.is_cancelled() {
                tracing::info!("publication consumer stopped");
            } else {
                tracing::warn!(error = %err, "publication consumer ended abnormally");
            }
        }
    }

    /// Messages currently waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue().len()
    }

    /// Point-in-time publication counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}
