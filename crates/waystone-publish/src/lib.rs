//! Waystone Publish — reliable batched outbound publication.
//!
//! [`EventPublicationManager`] owns a bounded-latency batching queue in
//! front of the message bus: messages move `queued → in-flight →
//! {acknowledged, retrying, failed}`, failed publishes back off
//! exponentially up to a retry ceiling, and messages past the ceiling
//! become terminal error messages instead of retrying forever.

pub mod config;
pub mod manager;
pub mod metrics;

pub use config::PublisherConfig;
pub use manager::EventPublicationManager;
pub use metrics::{MetricsSnapshot, PublisherMetrics};
