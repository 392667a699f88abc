//! Publication manager configuration.

use std::time::Duration;

/// Batching and retry parameters for the publication manager.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Most messages one batch may hold.
    pub batch_size: usize,
    /// Longest a batch waits after its first message before publishing.
    pub batch_timeout: Duration,
    /// Publish attempts before a message dead-letters.
    pub retry_max_attempts: u32,
    /// Base of the exponential retry backoff.
    pub retry_initial_delay: Duration,
    /// Ceiling of the exponential retry backoff.
    pub retry_max_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_millis(500),
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

impl PublisherConfig {
    /// Backoff before the attempt with the given retry count:
    /// `min(initial · 2^retries, max)`. The first attempt has no
    /// backoff.
    #[must_use]
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry_count.min(16));
        self.retry_initial_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = PublisherConfig {
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(500),
            ..PublisherConfig::default()
        };

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(30), Duration::from_millis(500));
    }
}
