//! Shared stores backing the service
//!
//! Two collaborators live behind traits so they can be swapped for test
//! doubles or an in-process implementation:
//! - [`CounterStore`]: durable, monotonically increasing request counter
//! - [`WindowStore`]: named ordered collection holding the rolling window

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{redis_url, RedisStore, RedisStoreConfig};

use crate::models::Metric;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to encode or decode window entry: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable request counter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter, returning the new value
    async fn increment(&self) -> Result<i64, StoreError>;

    /// Read the counter, initialising it to zero when absent
    async fn get_or_init(&self) -> Result<i64, StoreError>;

    /// Check reachability
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Append-only ordered collection used as the rolling window
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Append `entry` at the end and keep only the last `keep` entries.
    /// Both steps apply together or not at all.
    async fn push_and_trim(&self, entry: &Metric, keep: usize) -> Result<(), StoreError>;

    /// Read the full collection, oldest first
    async fn read_all(&self) -> Result<Vec<Metric>, StoreError>;

    /// Append, trim and read back in one step.
    ///
    /// The default runs the two calls back to back, so another writer may
    /// interleave between them. Implementations override this when the
    /// backend can do it atomically.
    async fn push_trim_and_read(
        &self,
        entry: &Metric,
        keep: usize,
    ) -> Result<Vec<Metric>, StoreError> {
        self.push_and_trim(entry, keep).await?;
        self.read_all().await
    }

    /// Check reachability
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Bounded exponential backoff used while waiting for a store at startup
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (at least one is always made)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Ping the counter store until it answers or the policy is exhausted.
///
/// Returns whether the store became reachable. Never fails: an unreachable
/// store at startup degrades the service instead of stopping it.
pub async fn connect_with_retry(store: &dyn CounterStore, policy: &RetryPolicy) -> bool {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match store.ping().await {
            Ok(()) => {
                info!(attempt, "Store connection successful");
                return true;
            }
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "Store connection attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff_for(attempt)).await;
                }
            }
        }
    }

    warn!(
        max_attempts = attempts,
        "Could not establish store connection after retries"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyCounter {
        failures_left: AtomicU32,
        pings: AtomicU32,
    }

    impl FlakyCounter {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                pings: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CounterStore for FlakyCounter {
        async fn increment(&self) -> Result<i64, StoreError> {
            Ok(1)
        }

        async fn get_or_init(&self) -> Result<i64, StoreError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                Err(StoreError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        };

        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_succeeds_after_transient_failures() {
        let store = FlakyCounter::new(2);

        assert!(connect_with_retry(&store, &fast_policy(5)).await);
        assert_eq!(store.pings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_max_attempts() {
        let store = FlakyCounter::new(100);

        assert!(!connect_with_retry(&store, &fast_policy(3)).await);
        assert_eq!(store.pings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_always_makes_one_attempt() {
        let store = FlakyCounter::new(0);

        assert!(connect_with_retry(&store, &fast_policy(0)).await);
        assert_eq!(store.pings.load(Ordering::SeqCst), 1);
    }
}
