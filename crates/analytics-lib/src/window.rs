//! Bounded rolling window of recent observations
//!
//! The window itself lives in a [`WindowStore`], which may be shared between
//! service instances. This type only fixes the capacity and the contract:
//! after any completed append the stored sequence holds at most `capacity`
//! metrics, oldest first.

use crate::models::Metric;
use crate::store::{StoreError, WindowStore};
use std::sync::Arc;

/// Size-capped, ordered window over a shared store
#[derive(Clone)]
pub struct BoundedWindow {
    store: Arc<dyn WindowStore>,
    capacity: usize,
}

impl BoundedWindow {
    /// Create a window of the given capacity (a capacity of zero is raised to one)
    pub fn new(store: Arc<dyn WindowStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append as newest and evict the oldest entries beyond capacity
    pub async fn append(&self, metric: &Metric) -> Result<(), StoreError> {
        self.store.push_and_trim(metric, self.capacity).await
    }

    /// Copy of the current contents, oldest first
    pub async fn snapshot(&self) -> Result<Vec<Metric>, StoreError> {
        self.store.read_all().await
    }

    /// Append, trim and snapshot in one step
    pub async fn append_and_snapshot(&self, metric: &Metric) -> Result<Vec<Metric>, StoreError> {
        self.store.push_trim_and_read(metric, self.capacity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn window(capacity: usize) -> BoundedWindow {
        BoundedWindow::new(Arc::new(MemoryStore::new()), capacity)
    }

    fn rps_of(metrics: &[Metric]) -> Vec<f64> {
        metrics.iter().map(|m| m.rps).collect()
    }

    #[tokio::test]
    async fn test_length_never_exceeds_capacity() {
        let window = window(4);

        for i in 0..20 {
            let snapshot = window
                .append_and_snapshot(&Metric::now(10.0, i as f64))
                .await
                .unwrap();
            assert!(snapshot.len() <= 4);
            assert_eq!(snapshot.len(), (i + 1).min(4));
        }
    }

    #[tokio::test]
    async fn test_retains_most_recent_values_oldest_first() {
        let window = window(3);

        for i in 1..=7 {
            window.append(&Metric::now(0.0, i as f64)).await.unwrap();
        }

        let snapshot = window.snapshot().await.unwrap();
        assert_eq!(rps_of(&snapshot), vec![5.0, 6.0, 7.0]);
    }

    #[tokio::test]
    async fn test_below_capacity_keeps_everything() {
        let window = window(10);

        for i in 0..3 {
            window.append(&Metric::now(0.0, i as f64)).await.unwrap();
        }

        assert_eq!(rps_of(&window.snapshot().await.unwrap()), vec![0.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let window = window(0);
        window.append(&Metric::now(0.0, 1.0)).await.unwrap();
        window.append(&Metric::now(0.0, 2.0)).await.unwrap();

        assert_eq!(window.capacity(), 1);
        assert_eq!(rps_of(&window.snapshot().await.unwrap()), vec![2.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_keep_exact_capacity_without_corruption() {
        const CAPACITY: usize = 16;
        const WRITERS: usize = 200;

        let window = window(CAPACITY);
        let mut handles = Vec::new();

        for i in 0..WRITERS {
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                // Distinct, non-round values so corruption would be visible
                let metric = Metric::now(i as f64 * 0.5, 1000.0 + i as f64 * 1.25);
                window.append(&metric).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = window.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), WRITERS.min(CAPACITY));

        let mut seen = HashSet::new();
        for metric in &snapshot {
            let i = ((metric.rps - 1000.0) / 1.25).round() as usize;
            assert!(i < WRITERS);
            assert_eq!(metric.rps.to_bits(), (1000.0 + i as f64 * 1.25).to_bits());
            assert_eq!(metric.cpu.to_bits(), (i as f64 * 0.5).to_bits());
            assert!(seen.insert(i), "duplicate entry for writer {}", i);
        }
    }
}
