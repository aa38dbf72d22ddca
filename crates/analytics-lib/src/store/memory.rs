//! In-process store for single-node runs and tests
//!
//! Window mutations and reads share one mutex, so append-trim-read is never
//! observed half done.

use super::{CounterStore, StoreError, WindowStore};
use crate::models::Metric;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Counter and window held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    counter: Mutex<Option<i64>>,
    window: Mutex<VecDeque<Metric>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn trim(window: &mut VecDeque<Metric>, keep: usize) {
        while window.len() > keep {
            window.pop_front();
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self) -> Result<i64, StoreError> {
        let mut counter = self.counter.lock().await;
        let next = counter.unwrap_or(0) + 1;
        *counter = Some(next);
        Ok(next)
    }

    async fn get_or_init(&self) -> Result<i64, StoreError> {
        let mut counter = self.counter.lock().await;
        Ok(*counter.get_or_insert(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn push_and_trim(&self, entry: &Metric, keep: usize) -> Result<(), StoreError> {
        let mut window = self.window.lock().await;
        window.push_back(*entry);
        Self::trim(&mut window, keep);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        Ok(self.window.lock().await.iter().copied().collect())
    }

    async fn push_trim_and_read(
        &self,
        entry: &Metric,
        keep: usize,
    ) -> Result<Vec<Metric>, StoreError> {
        let mut window = self.window.lock().await;
        window.push_back(*entry);
        Self::trim(&mut window, keep);
        Ok(window.iter().copied().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
