//! Counter Store contract.
//!
//! A flat string key space holding integer counters and a few scalar values.
//! Backends must make each individual call atomic; nothing here promises
//! atomicity across calls.

use std::sync::Arc;

use async_trait::async_trait;

pub use crate::errors::StoreError;

pub mod memory;

pub use memory::InMemoryCounterStore;

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Adds one to the integer at `key`, creating it at 1, and returns the new value.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Every `(key, value)` pair whose key starts with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Writes `new` only if `key` currently holds `expected` (`None` = key absent).
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        self.get(crate::domain::keys::LAST_VALID_NUMBER).await.map(|_| ())
    }
}

pub type SharedCounterStore = Arc<dyn CounterStore>;
