//! In-memory state store for testing and development.
//!
//! This module provides a fully functional in-memory store that:
//! - Persists records in their canonical serialized form
//! - Performs the failure-count increment atomically within the process
//! - Notifies watchers synchronously with the post-mutation value
//!
//! This provider is intended for:
//! - Unit testing of breaker consumers
//! - Single-process deployments and prototyping
//! - Reference implementation for coordination-store drivers

use super::{namespaced_key, StateStore, WatchCallback};
use crate::error::StoreError;
use crate::stats::ServiceStats;
use crate::Timestamp;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// In-memory state store implementation.
///
/// Records are held as serialized JSON keyed by the namespaced service key,
/// mirroring what a real key/value driver would persist.
pub struct InMemoryStateStore {
    records: RwLock<HashMap<String, String>>,
    watchers: RwLock<HashMap<String, Vec<WatchCallback>>>,
    closed: AtomicBool,
}

impl InMemoryStateStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Deliver the post-mutation record to every watcher of the key.
    ///
    /// Callbacks run outside the record lock; a slow callback delays the
    /// mutating caller but cannot deadlock the store.
    fn notify(&self, full_key: &str, stats: &ServiceStats) {
        let callbacks: Vec<WatchCallback> = {
            let watchers = self.watchers.read().unwrap();
            match watchers.get(full_key) {
                Some(callbacks) => callbacks.clone(),
                None => return,
            }
        };

        for callback in callbacks {
            callback(stats.clone());
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<ServiceStats>, StoreError> {
        self.ensure_open()?;

        let records = self.records.read().unwrap();
        match records.get(&namespaced_key(key)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, stats: &ServiceStats) -> Result<(), StoreError> {
        self.ensure_open()?;

        let full_key = namespaced_key(key);
        let raw = serde_json::to_string(stats)?;
        self.records.write().unwrap().insert(full_key.clone(), raw);

        self.notify(&full_key, stats);
        Ok(())
    }

    async fn increment_failure_count(&self, key: &str) -> Result<u32, StoreError> {
        self.ensure_open()?;

        let full_key = namespaced_key(key);
        let updated = {
            let mut records = self.records.write().unwrap();
            let mut stats = match records.get(&full_key) {
                Some(raw) => serde_json::from_str::<ServiceStats>(raw)?,
                None => ServiceStats::default(),
            };

            stats.failure_count += 1;
            stats.failed_requests += 1;
            stats.total_requests += 1;
            stats.last_failure_time = Some(Timestamp::now());

            records.insert(full_key.clone(), serde_json::to_string(&stats)?);
            stats
        };

        self.notify(&full_key, &updated);
        Ok(updated.failure_count)
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;

        let full_key = namespaced_key(key);
        let updated = {
            let mut records = self.records.write().unwrap();
            let mut stats = match records.get(&full_key) {
                Some(raw) => serde_json::from_str::<ServiceStats>(raw)?,
                None => return Ok(()),
            };

            stats.failure_count = 0;
            stats.last_failure_time = None;
            stats.last_error = None;

            records.insert(full_key.clone(), serde_json::to_string(&stats)?);
            stats
        };

        self.notify(&full_key, &updated);
        Ok(())
    }

    async fn watch(&self, key: &str, callback: WatchCallback) -> Result<(), StoreError> {
        self.ensure_open()?;

        let full_key = namespaced_key(key);
        self.watchers
            .write()
            .unwrap()
            .entry(full_key)
            .or_default()
            .push(callback);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        self.watchers.write().unwrap().clear();
        debug!("in-memory state store closed");
        Ok(())
    }
}
