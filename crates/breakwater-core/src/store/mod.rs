//! State store interface holding per-service stats records.
//!
//! The store is the coordination point for a fleet of callers: every breaker
//! reads, writes, and watches the record for its service key through this
//! trait. The in-memory provider in [`memory`] is the reference
//! implementation and the test double; production deployments plug in a
//! driver for a watchable key/value store.

use crate::error::StoreError;
use crate::stats::ServiceStats;
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;

/// Key namespace prepended to every service key by store implementations.
pub const KEY_NAMESPACE: &str = "circuit-breaker/";

/// Build the fully namespaced store key for a service key.
pub fn namespaced_key(service_key: &str) -> String {
    format!("{}{}", KEY_NAMESPACE, service_key)
}

/// Callback invoked with the post-mutation record when a watched key changes.
///
/// Callbacks must not block; they run on the mutating caller's path.
pub type WatchCallback = Arc<dyn Fn(ServiceStats) + Send + Sync>;

/// Durable, watchable mapping from service key to stats record.
///
/// Implementations persist records under `circuit-breaker/<service_key>`
/// as the canonical serialized form of [`ServiceStats`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Point read. Returns `None` if the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<ServiceStats>, StoreError>;

    /// Unconditional write of the full record.
    async fn put(&self, key: &str, stats: &ServiceStats) -> Result<(), StoreError>;

    /// Read-modify-write that increments `failure_count`, `failed_requests`,
    /// and `total_requests`, stamps `last_failure_time`, writes the record
    /// back, and returns the new `failure_count`.
    ///
    /// If the key is absent, a fresh closed record with counters at 1 is
    /// materialized. Implementations backed by a CAS-capable store should
    /// use a compare-and-swap loop; last-writer-wins is acceptable
    /// otherwise.
    async fn increment_failure_count(&self, key: &str) -> Result<u32, StoreError>;

    /// Zero `failure_count` and clear `last_failure_time` / `last_error`.
    /// Monotonic totals are left untouched.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Register a callback invoked with the latest record whenever the key
    /// changes. Multiple callbacks per key are supported; delivery is
    /// at-least-once and best-effort ordered.
    async fn watch(&self, key: &str, callback: WatchCallback) -> Result<(), StoreError>;

    /// Release watchers and connections. Subsequent operations fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}
