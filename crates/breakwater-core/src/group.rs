//! Sharded groups of breakers with deterministic key routing.
//!
//! A shard group fans one logical service out over `shard_count` breakers
//! keyed `{service_name}-{shard_id}`, so that one noisy key cannot trip the
//! circuit for the whole service. Routing is a deterministic function of the
//! key alone: the same key maps to the same shard across processes and
//! restarts for a fixed shard count.

use crate::breaker::Breaker;
use crate::config::BreakerOptions;
use crate::error::{BreakerError, ConfigurationError, RegistryError};
use crate::stats::{CircuitState, ServiceStats};
use crate::store::StateStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;

// ============================================================================
// Call Result
// ============================================================================

/// Outcome of a call routed through a shard group.
#[derive(Debug)]
pub struct CallResult<T> {
    /// Whether the protected call succeeded.
    pub success: bool,

    /// The call's value on success.
    pub data: Option<T>,

    /// The breaker error on failure.
    pub error: Option<BreakerError>,

    /// Logical service name of the group.
    pub service: String,

    /// Shard the call was routed to.
    pub shard_id: usize,

    /// Wall-clock time spent in the call, including admission.
    pub response_time: Duration,

    /// `true` iff the failure was an open-circuit rejection.
    pub circuit_open: bool,
}

// ============================================================================
// Shard Group
// ============================================================================

/// A fixed-width fan-out of breakers for one logical service.
pub struct ShardGroup {
    service_name: String,
    shard_count: usize,
    options: BreakerOptions,
    breakers: Vec<Arc<Breaker>>,
}

impl ShardGroup {
    /// Create a group of `shard_count` breakers named
    /// `{service_name}-0 .. {service_name}-{shard_count - 1}`.
    pub async fn new(
        service_name: impl Into<String>,
        shard_count: usize,
        store: Arc<dyn StateStore>,
        options: BreakerOptions,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let service_name = service_name.into();
        if service_name.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "service name must not be empty".to_string(),
            });
        }
        if shard_count == 0 {
            return Err(ConfigurationError::Invalid {
                message: "shard_count must be at least 1".to_string(),
            });
        }
        options.validate()?;

        let mut breakers = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let key = format!("{}-{}", service_name, shard_id);
            breakers.push(Breaker::new(key, Arc::clone(&store), options.clone()).await?);
        }

        Ok(Arc::new(Self {
            service_name,
            shard_count,
            options,
            breakers,
        }))
    }

    /// Logical service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Number of shards; fixed for the group's lifetime.
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// The options every shard was created with.
    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    /// All shard breakers, indexed by shard id.
    pub fn breakers(&self) -> &[Arc<Breaker>] {
        &self.breakers
    }

    /// Bounds-checked access to one shard's breaker.
    pub fn breaker(&self, shard_id: usize) -> Result<&Arc<Breaker>, RegistryError> {
        self.breakers
            .get(shard_id)
            .ok_or_else(|| RegistryError::InvalidShard {
                service: self.service_name.clone(),
                shard_id,
                shard_count: self.shard_count,
            })
    }

    /// Shard a key routes to. Deterministic for a fixed shard count.
    pub fn shard_for_key(&self, key: &str) -> usize {
        (hash_key(key).unsigned_abs() as usize) % self.shard_count
    }

    /// Current circuit state of one shard.
    pub fn state(&self, shard_id: usize) -> Result<CircuitState, RegistryError> {
        Ok(self.breaker(shard_id)?.current_state())
    }

    /// Current circuit state of every shard.
    pub fn states(&self) -> HashMap<usize, CircuitState> {
        self.breakers
            .iter()
            .enumerate()
            .map(|(shard_id, breaker)| (shard_id, breaker.current_state()))
            .collect()
    }

    /// Persisted stats of every shard that has a record.
    pub async fn stats(&self) -> HashMap<usize, ServiceStats> {
        let mut all = HashMap::new();
        for (shard_id, breaker) in self.breakers.iter().enumerate() {
            if let Ok(Some(stats)) = breaker.get_stats().await {
                all.insert(shard_id, stats);
            }
        }
        all
    }

    /// Execute a call on an explicit shard.
    pub async fn execute_on<F, Fut, T, E>(
        &self,
        shard_id: usize,
        thunk: F,
    ) -> Result<CallResult<T>, RegistryError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.breaker(shard_id)?;
        Ok(self.run_shard(shard_id, thunk).await)
    }

    /// Route a key to its shard and execute there.
    pub async fn execute_with_key<F, Fut, T, E>(&self, key: &str, thunk: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        let shard_id = self.shard_for_key(key);
        self.run_shard(shard_id, thunk).await
    }

    /// Stop every shard's background loops.
    pub fn stop(&self) {
        for breaker in &self.breakers {
            breaker.stop();
        }
    }

    async fn run_shard<F, Fut, T, E>(&self, shard_id: usize, thunk: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        let started = Instant::now();
        match self.breakers[shard_id].execute(thunk).await {
            Ok(data) => CallResult {
                success: true,
                data: Some(data),
                error: None,
                service: self.service_name.clone(),
                shard_id,
                response_time: started.elapsed(),
                circuit_open: false,
            },
            Err(error) => CallResult {
                success: false,
                data: None,
                circuit_open: error.is_circuit_open(),
                error: Some(error),
                service: self.service_name.clone(),
                shard_id,
                response_time: started.elapsed(),
            },
        }
    }
}

/// Deterministic 32-bit string hash used for key routing.
///
/// The iterative `h = ((h << 5) - h) + c` form with 32-bit wrap semantics is
/// part of the persisted contract: keys keep their shard affinity across
/// processes and implementations, so the hash must not change.
fn hash_key(key: &str) -> i32 {
    let mut hash: i32 = 0;
    for c in key.chars() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }
    hash
}
