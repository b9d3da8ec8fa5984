//! Error types for circuit breaker operations.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`Breaker::execute`](crate::Breaker::execute).
///
/// Admission rejections (`CircuitOpen`, `Overloaded`) are raised without
/// invoking the protected call; execution failures (`ServiceTimeout`,
/// `ServiceError`) are raised after the outcome has been counted.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// Circuit is open and the cool-down has not elapsed.
    #[error("Circuit breaker is open for service '{service}'")]
    CircuitOpen { service: String },

    /// The in-flight request cap was reached.
    #[error("Service '{service}' is overloaded: {active} of {max_concurrent} slots in use")]
    Overloaded {
        service: String,
        active: usize,
        max_concurrent: usize,
    },

    /// The per-call deadline elapsed before the service responded.
    #[error("Service timeout")]
    ServiceTimeout { timeout: Duration },

    /// The protected call itself failed; the original error is passed
    /// through verbatim.
    #[error("{0}")]
    ServiceError(Box<dyn std::error::Error + Send + Sync>),
}

impl BreakerError {
    /// Check if this is an admission rejection (the call was never invoked).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Overloaded { .. })
    }

    /// Check if this error counted as a failure against the circuit.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::ServiceTimeout { .. } | Self::ServiceError(_))
    }

    /// Check if this rejection was caused by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State store is closed")]
    Closed,

    #[error("State store backend error: {message}")]
    Backend { message: String },

    #[error("Stats record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from group and factory registry operations.
///
/// These indicate caller mistakes; they never trigger a state transition.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Service group '{name}' is already registered")]
    AlreadyExists { name: String },

    #[error("Unknown service group: {name}")]
    UnknownService { name: String },

    #[error("Shard {shard_id} is out of range for service '{service}' ({shard_count} shards)")]
    InvalidShard {
        service: String,
        shard_id: usize,
        shard_count: usize,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
