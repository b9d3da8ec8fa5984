//! Configuration for breakers, shard groups, and the factory.

use crate::error::ConfigurationError;
use std::time::Duration;

/// Default number of shards in a [`ShardGroup`](crate::ShardGroup).
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Configuration for a single circuit breaker.
///
/// Options are immutable for the lifetime of a breaker instance.
///
/// # Default Configuration
///
/// - Failure threshold: 5 consecutive failures
/// - Reset timeout: 60 seconds in open before half-open is considered
/// - Half-open retry limit: 1 trial call
/// - Monitor interval: 30 seconds (upper bound; see [`health_check_interval`])
/// - Service timeout: 5 seconds per call (zero disables the deadline)
/// - Max concurrent: 10,000 in-flight calls (zero disables the cap)
///
/// [`health_check_interval`]: BreakerOptions::health_check_interval
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    /// Consecutive failures in closed state that trip the circuit.
    pub failure_threshold: u32,

    /// Minimum time spent open before a half-open probe is considered.
    pub reset_timeout: Duration,

    /// Trial calls admitted in half-open before a decision.
    ///
    /// Carried for forward compatibility; the current state machine treats
    /// the first probe outcome as decisive.
    pub half_open_retry_limit: u32,

    /// Upper bound on the health-check cadence.
    pub monitor_interval: Duration,

    /// Deadline per protected call. Zero disables the deadline.
    pub service_timeout: Duration,

    /// Cap on in-flight calls per breaker instance. Zero disables the cap.
    pub max_concurrent: usize,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_retry_limit: 1,
            monitor_interval: Duration::from_secs(30),
            service_timeout: Duration::from_secs(5),
            max_concurrent: 10_000,
        }
    }
}

impl BreakerOptions {
    /// Validate option values.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Options are usable
    /// - `Err(ConfigurationError)`: A threshold or interval is out of range
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.failure_threshold == 0 {
            return Err(ConfigurationError::Invalid {
                message: "failure_threshold must be at least 1".to_string(),
            });
        }

        if self.half_open_retry_limit == 0 {
            return Err(ConfigurationError::Invalid {
                message: "half_open_retry_limit must be at least 1".to_string(),
            });
        }

        if self.reset_timeout.is_zero() {
            return Err(ConfigurationError::Invalid {
                message: "reset_timeout must be greater than zero".to_string(),
            });
        }

        if self.monitor_interval.is_zero() {
            return Err(ConfigurationError::Invalid {
                message: "monitor_interval must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Effective health-check period.
    ///
    /// The loop runs at `min(monitor_interval, reset_timeout / 2)` so that
    /// the open to half-open transition is observed promptly even with a
    /// long monitor interval.
    pub fn health_check_interval(&self) -> Duration {
        self.monitor_interval.min(self.reset_timeout / 2)
    }
}

/// Configuration for creating a shard group through the factory.
///
/// `shard_count` and `options` are optional; the factory falls back to
/// [`DEFAULT_SHARD_COUNT`] and its base options respectively.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Logical service name; also the prefix of every shard's service key.
    pub name: String,

    /// Number of shards; fixed for the lifetime of the group.
    pub shard_count: Option<usize>,

    /// Per-group breaker options overriding the factory's base options.
    pub options: Option<BreakerOptions>,
}

impl GroupConfig {
    /// Create a config with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shard_count: None,
            options: None,
        }
    }

    /// Set the shard count.
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = Some(shard_count);
        self
    }

    /// Set per-group breaker options.
    pub fn with_options(mut self, options: BreakerOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Validate the group configuration.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "group name must not be empty".to_string(),
            });
        }

        if self.shard_count == Some(0) {
            return Err(ConfigurationError::Invalid {
                message: "shard_count must be at least 1".to_string(),
            });
        }

        if let Some(ref options) = self.options {
            options.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
