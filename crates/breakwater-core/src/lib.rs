//! # Breakwater Core
//!
//! Distributed circuit breaker core for protecting calls to unreliable
//! downstream services. Breaker state is persisted in a shared, watchable
//! state store so that a fleet of identically configured callers converges
//! on one view of each service's health.
//!
//! This library provides:
//! - A three-state (closed / open / half-open) breaker per service key
//! - Admission control with per-call timeouts and in-flight caps
//! - Sliding-window request metrics and event subscriptions
//! - Sharded service groups with deterministic key-to-shard routing
//! - A factory registry that manages groups against one shared store
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for breaker, store, and registry operations
//! - [`config`] - Breaker and group configuration
//! - [`stats`] - Circuit state and the persisted stats record
//! - [`store`] - State store trait and the in-memory provider
//! - [`events`] - Event payloads and the per-kind dispatcher
//! - [`metrics`] - Sliding-window metrics calculator
//! - [`breaker`] - The breaker state machine
//! - [`group`] - Sharded service groups
//! - [`factory`] - Registry of named shard groups
//!
//! ## Usage
//!
//! ```rust
//! use breakwater_core::{Breaker, BreakerOptions, InMemoryStateStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStateStore::new());
//! let breaker = Breaker::new("payments", store, BreakerOptions::default()).await?;
//!
//! let result: Result<&str, _> = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("ok") })
//!     .await;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Module declarations
pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod group;
pub mod metrics;
pub mod stats;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use breaker::Breaker;
pub use config::{BreakerOptions, GroupConfig, DEFAULT_SHARD_COUNT};
pub use error::{BreakerError, ConfigurationError, RegistryError, StoreError};
pub use events::{BreakerEvent, EventKind, Listener, ListenerId};
pub use factory::BreakerFactory;
pub use group::{CallResult, ShardGroup};
pub use metrics::{LastMinuteStats, MetricsSnapshot};
pub use stats::{CircuitState, ServiceStats};
pub use store::{memory::InMemoryStateStore, StateStore, WatchCallback};

// ============================================================================
// Timestamp
// ============================================================================

/// UTC timestamp recorded in persisted stats records.
///
/// Serializes as an RFC 3339 string so that peers implemented in other
/// languages can parse the wire form of [`ServiceStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Wall-clock time elapsed since this timestamp.
    ///
    /// Returns zero for timestamps in the future, which can happen when
    /// records written by peers with skewed clocks are read back.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
