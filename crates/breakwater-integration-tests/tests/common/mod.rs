//! Common test utilities for breakwater integration tests
//!
//! This module provides:
//! - A shared downstream error type for protected calls
//! - Option builders tuned for fast end-to-end scenarios
//! - An event recorder for asserting on emitted event sequences

use breakwater_core::{
    BreakerEvent, BreakerOptions, CircuitState, EventKind, Listener,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a subscriber once so `RUST_LOG=debug cargo test` shows breaker
/// internals; later calls are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Downstream failure used by protected test calls.
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DownstreamError {
    message: String,
}

impl DownstreamError {
    #[allow(dead_code)]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Options tuned so scenarios complete in well under a second unless the
/// test drives time-based transitions on purpose.
#[allow(dead_code)]
pub fn scenario_options(failure_threshold: u32, reset_timeout: Duration) -> BreakerOptions {
    BreakerOptions {
        failure_threshold,
        reset_timeout,
        half_open_retry_limit: 1,
        monitor_interval: Duration::from_secs(30),
        service_timeout: Duration::from_millis(500),
        max_concurrent: 10_000,
    }
}

/// Recorder that captures every event delivered to its listeners.
#[allow(dead_code)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<BreakerEvent>>>,
}

#[allow(dead_code)]
impl EventRecorder {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A listener that appends every delivered event to this recorder.
    pub fn listener(&self) -> Listener {
        let captured = Arc::clone(&self.events);
        Arc::new(move |event: &BreakerEvent| {
            captured.lock().unwrap().push(event.clone());
        })
    }

    pub fn events(&self) -> Vec<BreakerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    /// The `(from, to)` pairs of every recorded state change, in order.
    pub fn state_changes(&self) -> Vec<(CircuitState, CircuitState)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                BreakerEvent::StateChange { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}
