//! Per-service circuit breaker backed by shared persisted state.
//!
//! Each breaker runs the closed / open / half-open state machine against the
//! stats record for its service key. The record lives in the state store, so
//! every caller in a fleet observing the same store converges on the same
//! view of a service's health. Local artifacts (the active-request set, the
//! metrics window, event subscribers) live only as long as the breaker
//! instance.
//!
//! Two background loops run per breaker: a health check that drives the
//! time-based open to half-open transition independently of traffic, and a
//! metrics tick that recomputes the rolling window. Both stop when
//! [`Breaker::stop`] is called or the breaker is dropped.

use crate::config::BreakerOptions;
use crate::error::{BreakerError, ConfigurationError, StoreError};
use crate::events::{BreakerEvent, EventDispatcher, EventKind, Listener, ListenerId};
use crate::metrics::{MetricsSnapshot, MetricsWindow};
use crate::stats::{CircuitState, ServiceStats};
use crate::store::{StateStore, WatchCallback};
use crate::Timestamp;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;

/// Cadence of the metrics recomputation loop.
const METRICS_TICK: Duration = Duration::from_millis(100);

// ============================================================================
// Breaker
// ============================================================================

/// Circuit breaker for a single service key.
///
/// Constructed with [`Breaker::new`], which spawns the health-check and
/// metrics loops and registers a store watch for the key. All shared fields
/// sit behind short lock sections; no lock is held across store I/O or the
/// protected call.
pub struct Breaker {
    service_key: String,
    options: BreakerOptions,
    store: Arc<dyn StateStore>,

    /// Last-known view of the persisted record, used when the store is
    /// unreachable.
    cached: Mutex<ServiceStats>,
    active_requests: Mutex<HashSet<Uuid>>,
    window: Mutex<MetricsWindow>,
    dispatcher: EventDispatcher,

    /// Serializes state transitions so racing triggers (admission and
    /// health check) converge to a single persisted transition.
    transition_gate: tokio::sync::Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl Breaker {
    /// Create a breaker for `service_key` against the given store.
    ///
    /// Spawns the health-check and metrics loops and registers a store
    /// watch; a watch registration failure is logged and the breaker
    /// continues without live updates.
    pub async fn new(
        service_key: impl Into<String>,
        store: Arc<dyn StateStore>,
        options: BreakerOptions,
    ) -> Result<Arc<Self>, ConfigurationError> {
        options.validate()?;

        let (shutdown, _) = watch::channel(false);
        let breaker = Arc::new(Self {
            service_key: service_key.into(),
            options,
            store,
            cached: Mutex::new(ServiceStats::fresh()),
            active_requests: Mutex::new(HashSet::new()),
            window: Mutex::new(MetricsWindow::new()),
            dispatcher: EventDispatcher::new(),
            transition_gate: tokio::sync::Mutex::new(()),
            shutdown,
        });

        Self::register_watch(&breaker).await;
        Self::spawn_health_loop(&breaker);
        Self::spawn_metrics_loop(&breaker);

        Ok(breaker)
    }

    /// The service key this breaker protects.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// The options this breaker was created with.
    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    /// Execute a protected call.
    ///
    /// Admission order: circuit state (with an open-to-half-open attempt
    /// when the cool-down has elapsed), then the in-flight cap. Admitted
    /// calls race against the service timeout; the outcome is counted
    /// exactly once and the relevant events are emitted.
    ///
    /// # Returns
    ///
    /// - `Ok(T)`: the call succeeded
    /// - `Err(BreakerError)`: admission rejection, timeout, or the call's
    ///   own error passed through
    pub async fn execute<F, Fut, T, E>(&self, thunk: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut stats = self.load_stats().await;

        if stats.state == CircuitState::Open {
            if stats.cool_down_elapsed(self.options.reset_timeout) {
                self.transition_to(CircuitState::HalfOpen, None).await;
                stats = self.load_stats().await;
            }

            if stats.state == CircuitState::Open {
                let error = BreakerError::CircuitOpen {
                    service: self.service_key.clone(),
                };
                self.dispatcher.emit(&BreakerEvent::Rejected {
                    error: error.to_string(),
                    stats,
                });
                return Err(error);
            }
        }

        let request_id = Uuid::new_v4();
        {
            let mut active = self.active_requests.lock().unwrap();
            if self.options.max_concurrent > 0 && active.len() >= self.options.max_concurrent {
                let error = BreakerError::Overloaded {
                    service: self.service_key.clone(),
                    active: active.len(),
                    max_concurrent: self.options.max_concurrent,
                };
                drop(active);
                self.dispatcher.emit(&BreakerEvent::Rejected {
                    error: error.to_string(),
                    stats,
                });
                return Err(error);
            }
            active.insert(request_id);
        }

        self.window
            .lock()
            .unwrap()
            .record_request(Timestamp::now().epoch_millis());
        let started = Instant::now();

        let outcome = if self.options.service_timeout.is_zero() {
            Ok(thunk().await)
        } else {
            tokio::time::timeout(self.options.service_timeout, thunk()).await
        };
        let response_time = started.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => {
                self.record_success(request_id, response_time).await;
                Ok(value)
            }
            Ok(Err(error)) => {
                let error = BreakerError::ServiceError(Box::new(error));
                self.record_failure(request_id, &error, false).await;
                Err(error)
            }
            Err(_elapsed) => {
                let error = BreakerError::ServiceTimeout {
                    timeout: self.options.service_timeout,
                };
                self.record_failure(request_id, &error, true).await;
                Err(error)
            }
        };

        self.release_request(request_id);
        self.emit_metrics();
        result
    }

    /// Read the persisted record for this key straight from the store.
    pub async fn get_stats(&self) -> Result<Option<ServiceStats>, StoreError> {
        self.store.get(&self.service_key).await
    }

    /// Snapshot of the in-memory metrics window.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.snapshot_metrics()
    }

    /// Current circuit state from the last-known view. Cheap and lock-only;
    /// use [`get_stats`](Breaker::get_stats) for the authoritative record.
    pub fn current_state(&self) -> CircuitState {
        self.cached.lock().unwrap().state
    }

    /// Number of calls currently in flight through this instance.
    pub fn active_request_count(&self) -> usize {
        self.active_requests.lock().unwrap().len()
    }

    /// Zero the failure count and clear the failure fields in the store.
    /// Monotonic totals are preserved.
    pub async fn reset_stats(&self) -> Result<(), StoreError> {
        self.store.reset(&self.service_key).await
    }

    /// Attach a listener for one event kind.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.dispatcher.subscribe(kind, listener)
    }

    /// Detach a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(kind, id)
    }

    /// Halt the health-check and metrics loops. Idempotent; the persisted
    /// record is not altered.
    pub fn stop(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        debug!(service = %self.service_key, "breaker stopped");
    }

    /// Check if [`stop`](Breaker::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    // ========================================================================
    // Outcome recording
    // ========================================================================

    async fn record_success(&self, request_id: Uuid, response_time: Duration) {
        if !self.request_is_active(request_id) {
            return;
        }

        self.window
            .lock()
            .unwrap()
            .record_response_time(response_time.as_secs_f64() * 1000.0);

        let mut stats = self.load_stats().await;
        let was_half_open = stats.state == CircuitState::HalfOpen;

        stats.successful_requests += 1;
        stats.total_requests += 1;
        stats.failure_count = 0;
        stats.last_success_time = Some(Timestamp::now());
        stats.last_update_time = Some(Timestamp::now());
        self.refresh_advisory(&mut stats);

        if let Err(error) = self.store.put(&self.service_key, &stats).await {
            warn!(service = %self.service_key, %error, "success stats write failed");
        }
        *self.cached.lock().unwrap() = stats;

        if was_half_open {
            self.transition_to(CircuitState::Closed, None).await;
        }

        self.dispatcher.emit(&BreakerEvent::Success {
            response_time,
            stats: self.cached_stats(),
        });
    }

    async fn record_failure(&self, request_id: Uuid, error: &BreakerError, timed_out: bool) {
        if !self.request_is_active(request_id) {
            return;
        }

        let message = error.to_string();
        self.window
            .lock()
            .unwrap()
            .record_error(Timestamp::now().epoch_millis());

        let failure_count = match self.store.increment_failure_count(&self.service_key).await {
            Ok(count) => count,
            Err(store_error) => {
                warn!(
                    service = %self.service_key,
                    error = %store_error,
                    "failure count increment failed, updating last known view"
                );
                let mut cached = self.cached.lock().unwrap();
                cached.failure_count += 1;
                cached.failed_requests += 1;
                cached.total_requests += 1;
                cached.last_failure_time = Some(Timestamp::now());
                cached.failure_count
            }
        };

        let mut stats = self.load_stats().await;
        let prior_state = stats.state;
        stats.last_error = Some(message.clone());
        stats.last_update_time = Some(Timestamp::now());
        self.refresh_advisory(&mut stats);

        if let Err(store_error) = self.store.put(&self.service_key, &stats).await {
            warn!(service = %self.service_key, error = %store_error, "failure stats write failed");
        }
        *self.cached.lock().unwrap() = stats.clone();

        if timed_out {
            self.dispatcher.emit(&BreakerEvent::Timeout {
                error: message.clone(),
                stats: stats.clone(),
            });
        }

        self.dispatcher.emit(&BreakerEvent::Failure {
            error: message.clone(),
            stats,
        });

        if prior_state == CircuitState::HalfOpen || failure_count >= self.options.failure_threshold
        {
            self.transition_to(CircuitState::Open, Some(&message)).await;
        }
    }

    fn request_is_active(&self, request_id: Uuid) -> bool {
        self.active_requests.lock().unwrap().contains(&request_id)
    }

    fn release_request(&self, request_id: Uuid) {
        self.active_requests.lock().unwrap().remove(&request_id);
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Persist a transition to `target`, then emit the change events.
    ///
    /// The persisted state is re-read inside the gate so concurrent
    /// triggers observe at most one transition per target; a write failure
    /// suppresses emission so subscribers never see a state that is not
    /// persisted.
    async fn transition_to(&self, target: CircuitState, error: Option<&str>) {
        let _gate = self.transition_gate.lock().await;

        let current = match self.store.get(&self.service_key).await {
            Ok(Some(stats)) => stats,
            Ok(None) => ServiceStats::fresh(),
            Err(store_error) => {
                warn!(
                    service = %self.service_key,
                    error = %store_error,
                    "state load failed, transitioning from last known view"
                );
                self.cached_stats()
            }
        };

        if current.state == target {
            return;
        }

        let from = current.state;
        let mut next = current;
        next.state = target;
        next.last_update_time = Some(Timestamp::now());

        match target {
            CircuitState::Open => {
                next.failure_count = self.options.failure_threshold;
                next.last_failure_time = Some(Timestamp::now());
                if let Some(message) = error {
                    next.last_error = Some(message.to_string());
                }
            }
            CircuitState::HalfOpen => {
                next.failure_count = 0;
            }
            CircuitState::Closed => {
                next.failure_count = 0;
                next.last_success_time = Some(Timestamp::now());
            }
        }

        if let Err(store_error) = self.store.put(&self.service_key, &next).await {
            warn!(
                service = %self.service_key,
                error = %store_error,
                "state transition write failed, suppressing emission"
            );
            return;
        }
        *self.cached.lock().unwrap() = next;

        debug!(service = %self.service_key, %from, to = %target, "circuit state changed");
        self.dispatcher
            .emit(&BreakerEvent::StateChange { from, to: target });

        if target == CircuitState::Open {
            self.dispatcher.emit(&BreakerEvent::CircuitOpen {
                error: error.unwrap_or("circuit tripped").to_string(),
            });
        }
    }

    // ========================================================================
    // Stats loading
    // ========================================================================

    /// Load the record, materializing a fresh one on first access. Store
    /// failures fall back to the last-known view; they never surface to the
    /// caller of `execute`.
    async fn load_stats(&self) -> ServiceStats {
        match self.store.get(&self.service_key).await {
            Ok(Some(stats)) => {
                *self.cached.lock().unwrap() = stats.clone();
                stats
            }
            Ok(None) => {
                let stats = ServiceStats::fresh();
                if let Err(error) = self.store.put(&self.service_key, &stats).await {
                    warn!(service = %self.service_key, %error, "failed to materialize stats record");
                }
                *self.cached.lock().unwrap() = stats.clone();
                stats
            }
            Err(error) => {
                warn!(service = %self.service_key, %error, "stats load failed, using last known view");
                self.cached_stats()
            }
        }
    }

    fn cached_stats(&self) -> ServiceStats {
        self.cached.lock().unwrap().clone()
    }

    fn refresh_advisory(&self, stats: &mut ServiceStats) {
        let load = self.active_requests.lock().unwrap().len();
        let snapshot = self
            .window
            .lock()
            .unwrap()
            .snapshot(Timestamp::now().epoch_millis(), load);
        stats.current_load = load as u32;
        stats.average_response_time = snapshot.average_response_time;
        stats.last_minute_requests = snapshot.last_minute.total;
    }

    fn snapshot_metrics(&self) -> MetricsSnapshot {
        let load = self.active_requests.lock().unwrap().len();
        self.window
            .lock()
            .unwrap()
            .snapshot(Timestamp::now().epoch_millis(), load)
    }

    fn emit_metrics(&self) {
        let snapshot = self.snapshot_metrics();
        self.dispatcher.emit(&BreakerEvent::Metrics { snapshot });
    }

    // ========================================================================
    // Background loops and store watch
    // ========================================================================

    async fn register_watch(breaker: &Arc<Self>) {
        let weak = Arc::downgrade(breaker);
        let callback: WatchCallback = Arc::new(move |stats: ServiceStats| {
            if let Some(breaker) = weak.upgrade() {
                *breaker.cached.lock().unwrap() = stats.clone();
                breaker.dispatcher.emit(&BreakerEvent::StateUpdate { stats });
            }
        });

        if let Err(error) = breaker.store.watch(&breaker.service_key, callback).await {
            warn!(service = %breaker.service_key, %error, "failed to register state watch");
        }
    }

    fn spawn_health_loop(breaker: &Arc<Self>) {
        let weak = Arc::downgrade(breaker);
        let mut shutdown_rx = breaker.shutdown.subscribe();
        let period = breaker.options.health_check_interval();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = shutdown_rx.changed() => break,
                }

                let Some(breaker) = weak.upgrade() else { break };
                breaker.health_tick().await;
            }
        });
    }

    fn spawn_metrics_loop(breaker: &Arc<Self>) {
        let weak = Arc::downgrade(breaker);
        let mut shutdown_rx = breaker.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(METRICS_TICK) => {}
                    _ = shutdown_rx.changed() => break,
                }

                let Some(breaker) = weak.upgrade() else { break };
                breaker.emit_metrics();
            }
        });
    }

    /// One health-check tick: drive the time-based open to half-open
    /// transition, otherwise publish advisory fields.
    async fn health_tick(&self) {
        let stats = match self.store.get(&self.service_key).await {
            Ok(Some(stats)) => stats,
            Ok(None) => return,
            Err(error) => {
                warn!(service = %self.service_key, %error, "health check stats load failed");
                return;
            }
        };

        if stats.state == CircuitState::Open
            && stats.cool_down_elapsed(self.options.reset_timeout)
        {
            self.transition_to(CircuitState::HalfOpen, None).await;
            return;
        }

        let mut updated = stats;
        self.refresh_advisory(&mut updated);
        updated.last_update_time = Some(Timestamp::now());

        match self.store.put(&self.service_key, &updated).await {
            Ok(()) => {
                *self.cached.lock().unwrap() = updated.clone();
            }
            Err(error) => {
                warn!(service = %self.service_key, %error, "health check stats write failed");
            }
        }

        self.dispatcher
            .emit(&BreakerEvent::HealthCheck { stats: updated });
    }
}
