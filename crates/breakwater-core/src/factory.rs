//! Registry of named shard groups sharing one state store.
//!
//! The factory owns its groups and the event listeners it attached to them.
//! Cleanup detaches listeners first, then stops the breakers, so no
//! listener observes events from a breaker that is shutting down.

use crate::breaker::Breaker;
use crate::config::{BreakerOptions, GroupConfig, DEFAULT_SHARD_COUNT};
use crate::error::RegistryError;
use crate::events::{EventKind, Listener, ListenerId};
use crate::group::{CallResult, ShardGroup};
use crate::stats::CircuitState;
use crate::store::StateStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

/// A listener attached through the factory, retained so cleanup can detach
/// it deterministically.
struct ListenerHandle {
    group: String,
    shard_id: usize,
    kind: EventKind,
    id: ListenerId,
}

/// Registry of named [`ShardGroup`]s built against one shared store and a
/// common set of base options.
pub struct BreakerFactory {
    store: Arc<dyn StateStore>,
    base_options: BreakerOptions,
    groups: RwLock<HashMap<String, Arc<ShardGroup>>>,
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl BreakerFactory {
    /// Create a factory. `base_options` apply to every group that does not
    /// carry its own options.
    pub fn new(store: Arc<dyn StateStore>, base_options: BreakerOptions) -> Self {
        Self {
            store,
            base_options,
            groups: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create and register a shard group.
    ///
    /// # Returns
    ///
    /// - `Ok(group)`: the group was created and registered
    /// - `Err(AlreadyExists)`: the name is taken
    /// - `Err(Configuration)`: the config is invalid
    pub async fn create_group(&self, config: GroupConfig) -> Result<Arc<ShardGroup>, RegistryError> {
        config.validate()?;

        if self.groups.read().unwrap().contains_key(&config.name) {
            return Err(RegistryError::AlreadyExists { name: config.name });
        }

        let shard_count = config.shard_count.unwrap_or(DEFAULT_SHARD_COUNT);
        let options = config
            .options
            .clone()
            .unwrap_or_else(|| self.base_options.clone());
        let group = ShardGroup::new(
            config.name.clone(),
            shard_count,
            Arc::clone(&self.store),
            options,
        )
        .await?;

        {
            let mut groups = self.groups.write().unwrap();
            if groups.contains_key(&config.name) {
                // Lost a registration race; discard the group we just built.
                group.stop();
                return Err(RegistryError::AlreadyExists { name: config.name });
            }
            groups.insert(config.name.clone(), Arc::clone(&group));
        }

        info!(service = %config.name, shard_count, "registered service group");
        Ok(group)
    }

    /// Look up a registered group.
    pub fn group(&self, name: &str) -> Result<Arc<ShardGroup>, RegistryError> {
        self.groups
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownService {
                name: name.to_string(),
            })
    }

    /// Check whether a service name is registered.
    pub fn has_service(&self, name: &str) -> bool {
        self.groups.read().unwrap().contains_key(name)
    }

    /// Names of all registered groups.
    pub fn services(&self) -> Vec<String> {
        self.groups.read().unwrap().keys().cloned().collect()
    }

    /// The resolved configuration of a registered group.
    pub fn config(&self, name: &str) -> Result<GroupConfig, RegistryError> {
        let group = self.group(name)?;
        Ok(GroupConfig {
            name: group.service_name().to_string(),
            shard_count: Some(group.shard_count()),
            options: Some(group.options().clone()),
        })
    }

    /// Bounds-checked access to one shard's breaker in a named group.
    pub fn get_breaker(&self, name: &str, shard_id: usize) -> Result<Arc<Breaker>, RegistryError> {
        let group = self.group(name)?;
        Ok(Arc::clone(group.breaker(shard_id)?))
    }

    /// Current circuit state of every shard of every registered group.
    pub fn group_states(&self) -> HashMap<String, HashMap<usize, CircuitState>> {
        self.groups
            .read()
            .unwrap()
            .iter()
            .map(|(name, group)| (name.clone(), group.states()))
            .collect()
    }

    /// Attach listeners to every shard of a named group. Registrations are
    /// retained and detached again by [`cleanup`](BreakerFactory::cleanup).
    pub fn add_listeners(
        &self,
        name: &str,
        registrations: Vec<(EventKind, Listener)>,
    ) -> Result<(), RegistryError> {
        let group = self.group(name)?;

        let mut retained = self.listeners.lock().unwrap();
        for (kind, listener) in registrations {
            for (shard_id, breaker) in group.breakers().iter().enumerate() {
                let id = breaker.subscribe(kind, Arc::clone(&listener));
                retained.push(ListenerHandle {
                    group: name.to_string(),
                    shard_id,
                    kind,
                    id,
                });
            }
        }

        Ok(())
    }

    /// Execute on an explicit shard of a named group.
    pub async fn execute_on<F, Fut, T, E>(
        &self,
        name: &str,
        shard_id: usize,
        thunk: F,
    ) -> Result<CallResult<T>, RegistryError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.group(name)?.execute_on(shard_id, thunk).await
    }

    /// Route a key within a named group and execute on its shard.
    pub async fn execute_with_key<F, Fut, T, E>(
        &self,
        name: &str,
        key: &str,
        thunk: F,
    ) -> Result<CallResult<T>, RegistryError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        Ok(self.group(name)?.execute_with_key(key, thunk).await)
    }

    /// Detach all listeners, stop all breakers, and clear the registry.
    /// Idempotent; a second call is a no-op.
    pub fn cleanup(&self) {
        let handles: Vec<ListenerHandle> = self.listeners.lock().unwrap().drain(..).collect();
        let groups: HashMap<String, Arc<ShardGroup>> =
            self.groups.write().unwrap().drain().collect();

        for handle in handles {
            if let Some(group) = groups.get(&handle.group) {
                if let Ok(breaker) = group.breaker(handle.shard_id) {
                    breaker.unsubscribe(handle.kind, handle.id);
                }
            }
        }

        for group in groups.values() {
            group.stop();
        }

        if !groups.is_empty() {
            debug!(group_count = groups.len(), "factory cleanup complete");
        }
    }
}
