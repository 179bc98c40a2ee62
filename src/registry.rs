//! Name-keyed registries of live connection handles.
//!
//! Both the device and the broker registry are a [`Registry`]: a shared map
//! from stable name to the currently live handle. Entries are replaced, never
//! mutated in place. A reader clones the `Arc` under the read lock, so a handle
//! obtained before a reconnect stays valid until the reader drops it.

use crate::transport::{BrokerClient, MeshDevice};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared name to handle map. Cloning shares the same underlying map.
pub struct Registry<H: ?Sized> {
    inner: Arc<RwLock<HashMap<String, Arc<H>>>>,
}

/// Device name to live mesh radio handle.
pub type DeviceRegistry = Registry<dyn MeshDevice>;

/// Broker name to live MQTT client handle.
pub type BrokerRegistry = Registry<dyn BrokerClient>;

impl<H: ?Sized> Registry<H> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // Writers only insert or remove whole entries; a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<H>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<H>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current handle for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<H>> {
        self.read().get(name).cloned()
    }

    /// Install `handle` under `name`, returning the handle it replaced.
    pub fn install(&self, name: impl Into<String>, handle: Arc<H>) -> Option<Arc<H>> {
        self.write().insert(name.into(), handle)
    }

    /// Remove the entry for `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<H>> {
        self.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove and return every entry (used at shutdown).
    pub fn drain(&self) -> Vec<(String, Arc<H>)> {
        self.write().drain().collect()
    }
}

impl<H: ?Sized> Clone for Registry<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}
