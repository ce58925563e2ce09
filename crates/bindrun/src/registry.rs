//! # Remote Reference Registry
//!
//! Maps endpoints to the tokens they travel as, and tokens back to handles.
//!
//! ## Invariants
//!
//! - **Canonical Handles**: Registering the same endpoint twice returns the
//!   same handle. Endpoint identity is the address of its `Arc` allocation,
//!   which stays pinned for as long as the registry holds a clone of it.
//! - **Explicit Reclamation**: An endpoint stays registered until
//!   `unregister` returns. Nothing is collected in the background.
//! - **Mutual Exclusion**: `register`, `resolve` and `unregister` take the
//!   same lock, so both maps always agree.
//! - **One Import per Dispatcher**: A foreign dispatcher adopted into this
//!   registry gets exactly one bridging handle until that handle is
//!   unregistered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tracing::debug;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::handle::Capability;
use crate::handle::HandleId;
use crate::handle::RemoteHandle;
use crate::loopback::Loopback;
use crate::transport::Transport;

#[derive(Default)]
struct Tables {
    handles: HashMap<HandleId, RemoteHandle>,
    endpoints: HashMap<usize, HandleId>,
    /// Bridges to dispatchers that resolve through another registry.
    imports: HashMap<usize, HandleId>,
    next_id: u64,
}

impl Tables {
    fn existing(&self, key: usize) -> Option<RemoteHandle> {
        self.endpoints.get(&key).and_then(|id| self.handles.get(id)).cloned()
    }

    fn insert(&mut self, capability: Capability) -> RemoteHandle {
        self.next_id += 1;
        let id = HandleId(self.next_id);
        let handle = RemoteHandle::new(id, capability);
        self.endpoints.insert(handle.capability().endpoint_key(), id);
        self.handles.insert(id, handle.clone());

        info!(handle = %id, live = self.handles.len(), "registered endpoint");
        handle
    }
}

/// Registry of live endpoints, shared by every dispatcher of a node.
#[derive(Default)]
pub struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Tables are never left half-updated, so a poisoned lock is still usable.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an endpoint, returning its canonical handle.
    pub fn register(&self, capability: Capability) -> RemoteHandle {
        let mut tables = self.lock();
        match tables.existing(capability.endpoint_key()) {
            Some(handle) => handle,
            None => tables.insert(capability),
        }
    }

    /// Exposes a local implementation to remote callers.
    pub fn register_local(&self, dispatcher: Arc<Dispatcher>) -> RemoteHandle {
        self.register(Capability::Local(dispatcher))
    }

    /// Records a cross-process endpoint.
    pub fn register_remote(&self, transport: Arc<dyn Transport>) -> RemoteHandle {
        self.register(Capability::Remote(transport))
    }

    /// Brings a handle minted by another registry into this one.
    ///
    /// An endpoint served in this process is registered against its
    /// dispatcher: directly when the dispatcher resolves tokens through this
    /// registry, otherwise behind a bridging `Loopback`. Any other transport
    /// is registered as is. Must be called inside a tokio runtime.
    pub fn adopt(self: &Arc<Self>, handle: &RemoteHandle) -> RemoteHandle {
        let home = match handle.capability() {
            Capability::Local(dispatcher) => Some(dispatcher.clone()),
            Capability::Remote(transport) => transport.local_dispatcher(),
        };

        match home {
            Some(dispatcher) if Arc::ptr_eq(dispatcher.registry(), self) => self.register_local(dispatcher),
            Some(dispatcher) => self.import(dispatcher),
            None => self.register(handle.capability().clone()),
        }
    }

    fn import(self: &Arc<Self>, dispatcher: Arc<Dispatcher>) -> RemoteHandle {
        let key = Arc::as_ptr(&dispatcher) as *const () as usize;
        let mut tables = self.lock();

        let existing = tables.imports.get(&key).and_then(|id| tables.handles.get(id)).cloned();
        if let Some(handle) = existing {
            return handle;
        }

        debug!(descriptor = %dispatcher.descriptor(), "bridging foreign dispatcher");
        let bridge: Arc<dyn Transport> = Loopback::bridge(dispatcher, self);
        let handle = tables.insert(Capability::Remote(bridge));
        tables.imports.insert(key, handle.id());
        handle
    }

    /// Turns an incoming token back into a handle.
    pub fn resolve(&self, id: HandleId) -> transact::Result<RemoteHandle> {
        self.lock()
            .handles
            .get(&id)
            .cloned()
            .ok_or(transact::Error::UnknownReference(id.0))
    }

    /// Removes a handle. Returns `false` if it was not registered.
    pub fn unregister(&self, handle: &RemoteHandle) -> bool {
        let mut tables = self.lock();
        let Some(removed) = tables.handles.remove(&handle.id()) else {
            return false;
        };
        tables.endpoints.remove(&removed.capability().endpoint_key());
        tables.imports.retain(|_, id| *id != removed.id());

        info!(handle = %handle.id(), live = tables.handles.len(), "unregistered endpoint");
        true
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.lock().handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().handles.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("live", &self.len()).finish()
    }
}
