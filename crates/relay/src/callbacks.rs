//! # Callback List
//!
//! The set of callbacks a service pushes notifications to.
//!
//! ## Invariants
//!
//! - **One Entry per Handle**: Registering a handle twice is detected and ignored.
//! - **Quiet Removal**: Unregistering an unknown handle is a no-op.
//! - **No Lock Across Calls**: Deliveries run on a snapshot, so a callback may
//!   register or unregister while it is being notified.

use std::sync::Arc;

use bindrun::HandleId;
use bindrun::RemoteHandle;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::error;
use transact::InterfaceContract;

use crate::callback::CallbackProxy;
use crate::callback::callback_contract;
use crate::error::Result;

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Callbacks that accepted the message.
    pub delivered: usize,
    /// Callbacks removed because their endpoint is gone.
    pub dropped: Vec<RemoteHandle>,
}

pub struct CallbackList {
    contract: Arc<InterfaceContract>,
    entries: DashMap<HandleId, CallbackProxy>,
}

impl CallbackList {
    pub fn new() -> Result<Self> {
        Ok(Self { contract: Arc::new(callback_contract()?), entries: DashMap::new() })
    }

    /// Adds a callback. Returns `false` if it was already present.
    pub fn register(&self, handle: RemoteHandle) -> bool {
        match self.entries.entry(handle.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CallbackProxy::with_contract(handle, self.contract.clone()));
                true
            }
        }
    }

    /// Removes a callback. Returns `false` if it was not present.
    pub fn unregister(&self, handle: &RemoteHandle) -> bool {
        self.entries.remove(&handle.id()).is_some()
    }

    pub fn contains(&self, handle: &RemoteHandle) -> bool {
        self.entries.contains_key(&handle.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn snapshot(&self) -> Vec<CallbackProxy> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Delivers `message` to every callback. Callbacks whose transport is
    /// closed are removed; other failures are logged and the callback stays.
    pub async fn broadcast(&self, message: &str) -> Delivery {
        let mut delivery = Delivery::default();

        for callback in self.snapshot() {
            match callback.deliver(message).await {
                Ok(()) => delivery.delivered += 1,
                Err(transact::Error::TransportClosed(reason)) => {
                    error!(handle = %callback.handle(), %reason, "dropping dead callback");
                    if self.unregister(callback.handle()) {
                        delivery.dropped.push(callback.handle().clone());
                    }
                }
                Err(e) => {
                    error!(handle = %callback.handle(), error = %e, "callback rejected notification");
                }
            }
        }

        delivery
    }
}

impl std::fmt::Debug for CallbackList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackList").field("len", &self.len()).finish()
    }
}
