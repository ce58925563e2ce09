//! # Remote Handles
//!
//! A `RemoteHandle` is an addressable endpoint. It is cheap to clone and
//! compares by the token the registry minted for it, never by what it wraps.

use std::sync::Arc;

use transact::InterfaceDescriptor;
use transact::TransactionId;

use crate::dispatch::Dispatcher;
use crate::transport;
use crate::transport::Transport;

pub use transact::HandleId;

/// What a handle actually talks to.
#[derive(Clone)]
pub enum Capability {
    /// A local implementation exposed to remote callers.
    Local(Arc<Dispatcher>),
    /// A genuine cross-process endpoint.
    Remote(Arc<dyn Transport>),
}

impl Capability {
    /// Stable identity of the underlying endpoint: the address of its allocation.
    pub(crate) fn endpoint_key(&self) -> usize {
        match self {
            Self::Local(dispatcher) => Arc::as_ptr(dispatcher) as *const () as usize,
            Self::Remote(transport) => Arc::as_ptr(transport) as *const () as usize,
        }
    }

    /// Delivers one transaction to the endpoint.
    pub async fn transact(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: Vec<u8>,
    ) -> transport::Result<Vec<u8>> {
        match self {
            Self::Local(dispatcher) => Ok(dispatcher.on_transact(descriptor, id, &request).await),
            Self::Remote(transport) => transport.send(descriptor, id, request).await,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(dispatcher) => write!(f, "Local({})", dispatcher.descriptor()),
            Self::Remote(_) => write!(f, "Remote"),
        }
    }
}

/// Canonical handle to an endpoint, minted by a `Registry`.
#[derive(Clone, Debug)]
pub struct RemoteHandle {
    id: HandleId,
    capability: Capability,
}

impl RemoteHandle {
    pub(crate) fn new(id: HandleId, capability: Capability) -> Self {
        Self { id, capability }
    }

    /// The token this handle travels as.
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Returns the local dispatcher if this handle points into this process.
    pub fn local(&self) -> Option<&Arc<Dispatcher>> {
        match &self.capability {
            Capability::Local(dispatcher) => Some(dispatcher),
            Capability::Remote(_) => None,
        }
    }

    pub async fn transact(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: Vec<u8>,
    ) -> transport::Result<Vec<u8>> {
        self.capability.transact(descriptor, id, request).await
    }
}

impl PartialEq for RemoteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RemoteHandle {}

impl std::hash::Hash for RemoteHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
