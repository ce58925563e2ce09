//! # Transaction Dispatcher
//!
//! The receiving side of a transaction: checks the descriptor, routes the
//! transaction id to a bound handler, decodes the arguments, and encodes
//! whatever the handler produced into a reply.
//!
//! ## Invariants
//!
//! - **No Invocation on Mismatch**: A descriptor mismatch, an unknown id, a
//!   malformed argument list or an unknown handle token is rejected before
//!   the handler runs.
//! - **Reentrant**: Routes are built once and never mutated. The registry is
//!   the only shared state an invocation touches.
//! - **Layered Interfaces**: Ids this dispatcher does not know are offered to
//!   its fallback, replying under the original descriptor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use tracing::error;
use tracing::warn;
use transact::Codec;
use transact::Error;
use transact::HandleId;
use transact::InterfaceContract;
use transact::InterfaceDescriptor;
use transact::MethodContract;
use transact::RequestDecoder;
use transact::Result;
use transact::TransactionId;
use transact::Value;

use crate::config::Config;
use crate::handle::RemoteHandle;
use crate::registry::Registry;

/// An implementation bound to one method.
pub type Handler = Arc<dyn Fn(Call) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Errors raised while binding handlers to a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A handler names a method the contract does not declare.
    UnknownMethod { descriptor: String, method: String },
    /// A declared method has no handler.
    Unbound { descriptor: String, method: String },
    /// Two handlers name the same method.
    DuplicateRoute { descriptor: String, method: String },
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMethod { descriptor, method } => {
                write!(f, "'{}' declares no method '{}'", descriptor, method)
            }
            Self::Unbound { descriptor, method } => {
                write!(f, "method '{}' of '{}' has no handler", method, descriptor)
            }
            Self::DuplicateRoute { descriptor, method } => {
                write!(f, "method '{}' of '{}' is bound twice", method, descriptor)
            }
        }
    }
}

impl std::error::Error for BindError {}

/// Decoded arguments of one invocation, with every handle already resolved.
#[derive(Debug)]
pub struct Call {
    method: String,
    args: Vec<Value>,
    handles: HashMap<HandleId, RemoteHandle>,
}

impl Call {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    fn arg(&self, idx: usize) -> Result<&Value> {
        self.args.get(idx).ok_or_else(|| {
            Error::MalformedTransaction(format!("{} has no argument {}", self.method, idx))
        })
    }

    fn mismatch(&self, idx: usize, expected: &str) -> Error {
        let found = self.args.get(idx).map(Value::kind).unwrap_or("nothing");
        Error::MalformedTransaction(format!(
            "{} argument {} is {}, expected {}", self.method, idx, found, expected
        ))
    }

    pub fn str(&self, idx: usize) -> Result<&str> {
        self.arg(idx)?.as_str().ok_or_else(|| self.mismatch(idx, "string"))
    }

    pub fn bool(&self, idx: usize) -> Result<bool> {
        self.arg(idx)?.as_bool().ok_or_else(|| self.mismatch(idx, "bool"))
    }

    pub fn i32(&self, idx: usize) -> Result<i32> {
        self.arg(idx)?.as_i32().ok_or_else(|| self.mismatch(idx, "i32"))
    }

    pub fn i64(&self, idx: usize) -> Result<i64> {
        self.arg(idx)?.as_i64().ok_or_else(|| self.mismatch(idx, "i64"))
    }

    /// Returns the resolved handle passed at `idx`.
    pub fn handle(&self, idx: usize) -> Result<RemoteHandle> {
        let id = self.arg(idx)?.as_handle().ok_or_else(|| self.mismatch(idx, "handle"))?;
        self.resolved(id).cloned().ok_or(Error::UnknownReference(id.0))
    }

    /// Looks up any handle that appeared in the arguments, including inside lists.
    pub fn resolved(&self, id: HandleId) -> Option<&RemoteHandle> {
        self.handles.get(&id)
    }
}

struct Route {
    method: MethodContract,
    handler: Handler,
}

/// Lookup-table dispatcher for one interface.
pub struct Dispatcher {
    contract: Arc<InterfaceContract>,
    routes: HashMap<TransactionId, Route>,
    fallback: Option<Arc<Dispatcher>>,
    registry: Arc<Registry>,
    codec: Codec,
}

impl Dispatcher {
    pub fn builder(contract: Arc<InterfaceContract>, registry: Arc<Registry>) -> DispatcherBuilder {
        DispatcherBuilder {
            contract,
            registry,
            config: Config::default(),
            handlers: Vec::new(),
            fallback: None,
        }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        self.contract.descriptor()
    }

    pub fn contract(&self) -> &Arc<InterfaceContract> {
        &self.contract
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Chains a dispatcher that receives ids this one does not know.
    pub fn with_fallback(mut self, fallback: Arc<Dispatcher>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Serves one transaction.
    ///
    /// Whatever the handler returns, success or failure, is encoded into the
    /// reply. Rejections are returned as `Err` and the handler is not invoked.
    pub async fn dispatch(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: &[u8],
    ) -> Result<Vec<u8>> {
        let own = self.descriptor();
        if descriptor != own {
            return Err(self.reject_descriptor(descriptor.as_str()));
        }

        let header = RequestDecoder::decode(request)?;
        if own != header.descriptor {
            return Err(self.reject_descriptor(header.descriptor));
        }

        if id == TransactionId::DESCRIBE_SELF {
            debug!(descriptor = %own, "describe self");
            return transact::encode_describe_reply(own);
        }

        let outcome = match self.route(own, id, request).await {
            Err(e) if e.as_failure().is_none() => return Err(e),
            outcome => outcome,
        };

        transact::encode_reply(own, &outcome, &self.codec)
    }

    /// Transport-facing entry point. Never fails: rejections are encoded as
    /// failure replies under the caller's descriptor.
    pub async fn on_transact(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: &[u8],
    ) -> Vec<u8> {
        match self.dispatch(descriptor, id, request).await {
            Ok(reply) => reply,
            Err(e) => {
                let outcome = Err(e);
                transact::encode_reply(descriptor, &outcome, &self.codec).unwrap_or_else(|e| {
                    error!(descriptor = %descriptor, %id, error = %e, "failed to encode failure reply");
                    Vec::new()
                })
            }
        }
    }

    fn reject_descriptor(&self, found: &str) -> Error {
        warn!(expected = %self.descriptor(), found, "descriptor mismatch");
        Error::DescriptorMismatch {
            expected: self.descriptor().to_string(),
            found: found.to_string(),
        }
    }

    fn route<'a>(
        &'a self,
        echo: &'a InterfaceDescriptor,
        id: TransactionId,
        request: &'a [u8],
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let Some(route) = self.routes.get(&id) else {
                if let Some(next) = &self.fallback {
                    debug!(descriptor = %echo, %id, fallback = %next.descriptor(), "delegating");
                    return next.route(echo, id, request).await;
                }
                warn!(descriptor = %echo, %id, "unknown transaction");
                return Err(Error::UnknownTransaction { descriptor: echo.to_string(), id });
            };

            let mut header = RequestDecoder::decode(request)?;
            let args = self.codec.decode_vals(&mut header.args, &route.method.params)?;
            if !header.args.is_empty() {
                return Err(Error::MalformedTransaction(format!(
                    "{} trailing bytes after arguments", header.args.remaining()
                )));
            }

            let handles = self.resolve_handles(&args)?;

            debug!(descriptor = %echo, %id, method = %route.method.name, "invoking");
            let call = Call { method: route.method.name.clone(), args, handles };
            // Core errors the handler ran into on its own calls belong to
            // those calls, not this one.
            let value = (route.handler)(call).await.map_err(|e| Error::Application(e.into_failure()))?;

            if !value.matches(&route.method.returns) {
                return Err(Error::MalformedTransaction(format!(
                    "{} returned {}, expected {}", route.method.name, value.kind(), route.method.returns
                )));
            }
            Ok(value)
        }
        .boxed()
    }

    fn resolve_handles(&self, args: &[Value]) -> Result<HashMap<HandleId, RemoteHandle>> {
        let mut handles = HashMap::new();
        let mut stack: Vec<&Value> = args.iter().collect();

        while let Some(value) = stack.pop() {
            match value {
                Value::Handle(id) => {
                    let handle = self.registry.resolve(*id).inspect_err(|_| {
                        warn!(descriptor = %self.descriptor(), handle = %id, "unknown reference");
                    })?;
                    handles.insert(*id, handle);
                }
                Value::List(items) => stack.extend(items),
                _ => {}
            }
        }

        Ok(handles)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("descriptor", self.descriptor())
            .field("routes", &self.routes.len())
            .field("fallback", &self.fallback.as_ref().map(|d| d.descriptor().clone()))
            .finish()
    }
}

/// Binds handlers to a contract's methods by name.
pub struct DispatcherBuilder {
    contract: Arc<InterfaceContract>,
    registry: Arc<Registry>,
    config: Config,
    handlers: Vec<(String, Handler)>,
    fallback: Option<Arc<Dispatcher>>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn fallback(mut self, fallback: Arc<Dispatcher>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Binds `handler` to the method called `name`.
    pub fn route<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let bound: Handler = Arc::new(move |call: Call| handler(call).boxed());
        self.handlers.push((name.to_string(), bound));
        self
    }

    /// Builds the routing table. Every declared method must be bound exactly
    /// by name.
    pub fn build(self) -> std::result::Result<Dispatcher, BindError> {
        let descriptor = self.contract.descriptor().to_string();
        let mut routes = HashMap::with_capacity(self.handlers.len());

        for (name, handler) in self.handlers {
            let method = self.contract.method_named(&name).ok_or_else(|| BindError::UnknownMethod {
                descriptor: descriptor.clone(),
                method: name.clone(),
            })?;
            if routes.contains_key(&method.id) {
                return Err(BindError::DuplicateRoute { descriptor, method: name });
            }
            routes.insert(method.id, Route { method: method.clone(), handler });
        }

        if let Some(missing) = self.contract.methods().iter().find(|m| !routes.contains_key(&m.id)) {
            return Err(BindError::Unbound { descriptor, method: missing.name.clone() });
        }

        Ok(Dispatcher {
            contract: self.contract,
            routes,
            fallback: self.fallback,
            registry: self.registry,
            codec: self.config.codec(),
        })
    }
}
