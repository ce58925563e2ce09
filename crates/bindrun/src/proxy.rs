//! # Remote Procedure Call Proxy
//!
//! Marshals typed calls onto a `RemoteHandle` and turns replies back into
//! values or errors.
//!
//! The proxy holds no per-call state. Any number of calls on one proxy may
//! be in flight at once; each owns its request and reply buffers.
//!
//! ## Invariants
//!
//! - Arguments match the method's parameters or nothing is sent
//! - Requests over `Config::max_transaction_bytes` are never sent
//! - Replies must echo the descriptor; the value must match the return type
//! - No call is ever retried

use std::sync::Arc;

use tracing::debug;
use transact::Codec;
use transact::Error;
use transact::InterfaceContract;
use transact::InterfaceDescriptor;
use transact::MethodContract;
use transact::RequestEncoder;
use transact::Result;
use transact::TransactionId;
use transact::Value;
use transact::ValueType;

use crate::config::Config;
use crate::handle::RemoteHandle;

/// Caller-side view of an interface on a handle.
#[derive(Clone, Debug)]
pub struct Proxy {
    handle: RemoteHandle,
    contract: Arc<InterfaceContract>,
    config: Config,
    codec: Codec,
}

impl Proxy {
    pub fn new(handle: RemoteHandle, contract: Arc<InterfaceContract>) -> Self {
        Self::with_config(handle, contract, Config::default())
    }

    pub fn with_config(handle: RemoteHandle, contract: Arc<InterfaceContract>, config: Config) -> Self {
        Self { handle, contract, config, codec: config.codec() }
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        self.contract.descriptor()
    }

    /// Executes a typed call and waits for its outcome.
    ///
    /// Returns `UnknownTransaction` if the local contract lacks `id`,
    /// `MalformedTransaction` if the arguments do not fit, `TransportClosed`
    /// if delivery fails, and whatever the remote side raised otherwise.
    pub async fn invoke(&self, id: TransactionId, args: &[Value]) -> Result<Value> {
        let method = self.contract.method(id).ok_or_else(|| Error::UnknownTransaction {
            descriptor: self.descriptor().to_string(),
            id,
        })?;
        self.call(method, args).await
    }

    /// Executes a call addressed by method name.
    pub async fn invoke_named(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.contract.method_named(name).ok_or_else(|| {
            Error::MalformedTransaction(format!("'{}' declares no method '{}'", self.descriptor(), name))
        })?;
        self.call(method, args).await
    }

    async fn call(&self, method: &MethodContract, args: &[Value]) -> Result<Value> {
        self.codec.check_args(&method.params, args)?;
        debug!(descriptor = %self.descriptor(), id = %method.id, method = %method.name, handle = %self.handle, "invoke");
        self.round_trip(method.id, args, &method.returns).await
    }

    /// Asks the endpoint for its descriptor.
    pub async fn describe(&self) -> Result<InterfaceDescriptor> {
        let value = self.round_trip(TransactionId::DESCRIBE_SELF, &[], &ValueType::String).await?;
        match value {
            Value::String(name) => Ok(InterfaceDescriptor::new(name)),
            other => Err(Error::ProtocolError(format!("describe returned {}", other.kind()))),
        }
    }

    async fn round_trip(&self, id: TransactionId, args: &[Value], returns: &ValueType) -> Result<Value> {
        let request = RequestEncoder::new(self.descriptor(), args).into_bytes(&self.codec)?;
        if request.len() > self.config.max_transaction_bytes {
            return Err(Error::MalformedTransaction(format!(
                "request of {} bytes exceeds the {} byte limit",
                request.len(),
                self.config.max_transaction_bytes
            )));
        }

        let reply = self.handle.transact(self.descriptor(), id, request).await?;
        transact::decode_reply(&reply, self.descriptor(), returns, &self.codec)
    }
}
