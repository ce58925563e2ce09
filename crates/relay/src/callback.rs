//! The notification interface: `relay.IRemoteCallback`.

use std::sync::Arc;

use bindrun::Call;
use bindrun::Dispatcher;
use bindrun::Proxy;
use bindrun::Registry;
use bindrun::RemoteHandle;
use transact::InterfaceContract;
use transact::TransactionId;
use transact::Value;
use transact::ValueType;

use crate::error::Result;

pub const CALLBACK_DESCRIPTOR: &str = "relay.IRemoteCallback";

pub const DELIVER: TransactionId = TransactionId::ordinal(0);

pub fn callback_contract() -> Result<InterfaceContract> {
    let contract = InterfaceContract::builder(CALLBACK_DESCRIPTOR)
        .method("deliver", vec![ValueType::String], ValueType::Void)
        .build()?;
    Ok(contract)
}

/// Receives messages pushed by a service.
///
/// Every method has a no-op default.
#[async_trait::async_trait]
pub trait RemoteCallback: Send + Sync + 'static {
    async fn deliver(&self, _message: &str) -> transact::Result<()> {
        Ok(())
    }
}

/// Callback that accepts and drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl RemoteCallback for NoopCallback {}

/// Binds a `RemoteCallback` implementation to a dispatcher.
pub fn callback_dispatcher(imp: Arc<dyn RemoteCallback>, registry: Arc<Registry>) -> Result<Dispatcher> {
    let dispatcher = Dispatcher::builder(Arc::new(callback_contract()?), registry)
        .route("deliver", move |call| deliver(imp.clone(), call))
        .build()?;
    Ok(dispatcher)
}

async fn deliver(imp: Arc<dyn RemoteCallback>, call: Call) -> transact::Result<Value> {
    imp.deliver(call.str(0)?).await?;
    Ok(Value::Void)
}

/// Typed caller-side view of a callback.
#[derive(Clone, Debug)]
pub struct CallbackProxy {
    proxy: Proxy,
}

impl CallbackProxy {
    pub fn new(handle: RemoteHandle) -> Result<Self> {
        Ok(Self::with_contract(handle, Arc::new(callback_contract()?)))
    }

    pub(crate) fn with_contract(handle: RemoteHandle, contract: Arc<InterfaceContract>) -> Self {
        Self { proxy: Proxy::new(handle, contract) }
    }

    pub fn handle(&self) -> &RemoteHandle {
        self.proxy.handle()
    }

    pub async fn deliver(&self, message: &str) -> transact::Result<()> {
        self.proxy.invoke(DELIVER, &[Value::from(message)]).await?;
        Ok(())
    }
}
