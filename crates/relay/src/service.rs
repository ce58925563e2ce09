//! The command interface: `relay.IRemoteService`.

use std::sync::Arc;

use bindrun::Call;
use bindrun::Dispatcher;
use bindrun::Proxy;
use bindrun::Registry;
use bindrun::RemoteHandle;
use transact::InterfaceContract;
use transact::InterfaceDescriptor;
use transact::TransactionId;
use transact::Value;
use transact::ValueType;

use crate::error::Result;

pub const SERVICE_DESCRIPTOR: &str = "relay.IRemoteService";

pub const SEND_COMMAND: TransactionId = TransactionId::ordinal(0);
pub const REGISTER_CALLBACK: TransactionId = TransactionId::ordinal(1);
pub const UNREGISTER_CALLBACK: TransactionId = TransactionId::ordinal(2);

pub fn service_contract() -> Result<InterfaceContract> {
    let contract = InterfaceContract::builder(SERVICE_DESCRIPTOR)
        .method_with_failures("sendCommand", vec![ValueType::String], ValueType::Void, &["Invalid"])
        .method("registerCallback", vec![ValueType::Handle], ValueType::Void)
        .method("unregisterCallback", vec![ValueType::Handle], ValueType::Void)
        .build()?;
    Ok(contract)
}

/// Accepts commands and callback registrations.
///
/// Every method has a no-op default.
#[async_trait::async_trait]
pub trait RemoteService: Send + Sync + 'static {
    async fn send_command(&self, _command: &str) -> transact::Result<()> {
        Ok(())
    }

    async fn register_callback(&self, _callback: RemoteHandle) -> transact::Result<()> {
        Ok(())
    }

    /// Unregistering a callback that was never registered is not an error.
    async fn unregister_callback(&self, _callback: RemoteHandle) -> transact::Result<()> {
        Ok(())
    }
}

/// Service that accepts every call and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopService;

impl RemoteService for NoopService {}

/// Binds a `RemoteService` implementation to a dispatcher.
pub fn service_dispatcher(imp: Arc<dyn RemoteService>, registry: Arc<Registry>) -> Result<Dispatcher> {
    let (send, register, unregister) = (imp.clone(), imp.clone(), imp);

    let dispatcher = Dispatcher::builder(Arc::new(service_contract()?), registry)
        .route("sendCommand", move |call| send_command(send.clone(), call))
        .route("registerCallback", move |call| register_callback(register.clone(), call))
        .route("unregisterCallback", move |call| unregister_callback(unregister.clone(), call))
        .build()?;
    Ok(dispatcher)
}

async fn send_command(imp: Arc<dyn RemoteService>, call: Call) -> transact::Result<Value> {
    imp.send_command(call.str(0)?).await?;
    Ok(Value::Void)
}

async fn register_callback(imp: Arc<dyn RemoteService>, call: Call) -> transact::Result<Value> {
    imp.register_callback(call.handle(0)?).await?;
    Ok(Value::Void)
}

async fn unregister_callback(imp: Arc<dyn RemoteService>, call: Call) -> transact::Result<Value> {
    imp.unregister_callback(call.handle(0)?).await?;
    Ok(Value::Void)
}

/// Typed caller-side view of a service.
#[derive(Clone, Debug)]
pub struct ServiceProxy {
    proxy: Proxy,
}

impl ServiceProxy {
    pub fn new(handle: RemoteHandle) -> Result<Self> {
        Ok(Self::with_contract(handle, Arc::new(service_contract()?)))
    }

    pub(crate) fn with_contract(handle: RemoteHandle, contract: Arc<InterfaceContract>) -> Self {
        Self { proxy: Proxy::new(handle, contract) }
    }

    pub fn handle(&self) -> &RemoteHandle {
        self.proxy.handle()
    }

    pub async fn send_command(&self, command: &str) -> transact::Result<()> {
        self.proxy.invoke(SEND_COMMAND, &[Value::from(command)]).await?;
        Ok(())
    }

    /// Passes `callback` as a registry token.
    pub async fn register_callback(&self, callback: &RemoteHandle) -> transact::Result<()> {
        self.proxy.invoke(REGISTER_CALLBACK, &[Value::Handle(callback.id())]).await?;
        Ok(())
    }

    pub async fn unregister_callback(&self, callback: &RemoteHandle) -> transact::Result<()> {
        self.proxy.invoke(UNREGISTER_CALLBACK, &[Value::Handle(callback.id())]).await?;
        Ok(())
    }

    pub async fn describe(&self) -> transact::Result<InterfaceDescriptor> {
        self.proxy.describe().await
    }
}
