//! Tests for the dispatcher, proxy and registry over local, loopback and mock transports.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;
use transact::Error;
use transact::Failure;
use transact::InterfaceContract;
use transact::InterfaceDescriptor;
use transact::RequestEncoder;
use transact::TransactionId;
use transact::Value;
use transact::ValueType;

use crate::config::Config;
use crate::dispatch::BindError;
use crate::dispatch::Call;
use crate::dispatch::Dispatcher;
use crate::handle::HandleId;
use crate::handle::RemoteHandle;
use crate::loopback::Loopback;
use crate::proxy::Proxy;
use crate::registry::Registry;
use crate::telemetry;
use crate::transport;
use crate::transport::Transport;

const SERVICE: &str = "test.IRemoteService";
const CALLBACK: &str = "test.IRemoteCallback";

const SEND_COMMAND: TransactionId = TransactionId::ordinal(0);
const REGISTER_CALLBACK: TransactionId = TransactionId::ordinal(1);
const UNREGISTER_CALLBACK: TransactionId = TransactionId::ordinal(2);
const ECHO: TransactionId = TransactionId::ordinal(3);

// ============================================================================
//  FIXTURES
// ============================================================================

fn service_contract(descriptor: &str) -> Arc<InterfaceContract> {
    Arc::new(
        InterfaceContract::builder(descriptor)
            .method_with_failures("sendCommand", vec![ValueType::String], ValueType::Void, &["Invalid"])
            .method("registerCallback", vec![ValueType::Handle], ValueType::Void)
            .method("unregisterCallback", vec![ValueType::Handle], ValueType::Void)
            .method("echo", vec![ValueType::String], ValueType::String)
            .build()
            .unwrap(),
    )
}

fn callback_contract() -> Arc<InterfaceContract> {
    Arc::new(
        InterfaceContract::builder(CALLBACK)
            .method("deliver", vec![ValueType::String], ValueType::Void)
            .build()
            .unwrap(),
    )
}

async fn send_command(
    call: Call,
    commands: Arc<Mutex<Vec<String>>>,
    invoked: Arc<AtomicUsize>,
) -> transact::Result<Value> {
    invoked.fetch_add(1, Ordering::SeqCst);
    let command = call.str(0)?.to_string();
    if command == "bad" {
        return Err(Failure::invalid("bad command").into());
    }
    commands.lock().unwrap().push(command);
    Ok(Value::Void)
}

async fn register_callback(
    call: Call,
    callbacks: Arc<Mutex<Vec<RemoteHandle>>>,
    invoked: Arc<AtomicUsize>,
) -> transact::Result<Value> {
    invoked.fetch_add(1, Ordering::SeqCst);
    let handle = call.handle(0)?;
    let mut callbacks = callbacks.lock().unwrap();
    if !callbacks.contains(&handle) {
        callbacks.push(handle);
    }
    Ok(Value::Void)
}

async fn unregister_callback(
    call: Call,
    callbacks: Arc<Mutex<Vec<RemoteHandle>>>,
    invoked: Arc<AtomicUsize>,
) -> transact::Result<Value> {
    invoked.fetch_add(1, Ordering::SeqCst);
    let handle = call.handle(0)?;
    callbacks.lock().unwrap().retain(|h| h != &handle);
    Ok(Value::Void)
}

async fn echo(call: Call, invoked: Arc<AtomicUsize>) -> transact::Result<Value> {
    invoked.fetch_add(1, Ordering::SeqCst);
    let text = call.str(0)?.to_string();
    let delay = rand::thread_rng().gen_range(0..5);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Ok(Value::String(text))
}

async fn void(_call: Call) -> transact::Result<Value> {
    Ok(Value::Void)
}

async fn hello(call: Call) -> transact::Result<Value> {
    Ok(Value::String(format!("hello {}", call.str(0)?)))
}

async fn count(_call: Call) -> transact::Result<Value> {
    Ok(Value::I32(3))
}

async fn record(call: Call, inbox: Arc<Mutex<Vec<String>>>) -> transact::Result<Value> {
    inbox.lock().unwrap().push(call.str(0)?.to_string());
    Ok(Value::Void)
}

async fn reflect(call: Call) -> transact::Result<Value> {
    Ok(Value::Handle(call.handle(0)?.id()))
}

async fn downstream_gone(_call: Call) -> transact::Result<Value> {
    Err(Error::TransportClosed("downstream gone".into()))
}

/// A service whose handlers record everything they see.
struct Service {
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
    commands: Arc<Mutex<Vec<String>>>,
    callbacks: Arc<Mutex<Vec<RemoteHandle>>>,
    invoked: Arc<AtomicUsize>,
}

impl Service {
    fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    fn with_registry(registry: Arc<Registry>) -> Self {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let callbacks = Arc::new(Mutex::new(Vec::<RemoteHandle>::new()));
        let invoked = Arc::new(AtomicUsize::new(0));

        let (c, i) = (commands.clone(), invoked.clone());
        let (reg_cbs, reg_i) = (callbacks.clone(), invoked.clone());
        let (unreg_cbs, unreg_i) = (callbacks.clone(), invoked.clone());
        let echo_i = invoked.clone();

        let dispatcher = Dispatcher::builder(service_contract(SERVICE), registry.clone())
            .route("sendCommand", move |call| send_command(call, c.clone(), i.clone()))
            .route("registerCallback", move |call| register_callback(call, reg_cbs.clone(), reg_i.clone()))
            .route("unregisterCallback", move |call| {
                unregister_callback(call, unreg_cbs.clone(), unreg_i.clone())
            })
            .route("echo", move |call| echo(call, echo_i.clone()))
            .build()
            .unwrap();

        Self { registry, dispatcher: Arc::new(dispatcher), commands, callbacks, invoked }
    }

    fn local_proxy(&self) -> Proxy {
        let handle = self.registry.register_local(self.dispatcher.clone());
        Proxy::new(handle, service_contract(SERVICE))
    }

    fn invoked(&self) -> usize {
        self.invoked.load(Ordering::SeqCst)
    }
}

fn callback_endpoint(registry: &Arc<Registry>) -> RemoteHandle {
    let dispatcher = Dispatcher::builder(callback_contract(), registry.clone())
        .route("deliver", void)
        .build()
        .unwrap();
    registry.register_local(Arc::new(dispatcher))
}

/// Transport that serves every call with a closure.
struct FnTransport<F>
where
    F: Fn(TransactionId, Vec<u8>) -> transport::Result<Vec<u8>> + Send + Sync + 'static,
{
    handler: F,
    calls: AtomicUsize,
}

impl<F> FnTransport<F>
where
    F: Fn(TransactionId, Vec<u8>) -> transport::Result<Vec<u8>> + Send + Sync + 'static,
{
    fn new(handler: F) -> Arc<Self> {
        Arc::new(Self { handler, calls: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(TransactionId, Vec<u8>) -> transport::Result<Vec<u8>> + Send + Sync + 'static,
{
    async fn send(
        &self,
        _descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: Vec<u8>,
    ) -> transport::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(id, request)
    }
}

fn remote_proxy(transport: Arc<dyn Transport>) -> Proxy {
    let registry = Registry::new();
    Proxy::new(registry.register_remote(transport), service_contract(SERVICE))
}

// ============================================================================
//  1. CALL SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_send_command_ping() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await?;

    assert_eq!(result, Value::Void);
    assert_eq!(*service.commands.lock().unwrap(), vec!["ping".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_send_command_over_loopback() -> anyhow::Result<()> {
    let service = Service::new();
    let loopback = Loopback::spawn(service.dispatcher.clone());
    let handle = service.registry.register_remote(loopback.clone());
    let proxy = Proxy::new(handle, service_contract(SERVICE));

    proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await?;
    proxy.invoke_named("sendCommand", &[Value::from("PLAY|GENRE|jazz")]).await?;

    assert_eq!(
        *service.commands.lock().unwrap(),
        vec!["ping".to_string(), "PLAY|GENRE|jazz".to_string()]
    );
    loopback.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_application_failure_propagates() {
    let service = Service::new();
    let proxy = service.local_proxy();

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("bad")]).await;

    assert_eq!(result, Err(Error::Application(Failure::new("Invalid", "bad command"))));
    assert!(service.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_unregister_unregister() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();
    let callback = callback_endpoint(&service.registry);
    let token = Value::Handle(callback.id());

    proxy.invoke(REGISTER_CALLBACK, &[token.clone()]).await?;
    assert_eq!(*service.callbacks.lock().unwrap(), vec![callback.clone()]);

    proxy.invoke(UNREGISTER_CALLBACK, &[token.clone()]).await?;
    assert!(service.callbacks.lock().unwrap().is_empty());

    // Unregistering again is a no-op, not an error.
    proxy.invoke(UNREGISTER_CALLBACK, &[token]).await?;
    assert!(service.callbacks.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_register_twice_keeps_one_entry() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();
    let first = callback_endpoint(&service.registry);

    // The same dispatcher registered again yields the same canonical handle.
    let again = service.registry.register(first.capability().clone());
    assert_eq!(again, first);

    proxy.invoke(REGISTER_CALLBACK, &[Value::Handle(first.id())]).await?;
    proxy.invoke(REGISTER_CALLBACK, &[Value::Handle(again.id())]).await?;
    assert_eq!(service.callbacks.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_describe() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();

    let descriptor = proxy.describe().await?;

    assert_eq!(descriptor, InterfaceDescriptor::new(SERVICE));
    assert_eq!(service.invoked(), 0);
    Ok(())
}

#[tokio::test]
async fn test_randomized_echo_roundtrip() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();
    let mut rng = rand::thread_rng();

    for _ in 0..32 {
        let len = rng.gen_range(0..256);
        let text: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
        let reply = proxy.invoke(ECHO, &[Value::from(text.as_str())]).await?;
        assert_eq!(reply.as_str(), Some(text.as_str()));
    }
    Ok(())
}

// ============================================================================
//  2. REJECTIONS
// ============================================================================

#[tokio::test]
async fn test_unknown_transaction_from_newer_caller() {
    let service = Service::new();
    let handle = service.registry.register_local(service.dispatcher.clone());
    let newer = Arc::new(
        InterfaceContract::builder(SERVICE)
            .method("sendCommand", vec![ValueType::String], ValueType::Void)
            .method("registerCallback", vec![ValueType::Handle], ValueType::Void)
            .method("unregisterCallback", vec![ValueType::Handle], ValueType::Void)
            .method("echo", vec![ValueType::String], ValueType::String)
            .method("reset", vec![], ValueType::Void)
            .build()
            .unwrap(),
    );
    let proxy = Proxy::new(handle, newer);

    let result = proxy.invoke(TransactionId::ordinal(4), &[]).await;

    assert_eq!(
        result,
        Err(Error::UnknownTransaction { descriptor: SERVICE.into(), id: TransactionId::ordinal(4) })
    );
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_unknown_transaction_in_local_contract() {
    let service = Service::new();
    let proxy = service.local_proxy();

    let result = proxy.invoke(TransactionId(999), &[]).await;

    assert!(matches!(result, Err(Error::UnknownTransaction { .. })));
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_descriptor_mismatch_never_invokes() {
    let service = Service::new();
    let handle = service.registry.register_local(service.dispatcher.clone());
    let proxy = Proxy::new(handle, service_contract("test.ISomethingElse"));

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await;

    match result {
        Err(Error::DescriptorMismatch { expected, found }) => {
            assert_eq!(expected, SERVICE);
            assert_eq!(found, "test.ISomethingElse");
        }
        res => panic!("Expected DescriptorMismatch, got {:?}", res),
    }
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_dispatch_checks_leading_token() {
    let service = Service::new();
    let codec = transact::Codec::default();
    let other = InterfaceDescriptor::new("test.ISomethingElse");
    let request = RequestEncoder::new(&other, &[Value::from("ping")]).into_bytes(&codec).unwrap();

    // The transport claims the right interface but the buffer names another.
    let result = service.dispatcher.dispatch(&InterfaceDescriptor::new(SERVICE), SEND_COMMAND, &request).await;

    assert!(matches!(result, Err(Error::DescriptorMismatch { .. })));
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_descriptor_checked_before_decoding() {
    let service = Service::new();
    let other = InterfaceDescriptor::new("test.ISomethingElse");
    let mismatch: transact::Result<Vec<u8>> = Err(Error::DescriptorMismatch {
        expected: SERVICE.into(),
        found: "test.ISomethingElse".into(),
    });

    assert_eq!(service.dispatcher.dispatch(&other, SEND_COMMAND, &[]).await, mismatch);
    assert_eq!(service.dispatcher.dispatch(&other, SEND_COMMAND, &[0x10, 0xff]).await, mismatch);

    let reply = service.dispatcher.on_transact(&other, SEND_COMMAND, &[]).await;
    let result = transact::decode_reply(&reply, &other, &ValueType::Void, &transact::Codec::default());
    assert!(matches!(result, Err(Error::DescriptorMismatch { .. })), "got {:?}", result);
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_malformed_request_never_invokes() {
    let service = Service::new();
    let descriptor = InterfaceDescriptor::new(SERVICE);
    let codec = transact::Codec::default();

    let result = service.dispatcher.dispatch(&descriptor, SEND_COMMAND, &[0x10, 0xff]).await;
    assert!(matches!(result, Err(Error::MalformedTransaction(_))));

    let wrong_type = RequestEncoder::new(&descriptor, &[Value::I32(7)]).into_bytes(&codec).unwrap();
    let result = service.dispatcher.dispatch(&descriptor, SEND_COMMAND, &wrong_type).await;
    assert!(matches!(result, Err(Error::MalformedTransaction(_))));

    let too_many = RequestEncoder::new(&descriptor, &[Value::from("a"), Value::from("b")])
        .into_bytes(&codec)
        .unwrap();
    let result = service.dispatcher.dispatch(&descriptor, SEND_COMMAND, &too_many).await;
    assert!(matches!(result, Err(Error::MalformedTransaction(_))));

    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_on_transact_encodes_rejections() {
    let service = Service::new();
    let descriptor = InterfaceDescriptor::new(SERVICE);
    let codec = transact::Codec::default();

    let reply = service.dispatcher.on_transact(&descriptor, SEND_COMMAND, &[]).await;
    let result = transact::decode_reply(&reply, &descriptor, &ValueType::Void, &codec);

    assert!(matches!(result, Err(Error::MalformedTransaction(_))), "got {:?}", result);
}

#[tokio::test]
async fn test_unknown_reference_never_invokes() {
    let service = Service::new();
    let proxy = service.local_proxy();

    let result = proxy.invoke(REGISTER_CALLBACK, &[Value::Handle(HandleId(4242))]).await;

    assert_eq!(result, Err(Error::UnknownReference(4242)));
    assert_eq!(service.invoked(), 0);
}

#[tokio::test]
async fn test_wrong_argument_type_is_not_sent() {
    let transport = FnTransport::new(|_, _| Ok(Vec::new()));
    let proxy = remote_proxy(transport.clone());

    let result = proxy.invoke(SEND_COMMAND, &[Value::I64(1)]).await;

    assert!(matches!(result, Err(Error::MalformedTransaction(_))));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversize_request_is_not_sent() {
    let transport = FnTransport::new(|_, _| Ok(Vec::new()));
    let registry = Registry::new();
    let handle = registry.register_remote(transport.clone());
    let config = Config::default().with_max_transaction_bytes(64);
    let proxy = Proxy::with_config(handle, service_contract(SERVICE), config);

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("x".repeat(128))]).await;

    match result {
        Err(Error::MalformedTransaction(msg)) => assert!(msg.contains("exceeds")),
        res => panic!("Expected MalformedTransaction, got {:?}", res),
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handler_returning_wrong_type() {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::builder(callback_contract(), registry.clone())
        .route("deliver", count)
        .build()
        .unwrap();
    let handle = registry.register_local(Arc::new(dispatcher));
    let proxy = Proxy::new(handle, callback_contract());

    let result = proxy.invoke(TransactionId::ordinal(0), &[Value::from("hi")]).await;

    assert!(matches!(result, Err(Error::MalformedTransaction(_))), "got {:?}", result);
}

#[tokio::test]
async fn test_handler_core_errors_are_its_own() {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::builder(callback_contract(), registry.clone())
        .route("deliver", downstream_gone)
        .build()
        .unwrap();
    let proxy = Proxy::new(registry.register_local(Arc::new(dispatcher)), callback_contract());

    let result = proxy.invoke(TransactionId::ordinal(0), &[Value::from("hi")]).await;

    // The handler's own call failed; this call reached it and completed.
    assert_eq!(
        result,
        Err(Error::Application(Failure::new(
            "TransportClosed",
            "transport closed: downstream gone"
        )))
    );
}

// ============================================================================
//  3. TRANSPORT FAILURES
// ============================================================================

#[tokio::test]
async fn test_transport_errors_become_transport_closed() {
    let failures = vec![
        transport::Error::Closed("peer went away".into()),
        transport::Error::Cancelled,
        transport::Error::PayloadTooLarge { size: 10, limit: 1 },
        transport::Error::Io("broken pipe".into()),
    ];

    for failure in failures {
        let returned = failure.clone();
        let proxy = remote_proxy(FnTransport::new(move |_, _| Err(returned.clone())));
        let result = proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await;
        assert_eq!(result, Err(Error::TransportClosed(failure.to_string())));
    }
}

#[tokio::test]
async fn test_empty_reply_is_transport_closed() {
    let proxy = remote_proxy(FnTransport::new(|_, _| Ok(Vec::new())));

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await;

    assert!(matches!(result, Err(Error::TransportClosed(_))));
}

#[tokio::test]
async fn test_garbage_reply_is_rejected() {
    let proxy = remote_proxy(FnTransport::new(|_, _| Ok(vec![0xEE, 0x00, 0x01])));

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("ping")]).await;

    assert!(matches!(result, Err(Error::MalformedTransaction(_))), "got {:?}", result);
}

#[tokio::test]
async fn test_loopback_shutdown_closes_calls() -> anyhow::Result<()> {
    let service = Service::new();
    let loopback = Loopback::spawn(service.dispatcher.clone());
    let proxy = Proxy::new(service.registry.register_remote(loopback.clone()), service_contract(SERVICE));

    proxy.invoke(SEND_COMMAND, &[Value::from("before")]).await?;
    loopback.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = proxy.invoke(SEND_COMMAND, &[Value::from("after")]).await;
    assert!(matches!(result, Err(Error::TransportClosed(_))), "got {:?}", result);
    assert_eq!(*service.commands.lock().unwrap(), vec!["before".to_string()]);
    Ok(())
}

// ============================================================================
//  4. CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_do_not_cross() -> anyhow::Result<()> {
    let service = Service::new();
    let loopback = Loopback::spawn(service.dispatcher.clone());
    let proxy = Proxy::new(service.registry.register_remote(loopback.clone()), service_contract(SERVICE));

    let mut tasks = Vec::new();
    for n in 0..64 {
        let proxy = proxy.clone();
        tasks.push(tokio::spawn(async move {
            let text = format!("message-{}", n);
            let reply = proxy.invoke(ECHO, &[Value::from(text.as_str())]).await;
            (text, reply)
        }));
    }

    for task in tasks {
        let (sent, reply) = task.await?;
        assert_eq!(reply?, Value::String(sent));
    }
    assert_eq!(service.invoked(), 64);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_send_commands() -> anyhow::Result<()> {
    let service = Service::new();
    let proxy = service.local_proxy();

    let left = [Value::from("left")];
    let right = [Value::from("right")];
    let (a, b) = tokio::join!(
        proxy.invoke(SEND_COMMAND, &left),
        proxy.invoke(SEND_COMMAND, &right),
    );

    assert_eq!(a?, Value::Void);
    assert_eq!(b?, Value::Void);
    let mut seen = service.commands.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["left".to_string(), "right".to_string()]);
    Ok(())
}

// ============================================================================
//  5. REGISTRY
// ============================================================================

#[test]
fn test_register_is_idempotent() {
    let registry = Arc::new(Registry::new());
    let transport: Arc<dyn Transport> = FnTransport::new(|_, _| Ok(Vec::new()));

    let a = registry.register_remote(transport.clone());
    let b = registry.register_remote(transport.clone());

    assert_eq!(a, b);
    assert_eq!(a.id(), b.id());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_distinct_endpoints_get_distinct_handles() {
    let registry = Registry::new();
    let a = registry.register_remote(FnTransport::new(|_, _| Ok(Vec::new())));
    let b = registry.register_remote(FnTransport::new(|_, _| Ok(Vec::new())));

    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_unregister_then_resolve_fails() {
    let registry = Registry::new();
    let handle = registry.register_remote(FnTransport::new(|_, _| Ok(Vec::new())));

    assert!(registry.contains(handle.id()));
    assert_eq!(registry.resolve(handle.id()).unwrap(), handle);

    assert!(registry.unregister(&handle));
    assert_eq!(registry.resolve(handle.id()), Err(Error::UnknownReference(handle.id().0)));
    assert!(!registry.unregister(&handle));
    assert!(registry.is_empty());
}

#[test]
fn test_reregister_after_unregister_mints_new_token() {
    let registry = Registry::new();
    let transport: Arc<dyn Transport> = FnTransport::new(|_, _| Ok(Vec::new()));

    let first = registry.register_remote(transport.clone());
    registry.unregister(&first);
    let second = registry.register_remote(transport);

    assert_ne!(first.id(), second.id());
    assert!(!registry.contains(first.id()));
}

// ============================================================================
//  6. LAYERING AND BINDING
// ============================================================================

#[tokio::test]
async fn test_fallback_serves_unknown_ids() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new());

    let base_contract = Arc::new(
        InterfaceContract::builder("test.IBase")
            .method("hello", vec![ValueType::String], ValueType::String)
            .build()?,
    );
    let base = Dispatcher::builder(base_contract, registry.clone())
        .route("hello", hello)
        .build()?;

    let derived_contract = Arc::new(
        InterfaceContract::builder("test.IDerived")
            .base(TransactionId::ordinal(1))
            .method("count", vec![], ValueType::I32)
            .build()?,
    );
    let derived = Dispatcher::builder(derived_contract, registry.clone())
        .route("count", count)
        .build()?
        .with_fallback(Arc::new(base));

    let caller_contract = Arc::new(
        InterfaceContract::builder("test.IDerived")
            .method("hello", vec![ValueType::String], ValueType::String)
            .method("count", vec![], ValueType::I32)
            .build()?,
    );
    let proxy = Proxy::new(registry.register_local(Arc::new(derived)), caller_contract);

    assert_eq!(proxy.invoke(TransactionId::ordinal(1), &[]).await?, Value::I32(3));
    assert_eq!(
        proxy.invoke(TransactionId::ordinal(0), &[Value::from("world")]).await?,
        Value::String("hello world".into())
    );
    Ok(())
}

#[test]
fn test_bind_rejects_unknown_method() {
    let result = Dispatcher::builder(callback_contract(), Arc::new(Registry::new()))
        .route("deliver", void)
        .route("shout", void)
        .build();

    assert_eq!(
        result.unwrap_err(),
        BindError::UnknownMethod { descriptor: CALLBACK.into(), method: "shout".into() }
    );
}

#[test]
fn test_bind_rejects_duplicate_route() {
    let result = Dispatcher::builder(callback_contract(), Arc::new(Registry::new()))
        .route("deliver", void)
        .route("deliver", count)
        .build();

    assert_eq!(
        result.unwrap_err(),
        BindError::DuplicateRoute { descriptor: CALLBACK.into(), method: "deliver".into() }
    );
}

#[tokio::test]
async fn test_zero_based_contract_dispatches() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new());
    let contract = Arc::new(
        InterfaceContract::builder("test.IGreeter")
            .base(TransactionId(0))
            .method("hello", vec![ValueType::String], ValueType::String)
            .build()?,
    );
    let dispatcher = Arc::new(Dispatcher::builder(contract.clone(), registry.clone()).route("hello", hello).build()?);

    let local = Proxy::new(registry.register_local(dispatcher.clone()), contract.clone());
    assert_eq!(
        local.invoke(TransactionId(0), &[Value::from("zero")]).await?,
        Value::String("hello zero".into())
    );

    let loopback = Loopback::spawn(dispatcher);
    let remote = Proxy::new(registry.register_remote(loopback.clone()), contract);
    assert_eq!(
        remote.invoke_named("hello", &[Value::from("loop")]).await?,
        Value::String("hello loop".into())
    );
    loopback.shutdown();
    Ok(())
}

#[test]
fn test_bind_rejects_unbound_method() {
    let result = Dispatcher::builder(service_contract(SERVICE), Arc::new(Registry::new()))
        .route("sendCommand", void)
        .build();

    assert!(matches!(result, Err(BindError::Unbound { .. })));
}

#[test]
fn test_telemetry_installs_once() {
    telemetry::init();
    assert!(!telemetry::init());
}

// ============================================================================
//  7. CROSS-REGISTRY HANDLES
// ============================================================================

#[tokio::test]
async fn test_callbacks_cross_bridged_registries() -> anyhow::Result<()> {
    let service = Service::new();
    // Offset the service's tokens so they cannot line up with the client's.
    callback_endpoint(&service.registry);
    let client = Arc::new(Registry::new());

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let inbox = delivered.clone();
    let callback = Dispatcher::builder(callback_contract(), client.clone())
        .route("deliver", move |call| record(call, inbox.clone()))
        .build()?;
    let callback = client.register_local(Arc::new(callback));

    let bridge = Loopback::bridge(service.dispatcher.clone(), &client);
    let proxy = Proxy::new(client.register_remote(bridge.clone()), service_contract(SERVICE));
    let token = Value::Handle(callback.id());

    proxy.invoke(REGISTER_CALLBACK, &[token.clone()]).await?;
    let stored = service.callbacks.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    let stored = stored[0].clone();
    assert_ne!(stored.id(), callback.id());
    assert_eq!(service.registry.resolve(stored.id())?, stored);

    // The service reaches the client through its own token.
    let back = Proxy::new(stored.clone(), callback_contract());
    back.invoke(TransactionId::ordinal(0), &[Value::from("PONG")]).await?;
    assert_eq!(*delivered.lock().unwrap(), vec!["PONG".to_string()]);

    proxy.invoke(REGISTER_CALLBACK, &[token.clone()]).await?;
    assert_eq!(*service.callbacks.lock().unwrap(), vec![stored]);

    proxy.invoke(UNREGISTER_CALLBACK, &[token]).await?;
    assert!(service.callbacks.lock().unwrap().is_empty());
    bridge.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_bridge_rejects_tokens_the_caller_never_minted() {
    let service = Service::new();
    let client = Arc::new(Registry::new());
    let bridge = Loopback::bridge(service.dispatcher.clone(), &client);
    let proxy = Proxy::new(client.register_remote(bridge.clone()), service_contract(SERVICE));

    let result = proxy.invoke(REGISTER_CALLBACK, &[Value::Handle(HandleId(77))]).await;

    assert_eq!(result, Err(Error::UnknownReference(77)));
    assert_eq!(service.invoked(), 0);
    bridge.shutdown();
}

#[tokio::test]
async fn test_bridge_translates_returned_handles() -> anyhow::Result<()> {
    let registry = Arc::new(Registry::new());
    let client = Arc::new(Registry::new());
    let callback = callback_endpoint(&client);

    let contract = Arc::new(
        InterfaceContract::builder("test.IMirror")
            .method("reflect", vec![ValueType::Handle], ValueType::Handle)
            .build()?,
    );
    let mirror = Dispatcher::builder(contract.clone(), registry.clone())
        .route("reflect", reflect)
        .build()?;

    let bridge = Loopback::bridge(Arc::new(mirror), &client);
    let proxy = Proxy::new(client.register_remote(bridge.clone()), contract);

    // A handle that went out comes back as the caller's own token.
    let reply = proxy.invoke(TransactionId::ordinal(0), &[Value::Handle(callback.id())]).await?;
    assert_eq!(reply, Value::Handle(callback.id()));
    bridge.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_adopt_brings_handles_home() {
    let home = Arc::new(Registry::new());
    let away = Arc::new(Registry::new());
    let local = callback_endpoint(&home);

    let imported = away.adopt(&local);
    assert!(imported.local().is_none());
    assert_eq!(away.adopt(&local), imported);
    assert_eq!(home.adopt(&imported), local);

    // A transport served elsewhere is shared as is.
    let foreign = home.register_remote(FnTransport::new(|_, _| Ok(Vec::new())));
    let shared = away.adopt(&foreign);
    assert_eq!(away.adopt(&foreign), shared);
    assert_eq!(away.len(), 2);

    assert!(away.unregister(&imported));
    assert_ne!(away.adopt(&local), imported);
}
