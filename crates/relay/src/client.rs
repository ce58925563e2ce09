//! # Client
//!
//! The caller side of a relay service: exposes its own callback, registers
//! it with the service, and tracks the connection from the messages that
//! come back.
//!
//! State and the last application message are published through
//! `tokio::sync::watch`, so any number of observers can follow them.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use bindrun::Registry;
use bindrun::RemoteHandle;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use transact::InterfaceContract;

use crate::callback::RemoteCallback;
use crate::callback::callback_dispatcher;
use crate::error::Result;
use crate::protocol::Command;
use crate::protocol::Response;
use crate::service::ServiceProxy;
use crate::service::service_contract;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application logic behind a `Client`.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called for every message that is not a connection update or `PONG`.
    async fn on_message(&self, message: &str);

    fn on_connection_changed(&self, _state: ConnectionState) {}
}

/// The client's callback endpoint.
struct Inbox<M> {
    handler: M,
    state: watch::Sender<ConnectionState>,
    messages: watch::Sender<String>,
}

impl<M: MessageHandler> Inbox<M> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "connection state changed");
        }
        self.handler.on_connection_changed(state);
    }

    fn set_message(&self, message: impl Into<String>) {
        self.messages.send_replace(message.into());
    }
}

#[async_trait::async_trait]
impl<M: MessageHandler> RemoteCallback for Inbox<M> {
    async fn deliver(&self, message: &str) -> transact::Result<()> {
        debug!(message, "message received");

        match message.parse::<Response>() {
            Ok(Response::Connection { connected: true }) => self.set_state(ConnectionState::Connected),
            Ok(Response::Connection { connected: false }) => self.set_state(ConnectionState::Disconnected),
            Ok(Response::Pong) => self.set_state(ConnectionState::Connected),
            _ => {
                self.set_message(message);
                self.handler.on_message(message).await;
            }
        }
        Ok(())
    }
}

pub struct Client<M> {
    inbox: Arc<Inbox<M>>,
    callback: RemoteHandle,
    contract: Arc<InterfaceContract>,
    service: Mutex<Option<ServiceProxy>>,
}

impl<M: MessageHandler> Client<M> {
    /// Creates a client and exposes its callback through `registry`.
    pub fn new(handler: M, registry: Arc<Registry>) -> Result<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (messages, _) = watch::channel(String::from("disconnected"));
        let inbox = Arc::new(Inbox { handler, state, messages });

        let dispatcher = callback_dispatcher(inbox.clone(), registry.clone())?;
        let callback = registry.register_local(Arc::new(dispatcher));

        Ok(Self {
            inbox,
            callback,
            contract: Arc::new(service_contract()?),
            service: Mutex::new(None),
        })
    }

    fn service(&self) -> MutexGuard<'_, Option<ServiceProxy>> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handler(&self) -> &M {
        &self.inbox.handler
    }

    /// The handle this client registers with services.
    pub fn callback(&self) -> &RemoteHandle {
        &self.callback
    }

    pub fn state(&self) -> ConnectionState {
        *self.inbox.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inbox.state.subscribe()
    }

    pub fn last_message(&self) -> String {
        self.inbox.messages.borrow().clone()
    }

    pub fn subscribe_messages(&self) -> watch::Receiver<String> {
        self.inbox.messages.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.service().is_some()
    }

    /// Registers this client's callback with `service`. A second call while
    /// connected does nothing.
    pub async fn connect(&self, service: RemoteHandle) -> transact::Result<()> {
        if self.is_connected() {
            debug!("already connected");
            return Ok(());
        }

        self.inbox.set_state(ConnectionState::Connecting);
        let proxy = ServiceProxy::with_contract(service, self.contract.clone());

        match proxy.register_callback(&self.callback).await {
            Ok(()) => {
                *self.service() = Some(proxy);
                self.inbox.set_message("connected");
                self.inbox.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.inbox.set_message(format!("error: {}", e));
                self.inbox.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    pub async fn send_command(&self, command: &str) -> transact::Result<()> {
        let proxy = self.service().clone();
        let Some(proxy) = proxy else {
            return Err(transact::Error::TransportClosed("client is not connected".into()));
        };

        debug!(command, "sending command");
        if let Err(e) = proxy.send_command(command).await {
            self.inbox.set_message(format!("error sending command: {}", e));
            self.inbox.set_state(ConnectionState::Error);
            return Err(e);
        }
        Ok(())
    }

    pub async fn send(&self, command: &Command) -> transact::Result<()> {
        self.send_command(&command.to_string()).await
    }

    pub async fn ping(&self) -> transact::Result<()> {
        self.send(&Command::Ping).await
    }

    /// Unregisters from the service. Does nothing if not connected.
    pub async fn disconnect(&self) -> transact::Result<()> {
        let proxy = self.service().take();
        let Some(proxy) = proxy else {
            debug!("already disconnected");
            return Ok(());
        };

        let result = proxy.unregister_callback(&self.callback).await;
        self.inbox.set_message("disconnected");
        self.inbox.set_state(ConnectionState::Disconnected);
        result
    }
}

impl<M> std::fmt::Debug for Client<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("callback", &self.callback)
            .field("state", &*self.inbox.state.borrow())
            .finish()
    }
}
