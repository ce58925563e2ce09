//! # Service Host
//!
//! A ready-made `RemoteService`: tracks connected clients, answers health
//! checks, and hands every other command to a `CommandHandler`.
//!
//! ## Behavior
//!
//! - `PING` is answered by broadcasting `PONG` and never reaches the handler.
//! - A new registration fires `on_client_connected` and broadcasts
//!   `CONNECTION|connected`.
//! - A client leaving, explicitly or because its endpoint is gone, fires
//!   `on_client_disconnected`.

use std::sync::Arc;

use bindrun::Dispatcher;
use bindrun::Registry;
use bindrun::RemoteHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::callbacks::CallbackList;
use crate::error::Result;
use crate::protocol::Command;
use crate::protocol::Response;
use crate::service::RemoteService;
use crate::service::service_dispatcher;

/// Application logic behind a `ServiceHost`.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync + Sized + 'static {
    /// Handles every command except `PING`. Use `host` to notify clients.
    async fn on_command(&self, host: &ServiceHost<Self>, command: &str) -> transact::Result<()>;

    fn on_client_connected(&self, _clients: usize) {}

    fn on_client_disconnected(&self, _clients: usize) {}
}

pub struct ServiceHost<H> {
    handler: H,
    callbacks: CallbackList,
}

impl<H: CommandHandler> ServiceHost<H> {
    pub fn new(handler: H) -> Result<Self> {
        Ok(Self { handler, callbacks: CallbackList::new()? })
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn callbacks(&self) -> &CallbackList {
        &self.callbacks
    }

    pub fn client_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Builds the dispatcher that serves this host.
    pub fn dispatcher(self: &Arc<Self>, registry: Arc<Registry>) -> Result<Dispatcher> {
        service_dispatcher(self.clone(), registry)
    }

    /// Sends `message` to every client. Returns how many accepted it.
    pub async fn notify_all(&self, message: &str) -> usize {
        debug!(clients = self.client_count(), message, "notifying clients");
        let delivery = self.callbacks.broadcast(message).await;

        for handle in &delivery.dropped {
            info!(handle = %handle, clients = self.client_count(), "client lost");
            self.handler.on_client_disconnected(self.client_count());
        }
        delivery.delivered
    }

    /// Forgets every client.
    pub fn shutdown(&self) {
        self.callbacks.clear();
        info!("service host shut down");
    }
}

#[async_trait::async_trait]
impl<H: CommandHandler> RemoteService for ServiceHost<H> {
    async fn send_command(&self, command: &str) -> transact::Result<()> {
        debug!(command, "command received");

        if command == Command::Ping.to_string() {
            self.notify_all(&Response::Pong.to_string()).await;
            return Ok(());
        }
        self.handler.on_command(self, command).await
    }

    async fn register_callback(&self, callback: RemoteHandle) -> transact::Result<()> {
        if !self.callbacks.register(callback.clone()) {
            warn!(handle = %callback, "callback already registered");
            return Ok(());
        }

        let clients = self.client_count();
        info!(handle = %callback, clients, "client connected");
        self.handler.on_client_connected(clients);
        self.notify_all(&Response::Connection { connected: true }.to_string()).await;
        Ok(())
    }

    async fn unregister_callback(&self, callback: RemoteHandle) -> transact::Result<()> {
        if self.callbacks.unregister(&callback) {
            let clients = self.client_count();
            info!(handle = %callback, clients, "client disconnected");
            self.handler.on_client_disconnected(clients);
        }
        Ok(())
    }
}

impl<H> std::fmt::Debug for ServiceHost<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost").field("callbacks", &self.callbacks).finish()
    }
}
