//! # Bindrun
//!
//! The moving parts of a transaction: handles and the registry that mints
//! them, the dispatcher that serves transactions, the proxy that issues
//! them, and the transports in between.
//!
//! ## Architecture
//!
//! ```text
//! Proxy ──request──▶ RemoteHandle ──▶ Capability::Local  ──▶ Dispatcher
//!                                 └─▶ Capability::Remote ──▶ dyn Transport ──▶ ... ──▶ Dispatcher
//! ```
//!
//! Handles passed as arguments travel as registry tokens. The dispatcher
//! resolves them through its registry before the handler runs. Between two
//! registries, `Loopback::bridge` rewrites tokens on the way in and out.

pub mod config;
pub mod dispatch;
pub mod handle;
pub mod loopback;
pub mod proxy;
pub mod registry;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use dispatch::BindError;
pub use dispatch::Call;
pub use dispatch::Dispatcher;
pub use dispatch::DispatcherBuilder;
pub use dispatch::Handler;
pub use handle::Capability;
pub use handle::HandleId;
pub use handle::RemoteHandle;
pub use loopback::Loopback;
pub use proxy::Proxy;
pub use registry::Registry;
pub use transport::Transport;
