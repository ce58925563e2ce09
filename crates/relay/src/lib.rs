//! # Relay
//!
//! A command service and its callback interface, built on `bindrun`.
//!
//! ```text
//! Client ──sendCommand / registerCallback──▶ ServiceHost ──▶ CommandHandler
//!    ▲                                            │
//!    └──────────────── deliver ◀──────────────────┘
//! ```
//!
//! - `relay.IRemoteService`: `sendCommand(string)`, `registerCallback(handle)`,
//!   `unregisterCallback(handle)`.
//! - `relay.IRemoteCallback`: `deliver(string)`.
//!
//! Commands and notifications are plain strings; `protocol` gives them types.

pub mod callback;
pub mod callbacks;
pub mod client;
pub mod error;
pub mod host;
pub mod protocol;
pub mod service;

pub use callback::CallbackProxy;
pub use callback::NoopCallback;
pub use callback::RemoteCallback;
pub use callback::callback_dispatcher;
pub use callbacks::CallbackList;
pub use callbacks::Delivery;
pub use client::Client;
pub use client::ConnectionState;
pub use client::MessageHandler;
pub use error::Error;
pub use error::Result;
pub use host::CommandHandler;
pub use host::ServiceHost;
pub use protocol::Command;
pub use protocol::PlaybackStatus;
pub use protocol::Response;
pub use service::NoopService;
pub use service::RemoteService;
pub use service::ServiceProxy;
pub use service::service_dispatcher;
