//! # Transport Abstraction
//!
//! A minimal, async interface for moving transactions between endpoints.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about values or contracts.
//!   It moves an opaque request buffer and hands back an opaque reply buffer.
//! - **Request-Response**: "send bytes, await bytes". Retry, timeouts and
//!   routing belong to whoever builds on top of this.
//! - **Ownership Transfer**: The request is moved into the transport for the
//!   duration of the call.

use std::fmt;
use std::sync::Arc;

use transact::InterfaceDescriptor;
use transact::TransactionId;

use crate::dispatch::Dispatcher;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the channel was dropped.
    Closed(String),
    /// The transaction was abandoned before a reply arrived.
    Cancelled,
    /// The transport rejected the request size.
    PayloadTooLarge { size: usize, limit: usize },
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(msg) => write!(f, "channel closed: {}", msg),
            Self::Cancelled => write!(f, "transaction cancelled"),
            Self::PayloadTooLarge { size, limit } => {
                write!(f, "payload of {} bytes exceeds the {} byte limit", size, limit)
            }
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Every transport failure reaches the caller as `TransportClosed`.
impl From<Error> for transact::Error {
    fn from(e: Error) -> Self {
        transact::Error::TransportClosed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to deliver a transaction and receive its reply.
///
/// This trait is object safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a request and waits for the reply.
    ///
    /// # Invariants
    /// - Must return `Ok(bytes)` with the raw reply on success. An empty
    ///   reply means the far side completed without answering.
    /// - Must return `Err` if delivery fails or the call is abandoned.
    /// - Must not interpret the request content.
    async fn send(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        request: Vec<u8>,
    ) -> Result<Vec<u8>>;

    /// The dispatcher this transport delivers into, if it lives in this
    /// process. Registries use it to bring such handles back home.
    fn local_dispatcher(&self) -> Option<Arc<Dispatcher>> {
        None
    }
}
