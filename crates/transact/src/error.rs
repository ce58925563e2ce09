//! # Error Definitions
//!
//! The taxonomy of everything that can go wrong with a single transaction.
//! Every failure is scoped to the call that produced it.

use crate::contract::TransactionId;

/// A failure raised by a remote implementation.
///
/// Only the kind and the message cross the boundary; the original context
/// stays with the process that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }

    /// An argument was rejected by the implementation.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new("Invalid", message)
    }

    /// The implementation is in a state where the call cannot proceed.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new("IllegalState", message)
    }

    /// The operation is not provided by this implementation.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new("Unsupported", message)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Failures of a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer was truncated, carried the wrong types, or broke the framing.
    MalformedTransaction(String),
    /// The addressed interface is not the one the receiver implements.
    DescriptorMismatch { expected: String, found: String },
    /// The receiver does not know this transaction id (version skew).
    UnknownTransaction { descriptor: String, id: TransactionId },
    /// A handle token has no live registration on the receiving side.
    UnknownReference(u64),
    /// The reply had a shape this side does not recognize.
    ProtocolError(String),
    /// The remote implementation raised a failure.
    Application(Failure),
    /// The peer is unreachable or the transport gave up on the call.
    TransportClosed(String),
}

impl Error {
    /// Stable tag used to carry this error inside a failure reply.
    pub(crate) fn as_tag(&self) -> &'static str {
        match self {
            Self::MalformedTransaction(_) => "MalformedTransaction",
            Self::DescriptorMismatch { .. } => "DescriptorMismatch",
            Self::UnknownTransaction { .. } => "UnknownTransaction",
            Self::UnknownReference(_) => "UnknownReference",
            Self::ProtocolError(_) => "ProtocolError",
            Self::Application(_) => "Application",
            Self::TransportClosed(_) => "TransportClosed",
        }
    }

    /// Shorthand for an application failure.
    pub fn application(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application(Failure::new(kind, message))
    }

    /// Returns the application failure, if this is one.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Application(failure) => Some(failure),
            _ => None,
        }
    }

    /// Turns any error into an application failure, keeping its tag as the
    /// failure kind.
    pub fn into_failure(self) -> Failure {
        match self {
            Self::Application(failure) => failure,
            other => Failure::new(other.as_tag(), other.to_string()),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedTransaction(msg) => write!(f, "malformed transaction: {}", msg),
            Self::DescriptorMismatch { expected, found } => {
                write!(f, "descriptor mismatch: expected '{}', found '{}'", expected, found)
            }
            Self::UnknownTransaction { descriptor, id } => {
                write!(f, "unknown transaction {} on '{}'", id, descriptor)
            }
            Self::UnknownReference(token) => write!(f, "unknown reference: handle-{}", token),
            Self::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            Self::Application(failure) => write!(f, "remote failure: {}", failure),
            Self::TransportClosed(msg) => write!(f, "transport closed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<parcel::Error> for Error {
    fn from(e: parcel::Error) -> Self {
        Self::MalformedTransaction(e.to_string())
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Application(failure)
    }
}

/// A specialized Result type for transaction operations.
pub type Result<T> = std::result::Result<T, Error>;
