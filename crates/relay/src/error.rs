//! Errors raised while wiring the relay interfaces together.
//!
//! Failures of individual calls are `transact::Error`; these only occur when
//! a contract or a dispatcher is built.

use bindrun::BindError;
use transact::contract;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Contract(contract::Error),
    Bind(BindError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract(e) => write!(f, "invalid contract: {}", e),
            Self::Bind(e) => write!(f, "binding failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Contract(e) => Some(e),
            Self::Bind(e) => Some(e),
        }
    }
}

impl From<contract::Error> for Error {
    fn from(e: contract::Error) -> Self {
        Self::Contract(e)
    }
}

impl From<BindError> for Error {
    fn from(e: BindError) -> Self {
        Self::Bind(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
