//! Runtime limits shared by proxies and dispatchers.

use tracing::warn;
use transact::Codec;

/// Default upper bound on an encoded request.
pub const DEFAULT_MAX_TRANSACTION_BYTES: usize = 1024 * 1024;

/// Environment variable overriding `max_transaction_bytes`.
pub const ENV_MAX_TRANSACTION_BYTES: &str = "BINDRUN_MAX_TRANSACTION_BYTES";
/// Environment variable overriding `max_depth`.
pub const ENV_MAX_DEPTH: &str = "BINDRUN_MAX_DEPTH";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Requests larger than this are rejected before they are sent.
    pub max_transaction_bytes: usize,
    /// Maximum nesting of list values.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_transaction_bytes: DEFAULT_MAX_TRANSACTION_BYTES,
            max_depth: transact::codec::MAX_DEPTH,
        }
    }
}

impl Config {
    pub fn with_max_transaction_bytes(mut self, bytes: usize) -> Self {
        self.max_transaction_bytes = bytes;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Reads overrides from the environment, keeping defaults for anything
    /// missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_transaction_bytes: read_env(ENV_MAX_TRANSACTION_BYTES, defaults.max_transaction_bytes),
            max_depth: read_env(ENV_MAX_DEPTH, defaults.max_depth),
        }
    }

    pub fn codec(&self) -> Codec {
        Codec::new(self.max_depth)
    }
}

fn read_env(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => parse_limit(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_limit(name: &str, raw: &str, default: usize) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(var = name, value = raw, default, "ignoring invalid limit");
            default
        }
    }
}
