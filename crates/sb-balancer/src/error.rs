use std::{io, time::Duration};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the balancer and by the backends it delegates to.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Strategy name not one of `random`, `round-robin`, `consistent-hashing`.
    #[error("unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("invalid filter {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// The refreshed pool was empty (no providers, or the filter dropped everything).
    #[error("no backends available in group {group}")]
    NoBackends { group: String },

    #[error("pool refresh: {0}")]
    Pool(#[from] PoolError),

    /// Free-form failure reported by a backend adapter.
    #[error("backend {backend}: {msg}")]
    Backend { backend: String, msg: String },

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub fn backend(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            msg: msg.into(),
        }
    }

    pub fn no_backends(group: impl Into<String>) -> Self {
        Self::NoBackends {
            group: group.into(),
        }
    }
}

/// Failure of one backend pool refresh.
///
/// Cloned to every caller that waited on the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("provider {provider}: {msg}")]
    Provider { provider: String, msg: String },

    #[error("timeout after {0:?}")]
    Timeout(Duration),
}
