//! Unified error type for the coordination layer.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Clawd.
///
/// Components built on the store (cache, rate limiter, job queue) do not
/// surface these errors to their callers for expected failure modes; they log
/// them and degrade. The error type is what the store backends and the
/// bootstrap path return.
#[derive(Error, Debug)]
pub enum ClawdError {
    // ============ Store Errors ============
    /// The store rejected or failed a command.
    #[error("Store error: {0}")]
    Store(String),

    /// The store could not be reached.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// A store round trip did not finish in time.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The store is disabled by configuration.
    #[error("Store is disabled")]
    Disabled,

    // ============ Encoding Errors ============
    /// A value could not be encoded or decoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ============ Setup Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClawdError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Store(_) => "STORE_ERROR",
            Self::Connection(_) => "STORE_UNREACHABLE",
            Self::Timeout(_) => "STORE_TIMEOUT",
            Self::Disabled => "STORE_DISABLED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a store error.
    #[must_use]
    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::Store(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// True when the store itself is down, unreachable or switched off.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Disabled
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for ClawdError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            Self::Connection(err.to_string())
        } else {
            Self::Store(err.to_string())
        }
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for ClawdError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        match err {
            deadpool_redis::PoolError::Backend(e) => Self::from(e),
            deadpool_redis::PoolError::Timeout(kind) => {
                Self::Timeout(format!("connection pool {kind:?} timeout"))
            }
            other => Self::Connection(other.to_string()),
        }
    }
}
