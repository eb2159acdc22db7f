//! Result type aliases for Clawd.

use crate::ClawdError;

/// A specialized `Result` type for Clawd operations.
pub type ClawdResult<T> = Result<T, ClawdError>;
