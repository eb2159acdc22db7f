//! # Clawd Core
//!
//! Core types shared by every crate of the Clawd coordination layer:
//! the unified error type, result aliases, the injectable clock and
//! logging/telemetry initialization.

pub mod clock;
pub mod error;
pub mod result;
pub mod telemetry;

pub use clock::*;
pub use error::*;
pub use result::*;
