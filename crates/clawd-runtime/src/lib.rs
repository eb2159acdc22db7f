//! Clawd Runtime - process wiring for the coordination layer
//!
//! [`Coordinator`] loads configuration, opens the shared store client and
//! hands out caches, rate limiters and queues built on it. The [`ctl`] module
//! backs the `clawdctl` operations binary.

pub mod coordinator;
pub mod ctl;

pub use coordinator::{install_metrics_exporter, register_metrics, Coordinator};
