//! Clawd Jobs - reliable work handoff between worker processes
//!
//! A queue built on three lists in the shared store:
//! - `queue:<name>` holds pending jobs
//! - `queue:<name>:processing` holds claimed jobs until they are acknowledged
//! - `queue:<name>:failed` keeps failed jobs for inspection
//!
//! # Lifecycle
//!
//! ```text
//!  push ──▶ pending ──pop──▶ processing ──complete──▶ (removed)
//!                                │
//!                                ├──fail──▶ failed
//!                                │
//!                                └──requeue (operator)──▶ pending
//! ```
//!
//! # Example
//!
//! ```no_run
//! use clawd_jobs::JobQueue;
//! use clawd_store::StoreClient;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example(client: StoreClient) {
//! let queue = JobQueue::new(client, "sync_tasks");
//! queue.push(&json!({"task": "sync_garmin", "date": "2026-01-26"})).await;
//!
//! if let Some(job) = queue.pop(Duration::from_secs(5)).await {
//!     // ... do the work ...
//!     queue.complete(&job).await;
//! }
//! # }
//! ```

pub mod job;
pub mod metrics;
pub mod queue;

pub use job::{FailedJob, Job, QueueStats};
pub use self::metrics::{register_metrics, JobMetrics};
pub use queue::JobQueue;
