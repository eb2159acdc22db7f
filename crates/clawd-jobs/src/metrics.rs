//! Prometheus metrics for job queue monitoring.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names for the job queue.
pub mod names {
    /// Total jobs pushed.
    pub const JOBS_PUSHED_TOTAL: &str = "clawd_jobs_pushed_total";
    /// Total jobs moved to processing.
    pub const JOBS_POPPED_TOTAL: &str = "clawd_jobs_popped_total";
    /// Total jobs completed.
    pub const JOBS_COMPLETED_TOTAL: &str = "clawd_jobs_completed_total";
    /// Total jobs moved to the failed list.
    pub const JOBS_FAILED_TOTAL: &str = "clawd_jobs_failed_total";
    /// Total jobs returned from processing to pending by an operator.
    pub const JOBS_REQUEUED_TOTAL: &str = "clawd_jobs_requeued_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "clawd_jobs_pending";
    /// Current jobs in processing.
    pub const JOBS_PROCESSING: &str = "clawd_jobs_processing";
    /// Current size of the failed list.
    pub const JOBS_FAILED: &str = "clawd_jobs_failed";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Job counters
    describe_counter!(names::JOBS_PUSHED_TOTAL, "Total number of jobs pushed");
    describe_counter!(
        names::JOBS_POPPED_TOTAL,
        "Total number of jobs claimed for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs moved to the failed list"
    );
    describe_counter!(
        names::JOBS_REQUEUED_TOTAL,
        "Total number of jobs returned from processing to pending"
    );

    // Queue gauges
    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_PROCESSING, "Current number of jobs in processing");
    describe_gauge!(names::JOBS_FAILED, "Current size of the failed list");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job pushed.
    pub fn job_pushed(queue: &str) {
        counter!(names::JOBS_PUSHED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a job claimed.
    pub fn job_popped(queue: &str) {
        counter!(names::JOBS_POPPED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(queue: &str) {
        counter!(names::JOBS_COMPLETED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a job failed.
    pub fn job_failed(queue: &str) {
        counter!(names::JOBS_FAILED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a job requeued.
    pub fn job_requeued(queue: &str) {
        counter!(names::JOBS_REQUEUED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Update queue depth gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_queue_depths(queue: &str, pending: u64, processing: u64, failed: u64) {
        gauge!(names::JOBS_PENDING, "queue" => queue.to_string()).set(pending as f64);
        gauge!(names::JOBS_PROCESSING, "queue" => queue.to_string()).set(processing as f64);
        gauge!(names::JOBS_FAILED, "queue" => queue.to_string()).set(failed as f64);
    }
}
