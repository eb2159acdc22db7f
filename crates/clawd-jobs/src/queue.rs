//! Reliable job queue.

use crate::job::{encode, failed_entry, FailedJob, Job, QueueStats};
use crate::metrics::JobMetrics;
use chrono::{DateTime, Utc};
use clawd_core::{system_clock, Clock};
use clawd_store::{StoreClient, StoreKeys};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A named FIFO queue with explicit acknowledgment.
///
/// Jobs live in exactly one of three lists:
///
/// - `queue:<name>`: pending, waiting to be claimed
/// - `queue:<name>:processing`: claimed by [`JobQueue::pop`], not yet acknowledged
/// - `queue:<name>:failed`: acknowledged with [`JobQueue::fail`]
///
/// Delivery is at-least-once. A consumer that crashes leaves its job in
/// processing; nothing moves it back automatically. [`JobQueue::requeue`] is
/// the operator's tool for that.
///
/// Jobs in processing are identified by their canonical JSON text, so two
/// identical payloads in flight at once are interchangeable on removal.
///
/// No operation returns an error: store failures are logged and reported as
/// `false`, `None`, empty lists or zero counts.
#[derive(Clone)]
pub struct JobQueue {
    client: StoreClient,
    name: String,
    pending_key: String,
    processing_key: String,
    failed_key: String,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    /// Creates a handle to the queue `name`.
    pub fn new(client: StoreClient, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            pending_key: StoreKeys::queue(&name),
            processing_key: StoreKeys::queue_processing(&name),
            failed_key: StoreKeys::queue_failed(&name),
            client,
            name,
            clock: system_clock(),
        }
    }

    /// Uses `clock` to timestamp failures.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a job to the pending list. Never blocks.
    ///
    /// Returns `false` if the job could not be encoded or stored; it is then
    /// not enqueued.
    pub async fn push<T: Serialize + ?Sized>(&self, job: &T) -> bool {
        let job = match serde_json::to_value(job) {
            Ok(job) => job,
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to encode job");
                return false;
            }
        };

        match self.client.list_push(&self.pending_key, &encode(&job)).await {
            Ok(()) => {
                info!(queue = %self.name, job = %job, "Job pushed");
                JobMetrics::job_pushed(&self.name);
                true
            }
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to push job");
                false
            }
        }
    }

    /// Claims the oldest pending job, moving it to processing in one step.
    ///
    /// A zero `timeout` returns immediately. Otherwise waits up to `timeout`
    /// for a job to arrive and returns `None` when it elapses.
    pub async fn pop(&self, timeout: Duration) -> Option<Job> {
        let raw = match self
            .client
            .list_move(&self.pending_key, &self.processing_key, timeout)
            .await
        {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(queue = %self.name, ?timeout, "No job available");
                return None;
            }
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to pop job");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(job) => {
                debug!(queue = %self.name, "Job claimed");
                JobMetrics::job_popped(&self.name);
                Some(job)
            }
            Err(e) => {
                // The entry stays in processing for inspection.
                error!(queue = %self.name, error = %e, raw = %raw, "Claimed job is not valid JSON");
                None
            }
        }
    }

    /// Acknowledges success, removing one occurrence of `job` from processing.
    ///
    /// Completing a job that is not in processing is not an error. Returns
    /// `false` only if the store could not be reached.
    pub async fn complete(&self, job: &Job) -> bool {
        match self.client.list_remove(&self.processing_key, &encode(job)).await {
            Ok(removed) => {
                if removed == 0 {
                    debug!(queue = %self.name, job = %job, "Completed job was not in processing");
                } else {
                    debug!(queue = %self.name, "Job completed");
                    JobMetrics::job_completed(&self.name);
                }
                true
            }
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to complete job");
                false
            }
        }
    }

    /// Acknowledges a terminal failure.
    ///
    /// Removes one occurrence of `job` from processing and records a copy with
    /// `error` and `failed_at` on the failed list, as one atomic step. This
    /// does not retry the job.
    pub async fn fail(&self, job: &Job, error: &str) -> bool {
        let entry = failed_entry(job, error, self.now());

        match self
            .client
            .list_remove_and_push(&self.processing_key, &encode(job), &self.failed_key, &encode(&entry))
            .await
        {
            Ok(removed) => {
                if removed == 0 {
                    warn!(queue = %self.name, job = %job, "Failed job was not in processing");
                }
                warn!(queue = %self.name, error = %error, "Job failed");
                JobMetrics::job_failed(&self.name);
                true
            }
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to mark job as failed");
                false
            }
        }
    }

    /// Moves one occurrence of `job` from processing back to pending, where it
    /// is the next job to be claimed.
    ///
    /// Returns `false` if the job was not in processing or the store could not
    /// be reached.
    pub async fn requeue(&self, job: &Job) -> bool {
        match self
            .client
            .list_reclaim(&self.processing_key, &self.pending_key, &encode(job))
            .await
        {
            Ok(true) => {
                info!(queue = %self.name, job = %job, "Job requeued");
                JobMetrics::job_requeued(&self.name);
                true
            }
            Ok(false) => {
                warn!(queue = %self.name, job = %job, "Requeued job was not in processing");
                false
            }
            Err(e) => {
                error!(queue = %self.name, error = %e, "Failed to requeue job");
                false
            }
        }
    }

    /// Pending jobs. Zero if the store cannot be reached.
    pub async fn size(&self) -> u64 {
        self.len(&self.pending_key).await
    }

    /// Jobs in processing. Zero if the store cannot be reached.
    pub async fn processing_count(&self) -> u64 {
        self.len(&self.processing_key).await
    }

    /// Entries on the failed list. Zero if the store cannot be reached.
    pub async fn failed_count(&self) -> u64 {
        self.len(&self.failed_key).await
    }

    /// Up to `limit` failed jobs, newest first.
    pub async fn failed_jobs(&self, limit: usize) -> Vec<FailedJob> {
        self.range(&self.failed_key, limit)
            .await
            .into_iter()
            .map(FailedJob::from_entry)
            .collect()
    }

    /// Up to `limit` jobs in processing, most recently claimed first.
    pub async fn processing_jobs(&self, limit: usize) -> Vec<Job> {
        self.range(&self.processing_key, limit).await
    }

    /// Current depths of all three lists. Also updates the depth gauges.
    pub async fn stats(&self) -> QueueStats {
        let stats = QueueStats {
            queue: self.name.clone(),
            pending: self.size().await,
            processing: self.processing_count().await,
            failed: self.failed_count().await,
        };
        JobMetrics::update_queue_depths(&self.name, stats.pending, stats.processing, stats.failed);
        stats
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now)
    }

    async fn len(&self, key: &str) -> u64 {
        match self.client.list_len(key).await {
            Ok(len) => len,
            Err(e) => {
                error!(queue = %self.name, key = %key, error = %e, "Failed to read queue length");
                0
            }
        }
    }

    async fn range(&self, key: &str, limit: usize) -> Vec<Job> {
        if limit == 0 {
            return Vec::new();
        }
        let stop = i64::try_from(limit).unwrap_or(i64::MAX) - 1;

        let raw = match self.client.list_range(key, 0, stop).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(queue = %self.name, key = %key, error = %e, "Failed to list jobs");
                return Vec::new();
            }
        };

        raw.iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(queue = %self.name, key = %key, error = %e, "Skipping undecodable entry");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::names;
    use clawd_core::{ClawdError, ManualClock};
    use clawd_store::MockStoreBackend;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    /// Records `clawd_jobs_completed_total` and drops everything else.
    #[derive(Default)]
    struct CompletedRecorder(Arc<AtomicU64>);

    impl Recorder for CompletedRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() == names::JOBS_COMPLETED_TOTAL {
                Counter::from_arc(self.0.clone())
            } else {
                Counter::noop()
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn queue(name: &str) -> JobQueue {
        JobQueue::new(StoreClient::memory(), name)
    }

    fn unreachable() -> StoreClient {
        let refused = || ClawdError::Connection("connection refused".to_string());
        let mut backend = MockStoreBackend::new();
        backend.expect_list_push().returning(move |_, _| Err(refused()));
        backend.expect_list_move().returning(move |_, _, _| Err(refused()));
        backend.expect_list_remove().returning(move |_, _| Err(refused()));
        backend
            .expect_list_remove_and_push()
            .returning(move |_, _, _, _| Err(refused()));
        backend.expect_list_reclaim().returning(move |_, _, _| Err(refused()));
        backend.expect_list_len().returning(move |_| Err(refused()));
        backend.expect_list_range().returning(move |_, _, _| Err(refused()));
        StoreClient::from_backend(Arc::new(backend), "mock")
    }

    #[tokio::test]
    async fn test_job_lifecycle_scenario() {
        let queue = queue("sync_tasks");
        let job = json!({"task": "sync", "date": "2026-01-26"});

        assert!(queue.push(&job).await);
        assert_eq!(queue.size().await, 1);

        let popped = queue.pop(Duration::ZERO).await.unwrap();
        assert_eq!(popped, job);
        assert_eq!(queue.size().await, 0);
        assert_eq!(queue.processing_count().await, 1);

        assert!(queue.complete(&popped).await);
        assert_eq!(queue.processing_count().await, 0);
    }

    #[tokio::test]
    async fn test_fifo_without_loss() {
        let queue = queue("fifo");
        let jobs: Vec<Job> = (1..=5).map(|i| json!({"task": "sync", "n": i})).collect();
        for job in &jobs {
            assert!(queue.push(job).await);
        }

        for (claimed, expected) in jobs.iter().enumerate() {
            let job = queue.pop(Duration::ZERO).await.unwrap();
            assert_eq!(&job, expected);

            let processing = queue.processing_jobs(10).await;
            assert!(processing.contains(&job));
            assert_eq!(processing.len(), claimed + 1);
            assert_eq!(queue.size().await, (jobs.len() - claimed - 1) as u64);
        }

        assert_eq!(queue.pop(Duration::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_push_accepts_typed_jobs() {
        #[derive(Serialize)]
        struct SyncTask<'a> {
            task: &'a str,
            date: &'a str,
        }

        let queue = queue("typed");
        assert!(queue.push(&SyncTask { task: "sync_garmin", date: "2026-01-26" }).await);

        let job = queue.pop(Duration::ZERO).await.unwrap();
        assert_eq!(job, json!({"task": "sync_garmin", "date": "2026-01-26"}));
        assert!(queue.complete(&job).await);
        assert_eq!(queue.processing_count().await, 0);
    }

    #[tokio::test]
    async fn test_complete_restores_processing_count() {
        let queue = queue("complete");
        queue.push(&json!({"n": 1})).await;
        queue.push(&json!({"n": 2})).await;

        let first = queue.pop(Duration::ZERO).await.unwrap();
        let before = queue.processing_count().await;
        let second = queue.pop(Duration::ZERO).await.unwrap();
        assert_eq!(queue.processing_count().await, before + 1);

        assert!(queue.complete(&second).await);
        assert_eq!(queue.processing_count().await, before);

        // Completing twice is harmless.
        assert!(queue.complete(&second).await);
        assert_eq!(queue.processing_count().await, before);
        assert!(queue.complete(&first).await);
    }

    #[tokio::test]
    async fn test_float_payloads_complete_and_fail() {
        let queue = queue("weights");
        let done = json!({"task": "sync", "weight": 2.663987731472464e-34});
        let broken = json!({"task": "sync", "weight": 0.10017300000000001});

        queue.push(&done).await;
        queue.push(&broken).await;

        let popped = queue.pop(Duration::ZERO).await.unwrap();
        assert_eq!(popped, done);
        assert!(queue.complete(&popped).await);
        assert_eq!(queue.processing_count().await, 0);

        let popped = queue.pop(Duration::ZERO).await.unwrap();
        assert!(queue.fail(&popped, "boom").await);
        assert_eq!(queue.processing_count().await, 0);
        assert_eq!(queue.failed_jobs(1).await[0].job, broken);
    }

    #[test]
    fn test_completed_counter_counts_removals_only() {
        let recorder = CompletedRecorder::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let queue = queue("counted");

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                queue.push(&json!({"n": 1})).await;
                let job = queue.pop(Duration::ZERO).await.unwrap();
                assert!(queue.complete(&job).await);
                assert!(queue.complete(&job).await);
                assert!(queue.complete(&json!({"n": 99})).await);
            })
        });

        assert_eq!(recorder.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fail_moves_job_to_failed_list() {
        let clock = ManualClock::default();
        let queue = queue("failing").with_clock(Arc::new(clock.clone()));
        let job = json!({"task": "sync", "date": "2026-01-26"});

        queue.push(&job).await;
        let popped = queue.pop(Duration::ZERO).await.unwrap();
        assert!(queue.fail(&popped, "boom").await);

        assert_eq!(queue.processing_count().await, 0);
        assert_eq!(queue.failed_count().await, 1);

        let failed = queue.failed_jobs(10).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job, job);
        assert_eq!(failed[0].error, "boom");
        assert_eq!(failed[0].failed_at.map(|at| at.timestamp_millis()), Some(clock.now_ms()));
    }

    #[tokio::test]
    async fn test_failed_jobs_newest_first_with_limit() {
        let queue = queue("failed_order");
        for n in 1..=3 {
            let job = json!({"n": n});
            queue.push(&job).await;
            let popped = queue.pop(Duration::ZERO).await.unwrap();
            queue.fail(&popped, &format!("error {n}")).await;
        }

        let failed = queue.failed_jobs(2).await;
        let errors: Vec<&str> = failed.iter().map(|f| f.error.as_str()).collect();
        assert_eq!(errors, vec!["error 3", "error 2"]);
        assert!(queue.failed_jobs(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_payloads_remove_one_occurrence() {
        let queue = queue("dupes");
        let job = json!({"task": "notify"});
        queue.push(&job).await;
        queue.push(&job).await;

        let a = queue.pop(Duration::ZERO).await.unwrap();
        let _b = queue.pop(Duration::ZERO).await.unwrap();
        assert_eq!(queue.processing_count().await, 2);

        queue.complete(&a).await;
        assert_eq!(queue.processing_count().await, 1);
    }

    #[tokio::test]
    async fn test_requeue_returns_job_to_front() {
        let queue = queue("requeue");
        queue.push(&json!({"n": 1})).await;
        queue.push(&json!({"n": 2})).await;

        let first = queue.pop(Duration::ZERO).await.unwrap();
        assert!(queue.requeue(&first).await);
        assert_eq!(queue.processing_count().await, 0);
        assert_eq!(queue.size().await, 2);

        assert_eq!(queue.pop(Duration::ZERO).await, Some(first.clone()));
        assert!(!queue.requeue(&json!({"n": 99})).await);
    }

    #[tokio::test]
    async fn test_stats() {
        let queue = queue("stats");
        for n in 0..3 {
            queue.push(&json!({"n": n})).await;
        }
        let job = queue.pop(Duration::ZERO).await.unwrap();
        let other = queue.pop(Duration::ZERO).await.unwrap();
        queue.fail(&other, "boom").await;

        let stats = queue.stats().await;
        assert_eq!(
            stats,
            QueueStats {
                queue: "stats".to_string(),
                pending: 1,
                processing: 1,
                failed: 1,
            }
        );
        assert!(queue.complete(&job).await);
    }

    #[tokio::test]
    async fn test_blocking_pop_times_out() {
        let queue = queue("empty");

        let started = Instant::now();
        let job = queue.pop(Duration::from_secs(1)).await;
        let elapsed = started.elapsed();

        assert!(job.is_none());
        assert!(elapsed >= Duration::from_millis(900), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "returned too late: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_blocking_pop_receives_late_push() {
        let queue = queue("late");
        let producer = queue.clone();

        let handle = tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.push(&json!({"task": "late"})).await;

        assert_eq!(handle.await.unwrap(), Some(json!({"task": "late"})));
        assert_eq!(producer.processing_count().await, 1);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let client = StoreClient::memory();
        let sync = JobQueue::new(client.clone(), "sync_tasks");
        let notify = JobQueue::new(client, "notifications");

        sync.push(&json!({"task": "sync"})).await;
        assert_eq!(notify.size().await, 0);
        assert_eq!(notify.pop(Duration::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_store_down_degrades() {
        let queue = JobQueue::new(unreachable(), "sync_tasks");
        let job = json!({"task": "sync"});

        assert!(!queue.push(&job).await);
        assert_eq!(queue.pop(Duration::ZERO).await, None);
        assert!(!queue.complete(&job).await);
        assert!(!queue.fail(&job, "boom").await);
        assert!(!queue.requeue(&job).await);
        assert_eq!(queue.size().await, 0);
        assert_eq!(queue.processing_count().await, 0);
        assert!(queue.failed_jobs(10).await.is_empty());
        assert_eq!(queue.stats().await.pending, 0);
    }

    #[tokio::test]
    async fn test_disabled_store_degrades() {
        let queue = JobQueue::new(StoreClient::disabled(), "notifications");
        assert!(!queue.push(&json!({"msg": "hi"})).await);
        assert_eq!(queue.pop(Duration::from_secs(1)).await, None);
    }
}
