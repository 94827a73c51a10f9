//! Task substrate for handler jobs.
//!
//! The router hands jobs to a `TaskScheduler` and returns immediately. The
//! production scheduler is `JobQueue`, a bounded channel drained by the
//! supervised workers of a `WorkerPool`. Failed jobs are retried inside the
//! worker according to the pool's `RetryPolicy`.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use surveyhook_core::WebhookError;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, WorkerError},
    registry::WebhookJob,
    retry::{RetryContext, RetryDecision, RetryPolicy},
};

/// Accepts jobs for asynchronous execution.
///
/// `schedule` must not wait for the job to run.
pub trait TaskScheduler: Send + Sync + fmt::Debug {
    /// Enqueues a job.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::SchedulingFailed` if the job cannot be accepted.
    fn schedule(&self, job: Box<dyn WebhookJob>) -> std::result::Result<(), WebhookError>;
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Capacity of the job queue. Scheduling fails once it is full.
    pub queue_capacity: usize,

    /// Retry policy for failing jobs.
    pub retry_policy: RetryPolicy,

    /// Maximum time to wait for workers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    active_workers: AtomicUsize,
    scheduled: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of worker pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Workers currently running.
    pub active_workers: usize,
    /// Jobs accepted by the queue.
    pub scheduled: u64,
    /// Jobs refused because the queue was full or closed.
    pub rejected: u64,
    /// Jobs that eventually succeeded.
    pub completed: u64,
    /// Failed runs that were retried.
    pub retried: u64,
    /// Jobs that exhausted their retries or were abandoned at shutdown.
    pub failed: u64,
}

impl WorkerStats {
    fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            active_workers: self.active_workers.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

type JobSender = mpsc::Sender<Box<dyn WebhookJob>>;
type JobReceiver = mpsc::Receiver<Box<dyn WebhookJob>>;

/// Bounded queue feeding a `WorkerPool`.
#[derive(Clone)]
pub struct JobQueue {
    sender: JobSender,
    stats: Arc<WorkerStats>,
    cancellation_token: CancellationToken,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.sender.max_capacity())
            .field("available", &self.sender.capacity())
            .finish()
    }
}

impl TaskScheduler for JobQueue {
    fn schedule(&self, job: Box<dyn WebhookJob>) -> std::result::Result<(), WebhookError> {
        let handler = job.name().to_string();

        if self.cancellation_token.is_cancelled() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(WebhookError::SchedulingFailed {
                handler,
                reason: "worker pool is shutting down".to_string(),
            });
        }

        match self.sender.try_send(job) {
            Ok(()) => {
                self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(error) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                let reason = match error {
                    TrySendError::Full(_) => "job queue is full",
                    TrySendError::Closed(_) => "job queue is closed",
                };
                Err(WebhookError::SchedulingFailed { handler, reason: reason.to_string() })
            },
        }
    }
}

/// Supervised workers draining the job queue.
pub struct WorkerPool {
    config: WorkerConfig,
    sender: JobSender,
    receiver: Arc<Mutex<JobReceiver>>,
    stats: Arc<WorkerStats>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool. No worker runs until `spawn_workers` is called, but
    /// the queue accepts jobs immediately.
    pub fn new(config: WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            config,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            stats: Arc::new(WorkerStats::default()),
            cancellation_token: CancellationToken::new(),
            worker_handles: Vec::new(),
        }
    }

    /// Returns a scheduler handle feeding this pool.
    pub fn queue(&self) -> JobQueue {
        JobQueue {
            sender: self.sender.clone(),
            stats: self.stats.clone(),
            cancellation_token: self.cancellation_token.clone(),
        }
    }

    /// Spawns the configured number of workers.
    pub fn spawn_workers(&mut self) {
        info!(worker_count = self.config.worker_count, "spawning handler workers");

        for worker_id in 0..self.config.worker_count {
            let worker = Worker {
                id: worker_id,
                receiver: self.receiver.clone(),
                retry_policy: self.config.retry_policy.clone(),
                stats: self.stats.clone(),
                cancellation_token: self.cancellation_token.clone(),
            };

            self.stats.active_workers.fetch_add(1, Ordering::Relaxed);
            let stats = self.stats.clone();
            let handle = tokio::spawn(async move {
                debug!(worker_id, "handler worker starting");
                worker.run().await;
                stats.active_workers.fetch_sub(1, Ordering::Relaxed);
                debug!(worker_id, "handler worker stopped");
            });

            self.worker_handles.push(handle);
        }
    }

    /// Returns current counters.
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true if any worker is still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|handle| !handle.is_finished())
    }

    /// Stops accepting jobs, lets workers drain what is already queued and
    /// waits for them up to the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if workers are still running when the
    /// timeout expires, or `WorkerPanic` for the first worker that panicked.
    pub async fn shutdown_graceful(mut self) -> Result<()> {
        let timeout = self.config.shutdown_timeout;
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let join_all = async move {
            let mut first_panic = None;
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    error!(worker_id, error = %join_error, "worker task panicked during shutdown");
                    first_panic.get_or_insert(WorkerError::WorkerPanic {
                        worker_id,
                        error: join_error.to_string(),
                    });
                }
            }
            first_panic
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(None) => {
                info!(stats = ?self.stats.snapshot(), "worker pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic)) => Err(panic),
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some jobs may still be running"
                );
                Err(WorkerError::ShutdownTimeout { timeout })
            },
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|handle| !handle.is_finished()).count();

        if active > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_workers = active,
                "worker pool dropped without graceful shutdown, cancelling workers"
            );
            self.cancellation_token.cancel();
        }
    }
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<JobReceiver>>,
    retry_policy: RetryPolicy,
    stats: Arc<WorkerStats>,
    cancellation_token: CancellationToken,
}

impl Worker {
    async fn run(self) {
        while let Some(job) = self.next_job().await {
            self.execute(job).await;
        }
    }

    /// Queued jobs win over cancellation so shutdown drains the queue.
    async fn next_job(&self) -> Option<Box<dyn WebhookJob>> {
        let mut receiver = self.receiver.lock().await;

        tokio::select! {
            biased;
            job = receiver.recv() => job,
            () = self.cancellation_token.cancelled() => None,
        }
    }

    async fn execute(&self, job: Box<dyn WebhookJob>) {
        let delivery_id = job.record().id;
        let mut attempt = 1;

        loop {
            let error = match job.run().await {
                Ok(()) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        worker_id = self.id,
                        handler = job.name(),
                        %delivery_id,
                        attempt,
                        "job completed"
                    );
                    return;
                },
                Err(error) => error,
            };

            let context = RetryContext::new(attempt, Utc::now(), self.retry_policy.clone());
            match context.decide_retry() {
                RetryDecision::Retry { delay, .. } => {
                    warn!(
                        worker_id = self.id,
                        handler = job.name(),
                        %delivery_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "job failed, retrying"
                    );
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = self.cancellation_token.cancelled() => {
                            warn!(
                                worker_id = self.id,
                                handler = job.name(),
                                %delivery_id,
                                "abandoning job retry during shutdown"
                            );
                            self.stats.failed.fetch_add(1, Ordering::Relaxed);
                            return;
                        },
                    }

                    attempt += 1;
                },
                RetryDecision::GiveUp { reason } => {
                    error!(
                        worker_id = self.id,
                        handler = job.name(),
                        %delivery_id,
                        attempt,
                        error = %error,
                        reason = %reason,
                        "job failed permanently"
                    );
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use serde_json::json;
    use surveyhook_core::{DeliveryId, DeliveryRecord};

    use super::*;

    #[derive(Debug)]
    struct FlakyJob {
        record: DeliveryRecord,
        failures_left: AtomicU32,
        runs: Arc<AtomicU32>,
    }

    impl FlakyJob {
        fn boxed(failures: u32, runs: Arc<AtomicU32>) -> Box<dyn WebhookJob> {
            Box::new(Self {
                record: DeliveryRecord::new(DeliveryId(1), "survey-monkey", json!({})),
                failures_left: AtomicU32::new(failures),
                runs,
            })
        }
    }

    #[async_trait::async_trait]
    impl WebhookJob for FlakyJob {
        fn name(&self) -> &str {
            "flaky"
        }

        fn record(&self) -> &DeliveryRecord {
            &self.record
        }

        async fn run(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("transient failure");
            }
            Ok(())
        }
    }

    fn fast_config(worker_count: usize, queue_capacity: usize) -> WorkerConfig {
        WorkerConfig {
            worker_count,
            queue_capacity,
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter_factor: 0.0,
                ..RetryPolicy::default()
            },
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn queued_jobs_run_before_shutdown_completes() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut pool = WorkerPool::new(fast_config(2, 16));
        let queue = pool.queue();

        for _ in 0..5 {
            queue.schedule(FlakyJob::boxed(0, runs.clone())).unwrap();
        }
        pool.spawn_workers();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = pool.stats();
        pool.shutdown_graceful().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert_eq!(stats.scheduled, 5);
        assert_eq!(stats.completed, 5);
    }

    #[tokio::test]
    async fn failing_job_is_retried_until_success() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut pool = WorkerPool::new(fast_config(1, 4));
        pool.spawn_workers();

        pool.queue().schedule(FlakyJob::boxed(2, runs.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = pool.stats();
        pool.shutdown_graceful().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn job_gives_up_after_max_attempts() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut pool = WorkerPool::new(fast_config(1, 4));
        pool.spawn_workers();

        pool.queue().schedule(FlakyJob::boxed(10, runs.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = pool.stats();
        pool.shutdown_graceful().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_job() {
        let runs = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(fast_config(1, 1));
        let queue = pool.queue();

        queue.schedule(FlakyJob::boxed(0, runs.clone())).unwrap();
        let error = queue.schedule(FlakyJob::boxed(0, runs)).unwrap_err();

        assert!(matches!(
            error,
            WebhookError::SchedulingFailed { ref reason, .. } if reason == "job queue is full"
        ));
        assert_eq!(pool.stats().rejected, 1);
    }

    #[tokio::test]
    async fn scheduling_after_shutdown_fails() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut pool = WorkerPool::new(fast_config(1, 4));
        let queue = pool.queue();
        pool.spawn_workers();
        pool.shutdown_graceful().await.unwrap();

        let error = queue.schedule(FlakyJob::boxed(0, runs)).unwrap_err();

        assert!(matches!(error, WebhookError::SchedulingFailed { .. }));
    }

    #[tokio::test]
    async fn spawn_tracks_active_workers() {
        let mut pool = WorkerPool::new(fast_config(3, 4));
        assert!(!pool.has_active_workers());

        pool.spawn_workers();

        assert_eq!(pool.stats().active_workers, 3);
        assert!(pool.has_active_workers());
        pool.shutdown_graceful().await.unwrap();
    }
}
