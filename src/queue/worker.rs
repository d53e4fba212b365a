//! The single print worker.
//!
//! Pops jobs in order, dispatches them, and applies the per-job retry
//! policy: I/O failures are retried up to `max_retries` times, each after
//! `retry_base × 2^retry_count`, by re-enqueueing at the tail. Invariant
//! and cancellation errors are final.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::dispatch::Pipeline;
use super::fifo::JobQueue;
use super::job::PrintJob;
use super::stats::Stats;
use crate::error::PrintError;
use crate::supervisor::ConnectionSupervisor;

/// Told when a write shows the link is gone.
pub trait LinkMonitor: Send + Sync {
    fn link_lost(&self, reason: &str);
}

impl LinkMonitor for ConnectionSupervisor {
    fn link_lost(&self, reason: &str) {
        self.mark_disconnected(reason);
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub retry_base: Duration,
    pub pop_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry_base: Duration::from_secs(1),
            pop_timeout: Duration::from_secs(1),
        }
    }
}

pub struct PrintWorker {
    queue: Arc<JobQueue>,
    pipeline: Pipeline,
    stats: Arc<Stats>,
    monitor: Arc<dyn LinkMonitor>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl PrintWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        pipeline: Pipeline,
        stats: Arc<Stats>,
        monitor: Arc<dyn LinkMonitor>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            pipeline,
            stats,
            monitor,
            config,
            shutdown,
        }
    }

    /// Process jobs until the shutdown token fires. A job already taken is
    /// finished first.
    pub async fn run(mut self) {
        info!("print worker started");
        loop {
            let popped = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job = self.queue.pop(self.config.pop_timeout) => job,
            };
            let Some(mut job) = popped else {
                continue;
            };
            if self.shutdown.is_cancelled() {
                job.complete(Err(PrintError::Cancelled("service stopping".into())));
                break;
            }
            self.process(job).await;
        }
        info!("print worker stopped");
    }

    async fn process(&mut self, mut job: PrintJob) {
        let err = match self.pipeline.dispatch(&job).await {
            Ok(_) => {
                self.stats.job_succeeded();
                job.complete(Ok(()));
                return;
            }
            Err(e) => e,
        };

        let kind = err.kind();
        if kind.is_link_loss() {
            self.monitor.link_lost(err.reason());
        }

        if kind.is_retryable() && job.retry_count < job.max_retries {
            let wait = retry_wait(self.config.retry_base, job.retry_count);
            warn!(
                job_id = job.id,
                attempt = job.retry_count + 1,
                max = job.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "job failed, will retry"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    job.complete(Err(PrintError::Cancelled("service stopping".into())));
                    return;
                }
                _ = sleep(wait) => {}
            }
            job.retry_count += 1;
            self.stats.job_retried();
            self.queue.requeue(job);
        } else {
            error!(job_id = job.id, kind = job.kind.name(), error = %err, "job failed permanently");
            self.stats.job_failed();
            job.complete(Err(err));
        }
    }
}

/// `base × 2^retry_count`.
pub fn retry_wait(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(1 << retry_count.min(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ErrorKind;
    use crate::queue::job::JobKind;
    use crate::raster::Bitmap;
    use crate::render::LabelRenderer;
    use crate::settings::{Settings, SettingsStore};
    use crate::transport::{MockPort, PrinterLink};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct Losses(Mutex<Vec<String>>);

    impl LinkMonitor for Losses {
        fn link_lost(&self, reason: &str) {
            self.0.lock().unwrap().push(reason.to_string());
        }
    }

    struct Fixture {
        port: Arc<MockPort>,
        queue: Arc<JobQueue>,
        stats: Arc<Stats>,
        losses: Arc<Losses>,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(port: Arc<MockPort>) -> Fixture {
        let stats = Arc::new(Stats::new());
        let queue = Arc::new(JobQueue::new(stats.clone()));
        let link = Arc::new(PrinterLink::new(port.clone()).with_throttle(Duration::ZERO));
        let pipeline = Pipeline::new(
            link,
            Arc::new(SettingsStore::in_memory(Settings::default())),
            Arc::new(LabelRenderer),
            stats.clone(),
        );
        let losses = Arc::new(Losses::default());
        let token = CancellationToken::new();
        let worker = PrintWorker::new(
            queue.clone(),
            pipeline,
            stats.clone(),
            losses.clone(),
            WorkerConfig::default(),
            token.clone(),
        );
        let handle = tokio::spawn(worker.run());
        Fixture {
            port,
            queue,
            stats,
            losses,
            token,
            handle,
        }
    }

    fn image_job() -> (PrintJob, oneshot::Receiver<crate::error::Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let job = PrintJob::new(JobKind::Image(Bitmap::new(384, 2))).with_completion(tx);
        (job, rx)
    }

    #[test]
    fn test_retry_wait_doubles() {
        let base = Duration::from_secs(1);
        let waits: Vec<u64> = (0..4).map(|k| retry_wait(base, k).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_counts() {
        let f = start(Arc::new(MockPort::new()));
        let (job, rx) = image_job();
        f.queue.submit_job(job);
        rx.await.unwrap().unwrap();

        let snap = f.stats.snapshot();
        assert_eq!((snap.total_jobs, snap.successful_jobs, snap.failed_jobs), (1, 1, 0));
        f.token.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let port = Arc::new(MockPort::new());
        port.fail_all(Some(ErrorKind::IoTransient));
        let f = start(port);
        let (job, rx) = image_job();
        let started = tokio::time::Instant::now();
        f.queue.submit_job(job);

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoTransient);
        // 1 + 2 + 4 seconds of job-level backoff
        assert!(started.elapsed() >= Duration::from_secs(7));

        let snap = f.stats.snapshot();
        assert_eq!(snap.retried_jobs, 3);
        assert_eq!(snap.failed_jobs, 1);
        assert_eq!(snap.successful_jobs, 0);
        // the leading ESC @ fails once per dispatch
        assert_eq!(f.port.write_attempts(), 4);
        assert!(f.losses.0.lock().unwrap().is_empty());
        f.token.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invariant_is_not_retried() {
        let f = start(Arc::new(MockPort::new()));
        let (tx, rx) = oneshot::channel();
        let job = PrintJob::new(JobKind::Image(Bitmap::new(0, 4))).with_completion(tx);
        f.queue.submit_job(job);

        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Invariant);
        let snap = f.stats.snapshot();
        assert_eq!((snap.retried_jobs, snap.failed_jobs), (0, 1));
        assert!(f.port.writes().is_empty());
        f.token.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_text_fails_once() {
        let f = start(Arc::new(MockPort::new()));
        let (tx, rx) = oneshot::channel();
        let text = crate::queue::job::TextJob::new("A").font_size(200_000);
        f.queue
            .submit_job(PrintJob::new(JobKind::Text(text)).with_completion(tx));

        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Invariant);
        let snap = f.stats.snapshot();
        assert_eq!((snap.retried_jobs, snap.failed_jobs), (0, 1));
        assert!(f.port.writes().is_empty());
        f.token.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_reported_then_recovered() {
        let port = Arc::new(MockPort::new());
        port.fail_next(ErrorKind::IoFatal, 1);
        let f = start(port);
        let (job, rx) = image_job();
        f.queue.submit_job(job);

        rx.await.unwrap().unwrap();
        assert_eq!(f.losses.0.lock().unwrap().len(), 1);
        let snap = f.stats.snapshot();
        assert_eq!((snap.retried_jobs, snap.successful_jobs), (1, 1));
        f.token.cancel();
        f.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_exits_idle_worker() {
        let f = start(Arc::new(MockPort::new()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.token.cancel();
        f.handle.await.unwrap();
        assert_eq!(f.queue.len(), 0);
    }
}
