//! Single-consumer FIFO shared between submitters and the worker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use super::job::{JobId, JobKind, JobSummary, PrintJob};
use super::stats::Stats;
use crate::error::PrintError;

pub struct JobQueue {
    jobs: Mutex<VecDeque<PrintJob>>,
    ready: Notify,
    stats: Arc<Stats>,
}

impl JobQueue {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PrintJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a new job of `kind`. Never blocks on the printer.
    pub fn submit(&self, kind: JobKind) -> JobId {
        self.submit_job(PrintJob::new(kind))
    }

    /// Enqueue a prepared job (e.g. one carrying a completion channel).
    pub fn submit_job(&self, job: PrintJob) -> JobId {
        let id = job.id;
        let kind = job.kind.name();
        let depth = {
            let mut jobs = self.lock();
            jobs.push_back(job);
            jobs.len()
        };
        self.stats.job_submitted();
        self.ready.notify_one();
        info!(job_id = id, kind, depth, "job queued");
        id
    }

    /// Put a retried job back at the tail.
    pub fn requeue(&self, job: PrintJob) {
        debug!(job_id = job.id, retry = job.retry_count, "job requeued");
        self.lock().push_back(job);
        self.ready.notify_one();
    }

    /// Take the oldest job, waiting up to `wait` for one to arrive.
    pub async fn pop(&self, wait: Duration) -> Option<PrintJob> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(job) = self.lock().pop_front() {
                return Some(job);
            }
            if timeout_at(deadline, self.ready.notified()).await.is_err() {
                return None;
            }
        }
    }

    /// Drop every pending job and return how many were removed. Waiters on
    /// dropped jobs see `Cancelled`. A job already taken by the worker is
    /// unaffected.
    pub fn clear(&self) -> usize {
        let drained: Vec<PrintJob> = self.lock().drain(..).collect();
        let count = drained.len();
        for mut job in drained {
            job.complete(Err(PrintError::Cancelled("queue cleared".into())));
        }
        if count > 0 {
            info!(count, "queue cleared");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<JobSummary> {
        self.lock().iter().map(PrintJob::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::queue::job::TextJob;
    use tokio::sync::oneshot;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(Stats::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let q = queue();
        let a = q.submit(JobKind::Init);
        let b = q.submit(JobKind::Text(TextJob::new("b")));
        let c = q.submit(JobKind::Init);
        assert_eq!(q.len(), 3);

        let order: Vec<JobId> = [
            q.pop(Duration::ZERO).await.unwrap().id,
            q.pop(Duration::ZERO).await.unwrap().id,
            q.pop(Duration::ZERO).await.unwrap().id,
        ]
        .into();
        assert_eq!(order, vec![a, b, c]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_when_empty() {
        let q = queue();
        let start = Instant::now();
        assert!(q.pop(Duration::from_secs(1)).await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wakes_on_submit() {
        let q = Arc::new(queue());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = q.submit(JobKind::Init);
        let job = waiter.await.unwrap().unwrap();
        assert_eq!(job.id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_goes_to_tail() {
        let q = queue();
        let a = q.submit(JobKind::Init);
        let b = q.submit(JobKind::Init);
        let mut first = q.pop(Duration::ZERO).await.unwrap();
        assert_eq!(first.id, a);
        first.retry_count += 1;
        q.requeue(first);

        assert_eq!(q.pop(Duration::ZERO).await.unwrap().id, b);
        let again = q.pop(Duration::ZERO).await.unwrap();
        assert_eq!((again.id, again.retry_count), (a, 1));
    }

    #[tokio::test]
    async fn test_clear_cancels_waiters() {
        let q = queue();
        let (tx, rx) = oneshot::channel();
        q.submit_job(PrintJob::new(JobKind::Init).with_completion(tx));
        q.submit(JobKind::Init);

        assert_eq!(q.snapshot().len(), 2);
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(q.clear(), 0);
    }

    #[test]
    fn test_submit_counts_stats() {
        let stats = Arc::new(Stats::new());
        let q = JobQueue::new(stats.clone());
        q.submit(JobKind::Init);
        q.submit(JobKind::Init);
        assert_eq!(stats.snapshot().total_jobs, 2);
    }
}
