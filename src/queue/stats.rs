//! Service-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Lock-free counters shared by the worker, supervisor and API.
#[derive(Debug)]
pub struct Stats {
    total_jobs: AtomicU64,
    successful_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    retried_jobs: AtomicU64,
    reconnections: AtomicU64,
    images_processed: AtomicU64,
    text_jobs: AtomicU64,
    uptime_start: DateTime<Local>,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    pub retried_jobs: u64,
    pub reconnections: u64,
    pub images_processed: u64,
    pub text_jobs: u64,
    pub uptime_start: DateTime<Local>,
    pub uptime_seconds: i64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_jobs: AtomicU64::new(0),
            successful_jobs: AtomicU64::new(0),
            failed_jobs: AtomicU64::new(0),
            retried_jobs: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            images_processed: AtomicU64::new(0),
            text_jobs: AtomicU64::new(0),
            uptime_start: Local::now(),
        }
    }

    pub fn job_submitted(&self) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_succeeded(&self) {
        self.successful_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.failed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_retried(&self) {
        self.retried_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnected(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn image_processed(&self) {
        self.images_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn text_job(&self) {
        self.text_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            successful_jobs: self.successful_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            retried_jobs: self.retried_jobs.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            images_processed: self.images_processed.load(Ordering::Relaxed),
            text_jobs: self.text_jobs.load(Ordering::Relaxed),
            uptime_start: self.uptime_start,
            uptime_seconds: (Local::now() - self.uptime_start).num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = Stats::new();
        stats.job_submitted();
        stats.job_submitted();
        stats.job_succeeded();
        stats.job_failed();
        stats.reconnected();

        let snap = stats.snapshot();
        assert_eq!(snap.total_jobs, 2);
        assert_eq!(snap.successful_jobs, 1);
        assert_eq!(snap.failed_jobs, 1);
        assert_eq!(snap.reconnections, 1);
        assert_eq!(snap.images_processed, 0);
        assert!(snap.uptime_seconds >= 0);
    }
}
