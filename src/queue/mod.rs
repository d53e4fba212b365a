//! # Job Queue
//!
//! Submitters push [`PrintJob`]s onto a [`JobQueue`]; one [`PrintWorker`]
//! drains it in submission order through the [`Pipeline`]. The worker is
//! the only writer of payload bytes.
//!
//! | Outcome | Effect |
//! |---------|--------|
//! | success | `successful_jobs += 1` |
//! | I/O error, retries left | wait `2^retry_count` s, re-enqueue at tail |
//! | I/O error, retries spent | `failed_jobs += 1` |
//! | Invariant / Cancelled | `failed_jobs += 1`, no retry |

pub mod dispatch;
pub mod fifo;
pub mod job;
pub mod stats;
pub mod worker;

pub use dispatch::Pipeline;
pub use fifo::JobQueue;
pub use job::{CalibrationJob, JobId, JobKind, JobSummary, PrintJob, TextJob};
pub use stats::{Stats, StatsSnapshot};
pub use worker::{LinkMonitor, PrintWorker, WorkerConfig};
