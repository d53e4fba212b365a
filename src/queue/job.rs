//! Print job model.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::protocol::commands::Alignment;
use crate::raster::Bitmap;
use crate::render::{CalibrationPattern, calibration, check_font_size};

pub const DEFAULT_FONT_SIZE: u32 = 22;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

pub type JobId = u64;

/// Final outcome of a job, delivered to whoever asked to wait for it.
pub type Completion = oneshot::Sender<Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextJob {
    pub text: String,
    pub font_size: u32,
    pub alignment: Alignment,
}

impl TextJob {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: DEFAULT_FONT_SIZE,
            alignment: Alignment::Center,
        }
    }

    pub fn font_size(mut self, size: u32) -> Self {
        self.font_size = size;
        self
    }

    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationJob {
    pub pattern: CalibrationPattern,
    /// Defaults to the active label size.
    pub width: Option<usize>,
    pub height: Option<usize>,
}

/// What to print. Each kind carries its own payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Already rendered 1-bit image.
    Image(Bitmap),
    Text(TextJob),
    TextWithCodes(TextJob),
    Calibration(CalibrationJob),
    /// Reset sequence only, no raster.
    Init,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Image(_) => "image",
            JobKind::Text(_) => "text",
            JobKind::TextWithCodes(_) => "text_with_codes",
            JobKind::Calibration(_) => "calibration",
            JobKind::Init => "init",
        }
    }

    /// Reject parameters no renderer should ever allocate for.
    pub fn validate(&self) -> Result<()> {
        match self {
            JobKind::Text(t) | JobKind::TextWithCodes(t) => check_font_size(t.font_size),
            JobKind::Calibration(c) => {
                if let Some(width) = c.width {
                    calibration::check_width(width)?;
                }
                if let Some(height) = c.height {
                    calibration::check_height(height)?;
                }
                Ok(())
            }
            JobKind::Image(_) | JobKind::Init => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct PrintJob {
    pub id: JobId,
    pub kind: JobKind,
    pub submitted_at: DateTime<Local>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub(crate) completion: Option<Completion>,
}

impl PrintJob {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            submitted_at: Local::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            completion: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a channel that receives the final outcome.
    pub fn with_completion(mut self, tx: Completion) -> Self {
        self.completion = Some(tx);
        self
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            kind: self.kind.name(),
            submitted_at: self.submitted_at,
            retry_count: self.retry_count,
        }
    }

    /// Report the final outcome. A receiver that went away is ignored.
    pub fn complete(&mut self, outcome: Result<()>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Queue listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub kind: &'static str,
    pub submitted_at: DateTime<Local>,
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PrintError};

    #[test]
    fn test_ids_are_monotonic() {
        let a = PrintJob::new(JobKind::Init);
        let b = PrintJob::new(JobKind::Init);
        assert!(b.id > a.id);
        assert_eq!(a.max_retries, 3);
        assert_eq!(a.retry_count, 0);
    }

    #[test]
    fn test_text_job_defaults() {
        let job = TextJob::new("hi");
        assert_eq!(job.font_size, 22);
        assert_eq!(job.alignment, Alignment::Center);
        let job = job.font_size(30).alignment(Alignment::Left);
        assert_eq!((job.font_size, job.alignment), (30, Alignment::Left));
    }

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let mut job = PrintJob::new(JobKind::Init).with_completion(tx);
        job.complete(Err(PrintError::Cancelled("stop".into())));
        job.complete(Ok(()));
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(JobKind::Text(TextJob::new("x")).validate().is_ok());
        let err = JobKind::Text(TextJob::new("x").font_size(200_000))
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert!(
            JobKind::TextWithCodes(TextJob::new("x").font_size(201))
                .validate()
                .is_err()
        );

        let calibration = |width, height| {
            JobKind::Calibration(CalibrationJob {
                pattern: CalibrationPattern::Grid,
                width,
                height,
            })
        };
        assert!(calibration(None, None).validate().is_ok());
        assert!(calibration(Some(1536), Some(65535)).validate().is_ok());
        assert!(calibration(Some(1537), None).validate().is_err());
        assert!(calibration(None, Some(65536)).validate().is_err());
        assert!(calibration(Some(19), None).validate().is_err());
    }

    #[test]
    fn test_kind_names() {
        let text = JobKind::TextWithCodes(TextJob::new("x"));
        assert_eq!(text.name(), "text_with_codes");
        assert_eq!(JobKind::Init.name(), "init");
    }
}
