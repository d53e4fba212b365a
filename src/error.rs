//! # Error Types
//!
//! Every failure the print core reports falls into one of five kinds. OS
//! errors never leave the transport layer unclassified; callers above the
//! core only ever see a [`PrintError`] and its [`ErrorKind`].
//!
//! | Kind | Meaning | Recovery |
//! |------|---------|----------|
//! | `NotConnected` | device node missing or not writable | supervisor reconnect |
//! | `IoTransient` | write failed but the link is likely alive | block retry, then job retry |
//! | `IoFatal` | link broken mid-transfer | mark disconnected, reconnect, job retry |
//! | `Invariant` | malformed payload or rejected settings | none, reported to caller |
//! | `Cancelled` | shutdown before the job started | none |

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotConnected,
    IoTransient,
    IoFatal,
    Invariant,
    Cancelled,
}

impl ErrorKind {
    /// Kind name as used in API error strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConnected => "NotConnected",
            Self::IoTransient => "IoTransient",
            Self::IoFatal => "IoFatal",
            Self::Invariant => "Invariant",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether a job failing with this kind may be attempted again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NotConnected | Self::IoTransient | Self::IoFatal)
    }

    /// Whether this kind means the link itself is gone.
    pub fn is_link_loss(self) -> bool {
        matches!(self, Self::NotConnected | Self::IoFatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for print operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintError {
    /// Device path absent or not writable
    #[error("NotConnected: {0}")]
    NotConnected(String),

    /// Write failed, link probably alive
    #[error("IoTransient: {0}")]
    IoTransient(String),

    /// Link broken
    #[error("IoFatal: {0}")]
    IoFatal(String),

    /// Payload or settings violated a structural rule
    #[error("Invariant: {0}")]
    Invariant(String),

    /// Shutdown requested before the job ran
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl PrintError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match kind {
            ErrorKind::NotConnected => Self::NotConnected(reason),
            ErrorKind::IoTransient => Self::IoTransient(reason),
            ErrorKind::IoFatal => Self::IoFatal(reason),
            ErrorKind::Invariant => Self::Invariant(reason),
            ErrorKind::Cancelled => Self::Cancelled(reason),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected(_) => ErrorKind::NotConnected,
            Self::IoTransient(_) => ErrorKind::IoTransient,
            Self::IoFatal(_) => ErrorKind::IoFatal,
            Self::Invariant(_) => ErrorKind::Invariant,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// The human reason without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::NotConnected(r)
            | Self::IoTransient(r)
            | Self::IoFatal(r)
            | Self::Invariant(r)
            | Self::Cancelled(r) => r,
        }
    }

    /// Classify an OS error raised while talking to the device.
    ///
    /// - NotFound / PermissionDenied → `NotConnected`
    /// - TimedOut / WouldBlock / Interrupted / WriteZero → `IoTransient`
    /// - everything else (broken pipe, EIO, ENODEV, ...) → `IoFatal`
    pub fn from_io(context: &str, err: &io::Error) -> Self {
        let reason = format!("{}: {}", context, err);
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Self::NotConnected(reason)
            }
            io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WriteZero => Self::IoTransient(reason),
            _ => Self::IoFatal(reason),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PrintError>;
