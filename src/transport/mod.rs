//! # Printer Transport Layer
//!
//! The serial endpoint the print pipeline writes to.
//!
//! ## Available Endpoints
//!
//! - [`rfcomm`]: Bluetooth RFCOMM character device (Linux)
//! - [`mock`]: in-memory endpoint for tests
//!
//! All writes go through a [`PrinterLink`], which serializes access between
//! the queue worker and the heartbeat.
//!
//! ## Error Classification
//!
//! Endpoints never return raw OS errors. A missing or unwritable node is
//! `NotConnected`, a stalled write is `IoTransient`, anything else is
//! `IoFatal` (see [`crate::error::PrintError::from_io`]).

pub mod link;
pub mod mock;
pub mod rfcomm;

use async_trait::async_trait;

use crate::error::Result;

pub use link::{LinkSession, PrinterLink};
pub use mock::MockPort;
pub use rfcomm::RfcommPort;

/// A one-way byte sink to the printer.
#[async_trait]
pub trait SerialPort: Send + Sync {
    /// Device node present and writable by this process.
    fn exists(&self) -> bool;

    /// Hand all of `data` to the kernel and flush. Does not imply the
    /// printer received it.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Drop any open handle. The next write reopens.
    fn close(&self);

    /// Human-readable identity for logs and status.
    fn describe(&self) -> String;
}
