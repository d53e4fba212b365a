//! In-memory serial endpoint for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::SerialPort;
use crate::error::{ErrorKind, PrintError, Result};

/// Records every successful write and fails on demand.
///
/// ```
/// use phomemo::error::ErrorKind;
/// use phomemo::transport::{MockPort, SerialPort};
///
/// let port = MockPort::new();
/// port.fail_next(ErrorKind::IoTransient, 2);
/// assert!(port.exists());
/// ```
#[derive(Default)]
pub struct MockPort {
    present: AtomicBool,
    writes: Mutex<Vec<Vec<u8>>>,
    script: Mutex<VecDeque<Option<ErrorKind>>>,
    fail_all: Mutex<Option<ErrorKind>>,
    latency: Mutex<Duration>,
    attempts: AtomicUsize,
}

impl MockPort {
    /// A present, healthy device.
    pub fn new() -> Self {
        let port = Self::default();
        port.present.store(true, Ordering::SeqCst);
        port
    }

    /// A device node that has not been bound yet.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    /// Fail the next `count` write attempts with `kind`.
    pub fn fail_next(&self, kind: ErrorKind, count: usize) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.extend(std::iter::repeat_n(Some(kind), count));
    }

    /// Let the next `count` scripted attempts succeed. Combine with
    /// [`fail_next`](Self::fail_next) to fail a specific write.
    pub fn pass_next(&self, count: usize) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.extend(std::iter::repeat_n(None, count));
    }

    /// Fail every write with `kind` until cleared with `None`.
    pub fn fail_all(&self, kind: Option<ErrorKind>) {
        *self.fail_all.lock().unwrap_or_else(|e| e.into_inner()) = kind;
    }

    /// Simulated time each write spends in the kernel.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All successfully written bytes, concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.writes().concat()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Write calls made, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> Option<ErrorKind> {
        if let Some(kind) = *self.fail_all.lock().unwrap_or_else(|e| e.into_inner()) {
            return Some(kind);
        }
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .flatten()
    }
}

#[async_trait]
impl SerialPort for MockPort {
    fn exists(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.exists() {
            return Err(PrintError::NotConnected("mock device absent".into()));
        }
        if let Some(kind) = self.scripted_failure() {
            return Err(PrintError::new(kind, "scripted failure"));
        }

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(data.to_vec());
        Ok(())
    }

    fn close(&self) {}

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
