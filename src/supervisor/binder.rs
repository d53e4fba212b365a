//! OS-level binding of the printer's Bluetooth address to the RFCOMM node.
//!
//! ## Linux sequence
//!
//! ```bash
//! rfcomm release 0                       # drop any stale binding
//! bluetoothctl trust 12:7E:5A:E9:E5:22   # allow reconnects without a prompt
//! rfcomm connect 0 12:7E:5A:E9:E5:22 1   # long-running, owns /dev/rfcomm0
//! ```
//!
//! `rfcomm connect` keeps running while the link is up; the node disappears
//! when it exits. It is terminated with SIGTERM and killed after a grace
//! period when the binding is released or the service stops.
//!
//! **Requires root privileges** (or the matching capabilities) for
//! `rfcomm`.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{PrintError, Result};
use crate::printer::PrinterConfig;
use crate::transport::MockPort;

/// Upper bound for the short helper commands (`release`, `trust`).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates and tears down the device node.
#[async_trait]
pub trait Binder: Send + Sync {
    /// Drop any existing binding. Failures are not errors: there may be
    /// nothing to release.
    async fn release(&self, grace: Duration);

    /// Start binding the configured address. Returns once the helper has
    /// been launched; the node may appear later.
    async fn bind(&self) -> Result<()>;

    /// Whether the long-running helper is alive.
    fn helper_running(&self) -> bool;

    /// Stop the helper: SIGTERM, then kill after `grace`.
    async fn shutdown(&self, grace: Duration);
}

/// `rfcomm` / `bluetoothctl` based binder.
pub struct RfcommBinder {
    config: PrinterConfig,
    child: Mutex<Option<Child>>,
}

impl RfcommBinder {
    pub fn new(config: PrinterConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    async fn run_quiet(&self, program: &str, args: &[&str]) {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(COMMAND_TIMEOUT, output).await {
            Ok(Ok(out)) if out.status.success() => debug!(program, ?args, "ok"),
            Ok(Ok(out)) => debug!(
                program,
                ?args,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "non-zero exit"
            ),
            Ok(Err(e)) => warn!(program, error = %e, "failed to run"),
            Err(_) => warn!(program, "timed out"),
        }
    }

    fn take_child(&self) -> Option<Child> {
        self.child.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl Binder for RfcommBinder {
    async fn release(&self, grace: Duration) {
        self.shutdown(grace).await;
        let index = self.config.rfcomm_index.to_string();
        self.run_quiet("rfcomm", &["release", &index]).await;
    }

    async fn bind(&self) -> Result<()> {
        let mac = self.config.mac_address.clone();
        self.run_quiet("bluetoothctl", &["trust", &mac]).await;

        let index = self.config.rfcomm_index.to_string();
        let channel = self.config.rfcomm_channel.to_string();
        info!(mac = %mac, index = %index, channel = %channel, "starting rfcomm connect");

        let child = Command::new("rfcomm")
            .args(["connect", &index, &mac, &channel])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PrintError::from_io("spawn rfcomm connect", &e))?;

        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        Ok(())
    }

    fn helper_running(&self) -> bool {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn shutdown(&self, grace: Duration) {
        let Some(mut child) = self.take_child() else {
            return;
        };
        if !matches!(child.try_wait(), Ok(None)) {
            return;
        }

        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => debug!("rfcomm helper exited"),
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "rfcomm helper ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "kill failed");
                }
            }
        }
    }
}

/// Scripted binder for tests. Each `bind` pops the next outcome (default:
/// success) and makes the paired [`MockPort`] appear or vanish accordingly.
pub struct MockBinder {
    port: Arc<MockPort>,
    outcomes: Mutex<VecDeque<bool>>,
    running: AtomicBool,
    binds: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockBinder {
    pub fn new(port: Arc<MockPort>) -> Self {
        Self {
            port,
            outcomes: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            binds: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Queue outcomes for the next binds.
    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outcomes);
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Binder for MockBinder {
    async fn release(&self, _grace: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.port.set_present(false);
    }

    async fn bind(&self) -> Result<()> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        let ok = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(true);
        self.running.store(ok, Ordering::SeqCst);
        self.port.set_present(ok);
        Ok(())
    }

    fn helper_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn shutdown(&self, _grace: Duration) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SerialPort;

    #[tokio::test]
    async fn test_mock_binder_toggles_port() {
        let port = Arc::new(MockPort::absent());
        let binder = MockBinder::new(port.clone());
        binder.script([false, true]);

        binder.bind().await.unwrap();
        assert!(!port.exists());
        assert!(!binder.helper_running());

        binder.bind().await.unwrap();
        assert!(port.exists());
        assert!(binder.helper_running());

        binder.release(Duration::ZERO).await;
        assert!(!port.exists());
        assert_eq!(binder.binds(), 2);
    }

    #[tokio::test]
    async fn test_rfcomm_binder_idle_shutdown_is_noop() {
        let binder = RfcommBinder::new(PrinterConfig::default());
        assert!(!binder.helper_running());
        binder.shutdown(Duration::from_millis(10)).await;
    }
}
