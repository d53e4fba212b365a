//! # Connection Supervisor
//!
//! Keeps the RFCOMM link to the printer alive.
//!
//! ## State Machine
//!
//! ```text
//!                  connect()
//! Disconnected ──────────────► Connecting ──ok──► Connected
//!      ▲                           │                  │
//!      │      fail, attempts < max │                  │ heartbeat fails /
//!      ├───────────────────────────┘                  │ worker reports loss
//!      │                                              ▼
//!      │                                        Disconnected
//!      │   backoff                                    │
//!      └─────────── Reconnecting ◄────────────────────┘
//!
//! any failure with attempts ≥ max ──► Failed (only connect(force) leaves it)
//! ```
//!
//! ## Background Loop
//!
//! Every `heartbeat_interval`:
//! - **Connected**: write `ESC @`; on failure go Disconnected and reconnect
//!   after backoff.
//! - **Disconnected**: if `auto_connect` is set and attempts remain,
//!   reconnect after backoff.
//!
//! The worker can wake the loop early through
//! [`ConnectionSupervisor::mark_disconnected`].
//!
//! Heartbeats go through the same [`PrinterLink`] session lock as print
//! jobs, so they never land inside a raster transfer.

pub mod backoff;
pub mod binder;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub use binder::{Binder, MockBinder, RfcommBinder};

use crate::error::{PrintError, Result};
use crate::printer::PrinterConfig;
use crate::protocol::commands;
use crate::queue::Stats;
use crate::settings::SettingsStore;
use crate::transport::PrinterLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Timing and retry limits.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_connection_attempts: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub heartbeat_interval: Duration,
    /// How long to wait for the device node after starting the helper.
    pub connect_wait: Duration,
    pub poll_interval: Duration,
    /// Pause after releasing a stale binding.
    pub release_settle: Duration,
    pub heartbeat_timeout: Duration,
    pub helper_grace: Duration,
    /// Wall-clock bound for one whole connect attempt.
    pub connect_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_connection_attempts: 5,
            base_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            connect_wait: Duration::from_secs(4),
            poll_interval: Duration::from_millis(200),
            release_settle: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(5),
            helper_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Copy of the connection state for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub last_successful_at: Option<DateTime<Local>>,
    pub consecutive_attempts: u32,
    pub last_heartbeat_at: Option<DateTime<Local>>,
    pub device: String,
    pub mac_address: String,
    pub device_exists: bool,
    pub helper_running: bool,
}

#[derive(Debug)]
struct ConnectionInner {
    state: ConnectionState,
    last_successful_at: Option<DateTime<Local>>,
    consecutive_attempts: u32,
    last_heartbeat_at: Option<DateTime<Local>>,
}

pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    printer: PrinterConfig,
    link: Arc<PrinterLink>,
    binder: Arc<dyn Binder>,
    settings: Arc<SettingsStore>,
    stats: Arc<Stats>,
    inner: Mutex<ConnectionInner>,
    connect_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    pub fn new(
        config: SupervisorConfig,
        printer: PrinterConfig,
        link: Arc<PrinterLink>,
        binder: Arc<dyn Binder>,
        settings: Arc<SettingsStore>,
        stats: Arc<Stats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            printer,
            link,
            binder,
            settings,
            stats,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                last_successful_at: None,
                consecutive_attempts: 0,
                last_heartbeat_at: None,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            shutdown,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        let mut inner = self.lock();
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "connection state");
            inner.state = state;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let inner = self.lock();
        ConnectionSnapshot {
            state: inner.state,
            last_successful_at: inner.last_successful_at,
            consecutive_attempts: inner.consecutive_attempts,
            last_heartbeat_at: inner.last_heartbeat_at,
            device: self.printer.device_path.clone(),
            mac_address: self.printer.mac_address.clone(),
            device_exists: self.link.exists(),
            helper_running: self.binder.helper_running(),
        }
    }

    /// Bind the device node and confirm the link with a heartbeat.
    ///
    /// Without `force` this is a no-op returning `true` while connected, and
    /// refuses (`false`) once the supervisor has given up (`Failed`).
    #[instrument(skip(self), fields(device = %self.printer.device_path))]
    pub async fn connect(&self, force: bool) -> bool {
        let _serial = self.connect_lock.lock().await;

        if !force {
            match self.state() {
                ConnectionState::Connected if self.link.exists() => return true,
                ConnectionState::Failed => {
                    debug!("connection failed permanently, manual connect required");
                    return false;
                }
                _ => {}
            }
        }

        let attempt = self.lock().consecutive_attempts + 1;
        info!(attempt, "connecting");
        self.set_state(ConnectionState::Connecting);

        let outcome = match timeout(self.config.connect_timeout, self.attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PrintError::NotConnected(format!(
                "connect exceeded {}s",
                self.config.connect_timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(()) => {
                {
                    let mut inner = self.lock();
                    inner.state = ConnectionState::Connected;
                    inner.last_successful_at = Some(Local::now());
                    inner.consecutive_attempts = 0;
                }
                self.stats.reconnected();
                info!("printer connected");

                let confirmed = self.heartbeat().await;
                if !confirmed {
                    warn!("connected but heartbeat failed");
                }
                confirmed
            }
            Err(e) => {
                self.binder.shutdown(self.config.helper_grace).await;
                let mut inner = self.lock();
                inner.consecutive_attempts += 1;
                inner.state = if inner.consecutive_attempts >= self.config.max_connection_attempts {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                };
                error!(
                    attempts = inner.consecutive_attempts,
                    state = ?inner.state,
                    error = %e,
                    "connection failed"
                );
                false
            }
        }
    }

    /// Release, bind, and wait for the node to become writable.
    async fn attempt(&self) -> Result<()> {
        self.link.close();
        self.binder.release(self.config.helper_grace).await;
        sleep(self.config.release_settle).await;

        self.binder.bind().await?;

        let deadline = Instant::now() + self.config.connect_wait;
        loop {
            if self.link.exists() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.config.poll_interval).await;
        }

        Err(PrintError::NotConnected(if self.binder.helper_running() {
            format!("{} not writable after bind", self.link.describe())
        } else {
            "rfcomm helper exited".to_string()
        }))
    }

    /// Write `ESC @` to probe the link.
    pub async fn heartbeat(&self) -> bool {
        if !self.link.exists() {
            debug!("heartbeat skipped, device missing");
            return false;
        }
        let session = self.link.session().await;
        match timeout(self.config.heartbeat_timeout, session.write(&commands::init())).await {
            Ok(Ok(())) => {
                self.lock().last_heartbeat_at = Some(Local::now());
                debug!("heartbeat ok");
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "heartbeat failed");
                false
            }
            Err(_) => {
                debug!("heartbeat timed out");
                false
            }
        }
    }

    /// Wait `min(base × 2^(attempts-1), max)` then try again.
    ///
    /// Returns `false` without trying once attempts are exhausted or when
    /// shutdown is requested during the wait.
    pub async fn reconnect_with_backoff(&self) -> bool {
        let attempts = self.lock().consecutive_attempts;
        if attempts >= self.config.max_connection_attempts {
            error!(attempts, "max connection attempts reached, giving up");
            return false;
        }

        let delay = backoff::retry_delay(
            attempts,
            self.config.base_retry_delay,
            self.config.max_retry_delay,
        );
        info!(delay_secs = delay.as_secs_f64(), "reconnecting after backoff");
        tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            _ = sleep(delay) => {}
        }

        self.set_state(ConnectionState::Reconnecting);
        self.connect(false).await
    }

    /// Record a lost link reported by a writer and wake the loop.
    pub fn mark_disconnected(&self, reason: &str) {
        {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connected {
                return;
            }
            inner.state = ConnectionState::Disconnected;
        }
        warn!(reason, "link lost");
        self.link.close();
        self.wake.notify_one();
    }

    /// Supervise until the shutdown token fires.
    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = self.config.heartbeat_interval.as_secs(), "connection monitor started");

        if self.settings.get().await.auto_connect {
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = self.connect(false) => {}
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.config.heartbeat_interval) => {}
                _ = self.wake.notified() => {}
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        self.binder.shutdown(self.config.helper_grace).await;
        info!("connection monitor stopped");
    }

    async fn tick(&self) {
        match self.state() {
            ConnectionState::Connected => {
                if !self.heartbeat().await {
                    warn!("heartbeat failed, connection lost");
                    self.set_state(ConnectionState::Disconnected);
                    self.link.close();
                    self.reconnect_with_backoff().await;
                }
            }
            ConnectionState::Disconnected => {
                let attempts = self.lock().consecutive_attempts;
                if self.settings.get().await.auto_connect
                    && attempts < self.config.max_connection_attempts
                {
                    self.reconnect_with_backoff().await;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::transport::MockPort;

    struct Fixture {
        supervisor: Arc<ConnectionSupervisor>,
        port: Arc<MockPort>,
        binder: Arc<MockBinder>,
        stats: Arc<Stats>,
        token: CancellationToken,
    }

    fn fixture(auto_connect: bool) -> Fixture {
        let port = Arc::new(MockPort::absent());
        let binder = Arc::new(MockBinder::new(port.clone()));
        let link = Arc::new(PrinterLink::new(port.clone()).with_throttle(Duration::ZERO));
        let stats = Arc::new(Stats::new());
        let settings = Arc::new(SettingsStore::in_memory(Settings {
            auto_connect,
            ..Settings::default()
        }));
        let token = CancellationToken::new();
        let supervisor = Arc::new(ConnectionSupervisor::new(
            SupervisorConfig::default(),
            PrinterConfig::default(),
            link,
            binder.clone(),
            settings,
            stats.clone(),
            token.clone(),
        ));
        Fixture {
            supervisor,
            port,
            binder,
            stats,
            token,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_sends_heartbeat() {
        let f = fixture(false);
        assert!(f.supervisor.connect(false).await);

        let snap = f.supervisor.snapshot();
        assert_eq!(snap.state, ConnectionState::Connected);
        assert_eq!(snap.consecutive_attempts, 0);
        assert!(snap.last_successful_at.is_some());
        assert!(snap.last_heartbeat_at.is_some());
        assert_eq!(f.port.writes(), vec![vec![0x1B, 0x40]]);
        assert_eq!(f.stats.snapshot().reconnections, 1);

        // idempotent without force
        assert!(f.supervisor.connect(false).await);
        assert_eq!(f.binder.binds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_backoff_then_success() {
        let f = fixture(false);
        f.binder.script([false, true]);

        assert!(!f.supervisor.connect(false).await);
        let snap = f.supervisor.snapshot();
        assert_eq!(snap.state, ConnectionState::Disconnected);
        assert_eq!(snap.consecutive_attempts, 1);

        let start = Instant::now();
        assert!(f.supervisor.reconnect_with_backoff().await);
        assert!(start.elapsed() >= Duration::from_secs(2));

        let snap = f.supervisor.snapshot();
        assert_eq!(snap.state, ConnectionState::Connected);
        assert_eq!(snap.consecutive_attempts, 0);
        assert!(snap.last_successful_at.is_some());
        assert_eq!(f.port.writes(), vec![vec![0x1B, 0x40]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_after_max_attempts() {
        let f = fixture(false);
        f.binder.script([false; 5]);

        for _ in 0..5 {
            assert!(!f.supervisor.connect(false).await);
        }
        assert_eq!(f.supervisor.state(), ConnectionState::Failed);
        assert!(!f.supervisor.reconnect_with_backoff().await);
        assert!(!f.supervisor.connect(false).await);
        assert_eq!(f.binder.binds(), 5);

        // manual connect still works
        assert!(f.supervisor.connect(true).await);
        assert_eq!(f.supervisor.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failure_triggers_reconnect() {
        let f = fixture(true);
        let task = tokio::spawn(f.supervisor.clone().run());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(f.supervisor.state(), ConnectionState::Connected);

        // link drops; next heartbeat fails and the loop rebinds
        f.port.set_present(false);
        sleep(Duration::from_secs(40)).await;
        assert_eq!(f.supervisor.state(), ConnectionState::Connected);
        assert_eq!(f.binder.binds(), 2);

        f.token.cancel();
        task.await.unwrap();
        assert!(f.binder.shutdowns() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_disconnected_wakes_loop() {
        let f = fixture(true);
        let task = tokio::spawn(f.supervisor.clone().run());

        sleep(Duration::from_secs(10)).await;
        f.supervisor.mark_disconnected("write failed");
        assert_eq!(f.supervisor.state(), ConnectionState::Disconnected);

        // backoff 2s + release settle 1s, well under the 30s heartbeat
        sleep(Duration::from_secs(5)).await;
        assert_eq!(f.supervisor.state(), ConnectionState::Connected);
        assert_eq!(f.binder.binds(), 2);

        f.token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_auto_connect_stays_disconnected() {
        let f = fixture(false);
        let task = tokio::spawn(f.supervisor.clone().run());

        sleep(Duration::from_secs(120)).await;
        assert_eq!(f.supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(f.binder.binds(), 0);

        f.token.cancel();
        task.await.unwrap();
    }
}
