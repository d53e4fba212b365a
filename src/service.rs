//! # Print Service
//!
//! Owns the link, settings, queue, supervisor and worker, and the two
//! background tasks:
//!
//! ```text
//!  HTTP handlers ──submit──► JobQueue ──► PrintWorker ──┐
//!                                                       ├──► PrinterLink ──► /dev/rfcommN
//!                     ConnectionSupervisor (heartbeat) ─┘
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{PrintError, Result};
use crate::printer::PrinterConfig;
use crate::queue::{
    JobId, JobKind, JobQueue, JobSummary, Pipeline, PrintJob, PrintWorker, Stats, StatsSnapshot,
    WorkerConfig,
};
use crate::render::Renderer;
use crate::settings::{Settings, SettingsBackend, SettingsStore};
use crate::supervisor::{Binder, ConnectionSnapshot, ConnectionSupervisor, SupervisorConfig};
use crate::transport::{PrinterLink, SerialPort, link::WRITE_THROTTLE};

/// How long `stop` waits for each background task.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub printer: PrinterConfig,
    pub supervisor: SupervisorConfig,
    pub worker: WorkerConfig,
    pub write_throttle: Duration,
}

impl ServiceConfig {
    pub fn new(printer: PrinterConfig) -> Self {
        Self {
            printer,
            supervisor: SupervisorConfig::default(),
            worker: WorkerConfig::default(),
            write_throttle: WRITE_THROTTLE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub jobs: Vec<JobSummary>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub connection: ConnectionSnapshot,
    pub queue_size: usize,
    pub stats: StatsSnapshot,
    pub settings: Settings,
}

pub struct Service {
    printer: PrinterConfig,
    settings: Arc<SettingsStore>,
    queue: Arc<JobQueue>,
    stats: Arc<Stats>,
    supervisor: Arc<ConnectionSupervisor>,
    renderer: Arc<dyn Renderer>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Service {
    /// Load settings and spawn the supervisor and worker. Must run inside a
    /// Tokio runtime.
    pub async fn start(
        config: ServiceConfig,
        settings_backend: Box<dyn SettingsBackend>,
        binder: Arc<dyn Binder>,
        port: Arc<dyn SerialPort>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Arc<Self>> {
        let settings = Arc::new(SettingsStore::load(settings_backend).await?);
        let stats = Arc::new(Stats::new());
        let queue = Arc::new(JobQueue::new(stats.clone()));
        let link = Arc::new(PrinterLink::new(port).with_throttle(config.write_throttle));
        let shutdown = CancellationToken::new();

        let supervisor = Arc::new(ConnectionSupervisor::new(
            config.supervisor,
            config.printer.clone(),
            link.clone(),
            binder,
            settings.clone(),
            stats.clone(),
            shutdown.clone(),
        ));

        let worker = PrintWorker::new(
            queue.clone(),
            Pipeline::new(link, settings.clone(), renderer.clone(), stats.clone()),
            stats.clone(),
            supervisor.clone(),
            config.worker,
            shutdown.clone(),
        );

        let tasks = vec![
            ("supervisor", tokio::spawn(supervisor.clone().run())),
            ("worker", tokio::spawn(worker.run())),
        ];

        info!(
            device = %config.printer.device_path,
            mac = %config.printer.mac_address,
            "print service started"
        );

        Ok(Arc::new(Self {
            printer: config.printer,
            settings,
            queue,
            stats,
            supervisor,
            renderer,
            shutdown,
            tasks: Mutex::new(tasks),
        }))
    }

    pub fn printer(&self) -> &PrinterConfig {
        &self.printer
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Queue a job and return its id without waiting.
    pub fn submit(&self, kind: JobKind) -> JobId {
        self.queue.submit(kind)
    }

    /// Queue a job and wait for its final outcome, retries included.
    pub async fn submit_and_wait(&self, kind: JobKind) -> Result<JobId> {
        if self.shutdown.is_cancelled() {
            return Err(PrintError::Cancelled("service stopping".into()));
        }
        let (tx, rx) = oneshot::channel();
        let id = self
            .queue
            .submit_job(PrintJob::new(kind).with_completion(tx));
        match rx.await {
            Ok(outcome) => outcome.map(|()| id),
            Err(_) => Err(PrintError::Cancelled("job dropped before completion".into())),
        }
    }

    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            queue_size: self.queue.len(),
            jobs: self.queue.snapshot(),
            stats: self.stats.snapshot(),
        }
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            connection: self.supervisor.snapshot(),
            queue_size: self.queue.len(),
            stats: self.stats.snapshot(),
            settings: self.settings.get().await,
        }
    }

    /// Stop both tasks. The worker finishes its current job; each task gets
    /// [`STOP_GRACE`] before it is aborted. Pending jobs are cancelled.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for (name, mut handle) in tasks {
            match tokio::time::timeout(STOP_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let dropped = self.queue.clear();
        info!(dropped, "print service stopped");
    }
}
