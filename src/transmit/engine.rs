//! Paced raster transfer.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use super::plan::TransmissionPlan;
use crate::error::{ErrorKind, PrintError, Result};
use crate::printer::config::BYTES_PER_LINE;
use crate::protocol::{commands, graphics};
use crate::raster::RasterPayload;
use crate::transport::{LinkSession, PrinterLink};

/// What happened during one transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionReport {
    pub class: super::SpeedClass,
    pub complexity: f64,
    pub bytes: usize,
    pub lines: u16,
    pub blocks: usize,
    pub block_retries: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Sends raster jobs, remembering when the last one finished so back-to-back
/// jobs keep their distance.
#[derive(Debug, Default)]
pub struct Transmitter {
    last_completed: Option<Instant>,
}

impl Transmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_completed(&self) -> Option<Instant> {
        self.last_completed
    }

    /// Send `ESC @`, the raster header and the payload under one link
    /// session, paced by `plan`.
    ///
    /// A failed block is retried once after `2 × block_delay`. A second
    /// failure aborts the job: `IoFatal` and `NotConnected` keep their kind,
    /// anything else is reported as `IoTransient`.
    #[instrument(
        name = "transmit",
        skip_all,
        fields(bytes = payload.len(), lines = payload.height(), class = ?plan.class)
    )]
    pub async fn send(
        &mut self,
        link: &PrinterLink,
        payload: &RasterPayload,
        plan: &TransmissionPlan,
    ) -> Result<TransmissionReport> {
        if let Some(last) = self.last_completed {
            let gap = plan.job_gap();
            let since = last.elapsed();
            if since < gap {
                debug!(wait_ms = (gap - since).as_millis() as u64, "spacing jobs");
                sleep(gap - since).await;
            }
        }

        let started = Instant::now();
        let session = link.session().await;
        let result = transfer(&session, payload, plan).await;
        drop(session);
        self.last_completed = Some(Instant::now());

        let (blocks, block_retries) = result?;
        let report = TransmissionReport {
            class: plan.class,
            complexity: plan.complexity,
            bytes: payload.len(),
            lines: payload.height(),
            blocks,
            block_retries,
            elapsed: started.elapsed(),
        };
        debug!(blocks, block_retries, elapsed_ms = report.elapsed.as_millis() as u64, "sent");
        Ok(report)
    }
}

async fn transfer(
    session: &LinkSession<'_>,
    payload: &RasterPayload,
    plan: &TransmissionPlan,
) -> Result<(usize, usize)> {
    let delays = &plan.delays;

    session.write(&commands::init()).await?;
    sleep(delays.init).await;

    session
        .write(&graphics::raster_header(BYTES_PER_LINE as u16, payload.height()))
        .await?;
    sleep(delays.header).await;

    let data = payload.data();
    let block_size = if plan.direct_write(data.len()) {
        data.len()
    } else {
        plan.block_size
    };

    let blocks: Vec<&[u8]> = data.chunks(block_size).collect();
    let mut retries = 0;
    for (index, block) in blocks.iter().enumerate() {
        if write_block(session, block, index, delays.block).await? {
            retries += 1;
        }
        if index + 1 < blocks.len() {
            sleep(delays.block).await;
        }
    }

    sleep(delays.post).await;
    Ok((blocks.len(), retries))
}

/// Write one block, retrying once. Returns whether a retry was needed.
async fn write_block(
    session: &LinkSession<'_>,
    block: &[u8],
    index: usize,
    block_delay: Duration,
) -> Result<bool> {
    let first = match session.write(block).await {
        Ok(()) => return Ok(false),
        Err(e) if e.kind().is_retryable() => e,
        Err(e) => return Err(e),
    };

    warn!(block = index, error = %first, "block write failed, retrying");
    sleep(block_delay * 2).await;

    match session.write(block).await {
        Ok(()) => Ok(true),
        Err(e) if matches!(e.kind(), ErrorKind::IoFatal | ErrorKind::NotConnected) => Err(e),
        Err(e) => Err(PrintError::IoTransient(format!(
            "block {} failed twice: {}",
            index,
            e.reason()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::transmit::SpeedClass;
    use crate::transport::MockPort;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup() -> (Arc<MockPort>, PrinterLink) {
        let port = Arc::new(MockPort::new());
        let link = PrinterLink::new(port.clone()).with_throttle(Duration::ZERO);
        (port, link)
    }

    fn sparse_payload(lines: usize) -> RasterPayload {
        RasterPayload::new(vec![0u8; lines * 48], lines).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_write_sequence() {
        let (port, link) = setup();
        let payload = RasterPayload::new(vec![0xFF; 144], 3).unwrap();
        let plan = TransmissionPlan::new(SpeedClass::UltraFast, 1.0, &Settings::default());

        let report = Transmitter::new().send(&link, &payload, &plan).await.unwrap();

        let writes = port.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0], vec![0x1B, 0x40]);
        assert_eq!(writes[1], vec![0x1D, 0x76, 0x30, 0x00, 0x30, 0x00, 0x03, 0x00]);
        assert_eq!(writes[2], vec![0xFF; 144]);
        assert_eq!((report.blocks, report.block_retries), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_follow_class() {
        let (port, link) = setup();
        let payload = sparse_payload(45);
        let plan = TransmissionPlan::new(SpeedClass::Slow, 0.1, &Settings::default());

        let report = Transmitter::new().send(&link, &payload, &plan).await.unwrap();

        let sizes: Vec<usize> = port.writes()[2..].iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![480, 480, 480, 480, 240]);
        assert_eq!(report.blocks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_retry_once_then_succeed() {
        let (port, link) = setup();
        let payload = sparse_payload(30);
        let plan = TransmissionPlan::new(SpeedClass::Normal, 0.06, &Settings::default());

        // init and header go through, first block fails once
        port.pass_next(2);
        port.fail_next(ErrorKind::IoTransient, 1);
        let report = Transmitter::new().send(&link, &payload, &plan).await.unwrap();

        assert_eq!(report.block_retries, 1);
        assert_eq!(port.write_attempts(), 5);
        let sizes: Vec<usize> = port.writes()[2..].iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![960, 480]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_block_failure_aborts() {
        let (port, link) = setup();
        let payload = sparse_payload(10);
        let plan = TransmissionPlan::new(SpeedClass::Slow, 0.1, &Settings::default());
        let mut tx = Transmitter::new();

        port.pass_next(2);
        port.fail_next(ErrorKind::IoTransient, 2);
        let err = tx.send(&link, &payload, &plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoTransient);
        assert!(err.reason().contains("failed twice"));
        assert!(tx.last_completed().is_some());

        port.pass_next(2);
        port.fail_next(ErrorKind::IoFatal, 2);
        let err = tx.send(&link, &payload, &plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_twice_block_delay() {
        let (port, link) = setup();
        let payload = sparse_payload(5);
        let plan = TransmissionPlan::new(SpeedClass::UltraSlow, 0.5, &Settings::default());

        let clean = {
            let start = Instant::now();
            Transmitter::new().send(&link, &payload, &plan).await.unwrap();
            start.elapsed()
        };

        port.pass_next(2);
        port.fail_next(ErrorKind::IoTransient, 1);
        let start = Instant::now();
        Transmitter::new().send(&link, &payload, &plan).await.unwrap();
        assert!(start.elapsed() >= clean + plan.delays.block * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_gap_is_respected() {
        let (_port, link) = setup();
        let payload = sparse_payload(1);
        let plan = TransmissionPlan::new(SpeedClass::UltraFast, 0.0, &Settings::default());

        let mut tx = Transmitter::new();
        tx.send(&link, &payload, &plan).await.unwrap();
        let finished = Instant::now();
        tx.send(&link, &payload, &plan).await.unwrap();

        assert!(finished.elapsed() >= plan.job_gap());
    }
}
