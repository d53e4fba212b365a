//! Job kind → bytes on the wire.
//!
//! ```text
//! Image ────────────────┐
//! Text ──── Renderer ───┤
//! TextWithCodes ─ " ────┼─► apply_offsets ─► to_payload ─► plan ─► Transmitter
//! Calibration ─ pattern ┘
//! Init ──────────────────────────────────► ESC @, ESC 3 0, ESC a 1
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::job::{JobKind, PrintJob};
use super::stats::Stats;
use crate::error::Result;
use crate::protocol::commands;
use crate::raster::{Bitmap, to_payload};
use crate::render::{Renderer, apply_offsets, blocking, render_calibration};
use crate::settings::{Settings, SettingsStore};
use crate::transmit::{TransmissionPlan, TransmissionReport, Transmitter};
use crate::transport::PrinterLink;

/// Pause between the commands of the init sequence.
pub const INIT_COMMAND_GAP: Duration = Duration::from_millis(200);

/// Everything the worker needs to turn a job into printer traffic. Owned by
/// the single worker task.
pub struct Pipeline {
    link: Arc<PrinterLink>,
    settings: Arc<SettingsStore>,
    renderer: Arc<dyn Renderer>,
    stats: Arc<Stats>,
    transmitter: Transmitter,
}

impl Pipeline {
    pub fn new(
        link: Arc<PrinterLink>,
        settings: Arc<SettingsStore>,
        renderer: Arc<dyn Renderer>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            link,
            settings,
            renderer,
            stats,
            transmitter: Transmitter::new(),
        }
    }

    /// Run one job to completion or failure. `Init` jobs return no report.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(job_id = job.id, kind = job.kind.name(), retry = job.retry_count)
    )]
    pub async fn dispatch(&mut self, job: &PrintJob) -> Result<Option<TransmissionReport>> {
        let settings = self.settings.get().await;

        let Some(bitmap) = self.render(&job.kind, &settings).await? else {
            self.send_init().await?;
            info!("printer initialized");
            return Ok(None);
        };

        let placed = apply_offsets(&bitmap, settings.x_offset, settings.y_offset);
        let payload = to_payload(&placed)?;
        let plan = TransmissionPlan::for_payload(&payload, &settings);
        debug!(
            width = bitmap.width(),
            height = bitmap.height(),
            class = ?plan.class,
            complexity = plan.complexity,
            "payload ready"
        );

        let report = self.transmitter.send(&self.link, &payload, &plan).await?;
        match job.kind {
            JobKind::Image(_) => self.stats.image_processed(),
            JobKind::Text(_) | JobKind::TextWithCodes(_) => self.stats.text_job(),
            _ => {}
        }
        info!(
            bytes = report.bytes,
            lines = report.lines,
            blocks = report.blocks,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "job printed"
        );
        Ok(Some(report))
    }

    /// Produce the 1-bit image for `kind`, or `None` for kinds without a
    /// raster. Rendering runs on the blocking pool.
    pub async fn render(&self, kind: &JobKind, settings: &Settings) -> Result<Option<Bitmap>> {
        kind.validate()?;
        let label = settings.label_size.dims();
        let renderer = self.renderer.clone();
        let bitmap = match kind {
            JobKind::Image(bitmap) => bitmap.clone(),
            JobKind::Text(t) => {
                let t = t.clone();
                blocking(move || renderer.text(&t.text, t.font_size, t.alignment, label)).await?
            }
            JobKind::TextWithCodes(t) => {
                let t = t.clone();
                blocking(move || {
                    renderer.text_with_codes(&t.text, t.font_size, t.alignment, label)
                })
                .await?
            }
            JobKind::Calibration(c) => {
                let c = c.clone();
                let offsets = (settings.x_offset, settings.y_offset);
                blocking(move || {
                    render_calibration(
                        c.pattern,
                        c.width.unwrap_or(label.width_px),
                        c.height.unwrap_or(label.height_px),
                        offsets,
                    )
                })
                .await?
            }
            JobKind::Init => return Ok(None),
        };
        Ok(Some(bitmap))
    }

    async fn send_init(&self) -> Result<()> {
        let session = self.link.session().await;
        let [reset, spacing, align] = commands::init_sequence();
        session.write(&reset).await?;
        sleep(INIT_COMMAND_GAP).await;
        session.write(&spacing).await?;
        sleep(INIT_COMMAND_GAP).await;
        session.write(&align).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::printer::LabelSize;
    use crate::protocol::commands::Alignment;
    use crate::queue::job::{CalibrationJob, TextJob};
    use crate::render::{CalibrationPattern, LabelRenderer};
    use crate::transport::MockPort;
    use pretty_assertions::assert_eq;

    fn pipeline(port: Arc<MockPort>, settings: Settings) -> (Pipeline, Arc<Stats>) {
        let stats = Arc::new(Stats::new());
        let link = Arc::new(PrinterLink::new(port).with_throttle(Duration::ZERO));
        let p = Pipeline::new(
            link,
            Arc::new(SettingsStore::in_memory(settings)),
            Arc::new(LabelRenderer),
            stats.clone(),
        );
        (p, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_sequence_bytes_and_spacing() {
        let port = Arc::new(MockPort::new());
        let (mut p, _) = pipeline(port.clone(), Settings::default());
        let start = tokio::time::Instant::now();
        let report = p.dispatch(&PrintJob::new(JobKind::Init)).await.unwrap();
        assert!(report.is_none());
        assert_eq!(
            port.writes(),
            vec![vec![0x1B, 0x40], vec![0x1B, 0x33, 0x00], vec![0x1B, 0x61, 0x01]]
        );
        assert!(start.elapsed() >= 2 * INIT_COMMAND_GAP);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_job_goes_through_raster_path() {
        let port = Arc::new(MockPort::new());
        let (mut p, stats) = pipeline(port.clone(), Settings::default());
        let bitmap = Bitmap::from_fn(384, 10, |x, _| x < 8);
        let report = p
            .dispatch(&PrintJob::new(JobKind::Image(bitmap)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.bytes, 480);
        let bytes = port.bytes();
        assert_eq!(&bytes[..2], &[0x1B, 0x40]);
        assert_eq!(&bytes[2..10], &[0x1D, 0x76, 0x30, 0x00, 48, 0, 10, 0]);
        assert_eq!(bytes[10], 0xFF);
        assert_eq!(bytes.len(), 2 + 8 + 480);
        assert_eq!(stats.snapshot().images_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offsets_shift_rendered_image() {
        let port = Arc::new(MockPort::new());
        let settings = Settings {
            x_offset: 8,
            y_offset: 2,
            ..Settings::default()
        };
        let (mut p, _) = pipeline(port.clone(), settings);
        let bitmap = Bitmap::from_fn(8, 1, |_, _| true);
        p.dispatch(&PrintJob::new(JobKind::Image(bitmap)))
            .await
            .unwrap();

        let bytes = port.bytes();
        // header says 3 lines: 1 + y_offset
        assert_eq!(&bytes[8..10], &[3, 0]);
        let payload = &bytes[10..];
        assert_eq!(payload.len(), 3 * 48);
        assert_eq!(payload[2 * 48], 0x00);
        assert_eq!(payload[2 * 48 + 1], 0xFF);
    }

    #[tokio::test]
    async fn test_render_calibration_defaults_to_label() {
        let port = Arc::new(MockPort::new());
        let settings = Settings {
            label_size: LabelSize::Mm50x30,
            ..Settings::default()
        };
        let (p, _) = pipeline(port, settings.clone());
        let kind = JobKind::Calibration(CalibrationJob {
            pattern: CalibrationPattern::Border,
            width: None,
            height: None,
        });
        let bmp = p.render(&kind, &settings).await.unwrap().unwrap();
        assert_eq!((bmp.width(), bmp.height()), (399, 239));
    }

    #[tokio::test]
    async fn test_render_rejects_out_of_range_jobs() {
        let port = Arc::new(MockPort::new());
        let (p, _) = pipeline(port, Settings::default());
        let settings = Settings::default();

        let huge_font = JobKind::Text(TextJob::new("A").font_size(200_000));
        let err = p.render(&huge_font, &settings).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);

        let wide = JobKind::Calibration(CalibrationJob {
            pattern: CalibrationPattern::Grid,
            width: Some(usize::MAX),
            height: None,
        });
        let err = p.render(&wide, &settings).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_job_fails_without_writes() {
        let port = Arc::new(MockPort::new());
        let (mut p, stats) = pipeline(port.clone(), Settings::default());
        let job = PrintJob::new(JobKind::TextWithCodes(TextJob::new("A").font_size(5000)));
        let err = p.dispatch(&job).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert!(port.writes().is_empty());
        assert_eq!(stats.snapshot().text_jobs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_job_counts_and_prints() {
        let port = Arc::new(MockPort::new());
        let (mut p, stats) = pipeline(port.clone(), Settings::default());
        let job = PrintJob::new(JobKind::Text(TextJob::new("Hello").alignment(Alignment::Left)));
        p.dispatch(&job).await.unwrap();
        assert_eq!(stats.snapshot().text_jobs, 1);
        assert!(port.bytes().len() > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_surfaces_kind() {
        let port = Arc::new(MockPort::absent());
        let (mut p, stats) = pipeline(port, Settings::default());
        let err = p
            .dispatch(&PrintJob::new(JobKind::Image(Bitmap::new(384, 4))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(stats.snapshot().images_processed, 0);
    }
}
