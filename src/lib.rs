//! # Phomemo - M110 Label Printer Service
//!
//! Drives a Phomemo M110 thermal label printer over a Bluetooth RFCOMM
//! character device. It provides:
//!
//! - **Raster protocol**: `ESC @` / `GS v 0` framing, 48 bytes per line
//! - **Adaptive transmission**: block sizes and pauses chosen from raster
//!   complexity so the printer's buffer never overruns
//! - **Job queue**: one worker, FIFO order, bounded retries
//! - **Connection supervision**: heartbeat, exponential backoff reconnects
//! - **Rendering**: text, QR codes, barcodes, calibration patterns, photos
//! - **HTTP API**: JSON endpoints for printing, previews and settings
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use phomemo::{
//!     PrinterConfig, Service,
//!     queue::{JobKind, TextJob},
//!     render::LabelRenderer,
//!     service::ServiceConfig,
//!     settings::JsonFileBackend,
//!     supervisor::RfcommBinder,
//!     transport::RfcommPort,
//! };
//!
//! # async fn example() -> phomemo::error::Result<()> {
//! let printer = PrinterConfig::m110("DC:0D:30:90:23:C7", "/dev/rfcomm0");
//! let service = Service::start(
//!     ServiceConfig::new(printer.clone()),
//!     Box::new(JsonFileBackend::new("settings.json")),
//!     Arc::new(RfcommBinder::new(printer.clone())),
//!     Arc::new(RfcommPort::new(&printer.device_path)),
//!     Arc::new(LabelRenderer),
//! )
//! .await?;
//!
//! service
//!     .submit_and_wait(JobKind::Text(TextJob::new("# Hello\nfrom Rust")))
//!     .await?;
//! service.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS command builders and raster framing |
//! | [`raster`] | 1-bit bitmaps and payload packing |
//! | [`transmit`] | Complexity analysis, plans and the block writer |
//! | [`transport`] | Serial endpoints and the shared link |
//! | [`supervisor`] | Connection state machine |
//! | [`queue`] | Jobs, FIFO, worker, statistics |
//! | [`settings`] | Validated, persisted runtime settings |
//! | [`render`] | Text, codes, calibration and photo rendering |
//! | [`service`] | Wiring and lifecycle |
//! | [`server`] | HTTP API |
//! | [`printer`] | Printer and label configuration |
//! | [`error`] | Error kinds |

pub mod error;
pub mod printer;
pub mod protocol;
pub mod queue;
pub mod raster;
pub mod render;
pub mod server;
pub mod service;
pub mod settings;
pub mod supervisor;
pub mod transmit;
pub mod transport;

// Re-exports for convenience
pub use error::PrintError;
pub use printer::PrinterConfig;
pub use service::Service;
