//! # Phomemo CLI
//!
//! Command-line interface for the M110 label printer service.
//!
//! ## Usage
//!
//! ```bash
//! # Run the HTTP API
//! phomemo serve --mac DC:0D:30:90:23:C7 --listen 0.0.0.0:8080
//!
//! # Print an image once and exit
//! phomemo print --mac DC:0D:30:90:23:C7 label.png
//!
//! # Save a calibration pattern as PNG
//! phomemo calibrate --pattern full --png calibration.png
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use phomemo::{
    PrintError, PrinterConfig, Service,
    printer::{config::DEFAULT_DEVICE, is_valid_mac},
    queue::{CalibrationJob, JobKind},
    render::{CalibrationPattern, ImageOptions, LabelRenderer, photo, render_calibration},
    server::{self, ServerConfig},
    service::ServiceConfig,
    settings::{JsonFileBackend, Settings, SettingsStore},
    supervisor::RfcommBinder,
    transport::RfcommPort,
};

/// Phomemo - M110 label printer service
#[derive(Parser, Debug)]
#[command(name = "phomemo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the printer lives.
#[derive(clap::Args, Debug, Clone)]
struct PrinterArgs {
    /// Bluetooth address of the printer
    #[arg(long)]
    mac: String,

    /// RFCOMM device node
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: String,

    /// RFCOMM channel
    #[arg(long, default_value = "1")]
    channel: u8,

    /// Settings file
    #[arg(long, default_value = "printer_settings.json")]
    settings: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[command(flatten)]
        printer: PrinterArgs,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Do not connect or reconnect automatically
        #[arg(long)]
        no_auto_connect: bool,
    },

    /// Print one image and exit
    Print {
        #[command(flatten)]
        printer: PrinterArgs,

        /// Image file (PNG, JPEG, BMP, GIF, WEBP)
        image: PathBuf,
    },

    /// Print a calibration pattern, or save it as PNG
    Calibrate {
        /// border, grid, lines or full
        #[arg(long, default_value = "full")]
        pattern: String,

        /// Output to PNG file instead of printing
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,

        /// Bluetooth address, required unless --png is given
        #[arg(long)]
        mac: Option<String>,

        #[arg(long, default_value = DEFAULT_DEVICE)]
        device: String,

        #[arg(long, default_value = "1")]
        channel: u8,

        #[arg(long, default_value = "printer_settings.json")]
        settings: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli.command).await {
        error!(error = %e, "fatal");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("phomemo=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Commands) -> Result<(), PrintError> {
    match command {
        Commands::Serve {
            printer,
            listen,
            no_auto_connect,
        } => {
            if no_auto_connect {
                // persisted before the supervisor reads it
                SettingsStore::load(Box::new(JsonFileBackend::new(&printer.settings)))
                    .await?
                    .update_json(serde_json::json!({ "auto_connect": false }))
                    .await?;
            }
            let service = start_service(&printer).await?;

            let config = ServerConfig {
                listen_addr: listen,
            };
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
                info!("shutdown requested");
            };
            let served = server::serve(config, service.clone(), shutdown).await;
            service.stop().await;
            served.map_err(|e| PrintError::IoFatal(format!("http server: {}", e)))
        }

        Commands::Print { printer, image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .map_err(|e| PrintError::Invariant(format!("{}: {}", image.display(), e)))?;
            let service = start_service(&printer).await?;
            let settings = service.settings().get().await;
            let bitmap = photo::process(
                &bytes,
                &ImageOptions::from_settings(&settings),
                settings.label_size.dims(),
            )?;

            let outcome = service.submit_and_wait(JobKind::Image(bitmap)).await;
            service.stop().await;
            let job_id = outcome?;
            info!(job_id, "printed {}", image.display());
            Ok(())
        }

        Commands::Calibrate {
            pattern,
            png,
            mac,
            device,
            channel,
            settings,
        } => {
            let pattern = CalibrationPattern::parse(&pattern)?;

            if let Some(path) = png {
                let label = Settings::default().label_size.dims();
                let bitmap =
                    render_calibration(pattern, label.width_px, label.height_px, (0, 0))?;
                let data = bitmap.to_png()?;
                tokio::fs::write(&path, data)
                    .await
                    .map_err(|e| PrintError::Invariant(format!("{}: {}", path.display(), e)))?;
                info!(path = %path.display(), "saved calibration pattern");
                return Ok(());
            }

            let mac = mac.ok_or_else(|| {
                PrintError::Invariant("--mac is required unless --png is given".into())
            })?;
            let service = start_service(&PrinterArgs {
                mac,
                device,
                channel,
                settings,
            })
            .await?;
            let outcome = service
                .submit_and_wait(JobKind::Calibration(CalibrationJob {
                    pattern,
                    width: None,
                    height: None,
                }))
                .await;
            service.stop().await;
            outcome.map(|_| ())
        }
    }
}

async fn start_service(args: &PrinterArgs) -> Result<Arc<Service>, PrintError> {
    if !is_valid_mac(&args.mac) {
        return Err(PrintError::Invariant(format!(
            "invalid MAC address '{}', expected XX:XX:XX:XX:XX:XX",
            args.mac
        )));
    }

    let printer = PrinterConfig::m110(&args.mac, &args.device).with_channel(args.channel);
    Service::start(
        ServiceConfig::new(printer.clone()),
        Box::new(JsonFileBackend::new(&args.settings)),
        Arc::new(RfcommBinder::new(printer.clone())),
        Arc::new(RfcommPort::new(&printer.device_path)),
        Arc::new(LabelRenderer),
    )
    .await
}
