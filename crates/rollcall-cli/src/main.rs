mod config;
mod display;
mod enroll;
mod keys;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{BackendKind, Config};
use rollcall_core::report::render_report;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam attendance with face matching and blink liveness")]
struct Cli {
    /// TOML config file (defaults to $ROLLCALL_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live attendance loop
    Run {
        /// V4L2 device path (e.g. /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
        /// Attendance store
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
        /// Write annotated frames to this JPEG
        #[arg(long)]
        preview: Option<PathBuf>,
        /// Record on a match alone, without waiting for a blink
        #[arg(long)]
        no_liveness: bool,
    },
    /// Capture an enrollment photo for one person
    Enroll {
        /// Person's name; prompted for when omitted
        #[arg(short, long)]
        label: Option<String>,
        /// V4L2 device path (e.g. /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Print stored attendance records
    Report {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Attendance store
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            device,
            backend,
            preview,
            no_liveness,
        } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if preview.is_some() {
                config.preview_path = preview;
            }
            if no_liveness {
                config.liveness = false;
            }
            tracing::info!(
                device = %config.camera_device,
                backend = ?config.backend,
                liveness = config.liveness,
                "starting attendance"
            );
            run::run(&config)?;
        }
        Commands::Enroll { label, device } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            enroll::enroll(&config, label)?;
        }
        Commands::Report { json, backend } => {
            if let Some(backend) = backend {
                config.backend = backend;
            }
            let records = config.open_backend()?.records()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("{}", render_report(&records));
            }
        }
    }

    Ok(())
}
