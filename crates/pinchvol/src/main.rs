use anyhow::{Context, Result};
use clap::Parser;
use pinchvol_core::HandLandmarker;
use pinchvol_hw::{open_default_sink, Camera, VolumeBackend, VolumeSink};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod overlay;
mod session;

use config::Config;
use display::PreviewWindow;
use session::{Session, SinkState};

#[derive(Parser)]
#[command(
    name = "pinchvol",
    version,
    about = "Hand gesture volume control: pinch to lower, spread to raise"
)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "PINCHVOL_CONFIG")]
    config: Option<PathBuf>,

    /// V4L2 camera device (e.g., /dev/video0)
    #[arg(short, long)]
    device: Option<String>,

    /// Hand landmark ONNX model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Palm detection ONNX model
    #[arg(long)]
    palm_model: Option<PathBuf>,

    /// Mixer to drive: auto, wpctl, pactl or none
    #[arg(long)]
    volume_backend: Option<VolumeBackend>,

    /// Show the camera image unmirrored
    #[arg(long)]
    no_mirror: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    /// Command-line flags take precedence over file and environment.
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.camera_device = device.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(model) = &self.palm_model {
            config.palm_model_path = model.clone();
        }
        if let Some(backend) = self.volume_backend {
            config.volume_backend = backend;
        }
        if self.no_mirror {
            config.mirror = false;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = Camera::list_devices();
        if devices.is_empty() {
            println!("No capture devices found");
        }
        for dev in devices {
            println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    tracing::debug!(?config, "configuration loaded");

    println!("Initializing audio control...");
    let sink: Option<Box<dyn VolumeSink>> = match open_default_sink(config.volume_backend) {
        Ok(sink) => {
            println!("✓ Audio control initialized!");
            Some(Box::new(sink))
        }
        Err(e) => {
            tracing::warn!(error = %e, "audio control unavailable; continuing without volume changes");
            println!("✗ Audio failed: {e}");
            None
        }
    };

    let mut detector = HandLandmarker::load(
        &config.palm_model_path,
        &config.model_path,
        config.detector_config(),
    )
    .context("failed to load hand tracking models")?;

    let mut camera = Camera::open(&config.camera_device, config.width, config.height)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;

    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        "camera streaming"
    );

    let mut window = PreviewWindow::open(overlay::TITLE, camera.width, camera.height)?;

    print_banner();

    let mut session = Session::new(config.mapper(), SinkState::new(sink), config.mirror);
    let summary = session.run(&mut camera, &mut detector, &mut window);

    tracing::info!(
        frames = summary.frames,
        hands = summary.hands,
        volume_sets = summary.volume_sets,
        audio_active = session.sink().is_enabled(),
        "session finished"
    );

    drop(window);
    drop(camera);
    println!("\nGoodbye!");
    Ok(())
}

fn print_banner() {
    let rule = "=".repeat(50);
    println!("\n{rule}");
    println!("{}", overlay::TITLE);
    println!("{rule}");
    println!("Instructions:");
    println!("- Pinch = Lower volume | Spread = Raise volume");
    println!("- Press 'q' to quit");
    println!("{rule}\n");
}
