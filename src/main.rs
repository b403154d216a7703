//! IdScan Kiosk - unattended ID-card scanner
//!
//! Watches a camera for a presented student ID, reads the student number and
//! name with OCR and hands the record to the confirmation step.

mod capture;
mod config;
mod control;
mod detection;
mod extraction;
mod handoff;
mod scanner;
mod storage;
mod vision;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::capture::{AcquisitionManager, CaptureBackend, CaptureError, SystemDevices};
use crate::config::AppConfig;
use crate::control::ControlListener;
use crate::detection::DetectionStateMachine;
use crate::extraction::FieldExtractor;
use crate::handoff::{
    ChannelHandOff, LogHandOff, ScanArchive, ScanRecord, SinkKind, TempFileHandOff,
};
use crate::scanner::{Scanner, ScannerExit};
use crate::vision::{Preprocessor, ScanProfile, TesseractOcr, VisionPipeline};

/// IdScan Kiosk - unattended ID-card scanner
#[derive(Parser, Debug)]
#[command(name = "idscan-kiosk")]
#[command(about = "Reads student ID cards from a camera and hands them to confirmation")]
struct Args {
    /// Configuration file (default: per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "idscan_kiosk=trace" (default: RUST_LOG or info)
    #[arg(long)]
    log_level: Option<String>,

    /// Number of camera indices to probe
    #[arg(long)]
    camera_probe_count: Option<u32>,

    /// Capture backend to try first
    #[arg(long, value_enum, ignore_case = true)]
    backend: Option<CaptureBackend>,

    /// Play back the images in this directory instead of using a camera
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Scan-area profile
    #[arg(long, value_enum, ignore_case = true)]
    profile: Option<ScanProfile>,

    /// Stop after the first successful hand-off
    #[arg(long)]
    exit_after_handoff: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };

    if args.write_default_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Default configuration written to {}", config_path.display());
        return Ok(());
    }

    info!("IdScan Kiosk starting...");

    let mut config = load_or_default_config(&config_path, args.config.is_some())?;
    apply_overrides(&mut config, &args);

    let (mut scanner, consoles) = build_scanner(&config)?;
    info!("Present an ID card to the camera");
    info!(
        "Type '{}' + Enter to quit, '{}' + Enter to reset",
        config.controls.abort_key, config.controls.reset_key
    );

    let result = match scanner.run() {
        Ok(ScannerExit::CameraLost { failures }) => Err(anyhow!(
            "camera lost after {} consecutive read failures",
            failures
        )),
        Ok(_) => Ok(()),
        Err(e @ CaptureError::NoDeviceFound { .. }) => {
            error!("No working camera found. Check the connection and permissions.");
            Err(e.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Camera initialization failed")),
    };

    // Dropping the scanner closes the console channels
    drop(scanner);
    for console in consoles {
        if console.join().is_err() {
            warn!("Console printer thread panicked");
        }
    }

    info!("IdScan Kiosk shutdown complete");
    result
}

/// Load configuration from file, falling back to defaults when the default
/// path has no file yet. An explicit path must exist.
fn load_or_default_config(path: &std::path::Path, explicit: bool) -> Result<AppConfig> {
    if path.exists() || explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(count) = args.camera_probe_count {
        config.camera.probe_count = count;
    }
    if let Some(backend) = args.backend {
        config.camera.backends.retain(|&b| b != backend);
        config.camera.backends.insert(0, backend);
    }
    if let Some(dir) = &args.replay {
        config.camera.use_replay(dir.clone());
    }
    if let Some(profile) = args.profile {
        config.scan_area.profile = profile;
    }
    if args.exit_after_handoff {
        config.handoff.after_handoff = handoff::AfterHandOff::Exit;
    }
}

/// Assemble the scanner and its sinks. Returns the console printer threads,
/// which finish once the scanner is dropped.
fn build_scanner(config: &AppConfig) -> Result<(Scanner, Vec<JoinHandle<()>>)> {
    let devices = SystemDevices::new(
        config.camera.replay_dir.clone(),
        Duration::from_millis(config.camera.replay_frame_interval_ms),
    );
    let camera = AcquisitionManager::new(Box::new(devices), config.camera.acquisition());

    let ocr = TesseractOcr::new(config.ocr.tesseract_config())
        .context("Failed to initialize OCR engine")?;
    let vision = VisionPipeline::new(
        config.scan_area.calculator(),
        Preprocessor::default(),
        Box::new(ocr),
    );

    let controls = if config.controls.terminal || config.controls.ctrl_c {
        ControlListener::spawn(
            config.controls.keys()?,
            config.controls.terminal,
            config.controls.ctrl_c,
        )?
    } else {
        ControlListener::disabled()
    };

    let mut scanner = Scanner::new(
        camera,
        vision,
        FieldExtractor::new(config.extraction.extraction_config()),
        DetectionStateMachine::new(config.detection.detection_config()),
        controls,
        config.scanner_config(),
    );

    let mut consoles = Vec::new();
    for kind in &config.handoff.sinks {
        match kind {
            SinkKind::Log => scanner.add_sink(Box::new(LogHandOff)),
            SinkKind::TempFile => {
                scanner.add_sink(Box::new(TempFileHandOff::new(&config.handoff.temp_file)))
            }
            SinkKind::Console => {
                let (sender, handle) = spawn_console()?;
                consoles.push(handle);
                scanner.add_sink(Box::new(ChannelHandOff::new(sender)));
            }
        }
    }
    if config.handoff.archive {
        let archive = ScanArchive::new(&config.handoff.archive_dir);
        info!("Archiving scans to {:?}", archive.dir());
        scanner.add_sink(Box::new(archive));
    }
    if config.handoff.sinks.is_empty() && !config.handoff.archive {
        warn!("No hand-off sinks configured; scans will only be logged by the scanner");
    }

    Ok((scanner, consoles))
}

/// Print every handed-off record on the kiosk terminal until the sender is
/// dropped
fn spawn_console() -> Result<(Sender<ScanRecord>, JoinHandle<()>)> {
    let (sender, receiver) = crossbeam_channel::unbounded::<ScanRecord>();
    let handle = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for record in receiver {
                println!();
                println!("SCAN COMPLETE");
                println!("  STUDENT NO: {}", record.student_no);
                println!("  NAME:       {}", record.name);
                if let Some(course) = &record.course {
                    println!("  COURSE:     {}", course);
                }
                if let Some(year) = &record.year_level {
                    println!("  YEAR:       {}", year);
                }
                println!();
            }
        })
        .context("Failed to start console thread")?;
    Ok((sender, handle))
}
