//! MeterReader - Real-time utility meter display reader
//!
//! Turns camera frames of an electricity meter's LCD into typed readings
//! (energy registers, date, time).

mod analysis;
mod app;
mod capture;
mod config;
mod error;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::analysis::MeterReading;
use crate::app::MeterReaderApp;
use crate::capture::ImageSequenceSource;
use crate::config::AppConfig;
use crate::storage::export::{format_readings, save_snapshot};
use crate::storage::recordings::Recording;
use crate::vision::{DirectorySink, ModelManager, ModelType, VisionPipeline};

/// MeterReader - camera frames to meter readings
#[derive(Parser, Debug)]
#[command(name = "meter-reader")]
#[command(about = "Reads energy, date and time screens from a utility meter display")]
struct Args {
    /// Image file or directory of frames to read
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Replay a JSON recording of OCR observations instead of running models
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between admitted frames
    #[arg(long)]
    interval: Option<f64>,

    /// Write per-stage debug images to this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Disable the digit classifier path
    #[arg(long)]
    no_digits: bool,

    /// List model files and their status, then exit
    #[arg(long)]
    list_models: bool,

    /// Download missing OCR models, then exit
    #[arg(long)]
    download_models: bool,

    /// Write the final readings as JSON
    #[arg(long)]
    export: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_models {
        return list_models();
    }
    if args.download_models {
        return download_models();
    }

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => load_or_create_config(),
    };
    if let Some(interval) = args.interval {
        config.capture.admission_interval_secs = interval;
    }
    if args.no_digits {
        config.digits.enabled = false;
    }
    if let Some(dir) = &args.debug_dir {
        config.diagnostics.enabled = true;
        config.diagnostics.output_dir = Some(dir.clone());
    }

    info!("MeterReader starting...");

    let app = match (&args.replay, &args.input) {
        (Some(recording), _) => run_replay(config, recording)?,
        (None, Some(input)) => run_frames(config, input)?,
        (None, None) => anyhow::bail!("Nothing to read: pass --input <path> or --replay <file>"),
    };

    {
        let state = app.state();
        let state = state.read();
        let runtime = &state.runtime;
        info!(
            "Frames: {} seen, {} admitted, {} results, {} failed; readings: {} stored, {} stale",
            runtime.frames_seen,
            runtime.frames_admitted,
            runtime.results_received,
            runtime.frames_failed,
            runtime.readings_stored,
            runtime.stale_rejected
        );
        if let Some(error) = &runtime.last_error {
            warn!("Last error: {}", error);
        }
    }

    let snapshot = app.snapshot();
    println!();
    if snapshot.is_empty() {
        println!("No readings captured");
    } else {
        println!("{}", format_readings(&snapshot));
    }
    if app.is_complete() {
        println!("Reading set complete");
    } else {
        let missing: Vec<&str> = app.missing().iter().map(|s| s.label()).collect();
        println!("Missing: {}", missing.join(", "));
    }

    if let Some(path) = &args.export {
        save_snapshot(&snapshot, path)?;
        info!("Readings written to {:?}", path);
    }

    info!("MeterReader shutdown complete");
    Ok(())
}

fn print_reading(reading: &MeterReading) {
    println!("Read {}", reading);
}

/// Load configuration from file or create default
fn load_or_create_config() -> AppConfig {
    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring invalid configuration: {:#}", e),
            }
        } else {
            let config = AppConfig::default();
            match config::save_config(&config, &config_path) {
                Ok(()) => info!("Created default configuration at {:?}", config_path),
                Err(e) => warn!("Could not write default configuration: {:#}", e),
            }
            return config;
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

/// Run image frames through both recognition paths
fn run_frames(config: AppConfig, input: &Path) -> Result<MeterReaderApp> {
    let models = ModelManager::new()?;

    let mut pipeline = VisionPipeline::from_config(&config, &models).context("Text path unavailable")?;
    if config.diagnostics.enabled {
        let dir = match &config.diagnostics.output_dir {
            Some(dir) => dir.clone(),
            None => storage::get_data_dir()?.join("diagnostics"),
        };
        info!("Writing debug images to {:?}", dir);
        pipeline = pipeline.with_diagnostics(Box::new(DirectorySink::new(dir)?));
    }
    let digits = if config.digits.enabled {
        Some(vision::digit_reader_from_config(&config, &models).context("Digit path unavailable")?)
    } else {
        None
    };

    let mut source = ImageSequenceSource::open(input, config.capture.source_fps, config.capture.orientation)?;

    let mut app = MeterReaderApp::new(config).with_text_pipeline(pipeline)?;
    if let Some(reader) = digits {
        app = app.with_digit_reader(reader)?;
    }
    app.on_reading(Box::new(print_reading));

    app.run(&mut source)?;
    Ok(app)
}

/// Feed recorded observations through the strategies and aggregator
fn run_replay(config: AppConfig, path: &Path) -> Result<MeterReaderApp> {
    let recording = Recording::load(path)?;
    let mut app = MeterReaderApp::new(config);
    app.on_reading(Box::new(print_reading));
    for observations in recording.frames_top_left() {
        app.replay_observations(&observations);
    }
    Ok(app)
}

fn list_models() -> Result<()> {
    let models = ModelManager::new()?;
    println!("Models in {:?}:", models.models_dir());
    for status in models.get_model_status() {
        match status.size {
            Some(size) if status.available => println!(
                "  {:<28} {:>10} bytes  {:?}",
                status.model_type.display_name(),
                size,
                status.path
            ),
            _ => println!("  {:<28} {:>16}  {:?}", status.model_type.display_name(), "missing", status.path),
        }
    }
    Ok(())
}

fn download_models() -> Result<()> {
    let models = ModelManager::new()?;
    models.download_all_with_progress(|model_type: ModelType| {
        println!("  {} ready", model_type.display_name());
    })?;
    println!("Models directory: {:?}", models.models_dir());
    Ok(())
}
