//! livefilter - Main Entry Point
//!
//! Command-line runner for the frame pipeline engine: run a pipeline against a
//! device, inspect the filter registry, validate pipeline files, probe devices
//! and write a default configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use livefilter_rs::{
    capture::{probe_devices, DEFAULT_PROBE_MAX_INDEX},
    config::{DeviceKind, EngineConfig},
    Engine, EngineEvent, FilterRegistry, Pipeline,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "livefilter")]
#[command(version, about = "Real-time frame pipeline engine", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and stream frames through a pipeline
    Run {
        /// Pipeline JSON file (list of stage records)
        #[arg(short, long, value_name = "FILE")]
        pipeline: Option<PathBuf>,

        /// Capture from a directory of images instead of the configured device
        #[arg(long, value_name = "DIR")]
        images: Option<PathBuf>,

        /// Capture from a camera (requires the `camera` feature)
        #[arg(long, conflicts_with = "images")]
        camera: bool,

        /// Device index to open
        #[arg(short, long, value_name = "N")]
        device: Option<u32>,

        /// How long to run, in seconds
        #[arg(long, value_name = "SECS", default_value = "5")]
        duration: f64,

        /// Save the last processed frame as PNG
        #[arg(long, value_name = "FILE")]
        save_last: Option<PathBuf>,
    },

    /// List registered filters and their parameters
    Filters,

    /// Validate a pipeline JSON file and print the sanitized records
    Validate {
        #[arg(value_name = "FILE")]
        pipeline: PathBuf,
    },

    /// Probe which device indices open
    Devices {
        /// Probe cameras instead of the configured device
        #[arg(long)]
        camera: bool,

        /// Probe indices below this value
        #[arg(long, value_name = "N", default_value_t = DEFAULT_PROBE_MAX_INDEX)]
        max_index: u32,

        /// Only report devices that also deliver a frame
        #[arg(long)]
        require_frame: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => EngineConfig::default_path()?,
    };
    let mut config = EngineConfig::load_or_default(&config_path);

    let _log_guard = init_logging(&config);
    config.validate();

    match cli.command {
        Commands::Run {
            pipeline,
            images,
            camera,
            device,
            duration,
            save_last,
        } => {
            if camera {
                config.source.device = DeviceKind::Camera;
            }
            if let Some(dir) = images {
                config.source.device = DeviceKind::ImageSequence;
                config.source.image_paths.clear();
                config.source.image_dir = Some(dir);
            }
            if let Some(index) = device {
                config.source.device_index = index;
            }
            run(&config, pipeline.as_deref(), duration, save_last.as_deref())
        }
        Commands::Filters => {
            list_filters();
            Ok(())
        }
        Commands::Validate { pipeline } => validate(&pipeline),
        Commands::Devices {
            camera,
            max_index,
            require_frame,
        } => {
            if camera {
                config.source.device = DeviceKind::Camera;
            }
            let mut device = config.build_device()?;
            let found = probe_devices(device.as_mut(), max_index, require_frame);
            if found.is_empty() {
                println!("No {} devices found", device.name());
            }
            for index in found {
                println!("{} device {}", device.name(), index);
            }
            Ok(())
        }
        Commands::InitConfig { force } => {
            if config_path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", config_path);
            }
            EngineConfig::default().save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

/// Install the stderr subscriber, plus a daily log file when configured
fn init_logging(config: &EngineConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,livefilter_rs=debug"))
    };

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();

    guard
}

fn run(
    config: &EngineConfig,
    pipeline: Option<&Path>,
    duration: f64,
    save_last: Option<&Path>,
) -> anyhow::Result<()> {
    let registry = FilterRegistry::builtin().shared();
    let device = config.build_device()?;
    let (mut engine, receiver) = Engine::start(config, registry, device)?;

    if let Some(path) = pipeline {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline {:?}", path))?;
        let report = engine.load_pipeline_json(&json)?;
        for name in &report.dropped {
            println!("skipped unknown filter '{}'", name);
        }
        println!("pipeline: {}", engine.pipeline().names().join(" -> "));
    }

    let deadline = Instant::now() + Duration::from_secs_f64(duration.max(0.0));
    let mut last = None;
    let mut received = 0u64;

    while Instant::now() < deadline {
        if let Some(result) = receiver.recv_result_timeout(Duration::from_millis(100)) {
            received += 1;
            if let Some(quality) = &result.quality {
                tracing::debug!(
                    "frame {}: psnr {:.2} ssim {:.4} in {:?}",
                    result.source_sequence,
                    quality.psnr,
                    quality.ssim,
                    result.elapsed
                );
            }
            last = Some(result);
        }

        for event in receiver.drain_events() {
            if let EngineEvent::StageFailed { sequence, failure } = &event {
                tracing::debug!("frame {}: {}", sequence, failure);
            }
        }

        if let Err(e) = engine.poll_source() {
            engine.stop()?;
            return Err(e.into());
        }
    }

    let stats = engine.stats();
    engine.stop()?;

    println!("received {} result(s)", received);
    println!(
        "captured {}, processed {}, queue drops {}, result drops {}, stage failures {}",
        stats.frames_captured,
        stats.processed,
        stats.queue_dropped,
        stats.dropped_results,
        stats.stage_failures
    );

    if let Some(path) = save_last {
        let Some(result) = last else {
            bail!("No frame was processed, nothing to save");
        };
        result.frame.save(path)?;
        println!("saved frame {} to {}", result.source_sequence, path.display());
    }
    Ok(())
}

fn list_filters() {
    let registry = FilterRegistry::builtin();
    for schema in registry.schemas() {
        println!("{:<28} {}", schema.name, schema.description);
        for param in &schema.params {
            let odd = if param.must_be_odd { ", odd" } else { "" };
            println!(
                "    {:<20} {:?} default {} range [{}, {}]{}",
                param.name, param.kind, param.default, param.min, param.max, odd
            );
        }
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let registry = FilterRegistry::builtin();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline {:?}", path))?;
    let (pipeline, report) = Pipeline::from_json(&registry, &json)?;

    for name in &report.dropped {
        println!("dropped unknown filter '{}'", name);
    }
    for validation in &report.corrections {
        for correction in &validation.corrections {
            println!(
                "{}.{}: {:?} -> {}",
                validation.filter, correction.param, correction.kind, correction.value
            );
        }
        for key in &validation.unknown_keys {
            println!("{}.{}: ignored unknown parameter", validation.filter, key);
        }
    }
    println!("{}", pipeline.to_json()?);
    Ok(())
}
