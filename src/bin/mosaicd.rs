//! mosaicd - real-time screen mosaic daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by MOSAIC_CONFIG, MOSAIC_* env, flags)
//! 2. Starts the capture thread on the configured source
//! 3. Shows the overlay surface (must be excluded from capture)
//! 4. Runs detect -> track -> mosaic -> publish until Ctrl-C or --seconds
//! 5. Stops pipeline, overlay and capture, each with a bounded join

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use screen_mosaic::config::split_targets;
use screen_mosaic::ingest::{open_backend, CaptureLoop};
use screen_mosaic::overlay::select_surface;
use screen_mosaic::{build_detector, FrameSource, MosaicConfig, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pixelate detected regions on screen in real time")]
struct Args {
    /// Configuration file (.toml or JSON).
    #[arg(long, env = "MOSAIC_CONFIG")]
    config: Option<PathBuf>,

    /// Detector backend (cpu, stub, tract).
    #[arg(long)]
    detector: Option<String>,

    /// Overlay backend (headless, log).
    #[arg(long)]
    overlay: Option<String>,

    /// Comma-separated class names to censor.
    #[arg(long)]
    targets: Option<String>,

    /// Mosaic block size in pixels, 5..=50.
    #[arg(long)]
    strength: Option<u32>,

    /// Minimum detection confidence.
    #[arg(long)]
    conf_threshold: Option<f32>,

    /// Cycles a track may go unmatched before it is dropped.
    #[arg(long)]
    max_age: Option<u32>,

    /// Matches needed before a track is rendered.
    #[arg(long)]
    min_hits: Option<u32>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("MOSAIC_CONFIG", path);
    }
    let mut cfg = MosaicConfig::load()?;
    apply_args(&mut cfg, &args)?;

    let backend = open_backend(&cfg.capture.url, cfg.capture.width, cfg.capture.height)?;
    let mut capture = CaptureLoop::new(backend, cfg.capture_settings());
    capture.start()?;

    let overlay = select_surface(&cfg.overlay.backend, cfg.surface_settings())?;
    if let Err(e) = overlay.show() {
        capture.stop();
        return Err(e);
    }

    let source: Arc<dyn FrameSource> = capture.source();
    let started = build_detector(&cfg.detector)
        .and_then(|detector| {
            Pipeline::new(source, detector, overlay.clone(), cfg.pipeline_settings())
        })
        .and_then(|mut pipeline| pipeline.start().map(|()| pipeline));
    let mut pipeline = match started {
        Ok(pipeline) => pipeline,
        Err(e) => {
            overlay.hide();
            capture.stop();
            return Err(e);
        }
    };

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    match args.seconds {
        Some(seconds) => {
            log::info!("mosaicd running for {}s (Ctrl-C to stop early)", seconds);
            let _ = rx.recv_timeout(Duration::from_secs(seconds));
        }
        None => {
            log::info!("mosaicd running, waiting for shutdown signal (Ctrl-C)...");
            let _ = rx.recv();
        }
    }

    log::info!("shutting down...");
    pipeline.stop();
    overlay.hide();
    capture.stop();

    let stats = pipeline.stats();
    let capture_stats = capture.stats();
    log::info!(
        "processed {} frames ({} regions), captured {}, dropped {}",
        stats.frames_processed,
        stats.regions_published,
        capture_stats.frames_captured,
        capture_stats.frames_dropped
    );
    Ok(())
}

fn apply_args(cfg: &mut MosaicConfig, args: &Args) -> Result<()> {
    if let Some(detector) = &args.detector {
        cfg.detector.backend = detector.clone();
    }
    if let Some(overlay) = &args.overlay {
        cfg.overlay.backend = overlay.clone();
    }
    if let Some(targets) = &args.targets {
        cfg.mosaic.targets = split_targets(targets);
    }
    if let Some(strength) = args.strength {
        cfg.mosaic.strength = strength;
    }
    if let Some(conf) = args.conf_threshold {
        cfg.mosaic.conf_threshold = conf;
    }
    if let Some(max_age) = args.max_age {
        cfg.tracker.max_age = max_age;
    }
    if let Some(min_hits) = args.min_hits {
        cfg.tracker.min_hits = min_hits;
    }
    cfg.validate()
}
