//! Screen Mosaic
//!
//! This crate implements the real-time core of an on-screen censor: it takes
//! captured screen frames, runs an object detector, tracks detections across
//! frames, pixelates tracked target regions and publishes them to a
//! transparent overlay.
//!
//! # Architecture
//!
//! The pipeline holds five invariants:
//!
//! 1. **No Feedback**: the overlay surface is excluded from screen capture;
//!    the pipeline refuses to start against a surface that is not.
//! 2. **Latest Wins**: capture and overlay hand-offs are single slots; frames
//!    and publishes are dropped under load, never queued.
//! 3. **Fail Open**: a failing detector or stage passes the frame through
//!    unmodified; the processing loop never dies on a per-cycle error.
//! 4. **Stable Identity**: track ids are monotonic per tracker and never reused.
//! 5. **Captured Frames Are Immutable**: pixelation runs on a copy.
//!
//! # Module Structure
//!
//! - `frame`: Frame buffer and the latest-wins `FrameSlot`
//! - `ingest`: Capture backends and the capture thread
//! - `detect`: Detector backends and the class table
//! - `track`: IoU tracker
//! - `mosaic`: Region pixelation
//! - `overlay`: Presentation contract and built-in surfaces
//! - `pipeline`: Processing orchestrator
//! - `config`: File and environment configuration

use anyhow::{anyhow, Result};

pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod mosaic;
pub mod overlay;
pub mod pipeline;
pub mod shutdown;
pub mod track;

pub use config::MosaicConfig;
pub use detect::{BackendRegistry, ClassNames, Detection, DetectorBackend};
pub use frame::{Frame, FrameSlot, PixelFormat};
pub use geometry::{BBox, PixelRect};
pub use ingest::{CaptureBackend, CaptureLoop, FrameSource};
pub use mosaic::{MosaicEngine, MosaicOutput, Region, RegionPixels};
pub use overlay::{OverlaySurface, OverlayUpdate};
pub use pipeline::{Pipeline, PipelineSettings, PipelineStats};
pub use shutdown::{StopOutcome, StopSignal};
pub use track::{Track, TrackId, TrackState, Tracker, TrackerConfig};

/// Register every detector this build supports and take the configured one.
///
/// `cpu` keys on the synthetic screen's marker colours, `stub` returns no
/// detections, and `tract` (feature `backend-tract`) loads the ONNX model.
pub fn build_detector(cfg: &config::DetectorConfig) -> Result<Box<dyn DetectorBackend>> {
    let mut registry = BackendRegistry::new();
    registry.register(detect::MarkerBackend::default());
    registry.register(detect::ScriptedBackend::new());
    if cfg.backend == "tract" {
        register_model_backend(&mut registry, cfg)?;
    }

    if cfg.backend == "tract" && !registry.contains("tract") {
        return Err(anyhow!(
            "detector backend 'tract' requires building with --features backend-tract"
        ));
    }
    registry.take(&cfg.backend)
}

#[cfg(feature = "backend-tract")]
fn register_model_backend(registry: &mut BackendRegistry, cfg: &config::DetectorConfig) -> Result<()> {
    let backend = detect::backends::TractBackend::new(&cfg.model_path, cfg.input_size)?;
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model_backend(_registry: &mut BackendRegistry, _cfg: &config::DetectorConfig) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn detector_config(backend: &str) -> config::DetectorConfig {
        config::DetectorConfig {
            backend: backend.to_string(),
            model_path: PathBuf::from("missing.onnx"),
            input_size: 640,
        }
    }

    #[test]
    fn builds_builtin_detectors() {
        assert_eq!(build_detector(&detector_config("cpu")).unwrap().name(), "cpu");
        assert_eq!(build_detector(&detector_config("stub")).unwrap().name(), "stub");
    }

    #[test]
    fn unknown_detector_is_a_startup_error() {
        assert!(build_detector(&detector_config("yolo9000")).is_err());
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_without_feature_explains_itself() {
        let err = build_detector(&detector_config("tract")).err().unwrap();
        assert!(err.to_string().contains("backend-tract"));
    }
}
