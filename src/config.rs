use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{ClassNames, DEFAULT_CLASS_NAMES, DEFAULT_TARGETS};
use crate::ingest::CaptureSettings;
use crate::mosaic::{clamp_strength, DEFAULT_STRENGTH};
use crate::overlay::SurfaceSettings;
use crate::pipeline::PipelineSettings;
use crate::track::{TrackerConfig, DEFAULT_IOU_THRESHOLD};

const DEFAULT_CAPTURE_URL: &str = "stub://screen";
const DEFAULT_CAPTURE_FPS: u32 = 60;
const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
const DEFAULT_CAPTURE_HEIGHT: u32 = 720;
const DEFAULT_DETECTOR: &str = "cpu";
const DEFAULT_MODEL_PATH: &str = "resources/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_OVERLAY: &str = "headless";
const DEFAULT_OVERLAY_FPS: u32 = 30;
const DEFAULT_IDLE_SLEEP_MS: u64 = 10;
const DEFAULT_STOP_TIMEOUT_MS: u64 = 1000;
const DEFAULT_STATS_WINDOW: usize = 60;
const DEFAULT_LOG_INTERVAL: u64 = 30;
const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
const DEFAULT_MAX_AGE: u32 = 3;
const DEFAULT_MIN_HITS: u32 = 1;

#[derive(Debug, Deserialize, Default)]
struct MosaicConfigFile {
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    mosaic: Option<MosaicSectionFile>,
    tracker: Option<TrackerConfigFile>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    url: Option<String>,
    max_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    backend: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    publish_frame: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    idle_sleep_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
    stats_window: Option<usize>,
    log_interval: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MosaicSectionFile {
    strength: Option<u32>,
    targets: Option<Vec<String>>,
    conf_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    max_age: Option<u32>,
    min_hits: Option<u32>,
    iou_threshold: Option<f32>,
}

/// Daemon configuration: file, then defaults, then `MOSAIC_*` environment.
#[derive(Debug, Clone)]
pub struct MosaicConfig {
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
    pub overlay: OverlayConfig,
    pub pipeline: PipelineTiming,
    pub mosaic: MosaicOptions,
    pub tracker: TrackerConfig,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub url: String,
    pub max_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub backend: String,
    pub fps: u32,
    /// Surface size; `None` means the capture size.
    pub size: Option<(u32, u32)>,
    pub publish_frame: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineTiming {
    pub idle_sleep: Duration,
    pub stop_timeout: Duration,
    pub stats_window: usize,
    pub log_interval: u64,
}

#[derive(Debug, Clone)]
pub struct MosaicOptions {
    pub strength: u32,
    pub targets: Vec<String>,
    pub conf_threshold: f32,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self::from_file(MosaicConfigFile::default())
    }
}

impl MosaicConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MOSAIC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MosaicConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let mosaic = file.mosaic.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();

        Self {
            capture: CaptureConfig {
                url: capture
                    .url
                    .unwrap_or_else(|| DEFAULT_CAPTURE_URL.to_string()),
                max_fps: capture.max_fps.unwrap_or(DEFAULT_CAPTURE_FPS),
                width: capture.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            },
            detector: DetectorConfig {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            overlay: OverlayConfig {
                backend: overlay
                    .backend
                    .unwrap_or_else(|| DEFAULT_OVERLAY.to_string()),
                fps: overlay.fps.unwrap_or(DEFAULT_OVERLAY_FPS),
                size: overlay.width.zip(overlay.height),
                publish_frame: overlay.publish_frame.unwrap_or(true),
            },
            pipeline: PipelineTiming {
                idle_sleep: Duration::from_millis(
                    pipeline.idle_sleep_ms.unwrap_or(DEFAULT_IDLE_SLEEP_MS),
                ),
                stop_timeout: Duration::from_millis(
                    pipeline.stop_timeout_ms.unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
                ),
                stats_window: pipeline.stats_window.unwrap_or(DEFAULT_STATS_WINDOW),
                log_interval: pipeline.log_interval.unwrap_or(DEFAULT_LOG_INTERVAL),
            },
            mosaic: MosaicOptions {
                strength: mosaic.strength.unwrap_or(DEFAULT_STRENGTH),
                targets: mosaic
                    .targets
                    .unwrap_or_else(|| DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect()),
                conf_threshold: mosaic.conf_threshold.unwrap_or(DEFAULT_CONF_THRESHOLD),
            },
            tracker: TrackerConfig {
                max_age: tracker.max_age.unwrap_or(DEFAULT_MAX_AGE),
                min_hits: tracker.min_hits.unwrap_or(DEFAULT_MIN_HITS),
                iou_threshold: tracker.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
            class_names: file.class_names.unwrap_or_else(|| {
                DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
            }),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("MOSAIC_CAPTURE_URL") {
            self.capture.url = url;
        }
        if let Some(backend) = env_string("MOSAIC_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_string("MOSAIC_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(backend) = env_string("MOSAIC_OVERLAY") {
            self.overlay.backend = backend;
        }
        if let Ok(targets) = std::env::var("MOSAIC_TARGETS") {
            let parsed = split_targets(&targets);
            if !parsed.is_empty() {
                self.mosaic.targets = parsed;
            }
        }
        if let Some(strength) = env_parse("MOSAIC_STRENGTH", "an integer")? {
            self.mosaic.strength = strength;
        }
        if let Some(conf) = env_parse("MOSAIC_CONF_THRESHOLD", "a number in [0, 1]")? {
            self.mosaic.conf_threshold = conf;
        }
        if let Some(max_age) = env_parse("MOSAIC_MAX_AGE", "an integer number of cycles")? {
            self.tracker.max_age = max_age;
        }
        if let Some(min_hits) = env_parse("MOSAIC_MIN_HITS", "an integer number of cycles")? {
            self.tracker.min_hits = min_hits;
        }
        Ok(())
    }

    /// Check ranges. An out-of-range strength is clamped, not rejected.
    pub fn validate(&mut self) -> Result<()> {
        let clamped = clamp_strength(self.mosaic.strength);
        if clamped != self.mosaic.strength {
            log::warn!(
                "mosaic strength {} out of range, clamped to {}",
                self.mosaic.strength,
                clamped
            );
            self.mosaic.strength = clamped;
        }
        if !(0.0..=1.0).contains(&self.mosaic.conf_threshold) {
            return Err(anyhow!(
                "conf_threshold must be in [0, 1], got {}",
                self.mosaic.conf_threshold
            ));
        }
        self.tracker.validate()?;

        if self.capture.url.trim().is_empty() {
            return Err(anyhow!("capture url must not be empty"));
        }
        if self.capture.max_fps == 0 {
            return Err(anyhow!("capture max_fps must be > 0"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture size must be non-zero"));
        }
        if self.overlay.fps == 0 {
            return Err(anyhow!("overlay fps must be > 0"));
        }
        if let Some((w, h)) = self.overlay.size {
            if w == 0 || h == 0 {
                return Err(anyhow!("overlay size must be non-zero"));
            }
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector backend must not be empty"));
        }
        if self.overlay.backend.trim().is_empty() {
            return Err(anyhow!("overlay backend must not be empty"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be > 0"));
        }
        if self.class_names.is_empty() {
            return Err(anyhow!("class_names must not be empty"));
        }
        if self.pipeline.stats_window == 0 {
            return Err(anyhow!("pipeline stats_window must be > 0"));
        }
        for target in &self.mosaic.targets {
            if !self.class_names.iter().any(|name| name == target) {
                log::warn!("target '{}' is not in the class table and will never match", target);
            }
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            conf_threshold: self.mosaic.conf_threshold,
            targets: self.mosaic.targets.clone(),
            strength: self.mosaic.strength,
            tracker: self.tracker.clone(),
            class_names: ClassNames::new(self.class_names.clone()),
            publish_frame: self.overlay.publish_frame,
            idle_sleep: self.pipeline.idle_sleep,
            stop_timeout: self.pipeline.stop_timeout,
            stats_window: self.pipeline.stats_window,
            log_interval: self.pipeline.log_interval,
        }
    }

    pub fn surface_settings(&self) -> SurfaceSettings {
        SurfaceSettings {
            fps: self.overlay.fps,
            size: self.overlay.size,
            stop_timeout: self.pipeline.stop_timeout,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_fps: self.capture.max_fps,
            stop_timeout: self.pipeline.stop_timeout,
            ..CaptureSettings::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<MosaicConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: MosaicConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        None => Ok(None),
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_targets(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
