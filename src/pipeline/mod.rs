//! Processing orchestrator.
//!
//! One thread runs frame -> detect -> track -> mosaic -> publish, one frame at
//! a time. The only input buffer is the frame source's latest-wins slot and the
//! only output is the overlay's latest-wins publish, so a slow detector drops
//! frames rather than queueing them.
//!
//! Stopping is cooperative: the loop checks its stop signal at the top of every
//! cycle and inside the idle sleep. `stop` waits a bounded time, logs a warning
//! if the loop did not exit, and clears the overlay either way.

mod cycle;
mod stats;

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::detect::{ClassNames, DetectorBackend, DEFAULT_TARGETS};
use crate::ingest::FrameSource;
use crate::mosaic::{clamp_strength, DEFAULT_STRENGTH};
use crate::overlay::OverlaySurface;
use crate::shutdown::{lock_unpoisoned, StopOutcome, Worker};
use crate::track::TrackerConfig;

pub use cycle::{CycleOutcome, CycleRunner};
pub use stats::{CycleStats, PipelineStats};

/// Runtime-tunable options. Applied between runs, never mid-cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Detections below this confidence are not offered to the tracker.
    pub conf_threshold: f32,
    /// Class names to censor.
    pub targets: Vec<String>,
    /// Mosaic block size, clamped to [5, 50].
    pub strength: u32,
    pub tracker: TrackerConfig,
    pub class_names: ClassNames,
    /// Whether each publish carries the processed frame and region pixels.
    pub publish_frame: bool,
    /// Sleep when no frame is available.
    pub idle_sleep: Duration,
    pub stop_timeout: Duration,
    /// Cycles kept for the rolling FPS figure.
    pub stats_window: usize,
    /// Log statistics every this many processed frames (0 disables).
    pub log_interval: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            conf_threshold: 0.5,
            targets: DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect(),
            strength: DEFAULT_STRENGTH,
            tracker: TrackerConfig::default(),
            class_names: ClassNames::default(),
            publish_frame: true,
            idle_sleep: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
            stats_window: 60,
            log_interval: 30,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            bail!("conf_threshold must be in [0, 1], got {}", self.conf_threshold);
        }
        if clamp_strength(self.strength) != self.strength {
            bail!("strength must be in [5, 50], got {}", self.strength);
        }
        if self.class_names.is_empty() {
            bail!("class table must not be empty");
        }
        if self.stats_window == 0 {
            bail!("stats_window must be > 0");
        }
        self.tracker.validate()
    }
}

pub struct Pipeline {
    source: Arc<dyn FrameSource>,
    overlay: Arc<dyn OverlaySurface>,
    runner: Arc<Mutex<CycleRunner>>,
    stats: Arc<Mutex<CycleStats>>,
    settings: PipelineSettings,
    worker: Option<Worker>,
    /// True while a processing thread exists, including one detached after a
    /// stop timeout.
    loop_alive: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        overlay: Arc<dyn OverlaySurface>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let stats = Arc::new(Mutex::new(CycleStats::new(
            settings.stats_window,
            settings.log_interval,
        )));
        let runner = CycleRunner::new(detector, &settings, Arc::clone(&stats));
        Ok(Self {
            source,
            overlay,
            runner: Arc::new(Mutex::new(runner)),
            stats,
            settings,
            worker: None,
            loop_alive: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn overlay(&self) -> &Arc<dyn OverlaySurface> {
        &self.overlay
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn stats(&self) -> PipelineStats {
        lock_unpoisoned(&self.stats).snapshot()
    }

    /// Start the processing loop.
    ///
    /// Fails without starting when the overlay is visible to capture, the
    /// detector cannot warm up, or a previous loop has not exited yet.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("pipeline is already running");
        }
        if self.loop_alive.load(Ordering::SeqCst) {
            bail!("previous processing loop has not exited yet");
        }
        if !self.overlay.capture_excluded() {
            bail!(
                "overlay {} is not excluded from screen capture; refusing to start",
                self.overlay.name()
            );
        }

        let detector = {
            let mut runner = lock_unpoisoned(&self.runner);
            runner.prepare()?;
            runner.detector_name()
        };

        let runner = Arc::clone(&self.runner);
        let source = Arc::clone(&self.source);
        let overlay = Arc::clone(&self.overlay);
        let idle_sleep = self.settings.idle_sleep;
        let alive = Arc::clone(&self.loop_alive);
        alive.store(true, Ordering::SeqCst);

        let worker = Worker::spawn("mosaic-process", move |stop| {
            let _alive = AliveGuard(alive);
            while !stop.is_raised() {
                let outcome = lock_unpoisoned(&runner).run_cycle(
                    source.as_ref(),
                    overlay.as_ref(),
                    &stop,
                );
                if outcome == CycleOutcome::Idle && stop.wait(idle_sleep) {
                    break;
                }
            }
            log::debug!("processing loop exited");
        });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.loop_alive.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.worker = Some(worker);
        log::info!(
            "pipeline started (detector={}, overlay={}, targets={:?}, strength={})",
            detector,
            self.overlay.name(),
            self.settings.targets,
            self.settings.strength
        );
        Ok(())
    }

    /// Signal the loop, wait up to `stop_timeout`, then clear the overlay.
    pub fn stop(&mut self) -> StopOutcome {
        let Some(worker) = self.worker.take() else {
            return StopOutcome::Joined;
        };
        let outcome = worker.stop(self.settings.stop_timeout);
        self.overlay.clear();
        let stats = self.stats();
        log::info!(
            "pipeline stopped ({:?}) after {} frames, {} detector failures",
            outcome,
            stats.frames_processed,
            stats.detector_failures
        );
        outcome
    }

    /// Replace targets, strength and thresholds. Only allowed while stopped.
    pub fn apply_settings(&mut self, settings: PipelineSettings) -> Result<()> {
        if self.is_running() || self.loop_alive.load(Ordering::SeqCst) {
            return Err(anyhow!("settings can only change while the pipeline is stopped"));
        }
        settings.validate()?;
        lock_unpoisoned(&self.runner).apply(&settings);
        self.settings = settings;
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(PipelineSettings::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let bad_conf = PipelineSettings {
            conf_threshold: 1.5,
            ..PipelineSettings::default()
        };
        assert!(bad_conf.validate().is_err());

        let bad_strength = PipelineSettings {
            strength: 4,
            ..PipelineSettings::default()
        };
        assert!(bad_strength.validate().is_err());

        let empty_classes = PipelineSettings {
            class_names: ClassNames::new(Vec::new()),
            ..PipelineSettings::default()
        };
        assert!(empty_classes.validate().is_err());
    }
}
