use anyhow::{anyhow, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::stats::CycleStats;
use super::PipelineSettings;
use crate::detect::{filter_confident, Detection, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::mosaic::{MosaicEngine, Region};
use crate::overlay::{OverlaySurface, OverlayUpdate};
use crate::shutdown::{lock_unpoisoned, StopSignal};
use crate::track::Tracker;

/// What one call to [`CycleRunner::run_cycle`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No frame was available; nothing ran and no counter moved.
    Idle,
    /// Frame processed and published with this many regions.
    Processed { regions: usize },
    /// A stage failed; the unmodified frame was published without regions.
    PassedThrough,
    /// Stop was raised while the frame was in flight; nothing was published.
    Discarded,
}

/// Detect, track, mosaic and publish for one frame at a time.
///
/// Owns every piece of per-cycle state; the processing thread is the only
/// caller while the pipeline runs.
pub struct CycleRunner {
    detector: Box<dyn DetectorBackend>,
    tracker: Tracker,
    mosaic: MosaicEngine,
    conf_threshold: f32,
    publish_frame: bool,
    stats: Arc<Mutex<CycleStats>>,
    sequence: u64,
}

impl CycleRunner {
    pub fn new(
        detector: Box<dyn DetectorBackend>,
        settings: &PipelineSettings,
        stats: Arc<Mutex<CycleStats>>,
    ) -> Self {
        let mut runner = Self {
            detector,
            tracker: Tracker::new(settings.tracker.clone()),
            mosaic: MosaicEngine::default(),
            conf_threshold: settings.conf_threshold,
            publish_frame: settings.publish_frame,
            stats,
            sequence: 0,
        };
        runner.apply(settings);
        runner
    }

    /// Take new thresholds, targets and strength. Tracks are kept.
    pub fn apply(&mut self, settings: &PipelineSettings) {
        self.tracker.set_config(settings.tracker.clone());
        self.mosaic.set_class_names(settings.class_names.clone());
        self.mosaic.set_targets(settings.targets.iter().cloned());
        self.mosaic.set_strength(settings.strength);
        self.mosaic.set_keep_pixels(settings.publish_frame);
        self.conf_threshold = settings.conf_threshold;
        self.publish_frame = settings.publish_frame;
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn mosaic(&self) -> &MosaicEngine {
        &self.mosaic
    }

    /// Prepare for a fresh run: warm the detector and forget old tracks.
    pub fn prepare(&mut self) -> Result<()> {
        self.detector.warm_up().map_err(|e| {
            anyhow!("detector {} failed to warm up: {:#}", self.detector.name(), e)
        })?;
        self.tracker.reset();
        lock_unpoisoned(&self.stats).reset_window();
        Ok(())
    }

    /// Pull the newest frame and, if there is one, process and publish it.
    ///
    /// Detection can outlast a stop timeout, so `stop` is checked again before
    /// publishing; a stopped pipeline never writes to the overlay.
    pub fn run_cycle(
        &mut self,
        source: &dyn FrameSource,
        overlay: &dyn OverlaySurface,
        stop: &StopSignal,
    ) -> CycleOutcome {
        let Some(frame) = source.latest_frame() else {
            return CycleOutcome::Idle;
        };
        let started = Instant::now();
        let (update, outcome) = self.process(frame);
        if stop.is_raised() {
            log::debug!("cycle {}: stopped mid-cycle, result discarded", update.sequence);
            return CycleOutcome::Discarded;
        }
        overlay.publish(update);
        let regions = match outcome {
            CycleOutcome::Processed { regions } => regions,
            _ => 0,
        };
        lock_unpoisoned(&self.stats).record(started.elapsed(), regions);
        outcome
    }

    /// Run detect, track and mosaic on one frame. Never fails: any stage error
    /// yields the original frame with no regions.
    pub fn process(&mut self, frame: Arc<Frame>) -> (OverlayUpdate, CycleOutcome) {
        self.sequence += 1;
        self.tracker
            .set_frame_bounds(Some((frame.width, frame.height)));

        let detections = match self.detect(&frame) {
            Ok(detections) => filter_confident(detections, self.conf_threshold),
            Err(e) => {
                log::warn!("cycle {}: detection failed, passing frame through: {:#}", self.sequence, e);
                lock_unpoisoned(&self.stats).record_detector_failure();
                // Tracks still age through the gap.
                self.tracker.update(&[]);
                return (self.pass_through(&frame), CycleOutcome::PassedThrough);
            }
        };
        log::debug!(
            "cycle {}: {} detections above {:.2}, frame age {} ms",
            self.sequence,
            detections.len(),
            self.conf_threshold,
            frame.age_ms()
        );

        let tracker = &mut self.tracker;
        let mosaic = &self.mosaic;
        let staged = panic::catch_unwind(AssertUnwindSafe(|| {
            let tracks = tracker.update(&detections);
            mosaic.apply(&frame, &tracks)
        }));
        match staged {
            Ok(output) => {
                let regions = output.regions.len();
                let update = OverlayUpdate {
                    sequence: self.sequence,
                    frame: self.publish_frame.then(|| Arc::new(output.frame)),
                    regions: output.regions,
                    source_size: (frame.width, frame.height),
                };
                (update, CycleOutcome::Processed { regions })
            }
            Err(payload) => {
                log::warn!(
                    "cycle {}: tracking/mosaic panicked, passing frame through: {}",
                    self.sequence,
                    panic_message(payload.as_ref())
                );
                lock_unpoisoned(&self.stats).record_stage_failure();
                (self.pass_through(&frame), CycleOutcome::PassedThrough)
            }
        }
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detector = &mut self.detector;
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame))) {
            Ok(result) => result,
            Err(payload) => Err(anyhow!(
                "detector {} panicked: {}",
                self.detector.name(),
                panic_message(payload.as_ref())
            )),
        }
    }

    fn pass_through(&self, frame: &Arc<Frame>) -> OverlayUpdate {
        OverlayUpdate {
            sequence: self.sequence,
            frame: self.publish_frame.then(|| Arc::clone(frame)),
            regions: Vec::<Region>::new(),
            source_size: (frame.width, frame.height),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
