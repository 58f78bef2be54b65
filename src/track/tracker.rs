use anyhow::{anyhow, Result};

use super::track::{Track, TrackId};
use crate::detect::Detection;

/// Minimum IoU for a detection to continue a track (strictly greater than).
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

/// Fraction of the last observed velocity applied per predicted cycle.
pub const PREDICTION_DAMPING: f32 = 0.5;

/// Tracker thresholds.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// A track is deleted once `miss_count > max_age`.
    pub max_age: u32,
    /// A track is rendered once `hit_count >= min_hits`.
    pub min_hits: u32,
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 3,
            min_hits: 1,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(anyhow!(
                "iou_threshold must be in (0, 1], got {}",
                self.iou_threshold
            ));
        }
        Ok(())
    }
}

/// Greedy IoU multi-object tracker.
///
/// Each `update` runs one cycle: predict every track, associate detections
/// first-fit in track-creation order, update matches, spawn tracks for
/// leftovers, then settle states and drop tracks past `max_age`.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
    bounds: Option<(u32, u32)>,
    cycles: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            bounds: None,
            cycles: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Change thresholds. Existing tracks keep their counters.
    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    /// Frame size used to clamp every stored box. `None` disables clamping.
    pub fn set_frame_bounds(&mut self, bounds: Option<(u32, u32)>) {
        self.bounds = bounds;
    }

    /// All active tracks (any state), in creation order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Drop all active tracks. The id counter keeps counting, so ids issued
    /// after a reset never collide with earlier ones.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    /// Run one tracking cycle and return the tracks eligible for rendering.
    ///
    /// With no detections only prediction and aging run, and nothing is
    /// returned for that cycle.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        self.cycles += 1;
        let damping = PREDICTION_DAMPING;
        for track in &mut self.tracks {
            track.predict(damping);
        }
        self.clamp_tracks();

        if detections.is_empty() {
            self.settle();
            return Vec::new();
        }

        let detections: Vec<Detection> = detections
            .iter()
            .map(|d| self.clamp_detection(d))
            .collect();

        let iou_threshold = self.config.iou_threshold;
        let mut detection_used = vec![false; detections.len()];
        for track in &mut self.tracks {
            let matched = detections.iter().enumerate().find(|(idx, det)| {
                !detection_used[*idx] && det.bbox.iou(&track.bbox) > iou_threshold
            });
            if let Some((idx, det)) = matched {
                detection_used[idx] = true;
                track.hit(det);
            }
        }

        for (det, used) in detections.iter().zip(detection_used) {
            if !used {
                let id = self.next_id;
                self.next_id += 1;
                log::debug!("tracker: new track {} class {}", id, det.class_id);
                self.tracks.push(Track::spawn(id, det));
            }
        }

        self.settle();

        let min_hits = self.config.min_hits;
        self.tracks
            .iter()
            .filter(|t| t.is_established() && t.hit_count >= min_hits)
            .cloned()
            .collect()
    }

    fn settle(&mut self) {
        let min_hits = self.config.min_hits;
        let max_age = self.config.max_age;
        for track in &mut self.tracks {
            track.refresh_state(min_hits);
        }
        self.tracks.retain(|t| {
            let keep = t.miss_count <= max_age;
            if !keep {
                log::debug!("tracker: track {} aged out after {} misses", t.id, t.miss_count);
            }
            keep
        });
    }

    fn clamp_tracks(&mut self) {
        if let Some((w, h)) = self.bounds {
            for track in &mut self.tracks {
                track.bbox = track.bbox.clamped(w, h);
            }
        }
    }

    fn clamp_detection(&self, detection: &Detection) -> Detection {
        match self.bounds {
            Some((w, h)) => Detection {
                bbox: detection.bbox.clamped(w, h),
                ..*detection
            },
            None => *detection,
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
