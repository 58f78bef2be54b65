use std::collections::VecDeque;
use std::time::Duration;

/// Snapshot of the processing loop counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    /// Cycles where the detector returned an error or panicked.
    pub detector_failures: u64,
    /// Cycles where tracking or mosaic panicked.
    pub stage_failures: u64,
    pub regions_published: u64,
    /// Cycles per second over the rolling window.
    pub fps: f64,
    pub mean_cycle_ms: f64,
}

/// Rolling cycle timing. Observability only; nothing reads it for control.
#[derive(Debug)]
pub struct CycleStats {
    window: VecDeque<Duration>,
    capacity: usize,
    window_total: Duration,
    log_interval: u64,
    frames_processed: u64,
    detector_failures: u64,
    stage_failures: u64,
    regions_published: u64,
}

impl CycleStats {
    pub fn new(capacity: usize, log_interval: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            window_total: Duration::ZERO,
            log_interval,
            frames_processed: 0,
            detector_failures: 0,
            stage_failures: 0,
            regions_published: 0,
        }
    }

    /// Record one processed frame.
    pub fn record(&mut self, duration: Duration, regions: usize) {
        if self.window.len() == self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.window_total = self.window_total.saturating_sub(oldest);
            }
        }
        self.window.push_back(duration);
        self.window_total += duration;
        self.frames_processed += 1;
        self.regions_published += regions as u64;

        if self.log_interval > 0 && self.frames_processed % self.log_interval == 0 {
            log::info!(
                "pipeline: {} frames, {:.1} fps, {:.1} ms/cycle, {} detector failures",
                self.frames_processed,
                self.fps(),
                self.mean_cycle_ms(),
                self.detector_failures
            );
        }
    }

    pub fn record_detector_failure(&mut self) {
        self.detector_failures += 1;
    }

    pub fn record_stage_failure(&mut self) {
        self.stage_failures += 1;
    }

    /// Forget the timing window; totals are kept.
    pub fn reset_window(&mut self) {
        self.window.clear();
        self.window_total = Duration::ZERO;
    }

    pub fn fps(&self) -> f64 {
        let secs = self.window_total.as_secs_f64();
        if self.window.is_empty() || secs <= 0.0 {
            0.0
        } else {
            self.window.len() as f64 / secs
        }
    }

    pub fn mean_cycle_ms(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.window_total.as_secs_f64() * 1000.0 / self.window.len() as f64
        }
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_processed: self.frames_processed,
            detector_failures: self.detector_failures,
            stage_failures: self.stage_failures,
            regions_published: self.regions_published,
            fps: self.fps(),
            mean_cycle_ms: self.mean_cycle_ms(),
        }
    }
}
