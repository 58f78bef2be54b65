//! Frame ingestion.
//!
//! This module provides the capture side of the pipeline:
//! - `FrameSource`: what the orchestrator reads from (non-blocking, latest-or-none)
//! - `CaptureBackend`: a screen/window grabber that produces frames on demand
//! - `CaptureLoop`: the capture thread that polls a backend into a `FrameSlot`
//! - Synthetic `stub://` screen (testing and model-free runs)
//!
//! The capture thread is the only writer of its slot. It never blocks on the
//! reader: a frame that is not picked up before the next grab is overwritten.
//!
//! Capture backends MUST NOT include the overlay surface in their output. The
//! overlay side guarantees this through its capture-exclusion attributes; see
//! `overlay::OverlaySurface::capture_excluded`.

mod normalize;
pub mod synthetic;

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::frame::{Frame, FrameSlot};
use crate::shutdown::{StopOutcome, Worker};

pub use normalize::{normalize_to_rgb, rgb_frame};
pub use synthetic::{MarkerSpec, SyntheticConfig, SyntheticScreen};

/// Read side of capture, as seen by the orchestrator.
pub trait FrameSource: Send + Sync {
    /// Most recent captured frame not yet handed out, or `None`.
    /// Never blocks; absence is the only failure signal.
    fn latest_frame(&self) -> Option<Arc<Frame>>;
}

/// A capture primitive (screen, window, synthetic).
pub trait CaptureBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Acquire the capture resource. Failure here is a startup error.
    fn connect(&mut self) -> Result<()>;

    /// Grab one frame. `Ok(None)` means nothing new is available yet.
    fn grab(&mut self) -> Result<Option<Frame>>;

    /// Whether the backend is currently producing frames.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Open a capture backend from a source URL.
pub fn open_backend(url: &str, width: u32, height: u32) -> Result<Box<dyn CaptureBackend>> {
    if url.trim().is_empty() {
        return Err(anyhow!("capture url must not be empty"));
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticScreen::new(SyntheticConfig {
            label: url.to_string(),
            width,
            height,
            ..SyntheticConfig::default()
        })?));
    }
    Err(anyhow!(
        "no capture backend available for '{}' (only stub:// is built in)",
        url
    ))
}

/// Capture loop settings.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    /// Upper bound on grabs per second.
    pub max_fps: u32,
    /// Back-off after a failed grab.
    pub retry_delay: Duration,
    /// Bounded join used by `stop`.
    pub stop_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_fps: 60,
            retry_delay: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// Statistics for a capture loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub grab_errors: u64,
    pub healthy: bool,
}

#[derive(Debug, Default)]
struct SharedCaptureState {
    grab_errors: u64,
    healthy: bool,
}

/// Capture thread driving a backend into a latest-wins slot.
pub struct CaptureLoop {
    backend: Option<Box<dyn CaptureBackend>>,
    backend_name: &'static str,
    settings: CaptureSettings,
    slot: Arc<FrameSlot>,
    state: Arc<Mutex<SharedCaptureState>>,
    worker: Option<Worker>,
}

impl CaptureLoop {
    pub fn new(backend: Box<dyn CaptureBackend>, settings: CaptureSettings) -> Self {
        let backend_name = backend.name();
        Self {
            backend: Some(backend),
            backend_name,
            settings,
            slot: Arc::new(FrameSlot::new()),
            state: Arc::new(Mutex::new(SharedCaptureState::default())),
            worker: None,
        }
    }

    /// The read side handed to the orchestrator.
    pub fn source(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Connect the backend and start the capture thread.
    ///
    /// Connection failure is returned to the caller; the loop is not started
    /// half-initialized.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(anyhow!("capture loop already started"));
        }
        if self.settings.max_fps == 0 {
            return Err(anyhow!("capture max_fps must be >= 1"));
        }
        let mut backend = self
            .backend
            .take()
            .ok_or_else(|| anyhow!("capture backend already consumed by a previous run"))?;
        backend
            .connect()
            .with_context(|| format!("failed to connect capture backend {}", backend.name()))?;
        log::info!("capture: connected {} backend", backend.name());

        if let Ok(mut state) = self.state.lock() {
            state.healthy = true;
        }

        let slot = self.slot.clone();
        let state = self.state.clone();
        let settings = self.settings.clone();
        let worker = Worker::spawn("mosaic-capture", move |stop| {
            let frame_budget = Duration::from_secs_f64(1.0 / settings.max_fps as f64);
            while !stop.is_raised() {
                let started = Instant::now();
                match backend.grab() {
                    Ok(Some(frame)) => {
                        slot.put(frame);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        log::warn!("capture: grab failed: {}", err);
                        if let Ok(mut state) = state.lock() {
                            state.grab_errors += 1;
                            state.healthy = backend.is_healthy();
                        }
                        if stop.wait(settings.retry_delay) {
                            break;
                        }
                        continue;
                    }
                }
                if let Ok(mut state) = state.lock() {
                    state.healthy = backend.is_healthy();
                }
                let elapsed = started.elapsed();
                if elapsed < frame_budget && stop.wait(frame_budget - elapsed) {
                    break;
                }
            }
            if let Ok(mut state) = state.lock() {
                state.healthy = false;
            }
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the capture thread (bounded join).
    pub fn stop(&mut self) -> StopOutcome {
        match self.worker.take() {
            Some(worker) => {
                let outcome = worker.stop(self.settings.stop_timeout);
                log::info!("capture: {} backend stopped ({:?})", self.backend_name, outcome);
                outcome
            }
            None => StopOutcome::Joined,
        }
    }

    pub fn stats(&self) -> CaptureStats {
        let (grab_errors, healthy) = match self.state.lock() {
            Ok(state) => (state.grab_errors, state.healthy),
            Err(_) => (0, false),
        };
        CaptureStats {
            frames_captured: self.slot.frames_written(),
            frames_dropped: self.slot.frames_dropped(),
            grab_errors,
            healthy,
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    struct FailingConnect;

    impl CaptureBackend for FailingConnect {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn connect(&mut self) -> Result<()> {
            Err(anyhow!("display unavailable"))
        }

        fn grab(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }
    }

    struct CountingBackend {
        next: u64,
    }

    impl CaptureBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn grab(&mut self) -> Result<Option<Frame>> {
            self.next += 1;
            Ok(Some(Frame::filled(2, 2, PixelFormat::Rgb24, &[0, 0, 0])?.with_sequence(self.next)))
        }
    }

    #[test]
    fn connect_failure_is_a_startup_error() {
        let mut capture = CaptureLoop::new(Box::new(FailingConnect), CaptureSettings::default());
        let err = capture.start().unwrap_err();
        assert!(format!("{:#}", err).contains("display unavailable"));
        assert!(!capture.is_running());
    }

    #[test]
    fn capture_loop_fills_slot_and_stops() {
        let mut capture = CaptureLoop::new(
            Box::new(CountingBackend { next: 0 }),
            CaptureSettings {
                max_fps: 500,
                ..CaptureSettings::default()
            },
        );
        let source = capture.source();
        capture.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = None;
        while seen.is_none() && Instant::now() < deadline {
            seen = source.latest_frame();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(seen.is_some());
        assert_eq!(capture.stop(), StopOutcome::Joined);
        assert!(capture.stats().frames_captured >= 1);
        assert!(!capture.stats().healthy);
    }

    #[test]
    fn unknown_url_scheme_is_rejected() {
        assert!(open_backend("dxgi://0", 640, 480).is_err());
        assert!(open_backend("", 640, 480).is_err());
        assert!(open_backend("stub://screen", 64, 48).is_ok());
    }
}
