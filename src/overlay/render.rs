use anyhow::{anyhow, bail, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{OverlaySurface, OverlayUpdate, PublishSlot, SurfaceScale, SurfaceSettings};
use crate::geometry::PixelRect;
use crate::shutdown::{lock_unpoisoned, StopSignal, Worker};

/// Drawing backend driven by [`ThreadedOverlay`].
pub trait Renderer: Send + 'static {
    fn name(&self) -> &'static str;

    /// Create the drawing surface. Called from `show`, on the caller's thread.
    fn prepare(&mut self, settings: &SurfaceSettings) -> Result<()>;

    /// Whether the prepared surface is excluded from screen capture.
    fn capture_excluded(&self) -> bool;

    /// Draw one frame of the render loop.
    fn draw(&mut self, list: &DrawList) -> Result<()>;

    /// Erase everything drawn.
    fn clear(&mut self);

    /// Tear down the surface after the render loop stopped.
    fn release(&mut self) {}
}

/// A publish mapped onto surface coordinates.
#[derive(Clone, Debug)]
pub struct DrawList {
    /// Slot generation this list was built from.
    pub generation: u64,
    pub update: Arc<OverlayUpdate>,
    pub scale: SurfaceScale,
    /// Region rectangles in surface pixels, same order as `update.regions`.
    pub rects: Vec<PixelRect>,
}

impl DrawList {
    pub fn new(generation: u64, update: Arc<OverlayUpdate>, surface: Option<(u32, u32)>) -> Self {
        let scale = SurfaceScale::between(update.source_size, surface);
        let rects = update
            .regions
            .iter()
            .map(|region| scale.apply(region.rect()))
            .collect();
        Self {
            generation,
            update,
            scale,
            rects,
        }
    }
}

/// Render loop counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Loop iterations that drew something.
    pub frames_rendered: u64,
    /// Distinct publishes that reached the screen.
    pub updates_drawn: u64,
    /// Publishes replaced before the loop got to them.
    pub updates_skipped: u64,
    pub draw_errors: u64,
}

/// An [`OverlaySurface`] that renders on its own thread at a fixed cadence.
///
/// `publish` only swaps the pending update; each render tick draws whatever is
/// newest, so a slow renderer drops intermediate publishes instead of queueing
/// them. While shown, only the render thread touches the renderer; `clear`
/// goes through the slot like a publish.
pub struct ThreadedOverlay<R: Renderer> {
    name: &'static str,
    renderer: Arc<Mutex<R>>,
    slot: Arc<PublishSlot>,
    settings: SurfaceSettings,
    stats: Arc<Mutex<RenderStats>>,
    worker: Mutex<Option<Worker>>,
}

impl<R: Renderer> ThreadedOverlay<R> {
    pub fn new(renderer: R, settings: SurfaceSettings) -> Result<Self> {
        if settings.fps == 0 {
            return Err(anyhow!("overlay fps must be > 0"));
        }
        if let Some((w, h)) = settings.size {
            if w == 0 || h == 0 {
                return Err(anyhow!("overlay surface size must be non-zero, got {}x{}", w, h));
            }
        }
        Ok(Self {
            name: renderer.name(),
            renderer: Arc::new(Mutex::new(renderer)),
            slot: Arc::new(PublishSlot::new()),
            settings,
            stats: Arc::new(Mutex::new(RenderStats::default())),
            worker: Mutex::new(None),
        })
    }

    pub fn stats(&self) -> RenderStats {
        *lock_unpoisoned(&self.stats)
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }
}

impl<R: Renderer> OverlaySurface for ThreadedOverlay<R> {
    fn name(&self) -> &str {
        self.name
    }

    fn show(&self) -> Result<()> {
        let mut worker = lock_unpoisoned(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        {
            let mut renderer = lock_unpoisoned(&self.renderer);
            renderer
                .prepare(&self.settings)
                .with_context(|| format!("failed to create {} overlay surface", self.name))?;
            if !renderer.capture_excluded() {
                renderer.release();
                bail!(
                    "{} overlay is not excluded from screen capture; refusing to show it",
                    self.name
                );
            }
        }

        let renderer = Arc::clone(&self.renderer);
        let slot = Arc::clone(&self.slot);
        let stats = Arc::clone(&self.stats);
        let fps = self.settings.fps;
        let surface = self.settings.size;
        let name = self.name;
        let spawned = Worker::spawn("mosaic-render", move |stop| {
            render_loop(name, stop, renderer, slot, stats, fps, surface)
        })?;
        *worker = Some(spawned);
        log::info!(
            "overlay {} shown at {} fps ({})",
            self.name,
            fps,
            match surface {
                Some((w, h)) => format!("{}x{}", w, h),
                None => "source size".to_string(),
            }
        );
        Ok(())
    }

    fn hide(&self) {
        let worker = lock_unpoisoned(&self.worker).take();
        if let Some(worker) = worker {
            worker.stop(self.settings.stop_timeout);
            let mut renderer = lock_unpoisoned(&self.renderer);
            renderer.clear();
            renderer.release();
            log::info!("overlay {} hidden", self.name);
        }
    }

    fn publish(&self, update: OverlayUpdate) {
        self.slot.publish(update);
    }

    fn clear(&self) {
        // The render thread erases the surface when it sees the cleared slot.
        self.slot.clear();
    }

    fn capture_excluded(&self) -> bool {
        lock_unpoisoned(&self.renderer).capture_excluded()
    }

    fn is_visible(&self) -> bool {
        lock_unpoisoned(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }
}

impl<R: Renderer> Drop for ThreadedOverlay<R> {
    fn drop(&mut self) {
        self.hide();
    }
}

fn render_loop<R: Renderer>(
    name: &'static str,
    stop: StopSignal,
    renderer: Arc<Mutex<R>>,
    slot: Arc<PublishSlot>,
    stats: Arc<Mutex<RenderStats>>,
    fps: u32,
    surface: Option<(u32, u32)>,
) {
    let frame_budget = Duration::from_secs_f64(1.0 / fps as f64);
    let mut seen = 0u64;
    let mut current: Option<DrawList> = None;
    let mut window_start = Instant::now();
    let mut window_frames = 0u32;

    while !stop.is_raised() {
        let tick = Instant::now();

        if let Some((generation, update)) = slot.changed_since(seen) {
            let skipped = generation - seen - 1;
            seen = generation;
            current = update.map(|u| DrawList::new(generation, u, surface));
            if current.is_none() {
                lock_unpoisoned(&renderer).clear();
            }
            let mut stats = lock_unpoisoned(&stats);
            stats.updates_skipped += skipped;
            if current.is_some() {
                stats.updates_drawn += 1;
            }
        }

        if let Some(list) = current.as_ref() {
            let result = lock_unpoisoned(&renderer).draw(list);
            let mut stats = lock_unpoisoned(&stats);
            match result {
                Ok(()) => stats.frames_rendered += 1,
                Err(e) => {
                    stats.draw_errors += 1;
                    log::warn!("overlay {}: draw failed: {:#}", name, e);
                }
            }
        }

        window_frames += 1;
        if window_frames >= fps {
            let elapsed = window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                log::debug!("overlay {}: {:.1} fps", name, window_frames as f64 / elapsed);
            }
            window_start = Instant::now();
            window_frames = 0;
        }

        let spent = tick.elapsed();
        if spent < frame_budget && stop.wait(frame_budget - spent) {
            break;
        }
    }
}
