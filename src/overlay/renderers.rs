//! Built-in renderers.
//!
//! Neither draws to a display: `headless` records what it was asked to draw,
//! `log` writes each new region set to the log. Both are trivially excluded
//! from screen capture since nothing reaches the screen.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use super::{DrawList, Renderer, SurfaceSettings};
use crate::geometry::PixelRect;
use crate::shutdown::lock_unpoisoned;

/// What the headless renderer last drew.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub generation: u64,
    pub sequence: u64,
    pub rects: Vec<PixelRect>,
    pub labels: Vec<String>,
    pub with_frame: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    prepared: bool,
    draws: u64,
    clears: u64,
    last: Option<DrawRecord>,
}

/// Read side of a [`HeadlessRenderer`], usable after the renderer moved into
/// a surface.
#[derive(Clone, Debug)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHandle {
    pub fn draws(&self) -> u64 {
        lock_unpoisoned(&self.state).draws
    }

    pub fn clears(&self) -> u64 {
        lock_unpoisoned(&self.state).clears
    }

    pub fn last(&self) -> Option<DrawRecord> {
        lock_unpoisoned(&self.state).last.clone()
    }

    pub fn is_prepared(&self) -> bool {
        lock_unpoisoned(&self.state).prepared
    }
}

#[derive(Debug)]
pub struct HeadlessRenderer {
    state: Arc<Mutex<HeadlessState>>,
    capture_excluded: bool,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState::default())),
            capture_excluded: true,
        }
    }

    /// Pretend the surface is (or is not) hidden from capture.
    pub fn with_capture_excluded(mut self, excluded: bool) -> Self {
        self.capture_excluded = excluded;
        self
    }

    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for HeadlessRenderer {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn prepare(&mut self, _settings: &SurfaceSettings) -> Result<()> {
        lock_unpoisoned(&self.state).prepared = true;
        Ok(())
    }

    fn capture_excluded(&self) -> bool {
        self.capture_excluded
    }

    fn draw(&mut self, list: &DrawList) -> Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.draws += 1;
        if state.last.as_ref().map(|r| r.generation) != Some(list.generation) {
            state.last = Some(DrawRecord {
                generation: list.generation,
                sequence: list.update.sequence,
                rects: list.rects.clone(),
                labels: list.update.regions.iter().map(|r| r.label.clone()).collect(),
                with_frame: list.update.frame.is_some(),
            });
        }
        Ok(())
    }

    fn clear(&mut self) {
        let mut state = lock_unpoisoned(&self.state);
        state.clears += 1;
        state.last = None;
    }

    fn release(&mut self) {
        lock_unpoisoned(&self.state).prepared = false;
    }
}

/// Logs every new region set at debug level.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_generation: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for LogRenderer {
    fn name(&self) -> &'static str {
        "log"
    }

    fn prepare(&mut self, settings: &SurfaceSettings) -> Result<()> {
        log::info!("log overlay ready, {} fps", settings.fps);
        Ok(())
    }

    fn capture_excluded(&self) -> bool {
        true
    }

    fn draw(&mut self, list: &DrawList) -> Result<()> {
        if list.generation == self.last_generation {
            return Ok(());
        }
        self.last_generation = list.generation;
        let regions: Vec<String> = list
            .update
            .regions
            .iter()
            .zip(&list.rects)
            .map(|(region, rect)| {
                format!("{}@{},{} {}x{}", region.label, rect.x, rect.y, rect.w, rect.h)
            })
            .collect();
        log::debug!(
            "overlay: cycle {} regions [{}]",
            list.update.sequence,
            regions.join(", ")
        );
        Ok(())
    }

    fn clear(&mut self) {
        log::debug!("overlay: cleared");
    }
}
