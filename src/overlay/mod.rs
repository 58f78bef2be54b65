//! Presentation contract.
//!
//! The orchestrator publishes one `OverlayUpdate` per cycle to an
//! `OverlaySurface`. Surfaces render on their own thread at a fixed cadence,
//! always drawing the newest publish and skipping any they fell behind on.
//!
//! A surface must be excluded from screen capture before it is shown;
//! otherwise pixelated output would be captured and fed back into detection.
//! `Pipeline::start` refuses to run against a surface that reports otherwise.

mod render;
mod renderers;
mod scale;
mod slot;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::frame::Frame;
use crate::mosaic::Region;

pub use render::{DrawList, RenderStats, Renderer, ThreadedOverlay};
pub use renderers::{DrawRecord, HeadlessHandle, HeadlessRenderer, LogRenderer};
pub use scale::SurfaceScale;
pub use slot::PublishSlot;

/// Names accepted by [`select_surface`].
pub const SURFACE_BACKENDS: &[&str] = &["headless", "log"];

/// One processing cycle's output.
#[derive(Clone, Debug)]
pub struct OverlayUpdate {
    /// Processing cycle that produced this update.
    pub sequence: u64,
    /// Processed frame for display, when the surface shows full frames.
    pub frame: Option<Arc<Frame>>,
    /// Regions in source-frame pixels.
    pub regions: Vec<Region>,
    /// Size of the captured frame the regions refer to.
    pub source_size: (u32, u32),
}

/// Capability interface of a presentation surface.
pub trait OverlaySurface: Send + Sync {
    fn name(&self) -> &str;

    /// Create the surface and start rendering. Failure to create the surface
    /// is a startup error.
    fn show(&self) -> Result<()>;

    /// Stop rendering and remove drawn content.
    fn hide(&self);

    /// Replace the pending update. Never blocks on the render loop.
    fn publish(&self, update: OverlayUpdate);

    /// Drop the pending update and erase what is on screen. A rendering
    /// surface may erase on its next tick rather than before returning.
    fn clear(&self);

    /// Whether the surface is invisible to screen capture.
    fn capture_excluded(&self) -> bool;

    fn is_visible(&self) -> bool;
}

/// Settings shared by the built-in surfaces.
#[derive(Clone, Debug)]
pub struct SurfaceSettings {
    /// Render cadence.
    pub fps: u32,
    /// Surface size; `None` draws at source coordinates.
    pub size: Option<(u32, u32)>,
    pub stop_timeout: Duration,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            size: None,
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// Build a surface by backend name.
pub fn select_surface(backend: &str, settings: SurfaceSettings) -> Result<Arc<dyn OverlaySurface>> {
    match backend {
        "headless" => Ok(Arc::new(ThreadedOverlay::new(
            HeadlessRenderer::new(),
            settings,
        )?)),
        "log" => Ok(Arc::new(ThreadedOverlay::new(LogRenderer::new(), settings)?)),
        other => Err(anyhow!(
            "unknown overlay backend '{}'. available: {}",
            other,
            SURFACE_BACKENDS.join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_known_backends_only() {
        for name in SURFACE_BACKENDS {
            let surface = select_surface(name, SurfaceSettings::default()).unwrap();
            assert_eq!(surface.name(), *name);
            assert!(surface.capture_excluded());
        }
        let err = select_surface("win32", SurfaceSettings::default())
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("available: headless, log"));
    }
}
