//! Captured frames and the single-slot hand-off between capture and processing.
//!
//! - `Frame`: pixel buffer plus capture metadata. Immutable once captured; the
//!   only mutable access is through an owned copy (`Frame::clone` then
//!   `pixels_mut`), so stages holding an `Arc<Frame>` never observe writes.
//! - `FrameSlot`: latest-wins cell shared between the capture thread and the
//!   orchestrator. Writers overwrite, readers take the newest frame or nothing.
//!   There is no queue behind it; an unread frame that gets overwritten is
//!   counted as dropped.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::ingest::FrameSource;

/// Pixel layout of a frame buffer. Both layouts are interleaved 8-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Native screen-grab layout on most platforms.
    Bgra32,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 => 4,
        }
    }
}

/// One captured image.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture-side sequence number (monotonic per source).
    pub sequence: u64,
    /// Monotonic capture instant.
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap a pixel buffer, validating its length against the dimensions.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self> {
        let expected = expected_len(width, height, format)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            format,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// A frame filled with one pixel value.
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != format.bytes_per_pixel() {
            return Err(anyhow!(
                "fill pixel has {} channels, {:?} needs {}",
                pixel.len(),
                format,
                format.bytes_per_pixel()
            ));
        }
        let count = (width as usize) * (height as usize);
        let pixels = pixel.repeat(count);
        Self::new(pixels, width, height, format, 0)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access. Only reachable on an owned frame, never through
    /// the `Arc<Frame>` handed out by a [`FrameSlot`].
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    /// Channel values of one pixel, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let offset = y as usize * self.stride() + x as usize * bpp;
        self.pixels.get(offset..offset + bpp)
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

fn expected_len(width: u32, height: u32, format: PixelFormat) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// FrameSlot: single-slot latest-wins hand-off
// ----------------------------------------------------------------------------

/// Latest-wins frame cell.
///
/// The capture thread calls [`FrameSlot::put`]; the orchestrator reads through
/// [`FrameSource::latest_frame`], which takes the newest unread frame. Frames
/// are swapped whole under the lock, so a reader never sees a partial frame.
#[derive(Debug, Default)]
pub struct FrameSlot {
    slot: Mutex<Option<Arc<Frame>>>,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, replacing any unread one. Returns true when an unread
    /// frame was overwritten.
    pub fn put(&self, frame: Frame) -> bool {
        let previous = match self.slot.lock() {
            Ok(mut guard) => guard.replace(Arc::new(frame)),
            Err(poisoned) => poisoned.into_inner().replace(Arc::new(frame)),
        };
        self.written.fetch_add(1, Ordering::Relaxed);
        let overwrote = previous.is_some();
        if overwrote {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        overwrote
    }

    /// Take the newest unread frame, leaving the slot empty.
    pub fn take(&self) -> Option<Arc<Frame>> {
        match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Whether an unread frame is waiting.
    pub fn has_frame(&self) -> bool {
        match self.slot.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Frames ever written.
    pub fn frames_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Frames overwritten before anyone read them.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSource for FrameSlot {
    fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.take()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
