//! Box geometry shared by detection, tracking and mosaic stages.
//!
//! Boxes are carried as `(x1, y1, x2, y2)` floats in source-frame pixel space.
//! Integer pixel rectangles are only produced at the mosaic boundary, after
//! clamping to the frame.

use serde::{Deserialize, Serialize};

/// Added to the IoU denominator so two degenerate boxes never divide by zero.
pub const IOU_EPSILON: f32 = 1e-6;

/// Axis-aligned box, corners in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area, treating inverted boxes as empty.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union. Symmetric; 1.0 for identical non-empty boxes,
    /// 0.0 for disjoint ones.
    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        intersection / (union + IOU_EPSILON)
    }

    /// Per-edge difference `self - earlier`.
    pub fn edge_delta(&self, earlier: &BBox) -> BBox {
        BBox {
            x1: self.x1 - earlier.x1,
            y1: self.y1 - earlier.y1,
            x2: self.x2 - earlier.x2,
            y2: self.y2 - earlier.y2,
        }
    }

    /// Shift every edge by `delta * factor`.
    pub fn shifted(&self, delta: &BBox, factor: f32) -> BBox {
        BBox {
            x1: self.x1 + delta.x1 * factor,
            y1: self.y1 + delta.y1 * factor,
            x2: self.x2 + delta.x2 * factor,
            y2: self.y2 + delta.y2 * factor,
        }
    }

    /// Clamp all edges into the frame. The box spans the half-open pixel range
    /// `[x1, x2)`, so `x2 == width` still addresses only pixels inside the frame.
    pub fn clamped(&self, width: u32, height: u32) -> BBox {
        let w = width as f32;
        let h = height as f32;
        BBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Integer rectangle inside a `width x height` frame, or `None` when the
    /// clamped box has no pixels.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        let clamped = self.clamped(width, height);
        let x1 = clamped.x1.floor() as u32;
        let y1 = clamped.y1.floor() as u32;
        let x2 = clamped.x2.floor() as u32;
        let y2 = clamped.y2.floor() as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        })
    }
}

/// Integer rectangle in frame pixels. Always non-empty when produced by
/// [`BBox::to_pixel_rect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
}
