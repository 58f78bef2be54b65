use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BBox;
use crate::ingest::{rgb_frame, synthetic::default_markers};

/// Minimum matching pixels before a marker counts as present.
const MIN_MARKER_PIXELS: u32 = 16;

/// A solid colour that maps to a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorMarker {
    pub color: [u8; 3],
    pub class_id: u32,
}

/// CPU backend that finds solid colour markers.
///
/// Each marker colour yields at most one box: the bounds of every pixel that
/// matches the colour within `tolerance` per channel. Confidence is the fill
/// ratio of matching pixels inside that box, so a clean square scores 1.0.
/// Pairs with the synthetic screen to run the pipeline without a model.
pub struct MarkerBackend {
    markers: Vec<ColorMarker>,
    tolerance: u8,
}

impl MarkerBackend {
    pub fn new(markers: Vec<ColorMarker>) -> Self {
        Self {
            markers,
            tolerance: 0,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn matches(&self, pixel: &[u8], color: &[u8; 3]) -> bool {
        pixel
            .iter()
            .zip(color.iter())
            .all(|(p, c)| p.abs_diff(*c) <= self.tolerance)
    }
}

impl Default for MarkerBackend {
    fn default() -> Self {
        Self::new(
            default_markers()
                .into_iter()
                .map(|m| ColorMarker {
                    color: m.color,
                    class_id: m.class_id,
                })
                .collect(),
        )
    }
}

#[derive(Clone, Copy)]
struct Bounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    count: u32,
}

impl DetectorBackend for MarkerBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let rgb = rgb_frame(frame)?;
        let width = frame.width as usize;
        let mut bounds: Vec<Option<Bounds>> = vec![None; self.markers.len()];

        for (idx, pixel) in rgb.chunks_exact(3).enumerate() {
            let Some(marker_idx) = self
                .markers
                .iter()
                .position(|m| self.matches(pixel, &m.color))
            else {
                continue;
            };
            let x = (idx % width) as u32;
            let y = (idx / width) as u32;
            let entry = bounds[marker_idx].get_or_insert(Bounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                count: 0,
            });
            entry.min_x = entry.min_x.min(x);
            entry.min_y = entry.min_y.min(y);
            entry.max_x = entry.max_x.max(x);
            entry.max_y = entry.max_y.max(y);
            entry.count += 1;
        }

        let detections = self
            .markers
            .iter()
            .zip(bounds)
            .filter_map(|(marker, bounds)| {
                let b = bounds?;
                if b.count < MIN_MARKER_PIXELS {
                    return None;
                }
                let bbox = BBox::new(
                    b.min_x as f32,
                    b.min_y as f32,
                    (b.max_x + 1) as f32,
                    (b.max_y + 1) as f32,
                );
                let confidence = (b.count as f32 / bbox.area()).min(1.0);
                Some(Detection::new(bbox, marker.class_id, confidence))
            })
            .collect();
        Ok(detections)
    }
}
