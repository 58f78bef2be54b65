use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// One raw detector output. Scoped to a single detection cycle; carries no
/// identity across cycles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in frame pixel coordinates.
    pub bbox: BBox,
    pub class_id: u32,
    /// Score in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }
}

/// Keep detections scoring at or above `threshold`, preserving order.
pub fn filter_confident(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence.is_finite() && d.confidence >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_filter_keeps_order_and_threshold() {
        let dets = vec![
            Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 0, 0.9),
            Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 1, 0.49),
            Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 2, 0.5),
            Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 3, f32::NAN),
        ];
        let kept = filter_confident(dets, 0.5);
        let classes: Vec<u32> = kept.iter().map(|d| d.class_id).collect();
        assert_eq!(classes, vec![0, 2]);
    }
}
