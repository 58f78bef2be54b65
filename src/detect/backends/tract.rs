#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, imageops::FilterType, ImageBuffer, Rgb};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BBox;
use crate::ingest::rgb_frame;

/// Proposals scoring below this never leave the backend. Deliberately low:
/// the pipeline applies the user-facing confidence threshold.
const MIN_PROPOSAL_SCORE: f32 = 0.05;

/// Overlap above which a lower-scoring box of the same class is suppressed.
const NMS_IOU: f32 = 0.45;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Loads a local model whose input is `[1, 3, S, S]` RGB in `0..1` and whose
/// output is `[1, 4 + classes, proposals]` with `(cx, cy, w, h)` followed by
/// per-class scores. Frames are resized to the model input and boxes are
/// scaled back to frame pixels. No network I/O.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = rgb_frame(frame)?;
        let image: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, rgb.as_ref())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let side = self.input_size;
        let resized = imageops::resize(&image, side, side, FilterType::Triangle);

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<Detection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let proposals = shape[2];
        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..proposals {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..rows - 4 {
                let score = view[[0, 4 + class, i]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if !best_score.is_finite() || best_score < MIN_PROPOSAL_SCORE {
                continue;
            }
            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            let bbox = BBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            )
            .clamped(frame.width, frame.height);
            candidates.push(Detection::new(
                bbox,
                best_class as u32,
                best_score.min(1.0),
            ));
        }
        Ok(non_max_suppression(candidates))
    }
}

/// Per-class greedy NMS; output is sorted by descending confidence.
fn non_max_suppression(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > NMS_IOU
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        self.decode(output, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let blank = Tensor::zero::<f32>(&[1, 3, side, side])?;
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_same_class_overlap_only() {
        let a = Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), 0, 0.9);
        let b = Detection::new(BBox::new(1.0, 1.0, 10.0, 10.0), 0, 0.8);
        let c = Detection::new(BBox::new(1.0, 1.0, 10.0, 10.0), 1, 0.7);
        let kept = non_max_suppression(vec![b, c, a]);
        assert_eq!(kept, vec![a, c]);
    }
}
