//! Pixelation of tracked regions.
//!
//! `MosaicEngine::apply` copies the captured frame, pixelates every
//! established track whose class is a target, and returns the copy together
//! with one `Region` per pixelated block. The captured frame is never written.
//!
//! Pixelation is a downscale by `strength` with a triangle (linear) filter
//! followed by a nearest-neighbour upscale back to the region size, so every
//! `strength x strength` block of the output is a single colour.

use anyhow::{anyhow, bail, Result};
use image::{imageops, imageops::FilterType, ImageBuffer, Pixel, Rgb, Rgba};
use std::collections::BTreeSet;

use crate::detect::{ClassNames, DEFAULT_TARGETS};
use crate::frame::{Frame, PixelFormat};
use crate::geometry::PixelRect;
use crate::track::{Track, TrackId};

pub const MIN_STRENGTH: u32 = 5;
pub const MAX_STRENGTH: u32 = 50;
pub const DEFAULT_STRENGTH: u32 = 15;

/// Regions narrower or shorter than this are left untouched.
pub const MIN_REGION_SIZE: u32 = 5;

/// Pixelated contents of one region, in the frame's pixel format.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionPixels {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// One censored area, in source-frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub label: String,
    pub track_id: TrackId,
    pub pixels: Option<RegionPixels>,
}

impl Region {
    pub fn rect(&self) -> PixelRect {
        PixelRect {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }
}

/// Result of one `apply` call.
#[derive(Clone, Debug)]
pub struct MosaicOutput {
    /// Copy of the input with every region pixelated.
    pub frame: Frame,
    pub regions: Vec<Region>,
}

pub fn clamp_strength(strength: u32) -> u32 {
    strength.clamp(MIN_STRENGTH, MAX_STRENGTH)
}

#[derive(Clone, Debug)]
pub struct MosaicEngine {
    targets: BTreeSet<String>,
    strength: u32,
    class_names: ClassNames,
    keep_pixels: bool,
}

impl Default for MosaicEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_TARGETS.iter().map(|s| s.to_string()),
            DEFAULT_STRENGTH,
            ClassNames::default(),
        )
    }
}

impl MosaicEngine {
    pub fn new<I, S>(targets: I, strength: u32, class_names: ClassNames) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            strength: clamp_strength(strength),
            class_names,
            keep_pixels: true,
        }
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn set_targets<I, S>(&mut self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    /// Set the block size, clamped to `[MIN_STRENGTH, MAX_STRENGTH]`.
    pub fn set_strength(&mut self, strength: u32) {
        let clamped = clamp_strength(strength);
        if clamped != strength {
            log::warn!(
                "mosaic strength {} out of range, using {}",
                strength,
                clamped
            );
        }
        self.strength = clamped;
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn set_class_names(&mut self, class_names: ClassNames) {
        self.class_names = class_names;
    }

    /// Whether regions carry their pixelated sub-image.
    pub fn set_keep_pixels(&mut self, keep: bool) {
        self.keep_pixels = keep;
    }

    pub fn is_target(&self, class_id: u32) -> bool {
        self.targets
            .contains(self.class_names.resolve(class_id).as_ref())
    }

    /// Pixelate every established target track on a copy of `frame`.
    ///
    /// Tentative tracks and non-target classes are ignored. A region that
    /// fails is logged and skipped; the rest of the frame is still processed.
    pub fn apply(&self, frame: &Frame, tracks: &[Track]) -> MosaicOutput {
        let mut working = frame.clone();
        let mut regions = Vec::new();
        if self.targets.is_empty() {
            return MosaicOutput {
                frame: working,
                regions,
            };
        }

        for track in tracks {
            if !track.is_established() {
                continue;
            }
            if !self.is_target(track.class_id) {
                continue;
            }
            let label = self.class_names.resolve(track.class_id);
            let Some(rect) = track.bbox.to_pixel_rect(frame.width, frame.height) else {
                log::debug!("mosaic: track {} has an empty box, skipped", track.id);
                continue;
            };
            if rect.w < MIN_REGION_SIZE || rect.h < MIN_REGION_SIZE {
                log::debug!(
                    "mosaic: track {} region {}x{} below {} px, skipped",
                    track.id,
                    rect.w,
                    rect.h,
                    MIN_REGION_SIZE
                );
                continue;
            }

            match pixelate_frame_region(&mut working, rect, self.strength) {
                Ok(data) => regions.push(Region {
                    x: rect.x,
                    y: rect.y,
                    w: rect.w,
                    h: rect.h,
                    label: label.into_owned(),
                    track_id: track.id,
                    pixels: self.keep_pixels.then(|| RegionPixels {
                        width: rect.w,
                        height: rect.h,
                        format: frame.format,
                        data,
                    }),
                }),
                Err(e) => {
                    log::warn!("mosaic: track {} region skipped: {:#}", track.id, e);
                }
            }
        }

        MosaicOutput {
            frame: working,
            regions,
        }
    }
}

/// Pixelate `rect` of `frame` in place and return the pixelated block.
pub fn pixelate_frame_region(frame: &mut Frame, rect: PixelRect, block: u32) -> Result<Vec<u8>> {
    let (width, height, format) = (frame.width, frame.height, frame.format);
    match format {
        PixelFormat::Rgb24 => pixelate::<Rgb<u8>>(frame.pixels_mut(), width, height, rect, block),
        // Channel order does not matter for a channel-wise filter.
        PixelFormat::Bgra32 => {
            pixelate::<Rgba<u8>>(frame.pixels_mut(), width, height, rect, block)
        }
    }
}

fn pixelate<P>(
    pixels: &mut [u8],
    frame_w: u32,
    frame_h: u32,
    rect: PixelRect,
    block: u32,
) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if block == 0 {
        bail!("block size must be > 0");
    }
    if rect.w == 0 || rect.h == 0 || rect.right() > frame_w || rect.bottom() > frame_h {
        bail!(
            "region {}x{}+{}+{} outside {}x{} frame",
            rect.w,
            rect.h,
            rect.x,
            rect.y,
            frame_w,
            frame_h
        );
    }
    let mut canvas: ImageBuffer<P, &mut [u8]> = ImageBuffer::from_raw(frame_w, frame_h, pixels)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame_w, frame_h))?;

    let patch: ImageBuffer<P, Vec<u8>> = ImageBuffer::from_fn(rect.w, rect.h, |x, y| {
        *canvas.get_pixel(rect.x + x, rect.y + y)
    });
    let small_w = (rect.w / block).max(1);
    let small_h = (rect.h / block).max(1);
    let small = imageops::resize(&patch, small_w, small_h, FilterType::Triangle);

    // Nearest-neighbour upscale with integer mapping keeps blocks exact.
    let blocky: ImageBuffer<P, Vec<u8>> = ImageBuffer::from_fn(rect.w, rect.h, |x, y| {
        *small.get_pixel(x * small_w / rect.w, y * small_h / rect.h)
    });
    imageops::replace(&mut canvas, &blocky, rect.x as i64, rect.y as i64);
    Ok(blocky.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::geometry::BBox;
    use crate::track::TrackState;

    fn gradient(width: u32, height: u32, format: PixelFormat) -> Frame {
        let bpp = format.bytes_per_pixel();
        let mut pixels = Vec::with_capacity((width * height) as usize * bpp);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 7 + y * 3) % 256) as u8;
                pixels.extend_from_slice(&[v, v.wrapping_add(40), v.wrapping_mul(2)]);
                if bpp == 4 {
                    pixels.push(255);
                }
            }
        }
        Frame::new(pixels, width, height, format, 1).unwrap()
    }

    fn confirmed(id: u64, bbox: BBox, class_id: u32) -> Track {
        let mut track = Track::spawn(id, &Detection::new(bbox, class_id, 0.9));
        track.state = TrackState::Confirmed;
        track.hit_count = 1;
        track
    }

    fn assert_uniform_blocks(frame: &Frame, rect: PixelRect, block: u32) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let bx = rect.x + (x - rect.x) / block * block;
                let by = rect.y + (y - rect.y) / block * block;
                assert_eq!(
                    frame.pixel(x, y),
                    frame.pixel(bx, by),
                    "pixel ({}, {}) differs from its block origin",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn empty_target_set_leaves_frame_unchanged() {
        let frame = gradient(64, 64, PixelFormat::Rgb24);
        let mut engine = MosaicEngine::default();
        engine.set_targets(Vec::<String>::new());
        let out = engine.apply(&frame, &[confirmed(1, BBox::new(0.0, 0.0, 40.0, 40.0), 0)]);
        assert!(out.regions.is_empty());
        assert_eq!(out.frame.pixels(), frame.pixels());
    }

    #[test]
    fn strength_twenty_on_hundred_pixel_box_gives_five_blocks_per_side() {
        let frame = gradient(120, 120, PixelFormat::Rgb24);
        let engine = MosaicEngine::new(["face"], 20, ClassNames::default());
        let out = engine.apply(&frame, &[confirmed(1, BBox::new(10.0, 10.0, 110.0, 110.0), 0)]);

        assert_eq!(out.regions.len(), 1);
        let rect = out.regions[0].rect();
        assert_eq!(rect, PixelRect { x: 10, y: 10, w: 100, h: 100 });
        assert_uniform_blocks(&out.frame, rect, 20);
        // Neighbouring blocks are not all the same colour.
        assert_ne!(out.frame.pixel(10, 10), out.frame.pixel(90, 90));
        // Outside the region nothing changed.
        assert_eq!(out.frame.pixel(5, 5), frame.pixel(5, 5));
        assert_eq!(out.frame.pixel(115, 115), frame.pixel(115, 115));
    }

    #[test]
    fn region_carries_label_and_pixelated_block() {
        let frame = gradient(80, 80, PixelFormat::Bgra32);
        let engine = MosaicEngine::new(["face"], 10, ClassNames::default());
        let out = engine.apply(&frame, &[confirmed(4, BBox::new(10.0, 10.0, 50.0, 50.0), 0)]);

        let region = &out.regions[0];
        assert_eq!((region.x, region.y, region.w, region.h), (10, 10, 40, 40));
        assert_eq!(region.label, "face");
        assert_eq!(region.track_id, 4);
        let pixels = region.pixels.as_ref().unwrap();
        assert_eq!(pixels.format, PixelFormat::Bgra32);
        assert_eq!(pixels.data.len(), 40 * 40 * 4);
        assert_eq!(&pixels.data[..4], out.frame.pixel(10, 10).unwrap());
        assert_uniform_blocks(&out.frame, region.rect(), 10);
    }

    #[test]
    fn input_frame_is_not_modified() {
        let frame = gradient(64, 64, PixelFormat::Rgb24);
        let before = frame.pixels().to_vec();
        let engine = MosaicEngine::new(["face"], 8, ClassNames::default());
        let out = engine.apply(&frame, &[confirmed(1, BBox::new(0.0, 0.0, 64.0, 64.0), 0)]);
        assert_eq!(frame.pixels(), &before[..]);
        assert_ne!(out.frame.pixels(), &before[..]);
    }

    #[test]
    fn small_regions_are_left_untouched() {
        let frame = gradient(64, 64, PixelFormat::Rgb24);
        let engine = MosaicEngine::new(["face"], 5, ClassNames::default());
        let tracks = [
            confirmed(1, BBox::new(10.0, 10.0, 14.0, 40.0), 0),
            confirmed(2, BBox::new(20.0, 20.0, 50.0, 24.5), 0),
        ];
        let out = engine.apply(&frame, &tracks);
        assert!(out.regions.is_empty());
        assert_eq!(out.frame.pixels(), frame.pixels());
    }

    #[test]
    fn tentative_and_non_target_tracks_are_skipped() {
        let frame = gradient(64, 64, PixelFormat::Rgb24);
        let engine = MosaicEngine::new(["face"], 5, ClassNames::default());
        let mut tentative = confirmed(1, BBox::new(0.0, 0.0, 30.0, 30.0), 0);
        tentative.state = TrackState::Tentative;
        let hand = confirmed(2, BBox::new(30.0, 30.0, 60.0, 60.0), 2);
        let out = engine.apply(&frame, &[tentative, hand]);
        assert!(out.regions.is_empty());
    }

    #[test]
    fn out_of_bounds_box_is_clamped() {
        let frame = gradient(50, 40, PixelFormat::Rgb24);
        let engine = MosaicEngine::new(["face"], 5, ClassNames::default());
        let out = engine.apply(&frame, &[confirmed(1, BBox::new(-10.0, 30.0, 20.0, 90.0), 0)]);
        assert_eq!(out.regions[0].rect(), PixelRect { x: 0, y: 30, w: 20, h: 10 });
    }

    #[test]
    fn strength_is_clamped() {
        let mut engine = MosaicEngine::new(["face"], 1, ClassNames::default());
        assert_eq!(engine.strength(), MIN_STRENGTH);
        engine.set_strength(500);
        assert_eq!(engine.strength(), MAX_STRENGTH);
        engine.set_strength(12);
        assert_eq!(engine.strength(), 12);
    }

    #[test]
    fn pixelating_a_region_in_place_returns_its_blocks() {
        let mut frame = gradient(40, 30, PixelFormat::Rgb24);
        let original = frame.clone();
        let rect = PixelRect { x: 5, y: 5, w: 20, h: 15 };
        let data = pixelate_frame_region(&mut frame, rect, 5).unwrap();

        assert_eq!(data.len(), 20 * 15 * 3);
        assert_eq!(&data[..3], frame.pixel(5, 5).unwrap());
        assert_uniform_blocks(&frame, rect, 5);
        assert_eq!(frame.pixel(30, 25), original.pixel(30, 25));
        assert_eq!(frame.pixel(4, 4), original.pixel(4, 4));
    }

    #[test]
    fn target_lookup_goes_through_class_names() {
        let engine = MosaicEngine::new(["face", "class-99"], 10, ClassNames::default());
        assert!(engine.is_target(0));
        assert!(engine.is_target(99));
        assert!(!engine.is_target(2));
    }

    #[test]
    fn region_outside_frame_is_an_error() {
        let mut frame = gradient(10, 10, PixelFormat::Rgb24);
        let rect = PixelRect { x: 8, y: 0, w: 5, h: 5 };
        assert!(pixelate_frame_region(&mut frame, rect, 5).is_err());
    }
}
