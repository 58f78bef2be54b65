use anyhow::{anyhow, Result};
use std::borrow::Cow;

use crate::frame::{Frame, PixelFormat};

/// Convert interleaved pixels to packed RGB24.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let expected = pixel_count
        .checked_mul(format.bytes_per_pixel())
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Bgra32 => Ok(bgra_to_rgb(pixels, pixel_count)),
    }
}

/// RGB view of a frame, borrowing when it already is RGB.
pub fn rgb_frame(frame: &Frame) -> Result<Cow<'_, [u8]>> {
    match frame.format {
        PixelFormat::Rgb24 => Ok(Cow::Borrowed(frame.pixels())),
        PixelFormat::Bgra32 => Ok(Cow::Owned(normalize_to_rgb(
            frame.pixels(),
            frame.width,
            frame.height,
            frame.format,
        )?)),
    }
}

fn bgra_to_rgb(pixels: &[u8], pixel_count: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for bgra in pixels.chunks_exact(4) {
        rgb.push(bgra[2]);
        rgb.push(bgra[1]);
        rgb.push(bgra[0]);
    }
    rgb
}
