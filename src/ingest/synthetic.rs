//! Synthetic screen source (`stub://`).
//!
//! Renders a gray gradient with solid-colour marker squares that drift across
//! the screen. Marker colours are saturated, so they never collide with the
//! gray background; the CPU marker detector keys on them to produce boxes
//! without a model. Motion jitter comes from a seeded RNG so runs repeat.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::CaptureBackend;
use crate::frame::{Frame, PixelFormat};

/// One moving square in the synthetic scene.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSpec {
    pub class_id: u32,
    /// RGB colour; must not be gray.
    pub color: [u8; 3],
    pub size: (u32, u32),
    pub start: (f32, f32),
    /// Pixels per frame.
    pub velocity: (f32, f32),
}

/// Configuration for a synthetic screen.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source label (e.g., "stub://screen").
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub markers: Vec<MarkerSpec>,
    /// Maximum random displacement added per frame, in pixels.
    pub jitter: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            label: "stub://screen".to_string(),
            width: 1280,
            height: 720,
            format: PixelFormat::Bgra32,
            markers: default_markers(),
            jitter: 1.0,
            seed: 7,
        }
    }
}

/// Marker colours used by the default scene and the CPU detector.
pub fn default_markers() -> Vec<MarkerSpec> {
    vec![
        MarkerSpec {
            class_id: 0,
            color: [230, 40, 40],
            size: (96, 96),
            start: (120.0, 100.0),
            velocity: (3.0, 2.0),
        },
        MarkerSpec {
            class_id: 3,
            color: [40, 200, 40],
            size: (140, 90),
            start: (600.0, 380.0),
            velocity: (-2.0, 1.5),
        },
        MarkerSpec {
            class_id: 2,
            color: [40, 40, 230],
            size: (60, 60),
            start: (900.0, 150.0),
            velocity: (1.0, -2.5),
        },
    ]
}

struct MarkerState {
    spec: MarkerSpec,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

/// Synthetic capture backend.
pub struct SyntheticScreen {
    config: SyntheticConfig,
    markers: Vec<MarkerState>,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticScreen {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "synthetic screen needs non-zero size, got {}x{}",
                config.width,
                config.height
            ));
        }
        for marker in &config.markers {
            let [r, g, b] = marker.color;
            if r == g && g == b {
                return Err(anyhow!(
                    "marker colour {:?} is gray and would blend into the background",
                    marker.color
                ));
            }
        }
        let markers = config
            .markers
            .iter()
            .map(|spec| MarkerState {
                spec: spec.clone(),
                x: spec.start.0,
                y: spec.start.1,
                vx: spec.velocity.0,
                vy: spec.velocity.1,
            })
            .collect();
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            markers,
            rng,
            frame_count: 0,
            connected: false,
        })
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    /// Current marker boxes as `(class_id, x1, y1, x2, y2)`.
    pub fn marker_boxes(&self) -> Vec<(u32, f32, f32, f32, f32)> {
        self.markers
            .iter()
            .map(|m| {
                (
                    m.spec.class_id,
                    m.x,
                    m.y,
                    m.x + m.spec.size.0 as f32,
                    m.y + m.spec.size.1 as f32,
                )
            })
            .collect()
    }

    fn advance(&mut self) {
        let width = self.config.width as f32;
        let height = self.config.height as f32;
        let jitter = self.config.jitter;
        for marker in &mut self.markers {
            let (jx, jy) = if jitter > 0.0 {
                (
                    self.rng.gen_range(-jitter..=jitter),
                    self.rng.gen_range(-jitter..=jitter),
                )
            } else {
                (0.0, 0.0)
            };
            marker.x += marker.vx + jx;
            marker.y += marker.vy + jy;

            let max_x = (width - marker.spec.size.0 as f32).max(0.0);
            let max_y = (height - marker.spec.size.1 as f32).max(0.0);
            if marker.x <= 0.0 || marker.x >= max_x {
                marker.vx = -marker.vx;
                marker.x = marker.x.clamp(0.0, max_x);
            }
            if marker.y <= 0.0 || marker.y >= max_y {
                marker.vy = -marker.vy;
                marker.y = marker.y.clamp(0.0, max_y);
            }
        }
    }

    fn render(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let format = self.config.format;
        let bpp = format.bytes_per_pixel();
        let mut pixels = vec![0u8; width * height * bpp];

        for y in 0..height {
            for x in 0..width {
                let v = (((x + y) * 255) / (width + height).max(1)) as u8;
                write_pixel(&mut pixels, (y * width + x) * bpp, format, [v, v, v]);
            }
        }

        for marker in &self.markers {
            let x0 = marker.x.max(0.0) as usize;
            let y0 = marker.y.max(0.0) as usize;
            let x1 = (x0 + marker.spec.size.0 as usize).min(width);
            let y1 = (y0 + marker.spec.size.1 as usize).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    write_pixel(&mut pixels, (y * width + x) * bpp, format, marker.spec.color);
                }
            }
        }
        pixels
    }
}

fn write_pixel(pixels: &mut [u8], offset: usize, format: PixelFormat, rgb: [u8; 3]) {
    match format {
        PixelFormat::Rgb24 => pixels[offset..offset + 3].copy_from_slice(&rgb),
        PixelFormat::Bgra32 => {
            pixels[offset] = rgb[2];
            pixels[offset + 1] = rgb[1];
            pixels[offset + 2] = rgb[0];
            pixels[offset + 3] = 255;
        }
    }
}

impl CaptureBackend for SyntheticScreen {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticScreen: connected to {} ({}x{} {:?})",
            self.config.label,
            self.config.width,
            self.config.height,
            self.config.format
        );
        self.connected = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic screen grabbed before connect"));
        }
        self.frame_count += 1;
        if self.frame_count > 1 {
            self.advance();
        }
        let pixels = self.render();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.config.format,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            width: 64,
            height: 48,
            format: PixelFormat::Rgb24,
            markers: vec![MarkerSpec {
                class_id: 0,
                color: [230, 40, 40],
                size: (10, 8),
                start: (5.0, 6.0),
                velocity: (0.0, 0.0),
            }],
            jitter: 0.0,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn grab_requires_connect() {
        let mut screen = SyntheticScreen::new(small_config()).unwrap();
        assert!(screen.grab().is_err());
        screen.connect().unwrap();
        assert!(screen.grab().unwrap().is_some());
    }

    #[test]
    fn marker_is_rendered_at_its_position() {
        let mut screen = SyntheticScreen::new(small_config()).unwrap();
        screen.connect().unwrap();
        let frame = screen.grab().unwrap().unwrap();
        assert_eq!(frame.pixel(5, 6), Some(&[230u8, 40, 40][..]));
        assert_eq!(frame.pixel(14, 13), Some(&[230u8, 40, 40][..]));
        let outside = frame.pixel(15, 6).unwrap();
        assert_eq!(outside[0], outside[1]);
    }

    #[test]
    fn gray_marker_is_rejected() {
        let mut config = small_config();
        config.markers[0].color = [90, 90, 90];
        assert!(SyntheticScreen::new(config).is_err());
    }

    #[test]
    fn same_seed_produces_same_motion() {
        let mut config = small_config();
        config.jitter = 2.0;
        config.markers[0].velocity = (1.0, 1.0);
        let mut a = SyntheticScreen::new(config.clone()).unwrap();
        let mut b = SyntheticScreen::new(config).unwrap();
        a.connect().unwrap();
        b.connect().unwrap();
        for _ in 0..5 {
            a.grab().unwrap();
            b.grab().unwrap();
        }
        assert_eq!(a.marker_boxes(), b.marker_boxes());
    }
}
