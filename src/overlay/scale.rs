use crate::geometry::PixelRect;

/// Uniform source-to-surface scale for one publish.
///
/// Identity when the surface matches the capture size. Otherwise the smaller
/// of the two axis ratios is used for both axes, so regions keep their aspect
/// ratio and stay inside the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceScale {
    pub factor: f32,
}

impl SurfaceScale {
    pub const IDENTITY: SurfaceScale = SurfaceScale { factor: 1.0 };

    pub fn between(source: (u32, u32), surface: Option<(u32, u32)>) -> Self {
        let Some((sw, sh)) = surface else {
            return Self::IDENTITY;
        };
        let (cw, ch) = source;
        if (sw, sh) == (cw, ch) || cw == 0 || ch == 0 || sw == 0 || sh == 0 {
            return Self::IDENTITY;
        }
        let factor = (sw as f32 / cw as f32).min(sh as f32 / ch as f32);
        Self { factor }
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0
    }

    pub fn apply(&self, rect: PixelRect) -> PixelRect {
        if self.is_identity() {
            return rect;
        }
        let f = self.factor;
        PixelRect {
            x: (rect.x as f32 * f).round() as u32,
            y: (rect.y as f32 * f).round() as u32,
            w: ((rect.w as f32 * f).round() as u32).max(1),
            h: ((rect.h as f32 * f).round() as u32).max(1),
        }
    }
}

impl Default for SurfaceScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_size_is_identity() {
        let scale = SurfaceScale::between((1920, 1080), Some((1920, 1080)));
        assert!(scale.is_identity());
        let rect = PixelRect { x: 10, y: 10, w: 40, h: 40 };
        assert_eq!(scale.apply(rect), rect);
        assert!(SurfaceScale::between((1920, 1080), None).is_identity());
    }

    #[test]
    fn uses_one_factor_for_both_axes() {
        // 0.5 horizontally, 0.6 vertically: the smaller wins.
        let scale = SurfaceScale::between((2000, 1000), Some((1000, 600)));
        assert_eq!(scale.factor, 0.5);
        let rect = PixelRect { x: 100, y: 50, w: 40, h: 20 };
        assert_eq!(scale.apply(rect), PixelRect { x: 50, y: 25, w: 20, h: 10 });
    }
}
