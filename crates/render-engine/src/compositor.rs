//! Frame compositor: letterboxing, uniform blur and selective blur regions.
//!
//! The compositor draws one decoded source frame into the shared output
//! surface. It owns a secondary buffer used to blur regions before they
//! are masked back onto the surface.

use clipweave_sequence_model::clip::{BlurRegion, ClipEffects, RegionShape};
use clipweave_sequence_model::geometry::{fit_content, region_bounds, PixelRect};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::blur::{gaussian_blur_in_place, kernel_radius};

/// Opaque black fill for letterbox bars.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Outcome of compositing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeReport {
    /// Where the source frame was drawn.
    pub content: PixelRect,
    /// No pixel differs from the background.
    pub blank: bool,
    /// The source had no usable frame; only the background was drawn.
    pub degenerate: bool,
}

/// Draws source frames into fixed-size output surfaces.
#[derive(Debug)]
pub struct Compositor {
    width: u32,
    height: u32,
    scratch: RgbaImage,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scratch: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// A surface of the output size filled with the background.
    pub fn new_surface(&self) -> RgbaImage {
        RgbaImage::from_pixel(self.width, self.height, BACKGROUND)
    }

    /// Composite `frame` with `effects` into `surface`.
    ///
    /// A missing or zero-sized frame leaves a background-only surface.
    pub fn composite(
        &mut self,
        surface: &mut RgbaImage,
        frame: Option<&RgbaImage>,
        effects: &ClipEffects,
    ) -> CompositeReport {
        if surface.dimensions() != (self.width, self.height) {
            *surface = self.new_surface();
        } else {
            for px in surface.pixels_mut() {
                *px = BACKGROUND;
            }
        }

        let Some(frame) = frame.filter(|f| f.width() > 0 && f.height() > 0) else {
            return CompositeReport {
                content: PixelRect::new(0, 0, 0, 0),
                blank: true,
                degenerate: true,
            };
        };

        let content = fit_content(frame.width(), frame.height(), self.width, self.height);
        if content.is_empty() {
            return CompositeReport {
                content,
                blank: true,
                degenerate: true,
            };
        }

        if frame.dimensions() == (content.width, content.height) {
            imageops::replace(surface, frame, content.x as i64, content.y as i64);
        } else {
            let scaled = imageops::resize(frame, content.width, content.height, FilterType::Triangle);
            imageops::replace(surface, &scaled, content.x as i64, content.y as i64);
        }

        // Blurs sample and write inside the content box only; bars stay black.
        if let Some(sigma) = effects.effective_global_blur() {
            gaussian_blur_in_place(surface, content, sigma);
        } else {
            for region in &effects.selective_blur_regions {
                self.blur_region(surface, region, &content);
            }
        }

        CompositeReport {
            content,
            blank: is_background_only(surface, &content),
            degenerate: false,
        }
    }

    fn blur_region(&mut self, surface: &mut RgbaImage, region: &BlurRegion, content: &PixelRect) {
        let bounds = region_bounds(region, content);
        let radius = kernel_radius(region.intensity);
        if bounds.is_empty() || radius == 0 {
            return;
        }

        if self.scratch.dimensions() != surface.dimensions() {
            self.scratch = RgbaImage::new(surface.width(), surface.height());
        }

        // Blur a margin around the region so its edges sample real neighbours.
        let sample_area = bounds.expand_within(radius, content);
        for y in sample_area.y..sample_area.bottom() {
            for x in sample_area.x..sample_area.right() {
                self.scratch.put_pixel(x, y, *surface.get_pixel(x, y));
            }
        }
        gaussian_blur_in_place(&mut self.scratch, sample_area, region.intensity);

        let mask = ClipMask::new(region.shape, &bounds);
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                if mask.contains(x, y) {
                    surface.put_pixel(x, y, *self.scratch.get_pixel(x, y));
                }
            }
        }
    }
}

/// Clip path inside a region box.
#[derive(Debug, Clone, Copy)]
enum ClipMask {
    Rect,
    Circle { cx: f64, cy: f64, r2: f64 },
}

impl ClipMask {
    fn new(shape: RegionShape, bounds: &PixelRect) -> Self {
        match shape {
            RegionShape::Rect => ClipMask::Rect,
            RegionShape::Circle => {
                let r = bounds.width.min(bounds.height) as f64 / 2.0;
                ClipMask::Circle {
                    cx: bounds.x as f64 + bounds.width as f64 / 2.0,
                    cy: bounds.y as f64 + bounds.height as f64 / 2.0,
                    r2: r * r,
                }
            }
        }
    }

    /// Pixel centers are tested against the path.
    fn contains(&self, x: u32, y: u32) -> bool {
        match *self {
            ClipMask::Rect => true,
            ClipMask::Circle { cx, cy, r2 } => {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                dx * dx + dy * dy <= r2
            }
        }
    }
}

fn is_background_only(surface: &RgbaImage, area: &PixelRect) -> bool {
    (area.y..area.bottom()).all(|y| {
        (area.x..area.right()).all(|x| {
            let [r, g, b, _] = surface.get_pixel(x, y).0;
            r == 0 && g == 0 && b == 0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([200, 30, 30, 255]);

    fn checkerboard(width: u32, height: u32, cell: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        })
    }

    fn region(x: f64, y: f64, w: f64, h: f64, shape: RegionShape, intensity: f64) -> BlurRegion {
        BlurRegion {
            x_pct: x,
            y_pct: y,
            width_pct: w,
            height_pct: h,
            shape,
            intensity,
        }
    }

    fn changed_pixels(a: &RgbaImage, b: &RgbaImage) -> Vec<(u32, u32)> {
        a.enumerate_pixels()
            .filter(|(x, y, px)| *px != b.get_pixel(*x, *y))
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_wide_source_letterboxed_with_black_bars() {
        let mut compositor = Compositor::new(640, 640);
        let mut surface = compositor.new_surface();
        let frame = RgbaImage::from_pixel(1920, 1080, RED);

        let report = compositor.composite(&mut surface, Some(&frame), &ClipEffects::default());

        assert_eq!(report.content, PixelRect::new(0, 140, 640, 360));
        assert!(!report.blank);
        assert!(PixelRect::full(640, 640).contains_rect(&report.content));
        assert_eq!(*surface.get_pixel(320, 10), BACKGROUND);
        assert_eq!(*surface.get_pixel(320, 630), BACKGROUND);
        assert_eq!(*surface.get_pixel(320, 320), RED);
    }

    #[test]
    fn test_tall_source_pillarboxed() {
        let mut compositor = Compositor::new(1280, 720);
        let mut surface = compositor.new_surface();
        let frame = RgbaImage::from_pixel(720, 1280, RED);

        let report = compositor.composite(&mut surface, Some(&frame), &ClipEffects::default());

        assert_eq!(report.content.y, 0);
        assert_eq!(report.content.height, 720);
        assert_eq!(report.content.width, 405);
        assert_eq!(*surface.get_pixel(5, 360), BACKGROUND);
        assert_eq!(*surface.get_pixel(1275, 360), BACKGROUND);
        assert_eq!(*surface.get_pixel(640, 360), RED);
    }

    fn assert_bars_are_background(surface: &RgbaImage, content: &PixelRect) {
        let bleed: Vec<(u32, u32)> = surface
            .enumerate_pixels()
            .filter(|(x, y, px)| !content.contains(*x, *y) && **px != BACKGROUND)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(bleed.is_empty(), "{} bar pixels are not background", bleed.len());
    }

    #[test]
    fn test_global_blur_stays_inside_letterbox() {
        let mut compositor = Compositor::new(64, 64);
        let mut surface = compositor.new_surface();
        let frame = RgbaImage::from_pixel(64, 32, Rgba([255, 255, 255, 255]));
        let effects = ClipEffects {
            blur_radius: 4.0,
            ..ClipEffects::default()
        };

        let report = compositor.composite(&mut surface, Some(&frame), &effects);

        assert_eq!(report.content, PixelRect::new(0, 16, 64, 32));
        assert_bars_are_background(&surface, &report.content);
        // A uniform frame stays uniform up to the content edge.
        assert_eq!(*surface.get_pixel(32, 16), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_region_blur_at_content_edge_keeps_pillars_black() {
        let mut compositor = Compositor::new(64, 32);
        let mut surface = compositor.new_surface();
        let frame = checkerboard(32, 32, 2);
        let effects = ClipEffects {
            selective_blur_regions: vec![region(0.0, 0.0, 100.0, 100.0, RegionShape::Rect, 3.0)],
            ..ClipEffects::default()
        };

        let report = compositor.composite(&mut surface, Some(&frame), &effects);

        assert_eq!(report.content, PixelRect::new(16, 0, 32, 32));
        assert_bars_are_background(&surface, &report.content);
    }

    #[test]
    fn test_missing_frame_yields_background_surface() {
        let mut compositor = Compositor::new(8, 4);
        let mut surface = RgbaImage::new(2, 2);

        let report = compositor.composite(&mut surface, None, &ClipEffects::default());
        assert!(report.degenerate);
        assert!(report.blank);
        assert_eq!(surface.dimensions(), (8, 4));
        assert!(surface.pixels().all(|px| *px == BACKGROUND));

        let empty = RgbaImage::new(0, 0);
        let report = compositor.composite(&mut surface, Some(&empty), &ClipEffects::default());
        assert!(report.degenerate);
    }

    #[test]
    fn test_black_frame_is_flagged_blank() {
        let mut compositor = Compositor::new(16, 9);
        let mut surface = compositor.new_surface();
        let frame = RgbaImage::from_pixel(16, 9, BACKGROUND);

        let report = compositor.composite(&mut surface, Some(&frame), &ClipEffects::default());
        assert!(report.blank);
        assert!(!report.degenerate);
    }

    #[test]
    fn test_global_blur_applies_without_regions() {
        let mut compositor = Compositor::new(32, 32);
        let frame = checkerboard(32, 32, 2);

        let mut plain = compositor.new_surface();
        compositor.composite(&mut plain, Some(&frame), &ClipEffects::default());

        let mut blurred = compositor.new_surface();
        let effects = ClipEffects {
            blur_radius: 2.0,
            ..ClipEffects::default()
        };
        compositor.composite(&mut blurred, Some(&frame), &effects);

        assert!(changed_pixels(&plain, &blurred).len() > 32 * 32 / 2);
    }

    #[test]
    fn test_regions_suppress_global_blur() {
        let mut compositor = Compositor::new(40, 40);
        let frame = checkerboard(40, 40, 2);

        let mut plain = compositor.new_surface();
        compositor.composite(&mut plain, Some(&frame), &ClipEffects::default());

        let effects = ClipEffects {
            blur_radius: 10.0,
            selective_blur_regions: vec![region(0.0, 0.0, 25.0, 25.0, RegionShape::Rect, 2.0)],
            ..ClipEffects::default()
        };
        let mut surface = compositor.new_surface();
        compositor.composite(&mut surface, Some(&frame), &effects);

        let bounds = PixelRect::new(0, 0, 10, 10);
        let changed = changed_pixels(&plain, &surface);
        assert!(!changed.is_empty());
        assert!(changed.iter().all(|&(x, y)| bounds.contains(x, y)));
    }

    #[test]
    fn test_circle_region_keeps_box_corners_sharp() {
        let mut compositor = Compositor::new(40, 40);
        let frame = checkerboard(40, 40, 1);

        let mut plain = compositor.new_surface();
        compositor.composite(&mut plain, Some(&frame), &ClipEffects::default());

        let effects = ClipEffects {
            selective_blur_regions: vec![region(25.0, 25.0, 50.0, 50.0, RegionShape::Circle, 2.0)],
            ..ClipEffects::default()
        };
        let mut surface = compositor.new_surface();
        compositor.composite(&mut surface, Some(&frame), &effects);

        // Box is (10, 10) to (30, 30); circle radius 10 around (20, 20).
        assert_eq!(surface.get_pixel(10, 10), plain.get_pixel(10, 10));
        assert_eq!(surface.get_pixel(29, 29), plain.get_pixel(29, 29));
        assert_ne!(surface.get_pixel(20, 20), plain.get_pixel(20, 20));
    }

    #[test]
    fn test_regions_scale_with_output_size() {
        let effects = ClipEffects {
            selective_blur_regions: vec![region(25.0, 20.0, 50.0, 40.0, RegionShape::Rect, 3.0)],
            ..ClipEffects::default()
        };

        let mut bounds = Vec::new();
        for (w, h) in [(320u32, 180u32), (640, 360)] {
            let mut compositor = Compositor::new(w, h);
            let frame = checkerboard(w, h, 3);

            let mut plain = compositor.new_surface();
            compositor.composite(&mut plain, Some(&frame), &ClipEffects::default());
            let mut surface = compositor.new_surface();
            let report = compositor.composite(&mut surface, Some(&frame), &effects);

            let region_px = region_bounds(&effects.selective_blur_regions[0], &report.content);
            let changed = changed_pixels(&plain, &surface);
            assert!(!changed.is_empty());
            assert!(changed.iter().all(|&(x, y)| region_px.contains(x, y)));
            bounds.push(region_px);
        }

        let (small, large) = (bounds[0], bounds[1]);
        assert_eq!(large.x, small.x * 2);
        assert_eq!(large.y, small.y * 2);
        assert_eq!(large.width, small.width * 2);
        assert_eq!(large.height, small.height * 2);
    }
}
