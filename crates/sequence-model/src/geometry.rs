//! Pixel-space rectangles for content fitting and region placement.
//!
//! Blur regions are authored as percentages of the fitted content box, so
//! every consumer (frame compositor, delegated filter graph) resolves them
//! through the same functions here.

use serde::{Deserialize, Serialize};

use crate::clip::BlurRegion;

/// An axis-aligned rectangle in output pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering an entire `width x height` surface.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if a pixel lies inside the rectangle.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Whether `other` lies entirely within this rectangle.
    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }

    /// Grow by `margin` pixels on every side, clamped to `bounds`.
    pub fn expand_within(&self, margin: u32, bounds: &PixelRect) -> PixelRect {
        let x = self.x.saturating_sub(margin).max(bounds.x);
        let y = self.y.saturating_sub(margin).max(bounds.y);
        let right = (self.right() + margin).min(bounds.right());
        let bottom = (self.bottom() + margin).min(bounds.bottom());
        PixelRect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

/// Compute the letterboxed content box for a `src_w x src_h` frame drawn
/// into a `dst_w x dst_h` target.
///
/// Wider sources fill the target width and are centered vertically; all
/// others fill the target height and are centered horizontally. The
/// result is always contained in the target.
pub fn fit_content(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> PixelRect {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return PixelRect::new(0, 0, 0, 0);
    }

    let src_aspect = src_w as f64 / src_h as f64;
    let dst_aspect = dst_w as f64 / dst_h as f64;

    if src_aspect > dst_aspect {
        let height = ((dst_w as f64 / src_aspect).round() as u32).clamp(1, dst_h);
        PixelRect::new(0, (dst_h - height) / 2, dst_w, height)
    } else {
        let width = ((dst_h as f64 * src_aspect).round() as u32).clamp(1, dst_w);
        PixelRect::new((dst_w - width) / 2, 0, width, dst_h)
    }
}

/// Resolve a percentage-based region against the fitted content box.
///
/// Coordinates outside `0..=100` are clamped so the result never leaves
/// the content box.
pub fn region_bounds(region: &BlurRegion, content: &PixelRect) -> PixelRect {
    let pct = |value: f64| (value / 100.0).clamp(0.0, 1.0);

    let x = (pct(region.x_pct) * content.width as f64).round() as u32;
    let y = (pct(region.y_pct) * content.height as f64).round() as u32;
    let width = (pct(region.width_pct) * content.width as f64).round() as u32;
    let height = (pct(region.height_pct) * content.height as f64).round() as u32;

    let x = x.min(content.width);
    let y = y.min(content.height);
    let width = width.min(content.width - x);
    let height = height.min(content.height - y);

    PixelRect::new(content.x + x, content.y + y, width, height)
}
