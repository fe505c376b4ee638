//! Separable fixed-point Gaussian blur over RGBA rasters.

use clipweave_sequence_model::geometry::PixelRect;
use image::RgbaImage;

/// Kernel half-width covering three standard deviations.
pub fn kernel_radius(sigma: f64) -> u32 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return 0;
    }
    (sigma * 3.0).ceil() as u32
}

/// Blur the pixels of `image` inside `area` with standard deviation `sigma`.
///
/// Samples are taken from `area` only; reads past its edges clamp to the
/// nearest edge pixel. Pixels outside `area` are left untouched.
pub fn gaussian_blur_in_place(image: &mut RgbaImage, area: PixelRect, sigma: f64) {
    let bounds = PixelRect::full(image.width(), image.height());
    let area = area.expand_within(0, &bounds);
    let radius = kernel_radius(sigma);
    if radius == 0 || area.is_empty() {
        return;
    }

    let kernel = gaussian_kernel_q16(radius, sigma);
    let (w, h) = (area.width as usize, area.height as usize);

    let mut src = Vec::with_capacity(w * h * 4);
    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            src.extend_from_slice(&image.get_pixel(x, y).0);
        }
    }

    let mut tmp = vec![0u8; src.len()];
    horizontal_pass(&src, &mut tmp, w, h, &kernel);
    vertical_pass(&tmp, &mut src, w, h, &kernel);

    for (row, y) in (area.y..area.bottom()).enumerate() {
        for (col, x) in (area.x..area.right()).enumerate() {
            let idx = (row * w + col) * 4;
            image.get_pixel_mut(x, y).0.copy_from_slice(&src[idx..idx + 4]);
        }
    }
}

/// Normalized Gaussian weights in Q16 that sum to exactly 65536.
fn gaussian_kernel_q16(radius: u32, sigma: f64) -> Vec<u32> {
    let r = radius as i32;
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|wf| ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();

    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    weights
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], w: usize, h: usize, k: &[u32]) {
    let radius = (k.len() / 2) as isize;
    let max_x = w as isize - 1;
    for y in 0..h {
        let row = y * w;
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius).clamp(0, max_x) as usize;
                let idx = (row + sx) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = (row + x) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], w: usize, h: usize, k: &[u32]) {
    let radius = (k.len() / 2) as isize;
    let max_y = h as isize - 1;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius).clamp(0, max_y) as usize;
                let idx = (sy * w + x) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = (y * w + x) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_kernel_radius() {
        assert_eq!(kernel_radius(0.0), 0);
        assert_eq!(kernel_radius(-1.0), 0);
        assert_eq!(kernel_radius(f64::NAN), 0);
        assert_eq!(kernel_radius(1.0), 3);
        assert_eq!(kernel_radius(2.5), 8);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        for sigma in [0.5, 1.0, 4.0, 12.0] {
            let k = gaussian_kernel_q16(kernel_radius(sigma), sigma);
            assert_eq!(k.iter().map(|&w| w as u64).sum::<u64>(), 65536);
        }
    }

    #[test]
    fn test_constant_image_is_unchanged() {
        let mut img = RgbaImage::from_pixel(6, 5, Rgba([10, 20, 30, 255]));
        let before = img.clone();
        gaussian_blur_in_place(&mut img, PixelRect::full(6, 5), 2.0);
        assert_eq!(img, before);
    }

    #[test]
    fn test_blur_spreads_within_area_only() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([0, 0, 0, 255]));
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));

        gaussian_blur_in_place(&mut img, PixelRect::new(2, 2, 5, 5), 1.0);

        assert!(img.get_pixel(4, 4).0[0] < 255);
        assert!(img.get_pixel(3, 4).0[0] > 0);
        // Outside the area: untouched.
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(1, 4).0[0], 0);
    }

    #[test]
    fn test_area_is_clamped_to_image() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([50, 50, 50, 255]));
        gaussian_blur_in_place(&mut img, PixelRect::new(2, 2, 100, 100), 3.0);
        assert_eq!(img.get_pixel(3, 3).0, [50, 50, 50, 255]);
    }
}
