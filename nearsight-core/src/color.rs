//! Coarse color layout signature in HSV space.

use std::f64::consts::TAU;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Hue, saturation and value, each in [0, 1]. Hue wraps around at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Hsv {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let s = if max == 0.0 { 0.0 } else { delta / max };
        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };

        Self {
            h: (h / 6.0).rem_euclid(1.0) as f32,
            s: s as f32,
            v: max as f32,
        }
    }

    fn is_normalised(&self) -> bool {
        [self.h, self.s, self.v]
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

/// Per-cell average HSV over a square grid, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorSignature(pub Vec<Hsv>);

impl ColorSignature {
    /// Downsample `image` to a `canvas`x`canvas` RGB grid and average HSV over
    /// `grid`x`grid` cells. Hue is averaged on the circle.
    pub fn from_image(image: &DynamicImage, canvas: u32, grid: u32) -> Self {
        let canvas = canvas.max(1);
        let grid = grid.clamp(1, canvas);
        let small = imageops::resize(&image.to_rgb8(), canvas, canvas, FilterType::Triangle);

        let mut cells = Vec::with_capacity((grid * grid) as usize);
        for gy in 0..grid {
            for gx in 0..grid {
                let (y0, y1) = (gy * canvas / grid, (gy + 1) * canvas / grid);
                let (x0, x1) = (gx * canvas / grid, (gx + 1) * canvas / grid);

                let (mut cos_sum, mut sin_sum) = (0.0f64, 0.0f64);
                let (mut s_sum, mut v_sum) = (0.0f64, 0.0f64);
                let mut count = 0u32;

                for y in y0..y1 {
                    for x in x0..x1 {
                        let [r, g, b] = small.get_pixel(x, y).0;
                        let hsv = Hsv::from_rgb(r, g, b);
                        let angle = hsv.h as f64 * TAU;
                        cos_sum += angle.cos();
                        sin_sum += angle.sin();
                        s_sum += hsv.s as f64;
                        v_sum += hsv.v as f64;
                        count += 1;
                    }
                }

                let n = count.max(1) as f64;
                cells.push(Hsv {
                    h: (sin_sum.atan2(cos_sum) / TAU).rem_euclid(1.0) as f32,
                    s: (s_sum / n) as f32,
                    v: (v_sum / n) as f32,
                });
            }
        }

        Self(cells)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All components finite and inside [0, 1].
    pub fn is_normalised(&self) -> bool {
        self.0.iter().all(Hsv::is_normalised)
    }
}

/// Distance between two hues on the unit circle, in [0, 0.5].
#[inline]
pub fn hue_distance(a: f32, b: f32) -> f64 {
    let d = (a as f64 - b as f64).abs().rem_euclid(1.0);
    if d > 0.5 {
        1.0 - d
    } else {
        d
    }
}

/// Cell-wise color similarity in [0, 1].
///
/// Each cell's distance averages the circular hue distance (scaled to [0, 1])
/// with the absolute saturation and value differences; the similarity is the
/// mean complement over all cells.
///
/// Returns `None` when either signature is empty or the lengths differ. `None`
/// means "do not use this signal", not zero similarity.
pub fn color_similarity(a: &ColorSignature, b: &ColorSignature) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let total: f64 = a
        .0
        .iter()
        .zip(&b.0)
        .map(|(x, y)| {
            let dh = hue_distance(x.h, y.h) * 2.0;
            let ds = (x.s as f64 - y.s as f64).abs();
            let dv = (x.v as f64 - y.v as f64).abs();
            1.0 - (dh + ds + dv) / 3.0
        })
        .sum();

    Some((total / a.len() as f64).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 60, Rgb([r, g, b])))
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        let red = Hsv::from_rgb(255, 0, 0);
        assert!((red.h - 0.0).abs() < 1e-6);
        assert!((red.s - 1.0).abs() < 1e-6);
        assert!((red.v - 1.0).abs() < 1e-6);

        let green = Hsv::from_rgb(0, 255, 0);
        assert!((green.h - 1.0 / 3.0).abs() < 1e-6);

        let blue = Hsv::from_rgb(0, 0, 255);
        assert!((blue.h - 2.0 / 3.0).abs() < 1e-6);

        let grey = Hsv::from_rgb(128, 128, 128);
        assert_eq!(grey.h, 0.0);
        assert_eq!(grey.s, 0.0);
    }

    #[test]
    fn test_hue_distance_wraps() {
        assert!((hue_distance(0.95, 0.05) - 0.1).abs() < 1e-6);
        assert!((hue_distance(0.05, 0.95) - 0.1).abs() < 1e-6);
        assert!((hue_distance(0.0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(hue_distance(0.3, 0.3), 0.0);
    }

    #[test]
    fn test_signature_shape() {
        let sig = ColorSignature::from_image(&solid(200, 40, 40), 30, 3);
        assert_eq!(sig.len(), 9);
        assert!(sig.is_normalised());
        for cell in &sig.0 {
            assert!(cell.s > 0.7);
        }
    }

    #[test]
    fn test_circular_hue_average() {
        // Left half just below hue 1.0, right half just above 0.0
        let img = RgbImage::from_fn(60, 60, |x, _| {
            if x < 30 {
                Rgb([255, 0, 20])
            } else {
                Rgb([255, 20, 0])
            }
        });
        let sig = ColorSignature::from_image(&DynamicImage::ImageRgb8(img), 2, 1);
        let h = sig.0[0].h;
        // A linear mean would land near 0.5
        assert!(h < 0.05 || h > 0.95, "hue {h}");
    }

    #[test]
    fn test_color_similarity_identity_and_contrast() {
        let red = ColorSignature::from_image(&solid(220, 30, 30), 30, 3);
        let blue = ColorSignature::from_image(&solid(30, 30, 220), 30, 3);

        let same = color_similarity(&red, &red).unwrap();
        assert!((same - 1.0).abs() < 1e-9);

        let different = color_similarity(&red, &blue).unwrap();
        assert!(different < 0.8);
        assert_eq!(color_similarity(&red, &blue), color_similarity(&blue, &red));
    }

    #[test]
    fn test_color_similarity_sentinel() {
        let a = ColorSignature::from_image(&solid(10, 200, 10), 30, 3);
        let b = ColorSignature::from_image(&solid(10, 200, 10), 30, 2);
        assert_eq!(color_similarity(&a, &b), None);
        assert_eq!(color_similarity(&ColorSignature(vec![]), &ColorSignature(vec![])), None);
    }
}
