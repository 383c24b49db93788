//! Difference hash (dHash) over arbitrary image regions.
//!
//! # Algorithm
//!
//! 1. Convert the image to a floating point luma plane
//!    (`0.299R + 0.587G + 0.114B`, normalised to [0, 1]).
//! 2. Crop the requested region (fractional bounds snap outward to whole pixels).
//! 3. Resample the region to an `(N+1)`x`N` canvas with a triangle filter.
//! 4. Optionally Gaussian-blur the canvas to suppress aliasing and noise.
//! 5. For each row emit bit `1` when a pixel is at least as bright as its right
//!    neighbour, giving `N²` bits in row-major order.
//!
//! The luma plane is computed once per image and shared by every hash the
//! descriptor builder derives from it.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma};

use super::bits::bits_to_hex;

/// Single-channel floating point luma image with values in [0, 1].
pub type LumaPlane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Perceptual luma of an sRGB pixel, normalised to [0, 1].
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
}

/// Convert an image into a luma plane.
pub fn luma_plane(image: &DynamicImage) -> LumaPlane {
    let rgb = image.to_rgb8();
    ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

/// Source rectangle in pixel coordinates. Bounds may be fractional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `width`x`height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    /// Snap to whole pixels inside a `width`x`height` image.
    ///
    /// The start is floored and the end ceiled, so a fractional tile covers
    /// every pixel it touches. The result is at least one pixel wide and high
    /// unless the image itself is empty.
    ///
    /// Returns `(x, y, width, height)`.
    pub fn snap(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (x, w) = snap_axis(self.x, self.width, width);
        let (y, h) = snap_axis(self.y, self.height, height);
        (x, y, w, h)
    }
}

fn snap_axis(start: f64, len: f64, limit: u32) -> (u32, u32) {
    let lo = start.floor().max(0.0).min(limit.saturating_sub(1) as f64) as u32;
    let hi = ((start + len).ceil().min(limit as f64) as u32)
        .max(lo + 1)
        .min(limit);
    (lo, hi.saturating_sub(lo))
}

/// Compute the dHash of a region of a luma plane.
///
/// # Arguments
///
/// * `plane` - Luma plane of the source image
/// * `region` - Source rectangle
/// * `size` - Output resolution `N`; the hash has `N²` bits
/// * `blur` - Gaussian sigma applied to the canvas (`0` = none)
///
/// # Returns
///
/// `ceil(N² / 4)` lowercase hex characters. Deterministic for identical input.
/// Regions a few pixels across still hash, but the result is degenerate;
/// callers reject tiny source images first.
pub fn compute_hash(plane: &LumaPlane, region: Region, size: u32, blur: f32) -> String {
    if size == 0 {
        return String::new();
    }

    let (x, y, w, h) = region.snap(plane.width(), plane.height());
    let cropped = imageops::crop_imm(plane, x, y, w, h).to_image();

    let mut canvas = imageops::resize(&cropped, size + 1, size, FilterType::Triangle);
    if blur.is_normal() && blur > 0.0 {
        canvas = imageops::blur(&canvas, blur);
    }

    let mut bits = Vec::with_capacity((size * size) as usize);
    for row in 0..size {
        for col in 0..size {
            let left = canvas.get_pixel(col, row)[0];
            let right = canvas.get_pixel(col + 1, row)[0];
            bits.push(left >= right);
        }
    }

    bits_to_hex(&bits)
}

/// Side of the single whole-image hash written by first-generation indexers.
pub const LEGACY_HASH_SIZE: u32 = 32;

/// Whole-image hash in the first-generation indexer's format.
///
/// Differs from [`compute_hash`] in three ways: the image is resampled in
/// RGB and luma is taken from the resampled 8-bit channels, there is no
/// blur, and a bit is `1` only when a pixel is strictly brighter than its
/// right neighbour. Flat areas therefore hash to `0` here and to `1` there,
/// so the two formats are never compared with each other.
pub fn legacy_hash(image: &DynamicImage) -> String {
    let size = LEGACY_HASH_SIZE;
    let canvas = imageops::resize(&image.to_rgb8(), size + 1, size, FilterType::Triangle);
    let bright = |x: u32, y: u32| {
        let [r, g, b] = canvas.get_pixel(x, y).0;
        luma(r, g, b)
    };

    let mut bits = Vec::with_capacity((size * size) as usize);
    for row in 0..size {
        for col in 0..size {
            bits.push(bright(col, row) > bright(col + 1, row));
        }
    }
    bits_to_hex(&bits)
}

/// Convenience wrapper hashing a region of a decoded image.
pub fn hash_image(image: &DynamicImage, region: Region, size: u32, blur: f32) -> String {
    compute_hash(&luma_plane(image), region, size, blur)
}
