//! Procedural test images shared by the integration tests.

#![allow(dead_code)]

use std::f64::consts::PI;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// Small deterministic generator so test images never depend on a RNG crate.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Sum of five seeded plane waves over a flat base color.
///
/// Textured everywhere, so every grid block carries structure.
pub fn texture(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = Lcg::new(seed);

    let waves: Vec<(f64, f64, f64, f64, usize)> = (0..5)
        .map(|_| {
            let angle = rng.below(360) as f64 * PI / 180.0;
            let period = width as f64 / (2 + rng.below(6)) as f64;
            let phase = rng.below(628) as f64 / 100.0;
            let amplitude = (20 + rng.below(30)) as f64;
            let channel = rng.below(3) as usize;
            let k = 2.0 * PI / period;
            (angle.cos() * k, angle.sin() * k, phase, amplitude, channel)
        })
        .collect();
    let base: Vec<f64> = (0..3).map(|_| (60 + rng.below(120)) as f64).collect();

    let img = RgbImage::from_fn(width, height, |x, y| {
        let mut px = [base[0], base[1], base[2]];
        for &(kx, ky, phase, amplitude, channel) in &waves {
            let v = amplitude * (kx * x as f64 + ky * y as f64 + phase).sin();
            px[channel] += v;
            px[(channel + 1) % 3] += v * 0.5;
        }
        Rgb(px.map(|c| (c as i32).clamp(0, 255) as u8))
    });
    DynamicImage::ImageRgb8(img)
}

/// Smooth background with six seeded circles and rectangles on top.
pub fn scene(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = Lcg::new(seed);
    let (w, h) = (width as u64, height as u64);

    let fx = (1 + rng.below(3)) as f64;
    let fy = (1 + rng.below(3)) as f64;
    let base: Vec<i64> = (0..3).map(|_| rng.below(256) as i64).collect();

    let shapes: Vec<(u64, i64, i64, i64, [u8; 3])> = (0..6)
        .map(|_| {
            let cx = rng.below(w) as i64;
            let cy = rng.below(h) as i64;
            let r = (w / 10 + rng.below(w / 5)) as i64;
            let color = [
                rng.below(256) as u8,
                rng.below(256) as u8,
                rng.below(256) as u8,
            ];
            let kind = rng.below(2);
            (kind, cx, cy, r, color)
        })
        .collect();

    let img = RgbImage::from_fn(width, height, |x, y| {
        let t = (fx * PI * x as f64 / width as f64).sin() * (fy * PI * y as f64 / height as f64).cos();
        let mut px = [0u8; 3];
        for (c, value) in px.iter_mut().enumerate() {
            let sign = if c == 1 { -1.0 } else { 1.0 };
            *value = ((base[c] as f64 + 60.0 * t * sign) as i32).clamp(0, 255) as u8;
        }

        let (x, y) = (x as i64, y as i64);
        for &(kind, cx, cy, r, color) in &shapes {
            let inside = if kind == 0 {
                (x - cx).pow(2) + (y - cy).pow(2) <= r * r
            } else {
                (x - cx).abs() <= r && (y - cy).abs() <= r / 2
            };
            if inside {
                px = color;
            }
        }
        Rgb(px)
    });
    DynamicImage::ImageRgb8(img)
}

/// Uniform random RGB noise.
pub fn noise(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = Lcg::new(seed);
    let mut img = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let px = [
                rng.below(256) as u8,
                rng.below(256) as u8,
                rng.below(256) as u8,
            ];
            img.put_pixel(x, y, Rgb(px));
        }
    }
    DynamicImage::ImageRgb8(img)
}

/// White canvas with a dark square, mostly flat background.
pub fn square_on_white(side: u32) -> DynamicImage {
    let (lo, hi) = (side * 3 / 10, side * 7 / 10);
    let img = RgbImage::from_fn(side, side, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb([30, 30, 40])
        } else {
            Rgb([255, 255, 255])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Hash the way the first-generation indexer wrote it: a 33x32 RGB canvas,
/// luma from the canvas bytes, `1` only when left is strictly brighter, then
/// the bit string read four characters at a time as hex.
pub fn first_generation_hash(image: &DynamicImage) -> String {
    let canvas = image.resize_exact(33, 32, FilterType::Triangle).to_rgb8();
    let brightness = |x: u32, y: u32| {
        let p = canvas.get_pixel(x, y).0;
        p[0] as f64 * 0.299 + p[1] as f64 * 0.587 + p[2] as f64 * 0.114
    };

    let mut bin = String::with_capacity(1024);
    for y in 0..32 {
        for x in 0..32 {
            bin.push(if brightness(x, y) > brightness(x + 1, y) { '1' } else { '0' });
        }
    }
    bin.as_bytes()
        .chunks(4)
        .map(|nibble| {
            let value = u8::from_str_radix(std::str::from_utf8(nibble).unwrap(), 2).unwrap();
            char::from_digit(value as u32, 16).unwrap()
        })
        .collect()
}

/// Centered crop keeping `fraction` of each side (0.7746 keeps 60% of the area).
pub fn center_crop(image: &DynamicImage, fraction: f64) -> DynamicImage {
    let cw = (image.width() as f64 * fraction).round() as u32;
    let ch = (image.height() as f64 * fraction).round() as u32;
    let x = (image.width() - cw) / 2;
    let y = (image.height() - ch) / 2;
    image.crop_imm(x, y, cw, ch)
}

pub fn blurred(image: &DynamicImage, sigma: f32) -> DynamicImage {
    DynamicImage::ImageRgb8(imageops::blur(&image.to_rgb8(), sigma))
}

pub fn resized(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(imageops::resize(
        &image.to_rgb8(),
        width,
        height,
        FilterType::Triangle,
    ))
}

/// Re-encode as JPEG at the given quality.
pub fn recompressed(image: &DynamicImage, quality: u8) -> DynamicImage {
    let mut buffer = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .expect("JPEG encoding failed");
    image::load_from_memory(&buffer.into_inner()).expect("JPEG decoding failed")
}
