//! Per-image descriptor and its builder.
//!
//! A descriptor bundles every signal the scoring engine compares:
//!
//! - `global_hash`: one dHash of the whole image (default 16x16 = 256 bits)
//! - `blocks`: one small dHash per cell of a G x G grid (default 9x9 cells, 64 bits each)
//! - `multi_scale`: whole-image dHashes at each configured resolution
//! - `color`: average HSV per cell of a coarse grid
//! - `fingerprint`: grayscale bytes of the center square, resampled (default 32x32)
//! - `content_hash`: grayscale bytes sampled from a full-frame downsample (default 256)
//! - `legacy_hash`: the 32x32 whole-image hash in the first-generation indexer's
//!   format, so records that indexer wrote can still be matched
//!
//! Every signal is optional. Records written by older indexers carry only a
//! subset, and the scoring engine renormalises its weights over whichever
//! signals both sides have.

use std::collections::BTreeMap;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::color::ColorSignature;
use crate::config::{HashParams, SearchConfig};
use crate::error::{NearsightError, Result};
use crate::hash::{
    compute_hash, hex_len, is_hex, legacy_hash, luma_plane, LumaPlane, Region, LEGACY_HASH_SIZE,
};

/// Fingerprint of one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<String>>,
    /// Resolution -> hash. Empty when the signal is absent.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub multi_scale: BTreeMap<u32, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_hash: Option<String>,
}

impl ImageDescriptor {
    /// Check every present signal against the shapes `params` produces.
    ///
    /// Hex strings must be hex and exactly as long as their size implies,
    /// the block count must be `block_grid²`, multi-scale keys must come from
    /// the configured scale set, color cells must number `color_grid²` with
    /// components in [0, 1], and pixel arrays must have the configured length.
    /// A descriptor with no hash signal at all is rejected.
    pub fn validate(&self, params: &HashParams) -> Result<()> {
        if self.global_hash.is_none()
            && self.blocks.is_none()
            && self.multi_scale.is_empty()
            && self.legacy_hash.is_none()
        {
            return Err(NearsightError::InvalidDescriptor(
                "descriptor carries no hash signal".into(),
            ));
        }

        if let Some(global) = &self.global_hash {
            check_hex("globalHash", global, params.global_size)?;
        }

        if let Some(blocks) = &self.blocks {
            let expected = HashParams::bits_for(params.block_grid);
            if blocks.len() != expected {
                return Err(NearsightError::InvalidDescriptor(format!(
                    "expected {expected} blocks, got {}",
                    blocks.len()
                )));
            }
            for block in blocks {
                check_hex("block", block, params.block_size)?;
            }
        }

        for (size, hash) in &self.multi_scale {
            if !params.multi_scale_sizes.contains(size) {
                return Err(NearsightError::InvalidDescriptor(format!(
                    "unexpected multi-scale resolution {size}"
                )));
            }
            check_hex("multiScale", hash, *size)?;
        }

        if let Some(legacy) = &self.legacy_hash {
            check_hex("legacyHash", legacy, LEGACY_HASH_SIZE)?;
        }

        if let Some(color) = &self.color {
            let expected = HashParams::bits_for(params.color_grid);
            if color.len() != expected {
                return Err(NearsightError::InvalidDescriptor(format!(
                    "expected {expected} color cells, got {}",
                    color.len()
                )));
            }
            if !color.is_normalised() {
                return Err(NearsightError::InvalidDescriptor(
                    "color components must lie in [0, 1]".into(),
                ));
            }
        }

        if let Some(fingerprint) = &self.fingerprint {
            if fingerprint.len() != params.fingerprint_len() {
                return Err(NearsightError::InvalidDescriptor(format!(
                    "expected {} fingerprint samples, got {}",
                    params.fingerprint_len(),
                    fingerprint.len()
                )));
            }
        }

        if let Some(content) = &self.content_hash {
            if content.len() != params.content_len() {
                return Err(NearsightError::InvalidDescriptor(format!(
                    "expected {} content samples, got {}",
                    params.content_len(),
                    content.len()
                )));
            }
        }

        Ok(())
    }
}

fn check_hex(field: &str, value: &str, size: u32) -> Result<()> {
    let expected = hex_len(HashParams::bits_for(size));
    if value.len() != expected || !is_hex(value) {
        return Err(NearsightError::InvalidHash(format!(
            "{field}: expected {expected} hex characters for size {size}"
        )));
    }
    Ok(())
}

/// Builds descriptors from decoded images.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    params: HashParams,
}

impl DescriptorBuilder {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.hash.clone())
    }

    pub fn params(&self) -> &HashParams {
        &self.params
    }

    /// Decode image bytes (JPEG, PNG, GIF or WebP) and build their descriptor.
    pub fn build_from_bytes(&self, data: &[u8]) -> Result<ImageDescriptor> {
        let image = image::load_from_memory(data)
            .map_err(|e| NearsightError::ImageDecode(format!("Failed to decode image: {e}")))?;
        self.build(&image)
    }

    /// Build the full descriptor of an image.
    ///
    /// Pure: identical pixels and parameters give bit-identical descriptors.
    ///
    /// # Errors
    ///
    /// [`NearsightError::ImageTooSmall`] if either side is below
    /// `min_dimension` (default 32).
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn build(&self, image: &DynamicImage) -> Result<ImageDescriptor> {
        let (width, height) = (image.width(), image.height());
        let p = &self.params;

        if width < p.min_dimension || height < p.min_dimension {
            return Err(NearsightError::ImageTooSmall {
                width,
                height,
                min: p.min_dimension,
            });
        }

        let plane = luma_plane(image);
        let full = Region::full(width, height);

        let global_hash = compute_hash(&plane, full, p.global_size, p.global_blur);

        let tile_w = width as f64 / p.block_grid as f64;
        let tile_h = height as f64 / p.block_grid as f64;
        let mut blocks = Vec::with_capacity(HashParams::bits_for(p.block_grid));
        for gy in 0..p.block_grid {
            for gx in 0..p.block_grid {
                let region = Region::new(gx as f64 * tile_w, gy as f64 * tile_h, tile_w, tile_h);
                blocks.push(compute_hash(&plane, region, p.block_size, p.block_blur));
            }
        }

        let multi_scale = p
            .multi_scale_sizes
            .iter()
            .map(|&size| (size, compute_hash(&plane, full, size, p.multi_scale_blur)))
            .collect();

        let color = ColorSignature::from_image(image, p.color_canvas, p.color_grid);

        let fingerprint = p
            .compute_fingerprint
            .then(|| center_fingerprint(&plane, p.fingerprint_size));
        let content_hash = p
            .compute_content_hash
            .then(|| content_samples(&plane, p.content_canvas, p.content_samples));
        let legacy_hash = p.compute_legacy_hash.then(|| legacy_hash(image));

        tracing::debug!(
            blocks = blocks.len(),
            scales = p.multi_scale_sizes.len(),
            "Built image descriptor"
        );

        Ok(ImageDescriptor {
            global_hash: Some(global_hash),
            blocks: Some(blocks),
            multi_scale,
            color: Some(color),
            fingerprint,
            content_hash,
            legacy_hash,
        })
    }
}

/// Grayscale bytes of the centered square crop, resampled to `size`x`size`.
fn center_fingerprint(plane: &LumaPlane, size: u32) -> Vec<u8> {
    let side = plane.width().min(plane.height());
    let x = (plane.width() - side) / 2;
    let y = (plane.height() - side) / 2;
    let square = imageops::crop_imm(plane, x, y, side, side).to_image();
    let grid = imageops::resize(&square, size, size, FilterType::Triangle);
    grid.pixels().map(|p| to_byte(p[0])).collect()
}

/// `samples`x`samples` evenly spaced bytes from a `canvas`x`canvas` downsample.
fn content_samples(plane: &LumaPlane, canvas: u32, samples: u32) -> Vec<u8> {
    let small = imageops::resize(plane, canvas, canvas, FilterType::Triangle);
    let stride = canvas as f64 / samples as f64;
    let at = |i: u32| (((i as f64 + 0.5) * stride) as u32).min(canvas.saturating_sub(1));

    let mut out = Vec::with_capacity((samples * samples) as usize);
    for j in 0..samples {
        for i in 0..samples {
            out.push(to_byte(small.get_pixel(at(i), at(j))[0]));
        }
    }
    out
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
