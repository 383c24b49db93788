//! Pairwise similarity functions between descriptor signals.
//!
//! Every function returns a value in [0, 1]. Inputs that cannot be compared
//! (mismatched lengths, malformed hex) never panic: hash comparisons fall back
//! to worst-case similarity, while optional signals return `None` so the
//! scoring engine can leave them out of the weighted sum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{HashParams, SimilarityParams};
use crate::hash::{hamming_distance, hex_similarity};

pub use crate::color::color_similarity;

/// `1 - hamming / bits` for two `size`x`size` hashes.
pub fn global_similarity(a: &str, b: &str, size: u32) -> f64 {
    hex_similarity(a, b, HashParams::bits_for(size))
}

/// Directional nearest-neighbour block matching.
///
/// For every block of `a`, find the closest block anywhere in `b`. Positions
/// are ignored so translated or cropped content still finds its counterpart.
/// A block counts as strongly matched when its best distance is at most
/// `good_distance`. Returns the fraction of strongly matched blocks in `a`.
pub fn block_similarity(a: &[String], b: &[String], good_distance: u32) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let strong = a
        .iter()
        .filter(|block| {
            b.iter()
                .filter_map(|other| hamming_distance(block, other))
                .min()
                .is_some_and(|best| best <= good_distance)
        })
        .count();

    strong as f64 / a.len() as f64
}

/// Aggregate similarity across the multi-scale hash family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiScaleSimilarity {
    /// Weighted mean of per-scale similarities
    pub score: f64,
    /// Lowest per-scale similarity
    pub min: f64,
    /// Highest per-scale similarity
    pub max: f64,
    /// Number of resolutions both sides share
    pub compared: usize,
    /// Every detail level agrees: spread below the threshold over enough scales
    pub consistent: bool,
}

/// Compare two multi-scale maps over their shared resolutions.
///
/// Each scale contributes `1 - distance / size²`, weighted by
/// `params.scale_weights` (missing entries weigh 1.0). Returns `None` when
/// the maps share no resolution.
pub fn multi_scale_similarity(
    a: &BTreeMap<u32, String>,
    b: &BTreeMap<u32, String>,
    params: &SimilarityParams,
) -> Option<MultiScaleSimilarity> {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut plain = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut compared = 0usize;

    for (size, hash_a) in a {
        let Some(hash_b) = b.get(size) else {
            continue;
        };
        let sim = global_similarity(hash_a, hash_b, *size);
        let weight = params.scale_weights.get(size).copied().unwrap_or(1.0);

        weighted += sim * weight;
        total_weight += weight;
        plain += sim;
        min = min.min(sim);
        max = max.max(sim);
        compared += 1;
    }

    if compared == 0 {
        return None;
    }

    let score = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        plain / compared as f64
    };

    Some(MultiScaleSimilarity {
        score: score.clamp(0.0, 1.0),
        min,
        max,
        compared,
        consistent: compared >= params.consistency_min_scales
            && max - min < params.consistency_spread,
    })
}

/// Fraction of positions whose byte values differ by at most `tolerance`.
///
/// Returns `None` for empty or mismatched-length arrays.
pub fn pixel_array_similarity(a: &[u8], b: &[u8], tolerance: u8) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let within = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.abs_diff(**y) <= tolerance)
        .count();

    Some(within as f64 / a.len() as f64)
}
