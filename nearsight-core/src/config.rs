//! Search configuration.
//!
//! Every tunable used by the hashing, similarity, scoring and search stages
//! lives in one immutable [`SearchConfig`] value that is passed by reference
//! through the whole pipeline. Defaults are empirical starting points, not
//! derived optima.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NearsightError, Result};

/// Current configuration schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Resolutions of the multi-scale hash family, ascending.
pub const DEFAULT_SCALES: [u32; 9] = [4, 6, 8, 10, 12, 16, 20, 24, 32];

/// Largest accepted hash or fingerprint side.
pub const MAX_HASH_SIZE: u32 = 64;
/// Largest accepted cells per side of the block and color grids.
pub const MAX_GRID: u32 = 32;
/// Largest accepted side of the color and content sampling canvases.
pub const MAX_CANVAS: u32 = 256;

/// Complete, versioned search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Schema version (see [`CONFIG_VERSION`])
    pub version: u32,
    pub hash: HashParams,
    pub similarity: SimilarityParams,
    pub scoring: ScoringParams,
    pub search: SearchParams,
}

/// Descriptor construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashParams {
    /// Side of the global structural hash (default: 16 -> 256 bits)
    pub global_size: u32,
    /// Blur sigma applied to the global hash canvas (default: 0.6)
    pub global_blur: f32,
    /// Cells per side of the spatial block grid (default: 9)
    pub block_grid: u32,
    /// Side of each block hash (default: 8 -> 64 bits)
    pub block_size: u32,
    /// Blur sigma applied to block canvases (default: 0.3)
    pub block_blur: f32,
    /// Multi-scale resolution set, ascending (default: [`DEFAULT_SCALES`])
    pub multi_scale_sizes: Vec<u32>,
    /// Blur sigma applied to multi-scale canvases (default: 0.4)
    pub multi_scale_blur: f32,
    /// Side of the color sampling canvas (default: 30)
    pub color_canvas: u32,
    /// Cells per side of the color grid (default: 3)
    pub color_grid: u32,
    /// Compute the center-crop pixel fingerprint (default: true)
    pub compute_fingerprint: bool,
    /// Side of the fingerprint grid (default: 32 -> 1024 samples)
    pub fingerprint_size: u32,
    /// Compute the full-frame content hash (default: true)
    pub compute_content_hash: bool,
    /// Side of the content hash downsample (default: 64)
    pub content_canvas: u32,
    /// Samples per side taken from the content canvas (default: 16 -> 256 samples)
    pub content_samples: u32,
    /// Compute the first-generation 32x32 hash for matching old records (default: true)
    pub compute_legacy_hash: bool,
    /// Images narrower or shorter than this are rejected (default: 32)
    pub min_dimension: u32,
}

/// Pairwise comparator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityParams {
    /// Maximum Hamming distance for a block to count as strongly matched (default: 12)
    pub block_match_distance: u32,
    /// Weight per multi-scale resolution; finer scales carry more weight
    pub scale_weights: BTreeMap<u32, f64>,
    /// Maximum min/max spread across scales for the consistency flag (default: 0.1)
    pub consistency_spread: f64,
    /// Minimum number of compared scales for the consistency flag (default: 5)
    pub consistency_min_scales: usize,
    /// Per-sample byte tolerance for the fingerprint signal (default: 10)
    pub fingerprint_tolerance: u8,
    /// Per-sample byte tolerance for the content hash signal (default: 16)
    pub content_tolerance: u8,
}

/// Weights of the individual signals in the combined score.
///
/// Weights are renormalised over the signals present for a given pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub multi_scale: f64,
    pub structural: f64,
    pub color: f64,
    pub fingerprint: f64,
    pub content: f64,
}

/// Scoring engine thresholds, boosts and classification bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub weights: SignalWeights,

    /// Early exit: structural score gate (default: 0.6)
    pub structural_gate: f64,
    /// Early exit: multi-scale gate (default: 0.6)
    pub multi_scale_gate: f64,
    /// A pixel-level signal at or above this keeps a candidate past the gates (default: 0.95)
    pub pixel_rescue: f64,

    /// Structural-priority boost threshold (default: 0.92)
    pub structural_boost_threshold: f64,
    /// Structural-priority boost magnitude (default: 0.05)
    pub structural_boost: f64,
    /// Color boost threshold (default: 0.85)
    pub color_boost_threshold: f64,
    /// Color boost per unit of similarity above the threshold (default: 0.5)
    pub color_boost_factor: f64,
    /// Color boost cap (default: 0.05)
    pub color_boost_max: f64,
    /// Triple agreement: structural minimum (default: 0.70)
    pub triple_structural: f64,
    /// Triple agreement: color minimum (default: 0.75)
    pub triple_color: f64,
    /// Triple agreement: multi-scale minimum (default: 0.75)
    pub triple_multi_scale: f64,
    /// Triple agreement boost (default: 0.05)
    pub triple_boost: f64,
    /// Multi-scale consistency bonus (default: 0.03)
    pub consistency_boost: f64,
    /// Pixel similarity treated as an exact match (default: 0.95)
    pub exact_match_threshold: f64,
    /// Exact match bonus (default: 0.20)
    pub exact_match_boost: f64,

    /// Very-close band: multi-scale minimum (default: 0.92)
    pub very_close_multi_scale: f64,
    /// Very-close band: structural minimum (default: 0.90)
    pub very_close_structural: f64,
    /// Perfect-structural band: global minimum (default: 0.95)
    pub perfect_structural: f64,
    /// Good-structural band: global minimum (default: 0.85)
    pub good_structural: f64,
    /// Crop/partial band: block minimum (default: 0.60)
    pub crop_block_min: f64,
    /// Crop/partial band: required lead of block over global similarity (default: 0.15)
    pub crop_block_margin: f64,
    /// Color-led band: color minimum (default: 0.90)
    pub color_led_min: f64,

    /// Candidates below this final score are rejected... (default: 0.50)
    pub min_score: f64,
    /// ...unless multi-scale similarity alone reaches this (default: 0.75)
    pub multi_scale_bypass: f64,
}

/// Search orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Maximum number of results returned (default: 10)
    pub max_results: usize,
    /// Multi-scale difference above which it alone decides ranking (default: 0.05)
    pub multi_scale_priority_margin: f64,
    /// Records between progress reports (default: 1000)
    pub progress_interval: usize,
    /// Records fetched per store round-trip when loading a corpus (default: 500)
    pub load_chunk_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            hash: HashParams::default(),
            similarity: SimilarityParams::default(),
            scoring: ScoringParams::default(),
            search: SearchParams::default(),
        }
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            global_size: 16,
            global_blur: 0.6,
            block_grid: 9,
            block_size: 8,
            block_blur: 0.3,
            multi_scale_sizes: DEFAULT_SCALES.to_vec(),
            multi_scale_blur: 0.4,
            color_canvas: 30,
            color_grid: 3,
            compute_fingerprint: true,
            fingerprint_size: 32,
            compute_content_hash: true,
            content_canvas: 64,
            content_samples: 16,
            compute_legacy_hash: true,
            min_dimension: 32,
        }
    }
}

impl Default for SimilarityParams {
    fn default() -> Self {
        let scale_weights = [
            (4, 0.5),
            (6, 0.6),
            (8, 0.8),
            (10, 0.9),
            (12, 1.0),
            (16, 1.2),
            (20, 1.3),
            (24, 1.4),
            (32, 1.5),
        ]
        .into_iter()
        .collect();

        Self {
            block_match_distance: 12,
            scale_weights,
            consistency_spread: 0.1,
            consistency_min_scales: 5,
            fingerprint_tolerance: 10,
            content_tolerance: 16,
        }
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            multi_scale: 0.40,
            structural: 0.30,
            color: 0.10,
            fingerprint: 0.12,
            content: 0.08,
        }
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            structural_gate: 0.6,
            multi_scale_gate: 0.6,
            pixel_rescue: 0.95,
            structural_boost_threshold: 0.92,
            structural_boost: 0.05,
            color_boost_threshold: 0.85,
            color_boost_factor: 0.5,
            color_boost_max: 0.05,
            triple_structural: 0.70,
            triple_color: 0.75,
            triple_multi_scale: 0.75,
            triple_boost: 0.05,
            consistency_boost: 0.03,
            exact_match_threshold: 0.95,
            exact_match_boost: 0.20,
            very_close_multi_scale: 0.92,
            very_close_structural: 0.90,
            perfect_structural: 0.95,
            good_structural: 0.85,
            crop_block_min: 0.60,
            crop_block_margin: 0.15,
            color_led_min: 0.90,
            min_score: 0.50,
            multi_scale_bypass: 0.75,
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_results: 10,
            multi_scale_priority_margin: 0.05,
            progress_interval: 1000,
            load_chunk_size: 500,
        }
    }
}

impl SearchConfig {
    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Recognised: `NEARSIGHT_MAX_RESULTS`, `NEARSIGHT_MIN_SCORE`,
    /// `NEARSIGHT_PROGRESS_INTERVAL`, `NEARSIGHT_LOAD_CHUNK`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(max_results) = env_parse("NEARSIGHT_MAX_RESULTS") {
            config.search.max_results = max_results;
        }

        if let Some(min_score) = env_parse("NEARSIGHT_MIN_SCORE") {
            config.scoring.min_score = min_score;
        }

        if let Some(interval) = env_parse("NEARSIGHT_PROGRESS_INTERVAL") {
            config.search.progress_interval = interval;
        }

        if let Some(chunk) = env_parse("NEARSIGHT_LOAD_CHUNK") {
            config.search.load_chunk_size = chunk;
        }

        config
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NearsightError::InvalidConfig(format!("Invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| NearsightError::Serialization(e.to_string()))
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(NearsightError::InvalidConfig(format!(
                "Unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }

        let hash = &self.hash;
        let sizes = [
            ("global_size", hash.global_size, MAX_HASH_SIZE),
            ("block_grid", hash.block_grid, MAX_GRID),
            ("block_size", hash.block_size, MAX_HASH_SIZE),
            ("color_canvas", hash.color_canvas, MAX_CANVAS),
            ("color_grid", hash.color_grid, MAX_GRID),
            ("fingerprint_size", hash.fingerprint_size, MAX_HASH_SIZE),
            ("content_canvas", hash.content_canvas, MAX_CANVAS),
            ("content_samples", hash.content_samples, MAX_CANVAS),
        ];
        for (name, value, max) in sizes {
            if value == 0 || value > max {
                return Err(NearsightError::InvalidConfig(format!(
                    "{name} must be within 1..={max}, got {value}"
                )));
            }
        }
        if hash.color_grid > hash.color_canvas {
            return Err(NearsightError::InvalidConfig(
                "color_grid cannot exceed color_canvas".into(),
            ));
        }
        if hash.content_samples > hash.content_canvas {
            return Err(NearsightError::InvalidConfig(
                "content_samples cannot exceed content_canvas".into(),
            ));
        }
        if hash.multi_scale_sizes.is_empty() {
            return Err(NearsightError::InvalidConfig(
                "multi_scale_sizes cannot be empty".into(),
            ));
        }
        if hash
            .multi_scale_sizes
            .iter()
            .any(|&size| size == 0 || size > MAX_HASH_SIZE)
        {
            return Err(NearsightError::InvalidConfig(format!(
                "multi_scale_sizes must lie within 1..={MAX_HASH_SIZE}"
            )));
        }
        if !hash.multi_scale_sizes.windows(2).all(|w| w[0] < w[1]) {
            return Err(NearsightError::InvalidConfig(
                "multi_scale_sizes must be strictly ascending".into(),
            ));
        }
        for (name, sigma) in [
            ("global_blur", hash.global_blur),
            ("block_blur", hash.block_blur),
            ("multi_scale_blur", hash.multi_scale_blur),
        ] {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(NearsightError::InvalidConfig(format!(
                    "{name} must be a finite non-negative sigma"
                )));
            }
        }

        if self
            .similarity
            .scale_weights
            .values()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(NearsightError::InvalidConfig(
                "scale weights must be finite and non-negative".into(),
            ));
        }

        let w = &self.scoring.weights;
        let weights = [w.multi_scale, w.structural, w.color, w.fingerprint, w.content];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(NearsightError::InvalidConfig(
                "signal weights must be finite and non-negative".into(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(NearsightError::InvalidConfig(
                "signal weights cannot all be zero".into(),
            ));
        }

        let s = &self.scoring;
        let unit = [
            ("structural_gate", s.structural_gate),
            ("multi_scale_gate", s.multi_scale_gate),
            ("pixel_rescue", s.pixel_rescue),
            ("structural_boost_threshold", s.structural_boost_threshold),
            ("color_boost_threshold", s.color_boost_threshold),
            ("triple_structural", s.triple_structural),
            ("triple_color", s.triple_color),
            ("triple_multi_scale", s.triple_multi_scale),
            ("exact_match_threshold", s.exact_match_threshold),
            ("very_close_multi_scale", s.very_close_multi_scale),
            ("very_close_structural", s.very_close_structural),
            ("perfect_structural", s.perfect_structural),
            ("good_structural", s.good_structural),
            ("crop_block_min", s.crop_block_min),
            ("color_led_min", s.color_led_min),
            ("min_score", s.min_score),
            ("multi_scale_bypass", s.multi_scale_bypass),
            (
                "multi_scale_priority_margin",
                self.search.multi_scale_priority_margin,
            ),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(NearsightError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.search.max_results == 0 {
            return Err(NearsightError::InvalidConfig(
                "max_results must be > 0".into(),
            ));
        }
        if self.search.load_chunk_size == 0 {
            return Err(NearsightError::InvalidConfig(
                "load_chunk_size must be > 0".into(),
            ));
        }

        Ok(())
    }
}

impl HashParams {
    /// Number of bits in an `n`x`n` difference hash.
    pub fn bits_for(size: u32) -> usize {
        (size as usize) * (size as usize)
    }

    /// Number of pixel samples in a fingerprint.
    pub fn fingerprint_len(&self) -> usize {
        Self::bits_for(self.fingerprint_size)
    }

    /// Number of pixel samples in a content hash.
    pub fn content_len(&self) -> usize {
        Self::bits_for(self.content_samples)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
