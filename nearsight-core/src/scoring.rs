//! Scoring engine: combines the similarity signals of one query/candidate pair
//! into a single ranked score and a match-type label.
//!
//! # Pipeline
//!
//! 1. Multi-scale similarity (primary signal).
//! 2. Structural score: the better of global and block similarity. When a
//!    side has no global hash (records from the first-generation indexer),
//!    the legacy whole-image hash stands in for it.
//! 3. Early exit when both fall below their gates and no pixel-level signal
//!    is strongly positive.
//! 4. Color and pixel-level signals.
//! 5. Additive, independently gated boosts.
//! 6. Weighted sum over the signals present for this pair, renormalised,
//!    plus boosts, clamped to [0, 1].
//! 7. Match-type classification in priority order.
//! 8. Rejection below the minimum score unless multi-scale alone clears the
//!    bypass threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ScoringParams, SearchConfig};
use crate::descriptor::ImageDescriptor;
use crate::hash::LEGACY_HASH_SIZE;
use crate::similarity::{
    block_similarity, color_similarity, global_similarity, multi_scale_similarity,
    pixel_array_similarity, MultiScaleSimilarity,
};

/// Categorical label of a match, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Pixel fingerprint (near-)identical
    ExactPixel,
    /// Multi-scale and structural both very high
    VeryClose,
    /// Whole-image structure identical
    PerfectStructural,
    /// Whole-image structure close
    GoodStructural,
    /// Structure, color and multi-scale all agree
    TripleAgreement,
    /// Local blocks match far better than the whole image: a crop or part
    CropOrPart,
    /// Color layout dominates the other signals
    ColorLed,
    /// All multi-scale levels agree
    ScaleConsistent,
    /// Passed the score gates without a stronger label
    Similar,
}

impl MatchType {
    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExactPixel => "exact match",
            Self::VeryClose => "very close",
            Self::PerfectStructural => "perfect structure",
            Self::GoodStructural => "good structure",
            Self::TripleAgreement => "triple agreement",
            Self::CropOrPart => "crop or part",
            Self::ColorLed => "color match",
            Self::ScaleConsistent => "scale consistent",
            Self::Similar => "similar",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Individual similarity signals for one pair. `None` means not applicable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    /// Global hash similarity, or the legacy hash similarity when either
    /// side has no global hash
    pub global: Option<f64>,
    pub block: Option<f64>,
    /// `max(global, block)`
    pub structural: Option<f64>,
    pub multi_scale: Option<MultiScaleSimilarity>,
    pub color: Option<f64>,
    pub fingerprint: Option<f64>,
    pub content: Option<f64>,
    /// First-generation 32x32 hash similarity
    #[serde(default)]
    pub legacy: Option<f64>,
}

impl SignalScores {
    /// Strongest available pixel-level signal. The fingerprint wins when both exist.
    pub fn pixel(&self) -> Option<f64> {
        self.fingerprint.or(self.content)
    }

    pub fn multi_scale_score(&self) -> f64 {
        self.multi_scale.map_or(0.0, |m| m.score)
    }

    pub fn structural_score(&self) -> f64 {
        self.structural.unwrap_or(0.0)
    }
}

/// Bonuses added on top of the weighted sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Boosts {
    pub structural: f64,
    pub color: f64,
    pub triple: f64,
    pub consistency: f64,
    pub exact: f64,
}

impl Boosts {
    pub fn total(&self) -> f64 {
        self.structural + self.color + self.triple + self.consistency + self.exact
    }
}

/// Outcome of scoring one candidate that survived every gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub signals: SignalScores,
    /// Weighted sum over present signals, before boosts
    pub base_score: f64,
    pub boosts: Boosts,
    /// Combined score in [0, 1]
    pub final_score: f64,
    pub match_type: MatchType,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub name: String,
    pub path: String,
    pub signals: SignalScores,
    pub final_score: f64,
    pub match_type: MatchType,
}

impl MatchResult {
    pub fn new(id: &str, name: &str, path: &str, card: ScoreCard) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            signals: card.signals,
            final_score: card.final_score,
            match_type: card.match_type,
        }
    }

    pub fn multi_scale_score(&self) -> f64 {
        self.signals.multi_scale_score()
    }
}

/// Compute every signal both descriptors support, without gating.
pub fn compare(
    query: &ImageDescriptor,
    candidate: &ImageDescriptor,
    config: &SearchConfig,
) -> SignalScores {
    let (global, block, structural, legacy) = structural_signals(query, candidate, config);
    let (fingerprint, content) = pixel_signals(query, candidate, config);

    SignalScores {
        global,
        block,
        structural,
        multi_scale: multi_scale_similarity(
            &query.multi_scale,
            &candidate.multi_scale,
            &config.similarity,
        ),
        color: color_signal(query, candidate),
        fingerprint,
        content,
        legacy,
    }
}

/// Score a candidate against the query.
///
/// Returns `None` when the pair has no comparable hash signal, when the
/// candidate fails the early-exit gates, or when it is rejected by the
/// minimum-score rule. Never panics on malformed fields; they degrade to
/// worst-case or absent signals.
pub fn score(
    query: &ImageDescriptor,
    candidate: &ImageDescriptor,
    config: &SearchConfig,
) -> Option<ScoreCard> {
    let s = &config.scoring;

    // Multi-scale first, then structure; these two decide the early exit.
    let multi_scale = multi_scale_similarity(
        &query.multi_scale,
        &candidate.multi_scale,
        &config.similarity,
    );
    let (global, block, structural, legacy) = structural_signals(query, candidate, config);

    if multi_scale.is_none() && structural.is_none() {
        return None;
    }

    let (fingerprint, content) = pixel_signals(query, candidate, config);

    let ms_score = multi_scale.map_or(0.0, |m| m.score);
    let struct_score = structural.unwrap_or(0.0);
    let pixel_rescued = fingerprint
        .or(content)
        .is_some_and(|p| p >= s.pixel_rescue);

    if struct_score < s.structural_gate && ms_score < s.multi_scale_gate && !pixel_rescued {
        return None;
    }

    let signals = SignalScores {
        global,
        block,
        structural,
        multi_scale,
        color: color_signal(query, candidate),
        fingerprint,
        content,
        legacy,
    };

    let (boosts, triple) = boosts(&signals, s);
    let base_score = weighted_sum(&signals, s);
    let final_score = (base_score + boosts.total()).clamp(0.0, 1.0);

    if final_score < s.min_score && ms_score < s.multi_scale_bypass {
        return None;
    }

    let match_type = classify(&signals, triple, s);

    Some(ScoreCard {
        signals,
        base_score,
        boosts,
        final_score,
        match_type,
    })
}

/// Global, block, combined structural and legacy similarity.
fn structural_signals(
    query: &ImageDescriptor,
    candidate: &ImageDescriptor,
    config: &SearchConfig,
) -> (Option<f64>, Option<f64>, Option<f64>, Option<f64>) {
    let legacy = match (&query.legacy_hash, &candidate.legacy_hash) {
        (Some(a), Some(b)) => Some(global_similarity(a, b, LEGACY_HASH_SIZE)),
        _ => None,
    };
    let global = match (&query.global_hash, &candidate.global_hash) {
        (Some(a), Some(b)) => Some(global_similarity(a, b, config.hash.global_size)),
        _ => legacy,
    };
    let block = match (&query.blocks, &candidate.blocks) {
        (Some(a), Some(b)) => Some(block_similarity(
            a,
            b,
            config.similarity.block_match_distance,
        )),
        _ => None,
    };
    let structural = match (global, block) {
        (Some(g), Some(b)) => Some(g.max(b)),
        (g, b) => g.or(b),
    };
    (global, block, structural, legacy)
}

/// Fingerprint and content-hash similarity.
fn pixel_signals(
    query: &ImageDescriptor,
    candidate: &ImageDescriptor,
    config: &SearchConfig,
) -> (Option<f64>, Option<f64>) {
    let sim = &config.similarity;
    let fingerprint = match (&query.fingerprint, &candidate.fingerprint) {
        (Some(a), Some(b)) => pixel_array_similarity(a, b, sim.fingerprint_tolerance),
        _ => None,
    };
    let content = match (&query.content_hash, &candidate.content_hash) {
        (Some(a), Some(b)) => pixel_array_similarity(a, b, sim.content_tolerance),
        _ => None,
    };
    (fingerprint, content)
}

fn color_signal(query: &ImageDescriptor, candidate: &ImageDescriptor) -> Option<f64> {
    match (&query.color, &candidate.color) {
        (Some(a), Some(b)) => color_similarity(a, b),
        _ => None,
    }
}

/// Weighted mean of the present signals.
///
/// Weights of absent signals are dropped and the rest renormalised, so a
/// missing signal never counts as zero similarity.
pub fn weighted_sum(signals: &SignalScores, params: &ScoringParams) -> f64 {
    let w = &params.weights;
    let terms = [
        (signals.multi_scale.map(|m| m.score), w.multi_scale),
        (signals.structural, w.structural),
        (signals.color, w.color),
        (signals.fingerprint, w.fingerprint),
        (signals.content, w.content),
    ];

    let (sum, weight) = terms
        .iter()
        .filter_map(|(value, weight)| value.map(|v| (v * weight, *weight)))
        .fold((0.0, 0.0), |(s, t), (v, w)| (s + v, t + w));

    if weight > 0.0 {
        sum / weight
    } else {
        0.0
    }
}

/// Evaluate every boost rule. Also reports whether the triple rule fired.
pub fn boosts(signals: &SignalScores, params: &ScoringParams) -> (Boosts, bool) {
    let mut boosts = Boosts::default();
    let struct_score = signals.structural_score();
    let ms_score = signals.multi_scale_score();

    if struct_score >= params.structural_boost_threshold {
        boosts.structural = params.structural_boost;
    }

    if let Some(color) = signals.color {
        if color >= params.color_boost_threshold {
            boosts.color = ((color - params.color_boost_threshold) * params.color_boost_factor)
                .min(params.color_boost_max);
        }
    }

    let triple = signals.color.is_some_and(|c| c >= params.triple_color)
        && struct_score >= params.triple_structural
        && ms_score >= params.triple_multi_scale;
    if triple {
        boosts.triple = params.triple_boost;
    }

    if signals.multi_scale.is_some_and(|m| m.consistent) {
        boosts.consistency = params.consistency_boost;
    }

    if signals.pixel().is_some_and(|p| p >= params.exact_match_threshold) {
        boosts.exact = params.exact_match_boost;
    }

    (boosts, triple)
}

/// Assign the match type. Bands are checked strongest first; the first hit wins.
pub fn classify(signals: &SignalScores, triple: bool, params: &ScoringParams) -> MatchType {
    let struct_score = signals.structural_score();
    let ms_score = signals.multi_scale_score();
    let global = signals.global;

    if signals.pixel().is_some_and(|p| p >= params.exact_match_threshold) {
        return MatchType::ExactPixel;
    }
    if ms_score >= params.very_close_multi_scale && struct_score >= params.very_close_structural {
        return MatchType::VeryClose;
    }
    if global.is_some_and(|g| g >= params.perfect_structural) {
        return MatchType::PerfectStructural;
    }
    if global.is_some_and(|g| g >= params.good_structural) {
        return MatchType::GoodStructural;
    }
    if triple {
        return MatchType::TripleAgreement;
    }
    if let Some(block) = signals.block {
        if block >= params.crop_block_min
            && block - global.unwrap_or(0.0) >= params.crop_block_margin
        {
            return MatchType::CropOrPart;
        }
    }
    if let Some(color) = signals.color {
        if color >= params.color_led_min && color > ms_score && color > struct_score {
            return MatchType::ColorLed;
        }
    }
    if signals.multi_scale.is_some_and(|m| m.consistent) {
        return MatchType::ScaleConsistent;
    }
    MatchType::Similar
}
