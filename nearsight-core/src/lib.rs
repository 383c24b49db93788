//! Nearsight Core - perceptual near-duplicate image search
//!
//! This crate turns images into compact multi-signal descriptors and ranks a
//! corpus of stored descriptors against a query, tolerating scaling, cropping,
//! blur and recompression.
//!
//! # Features
//!
//! - Difference hashes over arbitrary regions at arbitrary resolutions
//! - Global, spatial-block and multi-scale structural hashes
//! - Coarse HSV color layout and raw pixel fingerprints
//! - Weighted, renormalised scoring with boost rules and match classification
//! - Cancellable corpus scans with progress reporting
//! - Background search worker (feature `worker`)
//!
//! # Example
//!
//! ```no_run
//! use nearsight_core::{search, CorpusEntry, DescriptorBuilder, ScanControl, SearchConfig};
//!
//! # fn example(query_image: &image::DynamicImage, corpus: &[CorpusEntry]) -> nearsight_core::Result<()> {
//! let config = SearchConfig::default();
//! let query = DescriptorBuilder::from_config(&config).build(query_image)?;
//!
//! let report = search(&query, corpus, &config, &mut ScanControl::new())?;
//! for result in &report.results {
//!     println!("{} {:.3} {}", result.name, result.final_score, result.match_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod config;
pub mod corpus;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod scoring;
pub mod search;
pub mod similarity;
pub mod store;

// Re-export main types for convenience
pub use color::{ColorSignature, Hsv};
pub use config::{
    HashParams, ScoringParams, SearchConfig, SearchParams, SignalWeights, SimilarityParams,
    CONFIG_VERSION,
};
pub use corpus::{search_store, CorpusCache, CorpusEntry, LoadStats};
pub use descriptor::{DescriptorBuilder, ImageDescriptor};
pub use error::{NearsightError, Result};
pub use hash::{compute_hash, hamming_distance, legacy_hash, luma_plane, LumaPlane, Region};
pub use scoring::{score, MatchResult, MatchType, ScoreCard, SignalScores};
pub use search::{
    rank, search, CancelFlag, ScanControl, ScanStatus, SearchProgress, SearchReport,
};
pub use similarity::{
    block_similarity, color_similarity, global_similarity, multi_scale_similarity,
    pixel_array_similarity, MultiScaleSimilarity,
};
pub use store::{
    CorpusStats, MemoryStore, PrefixedStore, RecordStore, StoreError, StoredRecord,
};

// Background worker exports (not available in Wasm)
#[cfg(feature = "worker")]
pub use search::worker::{SearchEvent, SearchHandle, SearchRequest, SearchWorker};
