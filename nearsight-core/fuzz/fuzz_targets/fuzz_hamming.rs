#![no_main]

//! Fuzz target for hex Hamming distance and descriptor comparison
//!
//! Splits the input in two and compares the halves as hex hashes and, when
//! both parse, as descriptors. Malformed hashes must degrade, never panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_hamming

use libfuzzer_sys::fuzz_target;
use nearsight_core::hash::{hamming_distance, hex_similarity};
use nearsight_core::scoring::{compare, score};
use nearsight_core::{ImageDescriptor, SearchConfig};

fuzz_target!(|data: &[u8]| {
    let (left, right) = data.split_at(data.len() / 2);
    let a = String::from_utf8_lossy(left);
    let b = String::from_utf8_lossy(right);

    if let Some(distance) = hamming_distance(&a, &b) {
        assert!(distance as usize <= a.len() * 4);
    }
    let similarity = hex_similarity(&a, &b, a.len() * 4);
    assert!((0.0..=1.0).contains(&similarity));

    let (Ok(query), Ok(candidate)) = (
        serde_json::from_slice::<ImageDescriptor>(left),
        serde_json::from_slice::<ImageDescriptor>(right),
    ) else {
        return;
    };
    let config = SearchConfig::default();
    let _ = compare(&query, &candidate, &config);
    let _ = score(&query, &candidate, &config);
});
