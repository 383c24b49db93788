//! Hash primitives: difference hashing over image regions and hex bit vectors.

pub mod bits;
pub mod dhash;

pub use bits::{bits_to_hex, hamming_distance, hex_len, hex_similarity, hex_to_bits, is_hex};
pub use dhash::{
    compute_hash, hash_image, legacy_hash, luma, luma_plane, LumaPlane, Region, LEGACY_HASH_SIZE,
};
