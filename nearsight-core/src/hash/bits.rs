//! Hex encoding of hash bit vectors and Hamming distance on the encoded form.
//!
//! Bits are packed most-significant first, four bits per hex nibble. When the
//! bit count is not a multiple of four the final nibble is zero-padded on the
//! right, so an `n`-bit hash always encodes to exactly `ceil(n / 4)` lowercase
//! hex characters.

/// Number of hex characters needed to encode `bits` bits.
pub fn hex_len(bits: usize) -> usize {
    bits.div_ceil(4)
}

/// Encode a bit vector as lowercase hex.
pub fn bits_to_hex(bits: &[bool]) -> String {
    let bytes: Vec<u8> = bits
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | ((bit as u8) << (7 - i)))
        })
        .collect();

    let mut encoded = hex::encode(bytes);
    // Drop the trailing nibble of an odd-nibble hash; it is pure padding.
    encoded.truncate(hex_len(bits.len()));
    encoded
}

/// Decode a hex hash back into its bits, including any padding bits.
///
/// Returns `None` if the string contains a non-hex character.
pub fn hex_to_bits(hex_str: &str) -> Option<Vec<bool>> {
    let mut bits = Vec::with_capacity(hex_str.len() * 4);
    for c in hex_str.chars() {
        let nibble = c.to_digit(16)?;
        bits.extend((0..4).rev().map(|shift| (nibble >> shift) & 1 == 1));
    }
    Some(bits)
}

/// Check that a string is a non-empty run of hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Compute the Hamming distance between two hex-encoded hashes.
///
/// Nibbles are compared pairwise with XOR and popcount.
///
/// # Returns
///
/// `None` if the strings differ in length or either contains a non-hex
/// character. Callers treat `None` as maximal distance; the inputs are never
/// truncated to a common length.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }

    a.chars().zip(b.chars()).try_fold(0u32, |acc, (x, y)| {
        let x = x.to_digit(16)?;
        let y = y.to_digit(16)?;
        Some(acc + (x ^ y).count_ones())
    })
}

/// Similarity in [0, 1] derived from the Hamming distance over `bits` bits.
///
/// Mismatched or malformed inputs, or a zero bit count, yield `0.0`.
pub fn hex_similarity(a: &str, b: &str, bits: usize) -> f64 {
    if bits == 0 {
        return 0.0;
    }
    match hamming_distance(a, b) {
        Some(distance) => (1.0 - distance as f64 / bits as f64).clamp(0.0, 1.0),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_hex_msb_first() {
        let bits = [true, false, false, false, false, false, false, true];
        assert_eq!(bits_to_hex(&bits), "81");
    }

    #[test]
    fn test_bits_to_hex_pads_right() {
        // 36 bits (6x6 hash) -> 9 nibbles, the last one zero-padded
        let mut bits = vec![true; 36];
        bits[35] = false;
        let encoded = bits_to_hex(&bits);
        assert_eq!(encoded.len(), 9);
        assert_eq!(encoded, "ffffffffe");

        // 2 bits -> one nibble
        assert_eq!(bits_to_hex(&[true, true]), "c");
    }

    #[test]
    fn test_hex_len() {
        assert_eq!(hex_len(256), 64);
        assert_eq!(hex_len(36), 9);
        assert_eq!(hex_len(0), 0);
        assert_eq!(hex_len(1), 1);
    }

    #[test]
    fn test_hex_to_bits_roundtrip_with_padding() {
        let bits: Vec<bool> = (0..36).map(|i| i % 3 == 0).collect();
        let decoded = hex_to_bits(&bits_to_hex(&bits)).unwrap();
        assert_eq!(decoded.len(), 36);
        assert_eq!(&decoded[..36], &bits[..]);
        assert!(hex_to_bits("zz").is_none());
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance("00", "00"), Some(0));
        assert_eq!(hamming_distance("00", "ff"), Some(8));
        assert_eq!(hamming_distance("a5", "5a"), Some(8));
        assert_eq!(hamming_distance("F0", "f1"), Some(1));
        assert_eq!(hamming_distance("", ""), Some(0));
    }

    #[test]
    fn test_hamming_distance_symmetric() {
        let pairs = [("0123abcd", "fedc3210"), ("ffff0000", "0f0f0f0f"), ("1", "e")];
        for (a, b) in pairs {
            assert_eq!(hamming_distance(a, b), hamming_distance(b, a));
        }
    }

    #[test]
    fn test_hamming_distance_mismatch_is_sentinel() {
        assert_eq!(hamming_distance("abc", "ab"), None);
        assert_eq!(hamming_distance("zz", "00"), None);
        assert_eq!(hamming_distance("00", "0g"), None);
    }

    #[test]
    fn test_hex_similarity() {
        assert_eq!(hex_similarity("ff", "ff", 8), 1.0);
        assert_eq!(hex_similarity("ff", "00", 8), 0.0);
        assert_eq!(hex_similarity("f0", "f1", 8), 1.0 - 1.0 / 8.0);
        assert_eq!(hex_similarity("ff", "fff", 8), 0.0);
        assert_eq!(hex_similarity("ff", "ff", 0), 0.0);
    }

    #[test]
    fn test_is_hex() {
        assert!(is_hex("0123456789abcdefABCDEF"));
        assert!(!is_hex(""));
        assert!(!is_hex("12g4"));
    }
}
