//! Deterministic placeholder for audio features.
//!
//! These values are NOT audio analysis. They are derived from the track id
//! alone so that ranking is stable and testable without a features API.

use super::types::FeatureVector;

/// 32-bit signed string hash over UTF-16 code units (`hash * 31 + unit`, wrapping).
pub fn string_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Map an 8-bit window of the hash into [0.2, 0.8].
fn window(hash: u32, shift: u32) -> f64 {
    let byte = (hash >> shift) & 0xff;
    0.2 + (byte as f64 / 255.0) * 0.6
}

/// Synthetic feature vector for a track id: bits 0-7 give danceability,
/// 8-15 energy and 16-23 valence.
pub fn estimate_features(track_id: &str) -> FeatureVector {
    let hash = string_hash(track_id).unsigned_abs();
    FeatureVector {
        danceability: window(hash, 0),
        energy: window(hash, 8),
        valence: window(hash, 16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 3105);
        assert_eq!(string_hash("hello"), 99_162_322);
        // Wraps into the negative range.
        assert_eq!(string_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn test_hash_uses_utf16_units() {
        // U+1F3B5 is a surrogate pair: 0xD83C 0xDFB5
        let expected = 0xD83Ci32.wrapping_mul(31).wrapping_add(0xDFB5);
        assert_eq!(string_hash("\u{1F3B5}"), expected);
    }

    #[test]
    fn test_feature_windows() {
        // 3105 = 0x0C21
        let features = estimate_features("ab");
        assert!((features.danceability - (0.2 + 33.0 / 255.0 * 0.6)).abs() < 1e-12);
        assert!((features.energy - (0.2 + 12.0 / 255.0 * 0.6)).abs() < 1e-12);
        assert!((features.valence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_features_are_deterministic_and_bounded() {
        for id in ["4uLU6hMCjMI75M1A2tKUQC", "7qiZfU4dY1lWllzX7mPBI3", "", "polygenelubricants"] {
            let a = estimate_features(id);
            let b = estimate_features(id);
            assert_eq!(a.danceability.to_bits(), b.danceability.to_bits());
            assert_eq!(a.energy.to_bits(), b.energy.to_bits());
            assert_eq!(a.valence.to_bits(), b.valence.to_bits());

            for value in [a.danceability, a.energy, a.valence] {
                assert!((0.2..=0.8).contains(&value), "{} out of range for {}", value, id);
            }
        }
    }
}
