//! PKCE verifier/challenge pair (RFC 7636, S256 method).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved URL characters allowed in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const VERIFIER_LENGTH: usize = 128;

pub const CHALLENGE_METHOD: &str = "S256";

pub fn generate_code_verifier() -> String {
    generate_code_verifier_with_len(VERIFIER_LENGTH)
}

/// RFC 7636 bounds the verifier to 43..=128 characters.
pub fn generate_code_verifier_with_len(len: usize) -> String {
    let len = len.clamp(43, 128);
    let mut rng = rand::rng();
    (0..len)
        .map(|_| VERIFIER_CHARSET[rng.random_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

/// URL-safe base64 of SHA-256(verifier), without padding.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
