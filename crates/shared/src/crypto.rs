//! Cryptographic utilities for render keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Number of random bytes in a generated token.
const TOKEN_BYTES: usize = 24;

/// Generates a random URL-safe token with the given prefix, e.g. `rk_3hF...`.
pub fn generate_token(prefix: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_prefix_and_uniqueness() {
        let a = generate_token("rk");
        let b = generate_token("rk");
        assert!(a.starts_with("rk_"));
        assert_ne!(a, b);
        // 24 bytes -> 32 base64 characters
        assert_eq!(a.len(), "rk_".len() + 32);
    }

    #[test]
    fn test_generate_token_is_url_safe() {
        let token = generate_token("rk");
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
    }
}
