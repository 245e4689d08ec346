//! Cryptographic hashing utilities for the ledger
//!
//! Provides the SHA-256 helpers used for block hashes and transaction IDs,
//! plus the leading-zero-bit test behind proof of work.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Returns true if `s` looks like a hex-encoded SHA-256 digest
pub fn is_hash_hex(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Checks if a hash meets the difficulty target
/// The hash must start with `difficulty` zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let required_zeros = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    if required_zeros > hash.len() || (remaining_bits > 0 && required_zeros == hash.len()) {
        return false;
    }

    // Check full zero bytes
    for byte in hash.iter().take(required_zeros) {
        if *byte != 0 {
            return false;
        }
    }

    // Check remaining bits
    if remaining_bits > 0 {
        let mask = 0xFFu8 << (8 - remaining_bits);
        if hash[required_zeros] & mask != 0 {
            return false;
        }
    }

    true
}

/// Hex variant of [`meets_difficulty`]. Malformed hex never matches.
pub fn hash_matches_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    match hex::decode(hash_hex) {
        Ok(bytes) => meets_difficulty(&bytes, difficulty),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_meets_difficulty() {
        // Hash with leading zeros
        let hash = vec![0x00, 0x00, 0x0F, 0xFF, 0xFF, 0xFF];
        assert!(meets_difficulty(&hash, 0));
        assert!(meets_difficulty(&hash, 16)); // 16 bits = 2 bytes of zeros
        assert!(meets_difficulty(&hash, 20)); // 0x0F has four leading zero bits
        assert!(!meets_difficulty(&hash, 21));
        assert!(!meets_difficulty(&hash, 24)); // Need 3 bytes of zeros
    }

    #[test]
    fn test_difficulty_longer_than_hash() {
        let hash = vec![0x00, 0x00];
        assert!(meets_difficulty(&hash, 16));
        assert!(!meets_difficulty(&hash, 17));
        assert!(!meets_difficulty(&hash, 64));
    }

    #[test]
    fn test_hash_matches_difficulty_hex() {
        // 0x1f = 0001 1111
        assert!(hash_matches_difficulty("1fff", 3));
        assert!(!hash_matches_difficulty("1fff", 4));
        assert!(hash_matches_difficulty("00ff", 8));
        assert!(!hash_matches_difficulty("not-hex", 0));
    }

    #[test]
    fn test_is_hash_hex() {
        assert!(is_hash_hex(&sha256_hex(b"abc")));
        assert!(!is_hash_hex("abc"));
        assert!(!is_hash_hex(&"g".repeat(64)));
    }
}
