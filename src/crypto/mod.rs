//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing and the proof-of-work bit test
//! - ECDSA key management (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{hash_matches_difficulty, is_hash_hex, meets_difficulty, sha256, sha256_hex};
pub use keys::{
    public_key_for_private_hex, public_key_from_hex, sign_message, verify_hex_signature,
    verify_signature, KeyError, KeyPair,
};
