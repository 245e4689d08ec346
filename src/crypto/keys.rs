//! ECDSA key management for the ledger
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve. An address is the hex encoding of the
//! uncompressed public key (`04 || X || Y`), so a signature can be checked
//! against the address recorded in an unspent output without any lookup.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::sha256;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid message digest")]
    InvalidDigest,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (uncompressed, 130 chars)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    /// The ledger address of this key pair
    pub fn address(&self) -> String {
        self.public_key_hex()
    }

    /// Sign a hex-encoded digest (a transaction id), returning a hex DER signature
    pub fn sign_hex_digest(&self, digest_hex: &str) -> Result<String, KeyError> {
        let digest = hex::decode(digest_hex).map_err(|_| KeyError::InvalidDigest)?;
        let signature = sign_message(&self.secret_key, &digest)?;
        Ok(hex::encode(signature))
    }
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Derive the address (uncompressed public key hex) for a hex private key
pub fn public_key_for_private_hex(private_key_hex: &str) -> Result<String, KeyError> {
    Ok(KeyPair::from_private_key_hex(private_key_hex)?.address())
}

fn digest_message(message_hash: &[u8]) -> Result<Message, KeyError> {
    // Anything that is not already a 32-byte digest gets hashed first
    let hash = if message_hash.len() == 32 {
        message_hash.to_vec()
    } else {
        sha256(message_hash)
    };
    Ok(Message::from_digest_slice(&hash)?)
}

/// Sign a message hash with a secret key, returning a DER-encoded signature
pub fn sign_message(secret_key: &SecretKey, message_hash: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::signing_only();
    let message = digest_message(message_hash)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_der().to_vec())
}

/// Verify a DER-encoded signature against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    message_hash: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();
    let message = digest_message(message_hash)?;
    let mut sig = Signature::from_der(signature).map_err(|_| KeyError::InvalidSignature)?;
    // Other signers are not required to produce low-S signatures
    sig.normalize_s();

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Verify a hex DER signature over a hex digest with a hex public key (an address).
/// Any decoding failure counts as an invalid signature.
pub fn verify_hex_signature(address: &str, digest_hex: &str, signature_hex: &str) -> bool {
    let Ok(public_key) = public_key_from_hex(address) else {
        return false;
    };
    let Ok(digest) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    verify_signature(&public_key, &digest, &signature).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256_hex;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        assert!(!kp.public_key_hex().is_empty());
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        let address = kp.address();
        assert_eq!(address.len(), 130);
        assert!(address.starts_with("04"));
    }

    #[test]
    fn test_sign_and_verify_hex() {
        let kp = KeyPair::generate();
        let digest = sha256_hex(b"Hello, ledger!");

        let signature = kp.sign_hex_digest(&digest).unwrap();
        assert!(verify_hex_signature(&kp.address(), &digest, &signature));

        let other = sha256_hex(b"something else");
        assert!(!verify_hex_signature(&kp.address(), &other, &signature));

        let stranger = KeyPair::generate();
        assert!(!verify_hex_signature(&stranger.address(), &digest, &signature));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let kp = KeyPair::generate();
        let digest = sha256_hex(b"data");
        assert!(!verify_hex_signature(&kp.address(), &digest, "zz"));
        assert!(!verify_hex_signature(&kp.address(), &digest, "3006020101020101"));
        assert!(!verify_hex_signature("04abcd", &digest, "00"));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = kp1.private_key_hex();

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(
            public_key_for_private_hex(&private_hex).unwrap(),
            kp1.address()
        );
        assert!(KeyPair::from_private_key_hex("nothex").is_err());
    }
}
