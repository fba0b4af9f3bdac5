//! # Key Management
//!
//! Ed25519 keypairs for validators and account holders.
//!
//! A keypair is not tied to an address by construction: genesis accounts
//! use well-known tagged addresses, so the [`Keyring`](super::signatures::Keyring)
//! records which key speaks for which address. [`address_from_public_key`]
//! is the default derivation for accounts created after genesis.
//!
//! Key bytes are never logged.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::domain_separated_hash;
use crate::primitives::Address;

const ADDRESS_CONTEXT: &str = "selsichain 2025 address v1";

/// Errors that can occur while loading key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected {SECRET_KEY_LENGTH} hex-encoded bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 signing keypair.
///
/// Intentionally not `Serialize`: exporting a secret has to go through
/// [`secret_key_bytes`](Self::secret_key_bytes).
pub struct SelsiKeypair {
    signing_key: SigningKey,
}

impl SelsiKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded 32-byte seed, with or without `0x`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Default address for this key.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Deterministic 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Check a signature against this keypair's public half.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_with_key(&self.verifying_key(), message, signature)
    }

    /// Raw seed. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for SelsiKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for SelsiKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SelsiKeypair(pub={})", hex::encode(self.public_key_bytes()))
    }
}

/// Parse a 32-byte public key, rejecting bytes that are not a curve point.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, KeyError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidPublicKey)
}

/// Verify raw signature bytes. Any malformed input is simply `false`.
pub fn verify_with_key(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&bytes)).is_ok()
}

/// First 20 bytes of a domain-separated BLAKE3 hash of the public key.
pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let digest = domain_separated_hash(ADDRESS_CONTEXT, public_key);
    let mut bytes = [0u8; Address::LEN];
    bytes.copy_from_slice(&digest[..Address::LEN]);
    Address(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = SelsiKeypair::generate();
        let sig = kp.sign(b"stake 5000");
        assert!(kp.verify(b"stake 5000", &sig));
        assert!(!kp.verify(b"stake 5001", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let a = SelsiKeypair::from_seed(&[1u8; 32]);
        let b = SelsiKeypair::from_seed(&[2u8; 32]);
        let sig = a.sign(b"message");
        assert!(!b.verify(b"message", &sig));
    }

    #[test]
    fn truncated_signature_is_rejected_without_panic() {
        let kp = SelsiKeypair::from_seed(&[3u8; 32]);
        let sig = kp.sign(b"m");
        assert!(!kp.verify(b"m", &sig[..63]));
        assert!(!kp.verify(b"m", &[]));
    }

    #[test]
    fn seed_is_deterministic() {
        let a = SelsiKeypair::from_seed(&[42u8; 32]);
        let b = SelsiKeypair::from_seed(&[42u8; 32]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(a.sign(b"x"), b.sign(b"x"));
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn hex_seed_roundtrip() {
        let kp = SelsiKeypair::generate();
        let hex_seed = format!("0x{}", hex::encode(kp.secret_key_bytes()));
        let restored = SelsiKeypair::from_hex(&hex_seed).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());

        assert_eq!(
            SelsiKeypair::from_hex("deadbeef").unwrap_err(),
            KeyError::InvalidSecretKey
        );
        assert!(SelsiKeypair::from_hex("not hex").is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = SelsiKeypair::from_seed(&[9u8; 32]);
        let debug = format!("{:?}", kp);
        assert!(debug.starts_with("SelsiKeypair(pub="));
        assert!(!debug.contains(&hex::encode(kp.secret_key_bytes())));
    }

    #[test]
    fn public_key_parsing() {
        let kp = SelsiKeypair::generate();
        let key = verifying_key_from_bytes(&kp.public_key_bytes()).unwrap();
        assert_eq!(key, kp.verifying_key());
        assert_eq!(
            verifying_key_from_bytes(&[0u8; 16]).unwrap_err(),
            KeyError::InvalidPublicKey
        );
    }
}
