//! # Signing Collaborator
//!
//! The consensus engines never touch key material. They ask two narrow
//! capabilities:
//!
//! ```text
//!   Signer             "sign these bytes as <address>"      -> Option<sig>
//!   SignatureVerifier  "is <sig> by <address> over <bytes>" -> bool
//! ```
//!
//! [`KeyRegistry`] is the verify-only implementation (public keys of known
//! validators and accounts). [`Keyring`] holds full keypairs and implements
//! both traits; the devnet node and the tests use it.

use ed25519_dalek::VerifyingKey;
use std::collections::HashMap;

use super::keys::{verify_with_key, SelsiKeypair};
use crate::primitives::Address;

/// Produces signatures on behalf of addresses it holds keys for.
pub trait Signer: Send + Sync {
    /// Sign `message` as `address`. `None` when no key is held.
    fn sign(&self, address: &Address, message: &[u8]) -> Option<Vec<u8>>;

    /// Whether [`sign`](Self::sign) would succeed for `address`.
    fn holds_key(&self, address: &Address) -> bool;
}

/// Checks signatures attributed to an address.
pub trait SignatureVerifier: Send + Sync {
    /// `true` only if `signature` is a valid signature by `address` over
    /// `message`. Unknown addresses verify nothing.
    fn verify_signature(&self, address: &Address, message: &[u8], signature: &[u8]) -> bool;
}

// ---------------------------------------------------------------------------
// KeyRegistry
// ---------------------------------------------------------------------------

/// Address → Ed25519 verifying key.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: HashMap<Address, VerifyingKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the key for `address`.
    pub fn register(&mut self, address: Address, key: VerifyingKey) {
        self.keys.insert(address, key);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SignatureVerifier for KeyRegistry {
    fn verify_signature(&self, address: &Address, message: &[u8], signature: &[u8]) -> bool {
        self.keys
            .get(address)
            .is_some_and(|key| verify_with_key(key, message, signature))
    }
}

// ---------------------------------------------------------------------------
// Keyring
// ---------------------------------------------------------------------------

/// Address → Ed25519 keypair. Signs and verifies.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: HashMap<Address, SelsiKeypair>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `keypair` as the key for `address`.
    pub fn insert(&mut self, address: Address, keypair: SelsiKeypair) {
        self.keys.insert(address, keypair);
    }

    /// Addresses this keyring can sign for, sorted.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self.keys.keys().copied().collect();
        addrs.sort();
        addrs
    }

    /// Public half only, for handing to peers that must not sign.
    pub fn registry(&self) -> KeyRegistry {
        let mut registry = KeyRegistry::new();
        for (address, keypair) in &self.keys {
            registry.register(*address, keypair.verifying_key());
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Signer for Keyring {
    fn sign(&self, address: &Address, message: &[u8]) -> Option<Vec<u8>> {
        self.keys
            .get(address)
            .map(|keypair| keypair.sign(message).to_vec())
    }

    fn holds_key(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }
}

impl SignatureVerifier for Keyring {
    fn verify_signature(&self, address: &Address, message: &[u8], signature: &[u8]) -> bool {
        self.keys
            .get(address)
            .is_some_and(|keypair| keypair.verify(message, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyring() -> Keyring {
        let mut ring = Keyring::new();
        ring.insert(Address::tagged(1), SelsiKeypair::from_seed(&[1u8; 32]));
        ring.insert(Address::tagged(2), SelsiKeypair::from_seed(&[2u8; 32]));
        ring
    }

    #[test]
    fn keyring_signs_for_held_addresses_only() {
        let ring = keyring();
        assert!(ring.holds_key(&Address::tagged(1)));
        assert!(ring.sign(&Address::tagged(1), b"msg").is_some());
        assert!(ring.sign(&Address::tagged(3), b"msg").is_none());
        assert_eq!(ring.addresses(), vec![Address::tagged(1), Address::tagged(2)]);
    }

    #[test]
    fn signature_is_bound_to_address() {
        let ring = keyring();
        let sig = ring.sign(&Address::tagged(1), b"msg").unwrap();
        assert!(ring.verify_signature(&Address::tagged(1), b"msg", &sig));
        assert!(!ring.verify_signature(&Address::tagged(2), b"msg", &sig));
        assert!(!ring.verify_signature(&Address::tagged(1), b"other", &sig));
    }

    #[test]
    fn registry_verifies_what_keyring_signs() {
        let ring = keyring();
        let registry = ring.registry();
        assert_eq!(registry.len(), 2);

        let sig = ring.sign(&Address::tagged(2), b"vote").unwrap();
        assert!(registry.verify_signature(&Address::tagged(2), b"vote", &sig));
        assert!(!registry.verify_signature(&Address::tagged(9), b"vote", &sig));
    }

    #[test]
    fn garbage_signature_is_false() {
        let registry = keyring().registry();
        assert!(!registry.verify_signature(&Address::tagged(1), b"msg", &[0u8; 64]));
        assert!(!registry.verify_signature(&Address::tagged(1), b"msg", b"short"));
    }
}
