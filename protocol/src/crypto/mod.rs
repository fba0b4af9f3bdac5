//! # Cryptographic Primitives
//!
//! - **BLAKE3** (derive-key mode) for every header, transaction and vote hash.
//! - **Ed25519** for transaction signatures, proposer seals and PoS votes.
//!
//! Consensus code only sees the [`Signer`] / [`SignatureVerifier`] traits;
//! the concrete keys live in [`Keyring`] and [`KeyRegistry`].

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{hash_header, hash_transaction, transactions_root, vote_digest};
pub use keys::{address_from_public_key, KeyError, SelsiKeypair};
pub use signatures::{KeyRegistry, Keyring, SignatureVerifier, Signer};
