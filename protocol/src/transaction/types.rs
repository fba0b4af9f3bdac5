//! Core transaction types.
//!
//! A transaction names its sender explicitly; the signature over
//! [`hash_transaction`](crate::crypto::hash::hash_transaction) is what ties
//! it to that sender. Verification is delegated to a
//! [`SignatureVerifier`](crate::crypto::signatures::SignatureVerifier).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash::hash_transaction;
use crate::primitives::{amount_str, Address, Amount, Hash};

// ---------------------------------------------------------------------------
// TxType
// ---------------------------------------------------------------------------

/// The state transition a transaction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Move `value` from the sender to `to`.
    Regular,
    /// Lock `value` of the sender's balance as validator stake.
    Stake,
    /// Release `value` of the sender's stake back to its balance.
    Unstake,
    /// Governance vote carried in the payload. Only bumps the nonce.
    Vote,
}

impl TxType {
    /// Stable discriminant written into the transaction hash.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Stake => 1,
            Self::Unstake => 2,
            Self::Vote => 3,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Stake => write!(f, "stake"),
            Self::Unstake => write!(f, "unstake"),
            Self::Vote => write!(f, "vote"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed value or state transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Must equal the sender's ledger nonce when the transaction is applied.
    pub nonce: u64,
    /// Account that pays for and authorizes the transaction.
    pub sender: Address,
    /// Recipient. Required for [`TxType::Regular`], ignored otherwise.
    pub to: Option<Address>,
    /// Amount moved, staked, or unstaked.
    #[serde(with = "amount_str")]
    pub value: Amount,
    /// Opaque payload.
    pub data: Vec<u8>,
    pub tx_type: TxType,
    /// Sender's signature over [`Transaction::hash`]. Empty when unsigned.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Content hash; the signature is not covered.
    pub fn hash(&self) -> Hash {
        hash_transaction(self)
    }

    /// Returns `true` once a signature has been attached.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}
