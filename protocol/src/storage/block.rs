//! # Block Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Header                                     │
//! │  ├── parent_hash: Hash                      │
//! │  ├── coinbase: Address     (miner reward)   │
//! │  ├── number: u64                            │
//! │  ├── time: u64             (unix seconds)   │
//! │  ├── difficulty: u64       (PoW only)       │
//! │  ├── nonce: BlockNonce     (PoW only)       │
//! │  ├── validator: Address    (PoS proposer)   │
//! │  ├── checkpoint: bool      (true = PoW)     │
//! │  ├── tx_root: Hash         (Merkle root)    │
//! │  └── seal: Vec<u8>         (not hashed)     │
//! ├─────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>             │
//! │  votes: Vec<Vote>          (PoS only)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The block hash is [`hash_header`] over every header field except the
//! seal. It is always recomputed, never stored, so a tampered header cannot
//! carry a stale hash.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{hash_header, transactions_root, vote_digest};
use crate::primitives::{Address, BlockNonce, Hash};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash,
    /// Receives the miner share of the block reward.
    pub coinbase: Address,
    pub number: u64,
    /// Unix seconds. Strictly greater than the parent's.
    pub time: u64,
    /// Required work for checkpoint blocks. Zero on PoS blocks.
    pub difficulty: u64,
    pub nonce: BlockNonce,
    /// Proposer of a PoS block. Zero on checkpoint blocks.
    pub validator: Address,
    /// `true` for PoW checkpoint blocks.
    pub checkpoint: bool,
    /// Merkle root over the transaction hashes.
    pub tx_root: Hash,
    /// Proposer signature over [`Header::hash`]. Empty on checkpoint blocks.
    #[serde(with = "hex_bytes")]
    pub seal: Vec<u8>,
}

impl Header {
    pub fn hash(&self) -> Hash {
        hash_header(self)
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// A validator's signed decision on a PoS block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub validator: Address,
    /// Header hash this vote is about. Must match the block it rides in.
    pub block_hash: Hash,
    pub approve: bool,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Unix seconds at signing.
    pub timestamp: i64,
}

impl Vote {
    /// The message the validator signed.
    pub fn digest(&self) -> Hash {
        vote_digest(&self.block_hash, self.approve, self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    /// Empty on checkpoint blocks.
    pub votes: Vec<Vote>,
}

impl Block {
    /// Height-0 block. Checkpoint by definition, unsigned and unmined.
    pub fn genesis(time: u64) -> Self {
        Self {
            header: Header {
                time,
                checkpoint: true,
                ..Header::default()
            },
            transactions: Vec::new(),
            votes: Vec::new(),
        }
    }

    /// Unsealed child of `parent`. The consensus engines fill in the rest.
    pub fn child_of(parent: &Header, coinbase: Address, time: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            header: Header {
                parent_hash: parent.hash(),
                coinbase,
                number: parent.number + 1,
                time,
                tx_root: transactions_root(&transactions),
                ..Header::default()
            },
            transactions,
            votes: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn is_checkpoint(&self) -> bool {
        self.header.checkpoint
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Whether `tx_root` matches the transaction list.
    pub fn tx_root_matches(&self) -> bool {
        self.header.tx_root == transactions_root(&self.transactions)
    }
}

/// Hex serde for signature byte strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;

    fn tx(nonce: u64) -> Transaction {
        TransactionBuilder::transfer(Address::tagged(1), Address::tagged(2), 100)
            .nonce(nonce)
            .build()
    }

    #[test]
    fn genesis_properties() {
        let genesis = Block::genesis(1_700_000_000);
        assert_eq!(genesis.number(), 0);
        assert!(genesis.header.parent_hash.is_zero());
        assert!(genesis.is_checkpoint());
        assert!(genesis.transactions.is_empty());
        assert!(genesis.tx_root_matches());
        assert_eq!(genesis.hash(), Block::genesis(1_700_000_000).hash());
    }

    #[test]
    fn child_links_to_parent() {
        let genesis = Block::genesis(100);
        let child = Block::child_of(&genesis.header, Address::tagged(5), 101, vec![tx(0), tx(1)]);

        assert_eq!(child.number(), 1);
        assert_eq!(child.header.parent_hash, genesis.hash());
        assert_eq!(child.header.coinbase, Address::tagged(5));
        assert_eq!(child.tx_count(), 2);
        assert!(child.tx_root_matches());
    }

    #[test]
    fn swapped_transactions_break_tx_root() {
        let genesis = Block::genesis(100);
        let mut child = Block::child_of(&genesis.header, Address::zero(), 101, vec![tx(0), tx(1)]);
        child.transactions.swap(0, 1);
        assert!(!child.tx_root_matches());
    }

    #[test]
    fn hash_ignores_seal_and_votes() {
        let genesis = Block::genesis(100);
        let mut block = Block::child_of(&genesis.header, Address::zero(), 101, vec![]);
        let before = block.hash();

        block.header.seal = vec![1u8; 64];
        block.votes.push(Vote {
            validator: Address::tagged(1),
            block_hash: before,
            approve: true,
            signature: vec![],
            timestamp: 0,
        });
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn json_roundtrip() {
        let genesis = Block::genesis(100);
        let mut block = Block::child_of(&genesis.header, Address::tagged(3), 101, vec![tx(0)]);
        block.header.seal = vec![0xAB; 64];

        let json = serde_json::to_string(&block).expect("serialize");
        let recovered: Block = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(block, recovered);
    }
}
