//! # Block Hasher
//!
//! Every identity in the chain comes from here: header hashes (block
//! identity, PoW target check, vote target), transaction hashes (signing
//! message, Merkle leaves) and vote digests.
//!
//! ## Encoding
//!
//! Fields are fed to BLAKE3 in a fixed order as fixed-width big-endian
//! integers, raw fixed-size byte arrays, and `u32`-length-prefixed variable
//! byte strings. Length prefixes keep the encoding injective: moving a byte
//! from one variable field to the next changes the preimage.
//!
//! Each object kind hashes under its own `derive_key` context, so a header
//! preimage can never collide with a transaction preimage.

use crate::primitives::Hash;
use crate::storage::block::Header;
use crate::transaction::Transaction;

const HEADER_CONTEXT: &str = "selsichain 2025 block header v1";
const TRANSACTION_CONTEXT: &str = "selsichain 2025 transaction v1";
const VOTE_CONTEXT: &str = "selsichain 2025 pos vote v1";
const MERKLE_LEAF_CONTEXT: &str = "selsichain 2025 merkle leaf v1";
const MERKLE_NODE_CONTEXT: &str = "selsichain 2025 merkle node v1";

/// Plain BLAKE3 of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in derive-key mode. Different contexts never collide.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Streaming field encoder over a domain-separated BLAKE3 hasher.
struct FieldHasher(blake3::Hasher);

impl FieldHasher {
    fn new(context: &str) -> Self {
        Self(blake3::Hasher::new_derive_key(context))
    }

    fn fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(bytes);
        self
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.0.update(&[value]);
        self
    }

    fn u64(&mut self, value: u64) -> &mut Self {
        self.0.update(&value.to_be_bytes());
        self
    }

    fn u128(&mut self, value: u128) -> &mut Self {
        self.0.update(&value.to_be_bytes());
        self
    }

    fn var(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(&(bytes.len() as u32).to_be_bytes());
        self.0.update(bytes);
        self
    }

    fn finish(&self) -> Hash {
        Hash(*self.0.finalize().as_bytes())
    }
}

/// Hash of a block header.
///
/// Covers parent hash, coinbase, number, time, difficulty, nonce, validator,
/// the checkpoint flag and the transactions root. The proposer seal is NOT
/// covered; it signs this hash.
pub fn hash_header(header: &Header) -> Hash {
    FieldHasher::new(HEADER_CONTEXT)
        .fixed(header.parent_hash.as_bytes())
        .fixed(header.coinbase.as_bytes())
        .u64(header.number)
        .u64(header.time)
        .u64(header.difficulty)
        .fixed(header.nonce.as_bytes())
        .fixed(header.validator.as_bytes())
        .u8(header.checkpoint as u8)
        .fixed(header.tx_root.as_bytes())
        .finish()
}

/// Hash of a transaction.
///
/// Covers nonce, recipient (zero address when absent), value, payload,
/// sender and type. The signature is NOT covered.
pub fn hash_transaction(tx: &Transaction) -> Hash {
    let recipient = tx.to.unwrap_or_default();
    FieldHasher::new(TRANSACTION_CONTEXT)
        .u64(tx.nonce)
        .fixed(recipient.as_bytes())
        .u128(tx.value)
        .var(&tx.data)
        .fixed(tx.sender.as_bytes())
        .u8(tx.tx_type.as_byte())
        .finish()
}

/// The message a validator signs when voting on `block_hash`.
pub fn vote_digest(block_hash: &Hash, approve: bool, timestamp: i64) -> Hash {
    FieldHasher::new(VOTE_CONTEXT)
        .fixed(block_hash.as_bytes())
        .u8(approve as u8)
        .fixed(&timestamp.to_be_bytes())
        .finish()
}

/// Binary Merkle root over `leaves` with BLAKE3.
///
/// Leaves and inner nodes hash under separate contexts, and an odd node at
/// any level is carried up unpaired, so `[a]`, `[a, a]` and `[a, b, b]`
/// all have distinct roots. Empty input gives the zero hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::zero();
    }

    let mut level: Vec<Hash> = leaves
        .iter()
        .map(|leaf| Hash(domain_separated_hash(MERKLE_LEAF_CONTEXT, leaf.as_ref())))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for chunk in level.chunks(2) {
            let parent = match chunk {
                [left, right] => merkle_node(left, right),
                _ => chunk[0],
            };
            next.push(parent);
        }
        level = next;
    }

    level[0]
}

fn merkle_node(left: &Hash, right: &Hash) -> Hash {
    FieldHasher::new(MERKLE_NODE_CONTEXT)
        .fixed(left.as_bytes())
        .fixed(right.as_bytes())
        .finish()
}

/// Merkle root over the hashes of `transactions`, in block order.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(hash_transaction).collect();
    merkle_root(&leaves)
}
