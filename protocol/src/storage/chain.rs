//! In-memory block store: blocks by hash, canonical hashes by height.
//!
//! Only blocks that extend the current head are accepted. There is no fork
//! choice; the consensus service imports blocks one height at a time.

use std::collections::HashMap;
use thiserror::Error;

use super::block::Block;
use crate::primitives::Hash;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {number} does not extend head {head_number} ({head_hash})")]
    DoesNotExtendHead {
        number: u64,
        head_number: u64,
        head_hash: Hash,
    },

    #[error("block {0} already stored")]
    Duplicate(Hash),
}

/// Canonical chain rooted at a genesis block.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: HashMap<Hash, Block>,
    canonical: Vec<Hash>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self {
            blocks,
            canonical: vec![hash],
        }
    }

    /// Append a block that links to the head.
    pub fn append(&mut self, block: Block) -> Result<Hash, ChainError> {
        let head = self.head();
        let head_hash = head.hash();
        let head_number = head.number();

        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Err(ChainError::Duplicate(hash));
        }
        if block.number() != head_number + 1 || block.header.parent_hash != head_hash {
            return Err(ChainError::DoesNotExtendHead {
                number: block.number(),
                head_number,
                head_hash,
            });
        }

        self.blocks.insert(hash, block);
        self.canonical.push(hash);
        Ok(hash)
    }

    /// Latest canonical block.
    pub fn head(&self) -> &Block {
        // `canonical` is never empty and every entry is in `blocks`.
        &self.blocks[&self.canonical[self.canonical.len() - 1]]
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[&self.canonical[0]]
    }

    /// Height of the head block.
    pub fn height(&self) -> u64 {
        self.head().number()
    }

    pub fn get_by_hash(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn get_by_number(&self, number: u64) -> Option<&Block> {
        let index = usize::try_from(number).ok()?;
        self.canonical.get(index).and_then(|h| self.blocks.get(h))
    }

    /// Number of stored blocks, genesis included.
    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
