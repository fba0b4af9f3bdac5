//! # Proof-of-Work Checkpoints
//!
//! Every `pow_block_interval`-th block is mined instead of voted.
//!
//! ```text
//! target = floor(2^256 / difficulty)
//! valid  ⇔ U256(hash_header(header)) < target
//! ```
//!
//! Difficulty 1 accepts every hash. On average `difficulty` trials find a
//! valid nonce.
//!
//! Mining is a blocking loop. Callers run it on a blocking worker and hold
//! the cancel flag; the loop polls it every
//! [`MINING_CANCEL_CHECK_INTERVAL`] trials and gives up after
//! `max_mining_attempts`. An unsealed block is never returned.

use primitive_types::U256;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use super::error::ConsensusError;
use crate::config::{ConsensusConfig, MINING_CANCEL_CHECK_INTERVAL};
use crate::primitives::{Address, BlockNonce, Hash};
use crate::storage::block::{Block, Header};

/// Largest hash value accepted at `difficulty`, exclusive.
///
/// Returns `None` for difficulty 0 or 1, where every hash is accepted.
pub fn target_for(difficulty: u64) -> Option<U256> {
    if difficulty <= 1 {
        return None;
    }
    // floor(2^256 / d) == floor((2^256 - 1) / d) unless d divides 2^256.
    let d = U256::from(difficulty);
    let mut target = U256::MAX / d;
    if difficulty.is_power_of_two() {
        target += U256::one();
    }
    Some(target)
}

/// Whether `hash` satisfies `difficulty`.
pub fn meets_difficulty(hash: &Hash, difficulty: u64) -> bool {
    match target_for(difficulty) {
        None => true,
        Some(target) => U256::from_big_endian(hash.as_bytes()) < target,
    }
}

#[derive(Debug, Clone)]
pub struct PowEngine {
    difficulty: u64,
    max_attempts: u64,
}

impl PowEngine {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            difficulty: config.mining_difficulty,
            max_attempts: config.max_mining_attempts,
        }
    }

    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    /// Turn `block` into an unmined checkpoint: difficulty from config, a
    /// random starting nonce, no proposer, no seal, no votes.
    pub fn prepare_block(&self, block: &mut Block) {
        let header = &mut block.header;
        header.checkpoint = true;
        header.difficulty = self.difficulty;
        header.nonce = BlockNonce::from_u64(rand::thread_rng().gen());
        header.validator = Address::zero();
        header.seal.clear();
        block.votes.clear();
    }

    /// Search nonces from the current one until the header hash meets the
    /// difficulty.
    pub fn mine_block(&self, mut block: Block, cancel: &AtomicBool) -> Result<Block, ConsensusError> {
        let number = block.number();
        let start = block.header.nonce.to_u64();
        let mut nonce = start;

        for trial in 0..self.max_attempts {
            if trial % MINING_CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!(height = number, attempts = trial, "mining cancelled");
                return Err(ConsensusError::MiningCancelled);
            }

            block.header.nonce = BlockNonce::from_u64(nonce);
            let hash = block.header.hash();
            if meets_difficulty(&hash, self.difficulty) {
                debug!(
                    height = number,
                    attempts = trial + 1,
                    nonce,
                    hash = %hash.short(),
                    "checkpoint mined"
                );
                return Ok(block);
            }
            nonce = nonce.wrapping_add(1);
        }

        warn!(
            height = number,
            attempts = self.max_attempts,
            difficulty = self.difficulty,
            "mining budget exhausted"
        );
        Err(ConsensusError::MiningExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Checkpoint-specific checks. Does not touch the ledger.
    pub fn verify_block(&self, block: &Block, parent: &Header) -> Result<(), ConsensusError> {
        let header = &block.header;
        if header.difficulty != self.difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                expected: self.difficulty,
                got: header.difficulty,
            });
        }

        let hash = header.hash();
        if !meets_difficulty(&hash, header.difficulty) {
            return Err(ConsensusError::InvalidProofOfWork { hash });
        }

        if header.time <= parent.time {
            return Err(ConsensusError::BlockTimeTooEarly {
                time: header.time,
                parent_time: parent.time,
            });
        }

        if !block.votes.is_empty() {
            return Err(ConsensusError::UnexpectedVotes {
                count: block.votes.len(),
            });
        }

        Ok(())
    }
}
