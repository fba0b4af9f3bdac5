//! # Hybrid Engine
//!
//! Height decides the algorithm:
//!
//! ```text
//! height % pow_block_interval == 0  →  PoW checkpoint  (mined, no votes)
//! otherwise                         →  PoS block       (sealed + voted)
//! ```
//!
//! ## Block lifecycle
//!
//! ```text
//! create_block ──► Candidate::Pos(block)          ready
//!              └─► Candidate::Pow(block) ──► PowEngine::mine_block
//!
//! verify_block  number, parent link, clock drift, checkpoint flag, tx_root,
//!               tx signatures, then PoW or PoS rules
//!
//! apply_block   stage txs ► credit rewards ► burn ► commit (all or nothing)
//! ```
//!
//! ## Rewards
//!
//! `R = block_reward` is split by the configured percentages. The staker
//! share goes to the eligible validator set in proportion to stake. Every
//! integer-division remainder lands in the ecosystem share, so
//! `miner + stakers + ecosystem + burned == R` exactly. Rewards are
//! computed from the ledger as it was before the block.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

use super::error::ConsensusError;
use super::pos::PosEngine;
use super::pow::PowEngine;
use crate::config::{ConfigError, ConsensusConfig, MAX_FUTURE_BLOCK_SECS};
use crate::crypto::signatures::{SignatureVerifier, Signer};
use crate::primitives::{amount_str, Address, Amount, Hash};
use crate::storage::block::{Block, Header};
use crate::storage::state::{apply_transaction, Ledger, LedgerView};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMode {
    Pow,
    Pos,
}

impl ConsensusMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pow => "pow",
            Self::Pos => "pos",
        }
    }
}

impl fmt::Display for ConsensusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly created block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Prepared checkpoint that still has to be mined.
    Pow(Block),
    /// Sealed and voted PoS block.
    Pos(Block),
}

impl Candidate {
    pub fn mode(&self) -> ConsensusMode {
        match self {
            Self::Pow(_) => ConsensusMode::Pow,
            Self::Pos(_) => ConsensusMode::Pos,
        }
    }

    pub fn into_block(self) -> Block {
        match self {
            Self::Pow(block) | Self::Pos(block) => block,
        }
    }
}

/// One credited reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCredit {
    pub address: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

/// How one block reward is split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub miner: RewardCredit,
    /// Per-validator staker share, sorted by address.
    pub stakers: Vec<RewardCredit>,
    /// Ecosystem share plus every rounding remainder.
    pub ecosystem: RewardCredit,
    #[serde(with = "amount_str")]
    pub burned: Amount,
}

impl RewardDistribution {
    pub fn staker_total(&self) -> Amount {
        self.stakers.iter().map(|c| c.amount).sum()
    }

    /// Credited plus burned. Always the configured block reward.
    pub fn total(&self) -> Amount {
        self.miner.amount + self.staker_total() + self.ecosystem.amount + self.burned
    }

    /// Every credit in application order.
    pub fn credits(&self) -> impl Iterator<Item = &RewardCredit> {
        std::iter::once(&self.miner)
            .chain(self.stakers.iter())
            .chain(std::iter::once(&self.ecosystem))
    }
}

/// Summary of an applied block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReceipt {
    pub number: u64,
    pub hash: Hash,
    pub mode: ConsensusMode,
    pub transactions: usize,
    pub rewards: RewardDistribution,
}

/// `a * b / c` without intermediate overflow.
fn mul_div(a: Amount, b: Amount, c: Amount) -> Amount {
    if c == 0 {
        return 0;
    }
    (U256::from(a) * U256::from(b) / U256::from(c)).low_u128()
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// HybridEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HybridEngine {
    config: ConsensusConfig,
    pow: PowEngine,
    pos: PosEngine,
}

impl HybridEngine {
    pub fn new(config: ConsensusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            pow_block_interval = config.pow_block_interval,
            difficulty = config.mining_difficulty,
            minimum_stake = %config.minimum_stake,
            "hybrid consensus engine initialized"
        );
        Ok(Self {
            pow: PowEngine::new(&config),
            pos: PosEngine::new(config.minimum_stake),
            config,
        })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn pow(&self) -> &PowEngine {
        &self.pow
    }

    pub fn pos(&self) -> &PosEngine {
        &self.pos
    }

    pub fn mode_for(&self, height: u64) -> ConsensusMode {
        if height % self.config.pow_block_interval == 0 {
            ConsensusMode::Pow
        } else {
            ConsensusMode::Pos
        }
    }

    /// Build the child of `parent` under the mode its height calls for.
    pub fn create_block(
        &self,
        parent: &Header,
        transactions: Vec<Transaction>,
        coinbase: Address,
        ledger: &Ledger,
        signer: &dyn Signer,
    ) -> Result<Candidate, ConsensusError> {
        let earliest = parent
            .time
            .checked_add(1)
            .ok_or(ConsensusError::BlockTimeOverflow {
                parent_time: parent.time,
            })?;
        let time = unix_now().max(earliest);
        let mut block = Block::child_of(parent, coinbase, time, transactions);
        let number = block.number();

        let candidate = match self.mode_for(number) {
            ConsensusMode::Pow => {
                self.pow.prepare_block(&mut block);
                Candidate::Pow(block)
            }
            ConsensusMode::Pos => {
                self.pos.prepare_block(&mut block, ledger, signer)?;
                Candidate::Pos(block)
            }
        };
        debug!(height = number, mode = %candidate.mode(), "block created");
        Ok(candidate)
    }

    /// [`create_block`](Self::create_block) and, for checkpoints, mine inline.
    pub fn produce_block(
        &self,
        parent: &Header,
        transactions: Vec<Transaction>,
        coinbase: Address,
        ledger: &Ledger,
        signer: &dyn Signer,
    ) -> Result<Block, ConsensusError> {
        match self.create_block(parent, transactions, coinbase, ledger, signer)? {
            Candidate::Pos(block) => Ok(block),
            Candidate::Pow(block) => self.pow.mine_block(block, &AtomicBool::new(false)),
        }
    }

    /// Check `block` as a child of `parent` against the pre-block ledger.
    pub fn verify_block(
        &self,
        block: &Block,
        parent: &Header,
        ledger: &Ledger,
        verifier: &dyn SignatureVerifier,
    ) -> Result<ConsensusMode, ConsensusError> {
        let header = &block.header;
        let expected_number = parent.number + 1;
        if header.number != expected_number {
            return Err(ConsensusError::InvalidBlockNumber {
                expected: expected_number,
                got: header.number,
            });
        }

        let parent_hash = parent.hash();
        if header.parent_hash != parent_hash {
            return Err(ConsensusError::InvalidParentHash {
                expected: parent_hash,
                got: header.parent_hash,
            });
        }

        let now = unix_now();
        if header.time > now.saturating_add(MAX_FUTURE_BLOCK_SECS) {
            return Err(ConsensusError::BlockTimeInFuture {
                time: header.time,
                now,
                max_drift: MAX_FUTURE_BLOCK_SECS,
            });
        }

        let mode = self.mode_for(header.number);
        if header.checkpoint != (mode == ConsensusMode::Pow) {
            return Err(ConsensusError::CheckpointMismatch {
                number: header.number,
                got: header.checkpoint,
            });
        }

        if !block.tx_root_matches() {
            return Err(ConsensusError::InvalidTxRoot);
        }

        for (index, tx) in block.transactions.iter().enumerate() {
            if !verifier.verify_signature(&tx.sender, tx.hash().as_bytes(), &tx.signature) {
                return Err(ConsensusError::InvalidTransactionSignature {
                    index,
                    sender: tx.sender,
                });
            }
        }

        match mode {
            ConsensusMode::Pow => self.pow.verify_block(block, parent)?,
            ConsensusMode::Pos => {
                self.pos.verify_block(block, parent, ledger, verifier)?;
            }
        }
        Ok(mode)
    }

    /// Split the block reward for `block` against `ledger`.
    pub fn calculate_rewards(&self, block: &Block, ledger: &Ledger) -> RewardDistribution {
        let reward = self.config.block_reward;
        let split = self.config.reward_distribution;

        let miner = mul_div(reward, split.miner_percent.into(), 100);
        let staker_pool = mul_div(reward, split.staker_percent.into(), 100);
        let ecosystem_share = mul_div(reward, split.ecosystem_percent.into(), 100);
        let burned = mul_div(reward, split.burn_percent.into(), 100);
        let split_remainder = reward - (miner + staker_pool + ecosystem_share + burned);
        let mut ecosystem = ecosystem_share + split_remainder;

        let set = self.pos.eligible_validators(ledger);
        let total_stake = set.total_stake();
        let stakers: Vec<RewardCredit> = if total_stake == 0 {
            Vec::new()
        } else {
            set.validators()
                .iter()
                .map(|v| RewardCredit {
                    address: v.address,
                    amount: mul_div(staker_pool, v.stake, total_stake),
                })
                .collect()
        };
        let distributed: Amount = stakers.iter().map(|c| c.amount).sum();
        ecosystem += staker_pool - distributed;

        RewardDistribution {
            miner: RewardCredit {
                address: block.header.coinbase,
                amount: miner,
            },
            stakers,
            ecosystem: RewardCredit {
                address: self.config.ecosystem_address,
                amount: ecosystem,
            },
            burned,
        }
    }

    /// Apply transactions, rewards and burn. Nothing is written unless every
    /// step succeeds.
    pub fn apply_block(&self, block: &Block, ledger: &mut Ledger) -> Result<BlockReceipt, ConsensusError> {
        let rewards = self.calculate_rewards(block, ledger);

        let mut staged = ledger.stage();
        for tx in &block.transactions {
            apply_transaction(&mut staged, tx)?;
        }
        for credit in rewards.credits() {
            staged.add_balance(credit.address, credit.amount)?;
        }
        staged.burn(rewards.burned);
        let changes = staged.into_changes();
        ledger.commit(changes);

        let receipt = BlockReceipt {
            number: block.number(),
            hash: block.hash(),
            mode: self.mode_for(block.number()),
            transactions: block.tx_count(),
            rewards,
        };
        info!(
            height = receipt.number,
            mode = %receipt.mode,
            hash = %receipt.hash.short(),
            txs = receipt.transactions,
            burned = %receipt.rewards.burned,
            "block applied"
        );
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
