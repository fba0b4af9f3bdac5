//! Block-scoped consensus failures.

use thiserror::Error;

use crate::primitives::{Address, Amount, Hash};
use crate::storage::state::LedgerError;

/// Why a block could not be produced, verified or applied.
///
/// Every variant is scoped to one block; the node keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid difficulty: expected {expected}, got {got}")]
    InvalidDifficulty { expected: u64, got: u64 },

    #[error("proof of work {hash} is not below the target")]
    InvalidProofOfWork { hash: Hash },

    #[error("proposer {validator} stake {stake} is below the minimum {minimum}")]
    InsufficientStake {
        validator: Address,
        stake: Amount,
        minimum: Amount,
    },

    #[error("insufficient votes: approving stake {approving} below threshold {threshold} of {total}")]
    InsufficientVotes {
        approving: Amount,
        threshold: Amount,
        total: Amount,
    },

    #[error("no eligible validators")]
    NoValidators,

    #[error("block time {time} is not after parent time {parent_time}")]
    BlockTimeTooEarly { time: u64, parent_time: u64 },

    #[error("block time {time} is more than {max_drift}s past local time {now}")]
    BlockTimeInFuture { time: u64, now: u64, max_drift: u64 },

    #[error("no block time follows parent time {parent_time}")]
    BlockTimeOverflow { parent_time: u64 },

    #[error("invalid block number: expected {expected}, got {got}")]
    InvalidBlockNumber { expected: u64, got: u64 },

    #[error("parent hash {got} does not match parent {expected}")]
    InvalidParentHash { expected: Hash, got: Hash },

    #[error("checkpoint flag is {got} at height {number}")]
    CheckpointMismatch { number: u64, got: bool },

    #[error("transaction root does not match the block's transactions")]
    InvalidTxRoot,

    #[error("block proposed by {got}, expected {expected}")]
    WrongProposer { expected: Address, got: Address },

    #[error("proposer seal does not verify for {validator}")]
    InvalidSeal { validator: Address },

    #[error("no signing key for selected proposer {validator}")]
    MissingProposerKey { validator: Address },

    #[error("checkpoint block carries {count} votes")]
    UnexpectedVotes { count: usize },

    #[error("transaction {index} signature does not verify for {sender}")]
    InvalidTransactionSignature { index: usize, sender: Address },

    #[error("mining gave up after {attempts} attempts")]
    MiningExhausted { attempts: u64 },

    #[error("mining cancelled")]
    MiningCancelled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConsensusError {
    /// Short, stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDifficulty { .. } => "invalid_difficulty",
            Self::InvalidProofOfWork { .. } => "invalid_pow",
            Self::InsufficientStake { .. } => "insufficient_stake",
            Self::InsufficientVotes { .. } => "insufficient_votes",
            Self::NoValidators => "no_validators",
            Self::BlockTimeTooEarly { .. } => "time_too_early",
            Self::BlockTimeInFuture { .. } => "time_in_future",
            Self::BlockTimeOverflow { .. } => "time_overflow",
            Self::InvalidBlockNumber { .. } => "invalid_number",
            Self::InvalidParentHash { .. } => "invalid_parent",
            Self::CheckpointMismatch { .. } => "checkpoint_mismatch",
            Self::InvalidTxRoot => "invalid_tx_root",
            Self::WrongProposer { .. } => "wrong_proposer",
            Self::InvalidSeal { .. } => "invalid_seal",
            Self::MissingProposerKey { .. } => "missing_proposer_key",
            Self::UnexpectedVotes { .. } => "unexpected_votes",
            Self::InvalidTransactionSignature { .. } => "invalid_tx_signature",
            Self::MiningExhausted { .. } => "mining_exhausted",
            Self::MiningCancelled => "mining_cancelled",
            Self::Ledger(_) => "ledger",
        }
    }
}
