//! # Hybrid PoW/PoS Consensus
//!
//! ```text
//! hybrid.rs    — Height dispatch, common checks, rewards, block application
//! pow.rs       — Checkpoint preparation, cancellable mining, PoW verification
//! pos.rs       — Proposer selection, seal and votes, stake-weighted tally
//! validator.rs — Eligible validator set and quorum threshold
//! error.rs     — ConsensusError
//! ```
//!
//! The engines are pure functions of their inputs: a parent header, a
//! ledger snapshot and the signing collaborator. Only
//! [`HybridEngine::apply_block`] writes, and only on full success.

pub mod error;
pub mod hybrid;
pub mod pos;
pub mod pow;
pub mod validator;

pub use error::ConsensusError;
pub use hybrid::{BlockReceipt, Candidate, ConsensusMode, HybridEngine, RewardCredit, RewardDistribution};
pub use pos::{cast_vote, PosEngine, VoteTally};
pub use pow::{meets_difficulty, target_for, PowEngine};
pub use validator::{quorum_threshold, Validator, ValidatorSet};
