//! # Proof-of-Stake Blocks
//!
//! Non-checkpoint blocks are proposed by one validator and approved by
//! stake-weighted votes.
//!
//! ## Proposer selection
//!
//! ```text
//! eligible = stakers with stake >= minimum_stake, sorted by address
//! proposer(height) = eligible[height mod len(eligible)]
//! ```
//!
//! ## Quorum
//!
//! The proposer seals the header hash; its seal is its approval. Every
//! other eligible validator signs a [`Vote`] over
//! `vote_digest(header_hash, approve, timestamp)`.
//!
//! ```text
//! total     = stake of the whole eligible set
//! threshold = ceil(2 * total / 3)
//! approving = proposer stake + stake of counted approving votes
//! accepted  ⇔ approving >= threshold
//! ```
//!
//! A vote is counted only if it names this header's hash, comes from an
//! eligible validator other than the proposer, is that validator's first
//! counted vote, and its signature verifies. Anything else is dropped, not
//! treated as a rejection.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::error::ConsensusError;
use super::validator::{quorum_threshold, ValidatorSet};
use crate::crypto::signatures::{SignatureVerifier, Signer};
use crate::primitives::{Address, Amount, BlockNonce, Hash};
use crate::storage::block::{Block, Header, Vote};
use crate::storage::state::{Ledger, LedgerView};

/// Outcome of counting the votes on one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    /// Stake of the full eligible set.
    pub total_stake: Amount,
    /// `ceil(2 * total_stake / 3)`.
    pub threshold: Amount,
    /// Stake credited for the proposer's seal.
    pub proposer_stake: Amount,
    /// Stake of counted approving votes.
    pub approving_stake: Amount,
    /// Stake of counted rejecting votes.
    pub rejecting_stake: Amount,
    pub counted: usize,
    pub excluded: usize,
}

impl VoteTally {
    /// Proposer stake plus approving votes.
    pub fn approving_total(&self) -> Amount {
        self.proposer_stake.saturating_add(self.approving_stake)
    }

    pub fn approved(&self) -> bool {
        self.approving_total() >= self.threshold
    }
}

#[derive(Debug, Clone)]
pub struct PosEngine {
    minimum_stake: Amount,
}

impl PosEngine {
    pub fn new(minimum_stake: Amount) -> Self {
        Self { minimum_stake }
    }

    pub fn minimum_stake(&self) -> Amount {
        self.minimum_stake
    }

    pub fn eligible_validators(&self, ledger: &Ledger) -> ValidatorSet {
        ValidatorSet::from_ledger(ledger, self.minimum_stake)
    }

    /// Round-robin proposer for `height`.
    pub fn select_validator(&self, height: u64, ledger: &Ledger) -> Result<Address, ConsensusError> {
        self.eligible_validators(ledger)
            .proposer_for_height(height)
            .map(|v| v.address)
            .ok_or(ConsensusError::NoValidators)
    }

    /// Name the proposer, seal the header, and collect votes from every
    /// other eligible validator the signer holds a key for.
    pub fn prepare_block(
        &self,
        block: &mut Block,
        ledger: &Ledger,
        signer: &dyn Signer,
    ) -> Result<(), ConsensusError> {
        let set = self.eligible_validators(ledger);
        let number = block.number();
        let proposer = set
            .proposer_for_height(number)
            .map(|v| v.address)
            .ok_or(ConsensusError::NoValidators)?;

        let header = &mut block.header;
        header.validator = proposer;
        header.checkpoint = false;
        header.difficulty = 0;
        header.nonce = BlockNonce::zero();
        header.seal.clear();

        let hash = header.hash();
        header.seal = signer
            .sign(&proposer, hash.as_bytes())
            .ok_or(ConsensusError::MissingProposerKey {
                validator: proposer,
            })?;

        let timestamp = chrono::Utc::now().timestamp();
        block.votes = set
            .validators()
            .iter()
            .filter(|v| v.address != proposer && signer.holds_key(&v.address))
            .filter_map(|v| cast_vote(signer, v.address, &block.header, &set, timestamp))
            .collect();

        debug!(
            height = number,
            proposer = %proposer.short(),
            votes = block.votes.len(),
            "pos block prepared"
        );
        Ok(())
    }

    /// Full PoS verification. Returns the tally on acceptance.
    pub fn verify_block(
        &self,
        block: &Block,
        parent: &Header,
        ledger: &Ledger,
        verifier: &dyn SignatureVerifier,
    ) -> Result<VoteTally, ConsensusError> {
        let header = &block.header;
        let proposer = header.validator;

        let stake = ledger.get_stake(&proposer);
        if stake < self.minimum_stake {
            return Err(ConsensusError::InsufficientStake {
                validator: proposer,
                stake,
                minimum: self.minimum_stake,
            });
        }

        let set = self.eligible_validators(ledger);
        let expected = set
            .proposer_for_height(header.number)
            .map(|v| v.address)
            .ok_or(ConsensusError::NoValidators)?;
        if expected != proposer {
            return Err(ConsensusError::WrongProposer {
                expected,
                got: proposer,
            });
        }

        let hash = header.hash();
        if !verifier.verify_signature(&proposer, hash.as_bytes(), &header.seal) {
            return Err(ConsensusError::InvalidSeal {
                validator: proposer,
            });
        }

        if header.time <= parent.time {
            return Err(ConsensusError::BlockTimeTooEarly {
                time: header.time,
                parent_time: parent.time,
            });
        }

        let tally = self.tally_votes(&hash, Some(&proposer), &block.votes, &set, verifier);
        if !tally.approved() {
            warn!(
                height = header.number,
                approving_stake = %tally.approving_total(),
                threshold = %tally.threshold,
                "pos block lacks quorum"
            );
            return Err(ConsensusError::InsufficientVotes {
                approving: tally.approving_total(),
                threshold: tally.threshold,
                total: tally.total_stake,
            });
        }

        Ok(tally)
    }

    /// Count `votes` on `block_hash` against the eligible set.
    ///
    /// With `proposer` set, its stake is credited as approval and any vote
    /// it casts is dropped.
    pub fn tally_votes(
        &self,
        block_hash: &Hash,
        proposer: Option<&Address>,
        votes: &[Vote],
        set: &ValidatorSet,
        verifier: &dyn SignatureVerifier,
    ) -> VoteTally {
        let total_stake = set.total_stake();
        let mut tally = VoteTally {
            total_stake,
            threshold: quorum_threshold(total_stake),
            proposer_stake: proposer.map(|p| set.stake_of(p)).unwrap_or(0),
            approving_stake: 0,
            rejecting_stake: 0,
            counted: 0,
            excluded: 0,
        };

        let mut seen: HashSet<Address> = HashSet::new();
        for vote in votes {
            let Some(voter) = set.get(&vote.validator) else {
                tally.excluded += 1;
                continue;
            };
            let valid = vote.block_hash == *block_hash
                && Some(&vote.validator) != proposer
                && !seen.contains(&vote.validator)
                && verifier.verify_signature(
                    &vote.validator,
                    vote.digest().as_bytes(),
                    &vote.signature,
                );
            if !valid {
                debug!(voter = %vote.validator.short(), "vote excluded");
                tally.excluded += 1;
                continue;
            }

            seen.insert(vote.validator);
            tally.counted += 1;
            if vote.approve {
                tally.approving_stake = tally.approving_stake.saturating_add(voter.stake);
            } else {
                tally.rejecting_stake = tally.rejecting_stake.saturating_add(voter.stake);
            }
        }

        tally
    }
}

/// Sign `voter`'s decision on `header`.
///
/// The voter approves iff the header is not a checkpoint and names the
/// proposer the voter itself selects for that height. `None` when the
/// signer holds no key for `voter`.
pub fn cast_vote(
    signer: &dyn Signer,
    voter: Address,
    header: &Header,
    set: &ValidatorSet,
    timestamp: i64,
) -> Option<Vote> {
    let expected = set.proposer_for_height(header.number).map(|v| v.address);
    let approve = !header.checkpoint && expected == Some(header.validator);

    let mut vote = Vote {
        validator: voter,
        block_hash: header.hash(),
        approve,
        signature: Vec::new(),
        timestamp,
    };
    vote.signature = signer.sign(&voter, vote.digest().as_bytes())?;
    Some(vote)
}
