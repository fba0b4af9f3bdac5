//! Eligible validator set.
//!
//! Proposer selection, vote tallying and staker rewards all read the same
//! set: every staker whose stake meets the minimum, sorted by address. The
//! order is part of consensus; round-robin indexes into it.

use serde::{Deserialize, Serialize};

use crate::primitives::{amount_str, Address, Amount};
use crate::storage::state::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    #[serde(with = "amount_str")]
    pub stake: Amount,
}

/// Validators sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Every staker with `stake >= minimum_stake`.
    pub fn from_ledger(ledger: &Ledger, minimum_stake: Amount) -> Self {
        // `stakers()` is already sorted by address.
        let validators = ledger
            .stakers()
            .into_iter()
            .filter(|(_, stake)| *stake >= minimum_stake)
            .map(|(address, stake)| Validator { address, stake })
            .collect();
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Round-robin proposer: `validators[height mod len]`.
    pub fn proposer_for_height(&self, height: u64) -> Option<&Validator> {
        if self.validators.is_empty() {
            return None;
        }
        let index = (height % self.validators.len() as u64) as usize;
        self.validators.get(index)
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
            .map(|i| &self.validators[i])
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn stake_of(&self, address: &Address) -> Amount {
        self.get(address).map(|v| v.stake).unwrap_or(0)
    }

    pub fn total_stake(&self) -> Amount {
        self.validators
            .iter()
            .fold(0, |total, v| total.saturating_add(v.stake))
    }
}

/// Smallest stake that is at least two thirds of `total`: `ceil(2 * total / 3)`.
pub fn quorum_threshold(total: Amount) -> Amount {
    total.saturating_mul(2).div_ceil(3)
}
