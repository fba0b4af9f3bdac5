//! # Ledger
//!
//! Address → (balance, stake, nonce), plus the running total of burned
//! tokens. The ledger is the only mutable consensus state.
//!
//! ## Staging
//!
//! Blocks are applied all-or-nothing:
//!
//! ```text
//!   &Ledger ──► StagedLedger (read-through overlay, writes buffered)
//!                    │  apply txs, credit rewards, burn
//!                    ▼
//!               LedgerChanges ──► Ledger::commit   (only on full success)
//! ```
//!
//! Dropping a `StagedLedger` discards its writes, so a failing transaction
//! in the middle of a block leaves the ledger exactly as it was.
//!
//! ## State Transitions
//!
//! Every transaction first checks `sender.nonce == tx.nonce` and then bumps
//! the nonce. Then, by type:
//!
//! ```text
//! Regular  balance[sender] -= value; balance[to] += value
//! Stake    balance[sender] -= value; stake[sender] += value
//! Unstake  stake[sender]   -= value; balance[sender] += value
//! Vote     (nonce only)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::config::GenesisAccount;
use crate::primitives::{amount_str, Address, Amount};
use crate::transaction::{Transaction, TxType};

/// Errors from ledger mutation. The ledger is unchanged whenever one is
/// returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance for {address}: have {available}, need {needed}")]
    InsufficientBalance {
        address: Address,
        available: Amount,
        needed: Amount,
    },

    #[error("insufficient stake for {address}: have {available}, need {needed}")]
    InsufficientStakeBalance {
        address: Address,
        available: Amount,
        needed: Amount,
    },

    #[error("nonce mismatch for {address}: expected {expected}, got {got}")]
    NonceMismatch {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("regular transaction from {sender} has no recipient")]
    MissingRecipient { sender: Address },

    #[error("balance overflow crediting {address}")]
    BalanceOverflow { address: Address },
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(with = "amount_str")]
    pub balance: Amount,
    /// Next expected transaction nonce.
    pub nonce: u64,
    /// Opaque contract code. Never interpreted here.
    pub code: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Shared read/write surface
// ---------------------------------------------------------------------------

/// Operations shared by [`Ledger`] and [`StagedLedger`], so transaction
/// and reward logic is written once.
pub trait LedgerView {
    fn account(&self, address: &Address) -> Account;
    fn put_account(&mut self, address: Address, account: Account);
    fn get_stake(&self, address: &Address) -> Amount;
    fn set_stake(&mut self, address: Address, stake: Amount);
    fn burn(&mut self, amount: Amount);

    fn get_balance(&self, address: &Address) -> Amount {
        self.account(address).balance
    }

    fn set_balance(&mut self, address: Address, balance: Amount) {
        let mut account = self.account(&address);
        account.balance = balance;
        self.put_account(address, account);
    }

    fn add_balance(&mut self, address: Address, amount: Amount) -> Result<(), LedgerError> {
        let mut account = self.account(&address);
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { address })?;
        self.put_account(address, account);
        Ok(())
    }

    fn sub_balance(&mut self, address: Address, amount: Amount) -> Result<(), LedgerError> {
        let mut account = self.account(&address);
        if amount > account.balance {
            return Err(LedgerError::InsufficientBalance {
                address,
                available: account.balance,
                needed: amount,
            });
        }
        account.balance -= amount;
        self.put_account(address, account);
        Ok(())
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.account(address).nonce
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let mut account = self.account(&address);
        account.nonce = nonce;
        self.put_account(address, account);
    }
}

/// Apply one transaction's effects. On error nothing has been written.
pub fn apply_transaction<L: LedgerView + ?Sized>(
    ledger: &mut L,
    tx: &Transaction,
) -> Result<(), LedgerError> {
    let sender = tx.sender;
    let expected = ledger.get_nonce(&sender);
    if tx.nonce != expected {
        return Err(LedgerError::NonceMismatch {
            address: sender,
            expected,
            got: tx.nonce,
        });
    }

    match tx.tx_type {
        TxType::Regular => {
            let to = tx.to.ok_or(LedgerError::MissingRecipient { sender })?;
            ledger.sub_balance(sender, tx.value)?;
            if let Err(e) = ledger.add_balance(to, tx.value) {
                // Restore the debit.
                ledger.add_balance(sender, tx.value)?;
                return Err(e);
            }
        }
        TxType::Stake => {
            let stake = ledger.get_stake(&sender);
            let new_stake = stake
                .checked_add(tx.value)
                .ok_or(LedgerError::BalanceOverflow { address: sender })?;
            ledger.sub_balance(sender, tx.value)?;
            ledger.set_stake(sender, new_stake);
        }
        TxType::Unstake => {
            let stake = ledger.get_stake(&sender);
            if tx.value > stake {
                return Err(LedgerError::InsufficientStakeBalance {
                    address: sender,
                    available: stake,
                    needed: tx.value,
                });
            }
            ledger.add_balance(sender, tx.value)?;
            ledger.set_stake(sender, stake - tx.value);
        }
        TxType::Vote => {}
    }

    ledger.set_nonce(sender, expected + 1);
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// In-memory account store. Missing addresses read as zero and are not
/// materialized by reads.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    accounts: HashMap<Address, Account>,
    stakes: BTreeMap<Address, Amount>,
    burned: Amount,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed balances and stakes from the genesis allocation.
    pub fn with_genesis(accounts: &[GenesisAccount]) -> Self {
        let mut ledger = Self::new();
        for entry in accounts {
            ledger.set_balance(entry.address, entry.balance);
            if entry.stake > 0 {
                ledger.set_stake(entry.address, entry.stake);
            }
        }
        ledger
    }

    pub fn get_account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    /// Whether the address has an account record or stake.
    pub fn exists(&self, address: &Address) -> bool {
        self.accounts.contains_key(address) || self.stakes.contains_key(address)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.stakes.is_empty()
    }

    /// Every (address, stake) with non-zero stake, sorted by address.
    pub fn stakers(&self) -> Vec<(Address, Amount)> {
        self.stakes.iter().map(|(a, s)| (*a, *s)).collect()
    }

    /// Tokens removed from circulation so far.
    pub fn burned(&self) -> Amount {
        self.burned
    }

    /// Sum of all balances and stakes, saturating at `Amount::MAX`.
    pub fn total_supply(&self) -> Amount {
        self.accounts
            .values()
            .map(|a| a.balance)
            .chain(self.stakes.values().copied())
            .fold(0, Amount::saturating_add)
    }

    /// Buffer writes over this ledger without touching it.
    pub fn stage(&self) -> StagedLedger<'_> {
        StagedLedger {
            base: self,
            changes: LedgerChanges::default(),
        }
    }

    /// Apply a staged change set.
    pub fn commit(&mut self, changes: LedgerChanges) {
        for (address, account) in changes.accounts {
            self.accounts.insert(address, account);
        }
        for (address, stake) in changes.stakes {
            if stake == 0 {
                self.stakes.remove(&address);
            } else {
                self.stakes.insert(address, stake);
            }
        }
        self.burned = self.burned.saturating_add(changes.burned);
    }

    /// Apply one transaction atomically.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let mut staged = self.stage();
        apply_transaction(&mut staged, tx)?;
        let changes = staged.into_changes();
        self.commit(changes);
        Ok(())
    }
}

impl LedgerView for Ledger {
    fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).cloned().unwrap_or_default()
    }

    fn put_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn get_stake(&self, address: &Address) -> Amount {
        self.stakes.get(address).copied().unwrap_or(0)
    }

    fn set_stake(&mut self, address: Address, stake: Amount) {
        if stake == 0 {
            self.stakes.remove(&address);
        } else {
            self.stakes.insert(address, stake);
        }
    }

    fn burn(&mut self, amount: Amount) {
        self.burned = self.burned.saturating_add(amount);
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Buffered writes produced by a [`StagedLedger`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerChanges {
    accounts: HashMap<Address, Account>,
    stakes: HashMap<Address, Amount>,
    burned: Amount,
}

impl LedgerChanges {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.stakes.is_empty() && self.burned == 0
    }

    /// Number of accounts or stakes touched.
    pub fn touched(&self) -> usize {
        self.accounts.len() + self.stakes.len()
    }
}

/// Read-through overlay over a [`Ledger`].
#[derive(Debug)]
pub struct StagedLedger<'a> {
    base: &'a Ledger,
    changes: LedgerChanges,
}

impl<'a> StagedLedger<'a> {
    /// The ledger this overlay reads through to.
    pub fn base(&self) -> &'a Ledger {
        self.base
    }

    pub fn into_changes(self) -> LedgerChanges {
        self.changes
    }
}

impl LedgerView for StagedLedger<'_> {
    fn account(&self, address: &Address) -> Account {
        match self.changes.accounts.get(address) {
            Some(account) => account.clone(),
            None => self.base.account(address),
        }
    }

    fn put_account(&mut self, address: Address, account: Account) {
        self.changes.accounts.insert(address, account);
    }

    fn get_stake(&self, address: &Address) -> Amount {
        match self.changes.stakes.get(address) {
            Some(stake) => *stake,
            None => self.base.get_stake(address),
        }
    }

    fn set_stake(&mut self, address: Address, stake: Amount) {
        self.changes.stakes.insert(address, stake);
    }

    fn burn(&mut self, amount: Amount) {
        self.changes.burned = self.changes.burned.saturating_add(amount);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
