//! Nonce-ordered transaction pool.
//!
//! Pending transactions wait here until a block includes them. Each sender
//! has a queue keyed by nonce; a block can only take a sender's
//! transactions as a contiguous run starting at its ledger nonce.
//!
//! ## Design
//!
//! - `DashMap` holds the transactions by hash for lock-free lookups
//!   (duplicate detection on gossip, API queries).
//! - `parking_lot::RwLock<BTreeMap>` protects the per-sender nonce index.
//!   Admission and removal take the write lock; selection only reads.
//! - Selection dry-runs every candidate on a staged ledger, so a selected
//!   batch always applies cleanly on top of the ledger it was chosen from.

use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{MAX_MEMPOOL_SIZE, MAX_NONCE_GAP};
use crate::crypto::signatures::SignatureVerifier;
use crate::primitives::{Address, Hash};
use crate::storage::block::Block;
use crate::storage::state::{apply_transaction, Ledger, LedgerView};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions the pool will hold.
    pub max_size: usize,

    /// How far past its ledger nonce a sender may queue.
    pub max_nonce_gap: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_MEMPOOL_SIZE,
            max_nonce_gap: MAX_NONCE_GAP,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("transaction {0} is already pending")]
    Duplicate(Hash),

    #[error("mempool full ({capacity} transactions)")]
    Full { capacity: usize },

    #[error("invalid signature from {sender}")]
    InvalidSignature { sender: Address },

    #[error("stale nonce for {sender}: ledger is at {expected}, got {got}")]
    StaleNonce { sender: Address, expected: u64, got: u64 },

    #[error("nonce {got} for {sender} is more than {max_gap} ahead of {expected}")]
    NonceTooFarAhead {
        sender: Address,
        expected: u64,
        got: u64,
        max_gap: u64,
    },

    #[error("{sender} already has a pending transaction with nonce {nonce}")]
    NonceConflict { sender: Address, nonce: u64 },
}

// ---------------------------------------------------------------------------
// Mempool
// ---------------------------------------------------------------------------

pub struct Mempool {
    config: MempoolConfig,
    transactions: DashMap<Hash, Transaction>,
    by_sender: RwLock<BTreeMap<Address, BTreeMap<u64, Hash>>>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: DashMap::new(),
            by_sender: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Admit `tx` after checking its signature and nonce against `ledger`.
    ///
    /// Balances are not checked here; a transaction the sender cannot
    /// afford is simply never selected.
    pub fn add(
        &self,
        tx: Transaction,
        ledger: &Ledger,
        verifier: &dyn SignatureVerifier,
    ) -> Result<Hash, MempoolError> {
        let hash = tx.hash();
        let sender = tx.sender;

        if self.transactions.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }
        if !verifier.verify_signature(&sender, hash.as_bytes(), &tx.signature) {
            return Err(MempoolError::InvalidSignature { sender });
        }

        let expected = ledger.get_nonce(&sender);
        if tx.nonce < expected {
            return Err(MempoolError::StaleNonce {
                sender,
                expected,
                got: tx.nonce,
            });
        }
        if tx.nonce - expected > self.config.max_nonce_gap {
            return Err(MempoolError::NonceTooFarAhead {
                sender,
                expected,
                got: tx.nonce,
                max_gap: self.config.max_nonce_gap,
            });
        }

        let mut index = self.by_sender.write();
        if self.transactions.len() >= self.config.max_size {
            return Err(MempoolError::Full {
                capacity: self.config.max_size,
            });
        }
        let queue = index.entry(sender).or_default();
        if queue.contains_key(&tx.nonce) {
            return Err(MempoolError::NonceConflict {
                sender,
                nonce: tx.nonce,
            });
        }
        queue.insert(tx.nonce, hash);
        trace!(tx = %hash.short(), %sender, nonce = tx.nonce, "transaction admitted");
        self.transactions.insert(hash, tx);
        Ok(hash)
    }

    /// Up to `max` transactions that apply cleanly, in order, on `ledger`.
    ///
    /// Senders are visited in address order. For each, nonces are taken
    /// while they stay contiguous from the ledger nonce and the dry run
    /// succeeds.
    pub fn select_transactions(&self, ledger: &Ledger, max: usize) -> Vec<Transaction> {
        let mut selected = Vec::new();
        if max == 0 {
            return selected;
        }

        let index = self.by_sender.read();
        let mut staged = ledger.stage();

        'senders: for (sender, queue) in index.iter() {
            let mut expected = staged.get_nonce(sender);
            for (nonce, hash) in queue.range(expected..) {
                if *nonce != expected {
                    break;
                }
                let Some(tx) = self.transactions.get(hash).map(|entry| entry.value().clone()) else {
                    break;
                };
                if let Err(e) = apply_transaction(&mut staged, &tx) {
                    debug!(%sender, nonce, error = %e, "skipping unappliable transaction");
                    break;
                }
                selected.push(tx);
                if selected.len() == max {
                    break 'senders;
                }
                expected += 1;
            }
        }
        selected
    }

    /// Drop every transaction `block` carries. Returns how many were pending.
    pub fn remove_included(&self, block: &Block) -> usize {
        let mut index = self.by_sender.write();
        let mut removed = 0;
        for tx in &block.transactions {
            let hash = tx.hash();
            if self.transactions.remove(&hash).is_none() {
                continue;
            }
            removed += 1;
            if let Some(queue) = index.get_mut(&tx.sender) {
                queue.remove(&tx.nonce);
                if queue.is_empty() {
                    index.remove(&tx.sender);
                }
            }
        }
        removed
    }

    /// Drop transactions whose nonce the ledger has already passed.
    pub fn prune_stale(&self, ledger: &Ledger) -> usize {
        let mut index = self.by_sender.write();
        let mut removed = 0;
        index.retain(|sender, queue| {
            let current = ledger.get_nonce(sender);
            let live = queue.split_off(&current);
            for hash in queue.values() {
                self.transactions.remove(hash);
                removed += 1;
            }
            *queue = live;
            !queue.is_empty()
        });
        if removed > 0 {
            debug!(removed, "pruned stale transactions");
        }
        removed
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.transactions.get(hash).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Number of transactions queued for `sender`.
    pub fn pending_for(&self, sender: &Address) -> usize {
        self.by_sender.read().get(sender).map_or(0, BTreeMap::len)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(MempoolConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_genesis;
    use crate::crypto::keys::SelsiKeypair;
    use crate::crypto::signatures::Keyring;
    use crate::primitives::tokens;
    use crate::transaction::TransactionBuilder;
    use std::sync::Arc;

    fn keyring() -> Keyring {
        let mut ring = Keyring::new();
        for tag in 1..=3u8 {
            ring.insert(Address::tagged(tag), SelsiKeypair::from_seed(&[tag; 32]));
        }
        ring
    }

    fn transfer(ring: &Keyring, from: u8, nonce: u64, value: u128) -> Transaction {
        TransactionBuilder::transfer(Address::tagged(from), Address::tagged(9), value)
            .nonce(nonce)
            .build_signed(ring)
            .unwrap()
    }

    fn setup() -> (Mempool, Ledger, Keyring) {
        (
            Mempool::default(),
            Ledger::with_genesis(&default_genesis()),
            keyring(),
        )
    }

    #[test]
    fn add_and_lookup() {
        let (pool, ledger, ring) = setup();
        let tx = transfer(&ring, 1, 0, 10);
        let hash = pool.add(tx.clone(), &ledger, &ring).unwrap();
        assert_eq!(hash, tx.hash());
        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&hash), Some(tx));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pending_for(&Address::tagged(1)), 1);
    }

    #[test]
    fn duplicate_is_rejected() {
        let (pool, ledger, ring) = setup();
        let tx = transfer(&ring, 1, 0, 10);
        pool.add(tx.clone(), &ledger, &ring).unwrap();
        assert_eq!(
            pool.add(tx.clone(), &ledger, &ring),
            Err(MempoolError::Duplicate(tx.hash()))
        );
    }

    #[test]
    fn same_nonce_different_content_conflicts() {
        let (pool, ledger, ring) = setup();
        pool.add(transfer(&ring, 1, 0, 10), &ledger, &ring).unwrap();
        assert_eq!(
            pool.add(transfer(&ring, 1, 0, 11), &ledger, &ring),
            Err(MempoolError::NonceConflict {
                sender: Address::tagged(1),
                nonce: 0
            })
        );
    }

    #[test]
    fn bad_signature_is_rejected() {
        let (pool, ledger, ring) = setup();
        let mut tx = transfer(&ring, 1, 0, 10);
        tx.signature[0] ^= 0xFF;
        assert_eq!(
            pool.add(tx, &ledger, &ring),
            Err(MempoolError::InvalidSignature {
                sender: Address::tagged(1)
            })
        );

        let unsigned = TransactionBuilder::transfer(Address::tagged(2), Address::tagged(9), 1).build();
        assert!(matches!(
            pool.add(unsigned, &ledger, &ring),
            Err(MempoolError::InvalidSignature { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn nonce_window_is_enforced() {
        let (pool, mut ledger, ring) = setup();
        ledger.set_nonce(Address::tagged(1), 5);

        assert!(matches!(
            pool.add(transfer(&ring, 1, 4, 1), &ledger, &ring),
            Err(MempoolError::StaleNonce { expected: 5, got: 4, .. })
        ));
        assert!(matches!(
            pool.add(transfer(&ring, 1, 5 + MAX_NONCE_GAP + 1, 1), &ledger, &ring),
            Err(MempoolError::NonceTooFarAhead { .. })
        ));
        assert!(pool.add(transfer(&ring, 1, 5 + MAX_NONCE_GAP, 1), &ledger, &ring).is_ok());
    }

    #[test]
    fn full_pool_refuses() {
        let pool = Mempool::new(MempoolConfig {
            max_size: 2,
            ..MempoolConfig::default()
        });
        let ledger = Ledger::with_genesis(&default_genesis());
        let ring = keyring();
        pool.add(transfer(&ring, 1, 0, 1), &ledger, &ring).unwrap();
        pool.add(transfer(&ring, 2, 0, 1), &ledger, &ring).unwrap();
        assert_eq!(
            pool.add(transfer(&ring, 3, 0, 1), &ledger, &ring),
            Err(MempoolError::Full { capacity: 2 })
        );
    }

    #[test]
    fn selection_is_nonce_contiguous() {
        let (pool, ledger, ring) = setup();
        // Sender 1: 0, 1, 3 (gap at 2). Sender 2: 1 only (missing 0).
        for nonce in [0, 1, 3] {
            pool.add(transfer(&ring, 1, nonce, 1), &ledger, &ring).unwrap();
        }
        pool.add(transfer(&ring, 2, 1, 1), &ledger, &ring).unwrap();

        let selected = pool.select_transactions(&ledger, 100);
        let picked: Vec<(Address, u64)> = selected.iter().map(|tx| (tx.sender, tx.nonce)).collect();
        assert_eq!(picked, vec![(Address::tagged(1), 0), (Address::tagged(1), 1)]);
    }

    #[test]
    fn selection_respects_max() {
        let (pool, ledger, ring) = setup();
        for tag in 1..=3u8 {
            for nonce in 0..3 {
                pool.add(transfer(&ring, tag, nonce, 1), &ledger, &ring).unwrap();
            }
        }
        assert_eq!(pool.select_transactions(&ledger, 4).len(), 4);
        assert_eq!(pool.select_transactions(&ledger, 100).len(), 9);
        assert!(pool.select_transactions(&ledger, 0).is_empty());
    }

    #[test]
    fn selection_skips_unaffordable_runs() {
        let (pool, ledger, ring) = setup();
        let balance = ledger.get_balance(&Address::tagged(1));
        pool.add(transfer(&ring, 1, 0, balance), &ledger, &ring).unwrap();
        pool.add(transfer(&ring, 1, 1, 1), &ledger, &ring).unwrap();
        pool.add(transfer(&ring, 2, 0, 1), &ledger, &ring).unwrap();

        let selected = pool.select_transactions(&ledger, 100);
        let picked: Vec<(Address, u64)> = selected.iter().map(|tx| (tx.sender, tx.nonce)).collect();
        assert_eq!(picked, vec![(Address::tagged(1), 0), (Address::tagged(2), 0)]);

        // The batch applies on the untouched ledger.
        let mut copy = ledger.clone();
        for tx in &selected {
            copy.apply_transaction(tx).unwrap();
        }
        assert_eq!(ledger.get_nonce(&Address::tagged(1)), 0);
    }

    #[test]
    fn remove_included_and_prune() {
        let (pool, mut ledger, ring) = setup();
        let a = transfer(&ring, 1, 0, 1);
        let b = transfer(&ring, 1, 1, 1);
        let c = transfer(&ring, 2, 0, 1);
        for tx in [&a, &b, &c] {
            pool.add(tx.clone(), &ledger, &ring).unwrap();
        }

        let mut block = Block::genesis(0);
        block.transactions = vec![a.clone()];
        assert_eq!(pool.remove_included(&block), 1);
        assert_eq!(pool.remove_included(&block), 0);
        assert!(!pool.contains(&a.hash()));

        // Sender 2's nonce moved on elsewhere.
        ledger.set_nonce(Address::tagged(2), 1);
        assert_eq!(pool.prune_stale(&ledger), 1);
        assert!(!pool.contains(&c.hash()));
        assert!(pool.contains(&b.hash()));
        assert_eq!(pool.pending_for(&Address::tagged(2)), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn concurrent_admission() {
        let pool = Arc::new(Mempool::default());
        let ledger = Arc::new(Ledger::with_genesis(&default_genesis()));
        let ring = Arc::new(keyring());

        let handles: Vec<_> = (1..=3u8)
            .map(|tag| {
                let pool = Arc::clone(&pool);
                let ledger = Arc::clone(&ledger);
                let ring = Arc::clone(&ring);
                std::thread::spawn(move || {
                    for nonce in 0..20 {
                        pool.add(transfer(&ring, tag, nonce, 1), &ledger, ring.as_ref())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), 60);
        assert_eq!(pool.select_transactions(&ledger, 1_000).len(), 60);
    }
}
