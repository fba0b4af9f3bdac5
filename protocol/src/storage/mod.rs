//! # Storage Module
//!
//! ```text
//! block.rs  — Header, Block, Vote
//! state.rs  — Ledger (balances, stakes, nonces) and staged application
//! chain.rs  — In-memory canonical chain indexed by hash and height
//! ```
//!
//! Everything is in memory. Restarting a node starts from genesis.

pub mod block;
pub mod chain;
pub mod state;

pub use block::{Block, Header, Vote};
pub use chain::{Chain, ChainError};
pub use state::{Account, Ledger, LedgerChanges, LedgerError, LedgerView, StagedLedger};
