//! # Transaction Module
//!
//! ```text
//! types.rs   — Transaction and TxType
//! builder.rs — Fluent TransactionBuilder and signing through a Signer
//! ```
//!
//! State effects of each [`TxType`] live with the ledger
//! (`storage::state::apply_transaction`), not here.

pub mod builder;
pub mod types;

pub use builder::{sign_transaction, TransactionBuilder};
pub use types::{Transaction, TxType};
