// Copyright (c) 2026 SelsiChain Contributors. MIT License.
// See LICENSE for details.

//! # SelsiChain Protocol: Core Library
//!
//! Consensus core of a chain that alternates between proof-of-work
//! checkpoints and stake-voted blocks. Every Nth block is mined; every
//! other block is sealed by a round-robin proposer and approved by a
//! two-thirds stake supermajority.
//!
//! ## Architecture
//!
//! - **primitives** — Address, Hash, BlockNonce and token amounts.
//! - **config** — Consensus parameters, network presets, genesis.
//! - **crypto** — BLAKE3 hashing, Ed25519 keys, the signer/verifier seam.
//! - **transaction** — Transactions and the builder that signs them.
//! - **storage** — Blocks, the in-memory chain and the staged ledger.
//! - **consensus** — PoW, PoS and the hybrid engine that picks between them.
//! - **network** — Mempool, transport seam and the consensus service.
//!
//! ## Design Philosophy
//!
//! 1. Engines are pure; only block application writes, and only on success.
//! 2. No panics on consensus paths. Every rejection is a typed error.
//! 3. One writer. The consensus service serializes every ledger mutation.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod network;
pub mod primitives;
pub mod storage;
pub mod transaction;
