//! End-to-end integration tests for the SelsiChain protocol.
//!
//! These tests drive the public API only: genesis allocation, signed
//! transactions, block production under both consensus modes, vote
//! verification, reward application, and the consensus service running on
//! a tokio runtime.
//!
//! Each test builds its own ledger and chain. No shared state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use selsi_protocol::config::{default_genesis, ConsensusConfig};
use selsi_protocol::consensus::{ConsensusMode, HybridEngine};
use selsi_protocol::crypto::{Keyring, SelsiKeypair};
use selsi_protocol::network::{
    ConsensusService, LoopbackTransport, Mempool, ServiceConfig, ServiceEvent, SharedState,
};
use selsi_protocol::primitives::{tokens, Address, Amount};
use selsi_protocol::storage::{Block, Ledger, LedgerView};
use selsi_protocol::transaction::{Transaction, TransactionBuilder};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const A: Address = Address::tagged(1);
const B: Address = Address::tagged(2);
const C: Address = Address::tagged(3);
const COINBASE: Address = Address::tagged(0x99);
const RECIPIENT: Address = Address::tagged(0x42);

/// Keys for the three genesis validators.
fn keyring() -> Keyring {
    let mut ring = Keyring::new();
    for address in [A, B, C] {
        let seed = [address.as_bytes()[0]; 32];
        ring.insert(address, SelsiKeypair::from_seed(&seed));
    }
    ring
}

fn transfer(ring: &Keyring, nonce: u64, value: Amount) -> Transaction {
    TransactionBuilder::transfer(A, RECIPIENT, value)
        .nonce(nonce)
        .build_signed(ring)
        .expect("A is in the keyring")
}

// ---------------------------------------------------------------------------
// Genesis to height 1
// ---------------------------------------------------------------------------

#[test]
fn genesis_to_first_pos_block() {
    let config = ConsensusConfig::devnet();
    let reward = config.block_reward;
    let engine = HybridEngine::new(config).unwrap();
    let ring = keyring();
    let mut ledger = Ledger::with_genesis(&default_genesis());
    let genesis = Block::genesis(1_700_000_000);

    for address in [A, B, C] {
        assert_eq!(ledger.get_balance(&address), tokens(1_000_000));
    }

    let txs = vec![transfer(&ring, 0, tokens(100)), transfer(&ring, 1, tokens(50))];
    let block = engine
        .produce_block(&genesis.header, txs, COINBASE, &ledger, &ring)
        .unwrap();

    // Height 1 is not a multiple of 5, so PoS; eligible = [A, B, C], 1 mod 3 = B.
    assert_eq!(block.number(), 1);
    assert!(!block.is_checkpoint());
    assert_eq!(block.header.validator, B);

    // The other two validators voted, both approving.
    let voters: Vec<Address> = block.votes.iter().map(|v| v.validator).collect();
    assert_eq!(voters, vec![A, C]);
    assert!(block.votes.iter().all(|v| v.approve));
    assert!(block.votes.iter().all(|v| v.block_hash == block.hash()));

    let tally = engine
        .pos()
        .verify_block(&block, &genesis.header, &ledger, &ring)
        .unwrap();
    assert_eq!(tally.total_stake, tokens(15_000));
    assert_eq!(tally.threshold, tokens(10_000));
    assert_eq!(tally.approving_total(), tokens(15_000));
    assert_eq!(
        engine.verify_block(&block, &genesis.header, &ledger, &ring),
        Ok(ConsensusMode::Pos)
    );

    let supply_before = ledger.total_supply();
    let receipt = engine.apply_block(&block, &mut ledger).unwrap();

    // 45 / 45 / 7 / 3 of the block reward.
    let rewards = &receipt.rewards;
    assert_eq!(rewards.miner.amount, reward * 45 / 100);
    assert_eq!(rewards.staker_total(), reward * 45 / 100);
    assert_eq!(rewards.ecosystem.amount, reward * 7 / 100);
    assert_eq!(rewards.burned, reward * 3 / 100);
    assert_eq!(rewards.total(), reward);

    // Staker share by stake: 5000 / 3000 / 7000 of 15000.
    let pool = reward * 45 / 100;
    let share = |stake: Amount| pool * stake / 15_000;
    assert_eq!(
        ledger.get_balance(&A),
        tokens(1_000_000) - tokens(150) + share(5_000)
    );
    assert_eq!(ledger.get_balance(&B), tokens(1_000_000) + share(3_000));
    assert_eq!(ledger.get_balance(&C), tokens(1_000_000) + share(7_000));
    assert_eq!(ledger.get_balance(&RECIPIENT), tokens(150));
    assert_eq!(ledger.get_balance(&COINBASE), reward * 45 / 100);
    assert_eq!(
        ledger.get_balance(&engine.config().ecosystem_address),
        reward * 7 / 100
    );

    // A issued two transactions in this block.
    assert_eq!(ledger.get_nonce(&A), 2);
    assert_eq!(ledger.get_nonce(&B), 0);
    assert_eq!(ledger.burned(), reward * 3 / 100);
    assert_eq!(ledger.total_supply(), supply_before + reward - rewards.burned);
}

#[test]
fn block_with_only_minority_votes_is_rejected() {
    let engine = HybridEngine::new(ConsensusConfig::devnet()).unwrap();
    let ledger = Ledger::with_genesis(&default_genesis());
    let genesis = Block::genesis(1_700_000_000);

    // Only B (the proposer, 3000) holds a key: no other votes are cast.
    let mut ring = Keyring::new();
    ring.insert(B, SelsiKeypair::from_seed(&[2u8; 32]));
    let block = engine
        .produce_block(&genesis.header, vec![], COINBASE, &ledger, &ring)
        .unwrap();
    assert!(block.votes.is_empty());

    let verifier = keyring().registry();
    let err = engine
        .verify_block(&block, &genesis.header, &ledger, &verifier)
        .unwrap_err();
    assert_eq!(err.kind(), "insufficient_votes");
}

// ---------------------------------------------------------------------------
// Consensus service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_runs_through_checkpoints() {
    let config = ConsensusConfig {
        mining_difficulty: 16,
        block_time: Duration::from_millis(10),
        ..ConsensusConfig::devnet()
    };
    let reward = config.block_reward;
    let burn = reward * 3 / 100;

    let ring = Arc::new(keyring());
    let ledger = Ledger::with_genesis(&default_genesis());
    let initial_supply = ledger.total_supply();
    let state = SharedState::new(Block::genesis(1_700_000_000), ledger, Mempool::default());
    let service_config = ServiceConfig::from_consensus(&config, COINBASE);
    let (service, handle) = ConsensusService::new(
        HybridEngine::new(config).unwrap(),
        state.clone(),
        ring.clone(),
        ring.clone(),
        Arc::new(LoopbackTransport::default()),
        service_config,
    );
    let mut events = handle.subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(service.run(shutdown_rx));

    for nonce in 0..3 {
        handle
            .submit_transaction(transfer(&ring, nonce, tokens(1)))
            .await
            .unwrap();
    }

    let mut checkpoints = Vec::new();
    let mut height = 0;
    while height < 10 {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("service stalled")
            .unwrap();
        if let ServiceEvent::BlockImported { receipt, .. } = event {
            height = receipt.number;
            if receipt.mode == ConsensusMode::Pow {
                checkpoints.push(receipt.number);
            }
        }
    }
    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(&checkpoints[..2], &[5, 10]);

    let chain = state.chain.read();
    let final_height = chain.height();
    assert!(final_height >= 10);
    for number in 1..=final_height {
        let block = chain.get_by_number(number).unwrap();
        assert_eq!(block.is_checkpoint(), number % 5 == 0);
        assert_eq!(block.votes.is_empty(), block.is_checkpoint());
    }

    let ledger = state.ledger.read();
    assert_eq!(ledger.get_nonce(&A), 3);
    assert_eq!(ledger.get_balance(&RECIPIENT), tokens(3));
    assert_eq!(ledger.burned(), burn * final_height as Amount);
    assert_eq!(
        ledger.total_supply(),
        initial_supply + (reward - burn) * final_height as Amount
    );
    assert!(state.mempool.is_empty());
}
