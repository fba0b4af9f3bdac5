// Consensus engine benchmarks for the SelsiChain protocol.
//
// Covers header hashing, stake-weighted vote tallying over growing
// validator sets, and checkpoint mining at a few difficulties.

use std::sync::atomic::AtomicBool;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use selsi_protocol::config::ConsensusConfig;
use selsi_protocol::consensus::{cast_vote, PosEngine, PowEngine, ValidatorSet};
use selsi_protocol::crypto::{Keyring, SelsiKeypair};
use selsi_protocol::primitives::{tokens, Address};
use selsi_protocol::storage::{Block, Ledger, LedgerView, Vote};

/// `n` validators with equal stake, all keyed in one ring.
fn validators(n: usize) -> (Ledger, Keyring) {
    let mut ledger = Ledger::new();
    let mut ring = Keyring::new();
    for i in 0..n {
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
        let address = Address(bytes);
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&(i as u64).to_be_bytes());
        ring.insert(address, SelsiKeypair::from_seed(&seed));
        ledger.set_stake(address, tokens(1_000));
    }
    (ledger, ring)
}

fn bench_header_hash(c: &mut Criterion) {
    let genesis = Block::genesis(1_700_000_000);
    let block = Block::child_of(&genesis.header, Address::tagged(9), 1_700_000_001, vec![]);

    c.bench_function("consensus/header_hash", |b| {
        b.iter(|| block.header.hash());
    });
}

fn bench_tally(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus/tally_votes");

    for validator_count in [4usize, 16, 64] {
        let (ledger, ring) = validators(validator_count);
        let pos = PosEngine::new(tokens(1_000));
        let set: ValidatorSet = pos.eligible_validators(&ledger);
        let genesis = Block::genesis(1_700_000_000);
        let header = Block::child_of(&genesis.header, Address::tagged(9), 1_700_000_001, vec![]).header;
        let hash = header.hash();
        let votes: Vec<Vote> = set
            .validators()
            .iter()
            .filter_map(|v| cast_vote(&ring, v.address, &header, &set, 1_700_000_001))
            .collect();

        group.throughput(Throughput::Elements(validator_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(validator_count),
            &votes,
            |b, votes| {
                b.iter(|| pos.tally_votes(&hash, None, votes, &set, &ring));
            },
        );
    }

    group.finish();
}

fn bench_mining(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus/mine_checkpoint");
    group.sample_size(20);

    for difficulty in [1u64, 256, 4_096] {
        let config = ConsensusConfig {
            mining_difficulty: difficulty,
            ..ConsensusConfig::devnet()
        };
        let pow = PowEngine::new(&config);
        let genesis = Block::genesis(1_700_000_000);
        let mut block = Block::child_of(&genesis.header, Address::tagged(9), 1_700_000_001, vec![]);
        pow.prepare_block(&mut block);
        let cancel = AtomicBool::new(false);

        group.bench_with_input(
            BenchmarkId::from_parameter(difficulty),
            &block,
            |b, block| {
                b.iter(|| pow.mine_block(block.clone(), &cancel));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_header_hash, bench_tally, bench_mining);
criterion_main!(benches);
