//! # Consensus Service
//!
//! The `ConsensusService` is the only writer of the ledger and the chain.
//! Every block, local or from a peer, goes through the same
//! [`import_block`](ConsensusService::import_block) path on this one task,
//! so two blocks can never be applied at the same height.
//!
//! ## Event loop
//!
//! ```text
//!            ┌──────────── tick (block_time) ───────────┐
//!            ▼                                          │
//!   create_block(head) ── Pos ──► import_block ──► broadcast
//!            │
//!            └── Pow ──► spawn_blocking(mine_block) ──► import_block
//!                             ▲
//!                 inbound block for the same height raises the cancel flag
//!
//!   inbound queue:  Block       → import_block
//!                   Transaction → mempool admission → broadcast
//! ```
//!
//! While a checkpoint is being mined the service keeps draining its
//! inbound queue. Transactions are admitted as usual. A peer block that
//! extends the current head cancels the miner; the service waits for the
//! worker to stop before importing it, so mining never overlaps with
//! application.
//!
//! ## Shutdown
//!
//! The loop watches a `tokio::sync::watch` channel. Sending `true` (or
//! dropping the sender) stops it after the current step; an in-flight
//! mining worker is cancelled and awaited first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::mempool::{Mempool, MempoolError};
use super::transport::Transport;
use crate::config::{ConsensusConfig, MAX_BLOCK_TRANSACTIONS};
use crate::consensus::{BlockReceipt, Candidate, ConsensusError, HybridEngine};
use crate::crypto::signatures::{SignatureVerifier, Signer};
use crate::primitives::{Address, Hash};
use crate::storage::block::Block;
use crate::storage::chain::{Chain, ChainError};
use crate::storage::state::Ledger;
use crate::transaction::Transaction;

/// Capacity of the inbound block/transaction queue.
pub const INBOUND_QUEUE_CAPACITY: usize = 1_024;

/// Capacity of the service event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Receives the miner share of locally produced blocks.
    pub coinbase: Address,

    /// Time between production attempts.
    pub block_time: Duration,

    /// Transactions drained from the mempool per block.
    pub max_block_transactions: usize,
}

impl ServiceConfig {
    pub fn from_consensus(consensus: &ConsensusConfig, coinbase: Address) -> Self {
        Self {
            coinbase,
            block_time: consensus.block_time,
            max_block_transactions: MAX_BLOCK_TRANSACTIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("consensus service is not running")]
    Stopped,

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("mining worker failed: {0}")]
    MiningWorker(String),
}

impl ServiceError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Consensus(e) => e.kind(),
            Self::Mempool(_) => "mempool",
            Self::Chain(ChainError::Duplicate(_)) => "duplicate",
            Self::Chain(ChainError::DoesNotExtendHead { .. }) => "does_not_extend_head",
            Self::MiningWorker(_) => "mining_worker",
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State the service writes and everyone else reads.
///
/// Readers take one lock at a time and copy values out. The service takes
/// the ledger write lock before the chain write lock.
#[derive(Clone)]
pub struct SharedState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub chain: Arc<RwLock<Chain>>,
    pub mempool: Arc<Mempool>,
}

impl SharedState {
    pub fn new(genesis: Block, ledger: Ledger, mempool: Mempool) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            chain: Arc::new(RwLock::new(Chain::new(genesis))),
            mempool: Arc::new(mempool),
        }
    }

    pub fn height(&self) -> u64 {
        self.chain.read().height()
    }
}

// ---------------------------------------------------------------------------
// Events and handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOrigin {
    Local,
    Peer,
}

impl BlockOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Peer => "peer",
        }
    }
}

/// How a mining run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningOutcome {
    Sealed,
    Cancelled,
    Exhausted,
}

impl MiningOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sealed => "sealed",
            Self::Cancelled => "cancelled",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Published after every import decision and mining run.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    BlockImported {
        receipt: BlockReceipt,
        origin: BlockOrigin,
    },
    BlockRejected {
        number: u64,
        hash: Hash,
        origin: BlockOrigin,
        kind: &'static str,
        reason: String,
    },
    MiningFinished {
        number: u64,
        outcome: MiningOutcome,
    },
}

enum Inbound {
    Block(Box<Block>),
    Transaction {
        tx: Box<Transaction>,
        reply: oneshot::Sender<Result<Hash, MempoolError>>,
    },
}

/// Cloneable entry point for everything outside the service task.
#[derive(Clone)]
pub struct ServiceHandle {
    inbound: mpsc::Sender<Inbound>,
    events: broadcast::Sender<ServiceEvent>,
}

impl ServiceHandle {
    /// Queue a block received from a peer.
    pub async fn block_received(&self, block: Block) -> Result<(), ServiceError> {
        self.inbound
            .send(Inbound::Block(Box::new(block)))
            .await
            .map_err(|_| ServiceError::Stopped)
    }

    /// Queue a transaction and wait for the admission decision.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<Hash, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.inbound
            .send(Inbound::Transaction {
                tx: Box::new(tx),
                reply,
            })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        let hash = response.await.map_err(|_| ServiceError::Stopped)??;
        Ok(hash)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// ConsensusService
// ---------------------------------------------------------------------------

pub struct ConsensusService {
    engine: Arc<HybridEngine>,
    state: SharedState,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn SignatureVerifier>,
    transport: Arc<dyn Transport>,
    config: ServiceConfig,
    inbound: mpsc::Receiver<Inbound>,
    events: broadcast::Sender<ServiceEvent>,
}

impl ConsensusService {
    pub fn new(
        engine: HybridEngine,
        state: SharedState,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn SignatureVerifier>,
        transport: Arc<dyn Transport>,
        config: ServiceConfig,
    ) -> (Self, ServiceHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let handle = ServiceHandle {
            inbound: inbound_tx,
            events: events.clone(),
        };
        let service = Self {
            engine: Arc::new(engine),
            state,
            signer,
            verifier,
            transport,
            config,
            inbound: inbound_rx,
            events,
        };
        (service, handle)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn engine(&self) -> &HybridEngine {
        &self.engine
    }

    /// Runs until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServiceError> {
        info!(
            height = self.state.height(),
            block_time_ms = self.config.block_time.as_millis() as u64,
            coinbase = %self.config.coinbase,
            "consensus service starting"
        );

        let mut ticker = tokio::time::interval(self.config.block_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                info!(height = self.state.height(), "consensus service stopped");
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match self.produce(&mut shutdown).await {
                        Ok(_) => {}
                        Err(ServiceError::Consensus(ConsensusError::NoValidators)) => {
                            warn!(height = self.state.height(), "no eligible validators, retrying next tick");
                        }
                        Err(ServiceError::Consensus(ConsensusError::MissingProposerKey { validator })) => {
                            debug!(%validator, "not holding the proposer key, waiting for peers");
                        }
                        Err(e) => {
                            warn!(error = %e, kind = e.kind(), "block production failed");
                        }
                    }
                }
                Some(message) = self.inbound.recv() => {
                    self.handle_inbound(message);
                }
                _ = shutdown.changed() => {
                    info!(height = self.state.height(), "consensus service shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Produce and import one block on top of the current head.
    ///
    /// Returns `Ok(None)` when a peer block preempted a checkpoint being
    /// mined.
    pub async fn produce_block(&mut self) -> Result<Option<BlockReceipt>, ServiceError> {
        let (_keep, mut shutdown) = watch::channel(false);
        self.produce(&mut shutdown).await
    }

    async fn produce(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<BlockReceipt>, ServiceError> {
        let parent = self.state.chain.read().head().header.clone();
        let candidate = {
            let ledger = self.state.ledger.read();
            let transactions = self
                .state
                .mempool
                .select_transactions(&ledger, self.config.max_block_transactions);
            self.engine.create_block(
                &parent,
                transactions,
                self.config.coinbase,
                &ledger,
                self.signer.as_ref(),
            )?
        };

        match candidate {
            Candidate::Pos(block) => self.import_block(block, BlockOrigin::Local).map(Some),
            Candidate::Pow(block) => self.mine_and_import(block, shutdown).await,
        }
    }

    async fn mine_and_import(
        &mut self,
        block: Block,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<BlockReceipt>, ServiceError> {
        let number = block.number();
        let parent_hash = block.header.parent_hash;
        let cancel = Arc::new(AtomicBool::new(false));

        let engine = Arc::clone(&self.engine);
        let flag = Arc::clone(&cancel);
        let mut worker = tokio::task::spawn_blocking(move || engine.pow().mine_block(block, &flag));
        debug!(height = number, difficulty = self.engine.pow().difficulty(), "mining checkpoint");

        let mut preempting: Option<Block> = None;
        let mut stopping = false;
        let joined = loop {
            tokio::select! {
                joined = &mut worker => break joined,
                Some(message) = self.inbound.recv(), if preempting.is_none() && !stopping => {
                    match message {
                        Inbound::Block(peer)
                            if peer.number() == number && peer.header.parent_hash == parent_hash =>
                        {
                            debug!(height = number, "peer block arrived, cancelling miner");
                            cancel.store(true, Ordering::Relaxed);
                            preempting = Some(*peer);
                        }
                        other => self.handle_inbound(other),
                    }
                }
                _ = shutdown.changed(), if !stopping => {
                    cancel.store(true, Ordering::Relaxed);
                    stopping = true;
                }
            }
        };

        let mined = joined.map_err(|e| ServiceError::MiningWorker(e.to_string()))?;
        let outcome = match &mined {
            Ok(_) => MiningOutcome::Sealed,
            Err(ConsensusError::MiningCancelled) => MiningOutcome::Cancelled,
            Err(_) => MiningOutcome::Exhausted,
        };
        self.publish(ServiceEvent::MiningFinished { number, outcome });

        let result = match mined {
            Ok(block) => self.import_block(block, BlockOrigin::Local).map(Some),
            Err(ConsensusError::MiningCancelled) => Ok(None),
            Err(e) => Err(e.into()),
        };
        // If our checkpoint was sealed first the peer block no longer
        // extends the head and is rejected. Rejections are logged and
        // published by `import_block`.
        if let Some(peer) = preempting {
            let _ = self.import_block(peer, BlockOrigin::Peer);
        }
        result
    }

    fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Block(block) => {
                // Logged and published as `BlockRejected` on failure.
                let _ = self.import_block(*block, BlockOrigin::Peer);
            }
            Inbound::Transaction { tx, reply } => {
                let result = self.admit_transaction(*tx);
                // The submitter may have stopped waiting.
                let _ = reply.send(result);
            }
        }
    }

    fn admit_transaction(&self, tx: Transaction) -> Result<Hash, MempoolError> {
        let admitted = {
            let ledger = self.state.ledger.read();
            self.state.mempool.add(tx.clone(), &ledger, self.verifier.as_ref())
        };
        match &admitted {
            Ok(hash) => {
                debug!(tx = %hash.short(), sender = %tx.sender, nonce = tx.nonce, "transaction admitted");
                self.transport.broadcast_transaction(&tx);
            }
            Err(e) => debug!(sender = %tx.sender, error = %e, "transaction refused"),
        }
        admitted
    }

    /// Verify, apply and append `block`, then announce it.
    ///
    /// Nothing is written unless every step succeeds.
    pub fn import_block(
        &mut self,
        block: Block,
        origin: BlockOrigin,
    ) -> Result<BlockReceipt, ServiceError> {
        let number = block.number();
        let hash = block.hash();

        match self.try_import(&block) {
            Ok(receipt) => {
                self.state.mempool.remove_included(&block);
                {
                    let ledger = self.state.ledger.read();
                    self.state.mempool.prune_stale(&ledger);
                }
                if origin == BlockOrigin::Local {
                    self.transport.broadcast_block(&block);
                }
                info!(
                    height = number,
                    hash = %hash.short(),
                    mode = %receipt.mode,
                    origin = origin.as_str(),
                    txs = receipt.transactions,
                    "block imported"
                );
                self.publish(ServiceEvent::BlockImported {
                    receipt: receipt.clone(),
                    origin,
                });
                Ok(receipt)
            }
            Err(e) => {
                if matches!(e, ServiceError::Chain(ChainError::Duplicate(_))) {
                    debug!(height = number, hash = %hash.short(), "block already known");
                } else {
                    warn!(
                        height = number,
                        hash = %hash.short(),
                        origin = origin.as_str(),
                        kind = e.kind(),
                        error = %e,
                        "block rejected"
                    );
                }
                self.publish(ServiceEvent::BlockRejected {
                    number,
                    hash,
                    origin,
                    kind: e.kind(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn try_import(&self, block: &Block) -> Result<BlockReceipt, ServiceError> {
        let hash = block.hash();
        let parent = {
            let chain = self.state.chain.read();
            if chain.get_by_hash(&hash).is_some() {
                return Err(ChainError::Duplicate(hash).into());
            }
            chain.head().header.clone()
        };

        let mut ledger = self.state.ledger.write();
        self.engine
            .verify_block(block, &parent, &ledger, self.verifier.as_ref())?;
        // verify_block checked the link to the head, and this task is the
        // only writer, so the append below cannot fail after the commit.
        let mut chain = self.state.chain.write();
        let receipt = self.engine.apply_block(block, &mut ledger)?;
        chain.append(block.clone())?;
        Ok(receipt)
    }

    fn publish(&self, event: ServiceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
