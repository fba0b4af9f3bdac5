//! # Peer Transport Seam
//!
//! The consensus service hands finished blocks and admitted transactions
//! to a [`Transport`]. There is no wire format here: a real peer layer
//! implements the trait and feeds received blocks back through
//! `ServiceHandle::block_received`.
//!
//! [`LoopbackTransport`] fans messages out over an in-process
//! `tokio::sync::broadcast` channel. Devnet nodes and tests subscribe to
//! it to watch what the node would have sent.

use tokio::sync::broadcast;
use tracing::trace;

use crate::storage::block::Block;
use crate::transaction::Transaction;

/// Default buffer of the loopback channel. Slow subscribers lag and skip.
pub const LOOPBACK_CAPACITY: usize = 1_024;

pub trait Transport: Send + Sync {
    fn broadcast_block(&self, block: &Block);
    fn broadcast_transaction(&self, tx: &Transaction);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Block(Box<Block>),
    Transaction(Box<Transaction>),
}

#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    sender: broadcast::Sender<NetworkEvent>,
}

impl LoopbackTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, event: NetworkEvent) {
        // Sending only fails when nobody listens.
        if self.sender.send(event).is_err() {
            trace!("loopback transport has no subscribers");
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(LOOPBACK_CAPACITY)
    }
}

impl Transport for LoopbackTransport {
    fn broadcast_block(&self, block: &Block) {
        trace!(height = block.number(), hash = %block.hash().short(), "broadcasting block");
        self.publish(NetworkEvent::Block(Box::new(block.clone())));
    }

    fn broadcast_transaction(&self, tx: &Transaction) {
        trace!(tx = %tx.hash().short(), "broadcasting transaction");
        self.publish(NetworkEvent::Transaction(Box::new(tx.clone())));
    }
}
