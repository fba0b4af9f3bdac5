//! # Network Module
//!
//! Everything between the consensus engines and the outside world.
//!
//! ```text
//! mempool.rs   — Pending transactions, ordered per sender by nonce
//! transport.rs — Transport seam and the in-process loopback transport
//! service.rs   — The single serialized consensus task and its handle
//! ```
//!
//! ## Design Decisions
//!
//! - One task owns block production and import. Peers, the API and the
//!   mempool only ever read the ledger; writes happen on the service task
//!   under the write lock.
//! - Shared state sits behind `parking_lot` locks. No critical section
//!   awaits.
//! - No wire format lives here. A peer layer implements [`Transport`] and
//!   feeds received blocks into [`ServiceHandle::block_received`].

pub mod mempool;
pub mod service;
pub mod transport;

pub use mempool::{Mempool, MempoolConfig, MempoolError};
pub use service::{
    BlockOrigin, ConsensusService, MiningOutcome, ServiceConfig, ServiceError, ServiceEvent,
    ServiceHandle, SharedState,
};
pub use transport::{LoopbackTransport, NetworkEvent, Transport};
