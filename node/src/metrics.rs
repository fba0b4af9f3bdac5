//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on both the API
//! port and the dedicated metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`]
//! prefixed `selsi_` so they do not collide with the default global
//! registry. They are fed from the consensus service's event stream.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use selsi_protocol::network::ServiceEvent;

/// Handles to every metric the node exports. Cheap to clone.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks imported, by consensus mode and origin.
    pub blocks_imported_total: IntCounterVec,
    /// Blocks rejected, by error kind.
    pub blocks_rejected_total: IntCounterVec,
    /// Checkpoint mining runs, by outcome.
    pub mining_runs_total: IntCounterVec,
    pub transactions_included_total: IntCounter,
    /// Height of the canonical head.
    pub block_height: IntGauge,
    pub mempool_size: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("selsi".into()), None)?;

        let blocks_imported_total = IntCounterVec::new(
            Opts::new("blocks_imported_total", "Blocks appended to the canonical chain"),
            &["mode", "origin"],
        )?;
        registry.register(Box::new(blocks_imported_total.clone()))?;

        let blocks_rejected_total = IntCounterVec::new(
            Opts::new("blocks_rejected_total", "Blocks that failed verification or application"),
            &["kind"],
        )?;
        registry.register(Box::new(blocks_rejected_total.clone()))?;

        let mining_runs_total = IntCounterVec::new(
            Opts::new("mining_runs_total", "Checkpoint mining runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(mining_runs_total.clone()))?;

        let transactions_included_total = IntCounter::new(
            "transactions_included_total",
            "Transactions included in imported blocks",
        )?;
        registry.register(Box::new(transactions_included_total.clone()))?;

        let block_height = IntGauge::new("block_height", "Height of the canonical head")?;
        registry.register(Box::new(block_height.clone()))?;

        let mempool_size = IntGauge::new("mempool_size", "Pending transactions in the mempool")?;
        registry.register(Box::new(mempool_size.clone()))?;

        Ok(Self {
            registry,
            blocks_imported_total,
            blocks_rejected_total,
            mining_runs_total,
            transactions_included_total,
            block_height,
            mempool_size,
        })
    }

    /// Fold one service event into the counters.
    pub fn observe(&self, event: &ServiceEvent) {
        match event {
            ServiceEvent::BlockImported { receipt, origin } => {
                self.blocks_imported_total
                    .with_label_values(&[receipt.mode.as_str(), origin.as_str()])
                    .inc();
                self.transactions_included_total
                    .inc_by(receipt.transactions as u64);
                self.block_height.set(receipt.number as i64);
            }
            ServiceEvent::BlockRejected { kind, .. } => {
                self.blocks_rejected_total.with_label_values(&[*kind]).inc();
            }
            ServiceEvent::MiningFinished { outcome, .. } => {
                self.mining_runs_total
                    .with_label_values(&[outcome.as_str()])
                    .inc();
            }
        }
    }

    /// Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> Response {
    render(&metrics)
}

pub fn render(metrics: &NodeMetrics) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selsi_protocol::consensus::{BlockReceipt, ConsensusMode, RewardCredit, RewardDistribution};
    use selsi_protocol::network::{BlockOrigin, MiningOutcome};
    use selsi_protocol::primitives::{Address, Hash};

    fn receipt(number: u64, mode: ConsensusMode) -> BlockReceipt {
        let credit = RewardCredit {
            address: Address::zero(),
            amount: 0,
        };
        BlockReceipt {
            number,
            hash: Hash::zero(),
            mode,
            transactions: 2,
            rewards: RewardDistribution {
                miner: credit,
                stakers: vec![],
                ecosystem: credit,
                burned: 0,
            },
        }
    }

    #[test]
    fn events_update_counters() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.observe(&ServiceEvent::BlockImported {
            receipt: receipt(1, ConsensusMode::Pos),
            origin: BlockOrigin::Local,
        });
        metrics.observe(&ServiceEvent::BlockImported {
            receipt: receipt(2, ConsensusMode::Pow),
            origin: BlockOrigin::Peer,
        });
        metrics.observe(&ServiceEvent::BlockRejected {
            number: 3,
            hash: Hash::zero(),
            origin: BlockOrigin::Peer,
            kind: "invalid_seal",
            reason: String::new(),
        });
        metrics.observe(&ServiceEvent::MiningFinished {
            number: 5,
            outcome: MiningOutcome::Cancelled,
        });

        assert_eq!(metrics.block_height.get(), 2);
        assert_eq!(metrics.transactions_included_total.get(), 4);
        assert_eq!(
            metrics
                .blocks_imported_total
                .with_label_values(&["pow", "peer"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .blocks_rejected_total
                .with_label_values(&["invalid_seal"])
                .get(),
            1
        );

        let text = metrics.encode().unwrap();
        assert!(text.contains("selsi_block_height 2"));
        assert!(text.contains("selsi_mining_runs_total{outcome=\"cancelled\"} 1"));
    }
}
