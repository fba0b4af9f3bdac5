//! # HTTP API
//!
//! Read-only view of the node over axum. Handlers copy what they need out
//! of [`SharedState`] under a short read lock; nothing here writes to the
//! ledger or the chain.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/status`              | Height, head, mode of the next block |
//! | GET    | `/blocks/latest`       | Canonical head                       |
//! | GET    | `/blocks/:number`      | Block by height                      |
//! | GET    | `/accounts/:address`   | Balance, stake and nonce             |
//! | GET    | `/validators`          | Eligible validator set               |
//! | GET    | `/metrics`             | Prometheus exposition                |

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use selsi_protocol::config::{ConsensusConfig, Network};
use selsi_protocol::consensus::{quorum_threshold, ValidatorSet};
use selsi_protocol::network::SharedState;
use selsi_protocol::primitives::Address;
use selsi_protocol::storage::{Block, LedgerView};

use crate::metrics::{self, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: Network,
    pub consensus: Arc<ConsensusConfig>,
    pub state: SharedState,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/blocks/latest", get(latest_block_handler))
        .route("/blocks/:number", get(block_by_number_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/validators", get(validators_handler))
        .route("/metrics", get(api_metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub network: Network,
    pub chain_id: u64,
    pub version: String,
    pub height: u64,
    pub head_hash: String,
    /// `pow` or `pos`, for the block after the head.
    pub next_mode: String,
    pub pow_block_interval: u64,
    pub mempool_size: usize,
    pub total_supply: String,
    pub burned: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub validator: String,
    pub approve: bool,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub mode: String,
    pub time: u64,
    pub coinbase: String,
    /// Zero address on checkpoint blocks.
    pub validator: String,
    pub difficulty: u64,
    pub nonce: u64,
    pub tx_root: String,
    pub transactions: Vec<String>,
    pub votes: Vec<VoteResponse>,
}

impl From<&Block> for BlockResponse {
    fn from(block: &Block) -> Self {
        let header = &block.header;
        let mode = if block.is_checkpoint() { "pow" } else { "pos" };
        Self {
            number: header.number,
            hash: block.hash().to_hex(),
            parent_hash: header.parent_hash.to_hex(),
            mode: mode.to_string(),
            time: header.time,
            coinbase: header.coinbase.to_hex(),
            validator: header.validator.to_hex(),
            difficulty: header.difficulty,
            nonce: header.nonce.to_u64(),
            tx_root: header.tx_root.to_hex(),
            transactions: block.transactions.iter().map(|tx| tx.hash().to_hex()).collect(),
            votes: block
                .votes
                .iter()
                .map(|v| VoteResponse {
                    validator: v.validator.to_hex(),
                    approve: v.approve,
                    timestamp: v.timestamp,
                })
                .collect(),
        }
    }
}

/// Amounts are decimal strings in base units.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: String,
    pub balance: String,
    pub stake: String,
    pub nonce: u64,
    /// Transactions from this sender waiting in the mempool.
    pub pending: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub address: String,
    pub stake: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidatorResponse {
    pub minimum_stake: String,
    pub total_stake: String,
    pub quorum: String,
    /// Proposer of the next PoS block, if any validator is eligible.
    pub next_proposer: Option<String>,
    pub validators: Vec<ValidatorEntry>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
    })
}

async fn status_handler(State(app): State<AppState>) -> Json<StatusResponse> {
    let (height, head_hash) = {
        let chain = app.state.chain.read();
        (chain.height(), chain.head().hash())
    };
    let (total_supply, burned) = {
        let ledger = app.state.ledger.read();
        (ledger.total_supply(), ledger.burned())
    };
    let interval = app.consensus.pow_block_interval;
    let next_mode = if (height + 1) % interval == 0 { "pow" } else { "pos" };

    Json(StatusResponse {
        network: app.network,
        chain_id: app.network.chain_id(),
        version: app.version.clone(),
        height,
        head_hash: head_hash.to_hex(),
        next_mode: next_mode.to_string(),
        pow_block_interval: interval,
        mempool_size: app.state.mempool.len(),
        total_supply: total_supply.to_string(),
        burned: burned.to_string(),
    })
}

async fn latest_block_handler(State(app): State<AppState>) -> Json<BlockResponse> {
    let chain = app.state.chain.read();
    Json(BlockResponse::from(chain.head()))
}

async fn block_by_number_handler(
    State(app): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<BlockResponse>, ApiError> {
    let number: u64 = number
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid block number {number:?}")))?;
    let chain = app.state.chain.read();
    chain
        .get_by_number(number)
        .map(|block| Json(BlockResponse::from(block)))
        .ok_or_else(|| ApiError::NotFound(format!("block {number} not found")))
}

async fn account_handler(
    State(app): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address: {e}")))?;

    let (account, stake) = {
        let ledger = app.state.ledger.read();
        (ledger.account(&address), ledger.get_stake(&address))
    };

    Ok(Json(AccountResponse {
        address: address.to_hex(),
        balance: account.balance.to_string(),
        stake: stake.to_string(),
        nonce: account.nonce,
        pending: app.state.mempool.pending_for(&address),
    }))
}

async fn validators_handler(State(app): State<AppState>) -> Json<ValidatorResponse> {
    let set = {
        let ledger = app.state.ledger.read();
        ValidatorSet::from_ledger(&ledger, app.consensus.minimum_stake)
    };
    let next_height = app.state.height() + 1;
    let total = set.total_stake();

    Json(ValidatorResponse {
        minimum_stake: app.consensus.minimum_stake.to_string(),
        total_stake: total.to_string(),
        quorum: quorum_threshold(total).to_string(),
        next_proposer: set.proposer_for_height(next_height).map(|v| v.address.to_hex()),
        validators: set
            .validators()
            .iter()
            .map(|v| ValidatorEntry {
                address: v.address.to_hex(),
                stake: v.stake.to_string(),
            })
            .collect(),
    })
}

async fn api_metrics_handler(State(app): State<AppState>) -> Response {
    app.metrics.mempool_size.set(app.state.mempool.len() as i64);
    metrics::render(&app.metrics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
