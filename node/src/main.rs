// Copyright (c) 2026 SelsiChain Contributors. MIT License.
// See LICENSE for details.

//! # SelsiChain Node
//!
//! Entry point for the `selsi-node` binary. Loads the TOML config, starts
//! the consensus service, and serves the read-only HTTP API and the
//! Prometheus endpoint.
//!
//! - `run`     start the node
//! - `init`    write a fresh config with generated validator keys
//! - `version` print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, watch};

use selsi_protocol::config::PROTOCOL_VERSION;
use selsi_protocol::consensus::HybridEngine;
use selsi_protocol::network::{
    ConsensusService, LoopbackTransport, Mempool, ServiceConfig, SharedState,
};

use cli::{Commands, SelsiNodeCli};
use config::NodeConfig;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SelsiNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the consensus service, the API server and the metrics endpoint,
/// and runs until SIGINT/SIGTERM.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let mut config = NodeConfig::load(&args.config)?;
    if let Some(port) = args.api_port {
        config.api_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }

    logging::init_logging(&config.log_level, config.log_format)?;

    tracing::info!(
        network = %config.network,
        chain_id = config.network.chain_id(),
        api_port = config.api_port,
        metrics_port = config.metrics_port,
        coinbase = %config.coinbase,
        validators = config.validators.len(),
        "starting selsi-node"
    );

    // --- Consensus ---
    let engine = HybridEngine::new(config.consensus.clone()).context("invalid consensus config")?;
    let state = SharedState::new(
        config.genesis.block(),
        config.genesis.ledger(),
        Mempool::default(),
    );
    let keyring = Arc::new(config.keyring()?);
    let transport = Arc::new(LoopbackTransport::default());
    let service_config = ServiceConfig::from_consensus(&config.consensus, config.coinbase);

    let (service, handle) = ConsensusService::new(
        engine,
        state.clone(),
        keyring.clone(),
        keyring,
        transport,
        service_config,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let mut events = handle.subscribe();
    let metrics_ref = Arc::clone(&node_metrics);
    let mempool_ref = Arc::clone(&state.mempool);
    let metrics_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    metrics_ref.observe(&event);
                    metrics_ref.mempool_size.set(mempool_ref.len() as i64);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "metrics fell behind service events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: config.network,
        consensus: Arc::new(config.consensus.clone()),
        state,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Consensus loop ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut service_task = tokio::spawn(service.run(shutdown_rx));

    // --- Serve ---
    let mut service_done = false;
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        res = &mut service_task => {
            service_done = true;
            report_service_exit(res);
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if !service_done {
        let _ = shutdown_tx.send(true);
        report_service_exit(service_task.await);
    }
    drop(handle);
    metrics_task.abort();

    tracing::info!("selsi-node stopped");
    Ok(())
}

fn report_service_exit(
    res: Result<Result<(), selsi_protocol::network::ServiceError>, tokio::task::JoinError>,
) {
    match res {
        Ok(Ok(())) => tracing::info!("consensus service stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "consensus service failed"),
        Err(e) => tracing::error!(error = %e, "consensus service panicked"),
    }
}

/// Writes a fresh config with newly generated validator keys.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(config::DEFAULT_LOG_LEVEL, logging::LogFormat::Pretty)?;

    if args.config.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.config.display()
        );
    }

    let node_config = NodeConfig::generate(args.network);
    node_config.save(&args.config)?;

    tracing::info!(
        path = %args.config.display(),
        network = %args.network,
        "node config written"
    );

    println!("Node initialized successfully.");
    println!("  Config     : {}", args.config.display());
    println!("  Network    : {}", args.network);
    println!("  Chain ID   : {}", args.network.chain_id());
    println!("  Coinbase   : {}", node_config.coinbase);
    for validator in &node_config.validators {
        println!("  Validator  : {}", validator.address);
    }

    Ok(())
}

fn print_version() {
    println!("selsi-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
