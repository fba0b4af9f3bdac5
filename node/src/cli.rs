//! # CLI Interface
//!
//! Command-line arguments for `selsi-node`, via `clap` derive. Three
//! subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use selsi_protocol::config::Network;

use crate::logging::LogFormat;

/// SelsiChain hybrid PoW/PoS node.
///
/// Produces and verifies blocks, mines checkpoints, serves a read-only
/// HTTP API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "selsi-node",
    about = "SelsiChain hybrid PoW/PoS node",
    version,
    propagate_version = true
)]
pub struct SelsiNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Write a fresh config with newly generated validator keys.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Flags override the config file.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "SELSI_CONFIG", default_value = "selsi.toml")]
    pub config: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "SELSI_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SELSI_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "SELSI_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "SELSI_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration file.
    #[arg(long, short = 'c', env = "SELSI_CONFIG", default_value = "selsi.toml")]
    pub config: PathBuf,

    /// Network preset: devnet or testnet.
    #[arg(long, default_value = "devnet")]
    pub network: Network,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
