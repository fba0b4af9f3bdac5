//! # Node Configuration
//!
//! A node is described by one TOML file:
//!
//! ```toml
//! network = "devnet"
//! log_level = "selsi_node=info,selsi_protocol=info"
//! log_format = "pretty"
//! api_port = 7690
//! metrics_port = 7691
//! coinbase = "0x…"
//!
//! [consensus]
//! pow_block_interval = 5
//! mining_difficulty = 1000000
//! minimum_stake = "1000000000000000000000"
//! # …
//!
//! [genesis]
//! time = 1735689600
//!
//! [[genesis.accounts]]
//! address = "0x…"
//! balance = "1000000000000000000000000"
//! stake = "5000000000000000000000"
//!
//! [[validators]]
//! address = "0x…"
//! secret_key = "…"
//! ```
//!
//! Amounts are decimal strings because TOML integers stop at `i64`.
//! `selsi-node init` writes a fresh devnet file with newly generated
//! validator keys.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use selsi_protocol::config::{
    ConsensusConfig, GenesisAccount, Network, DEFAULT_API_PORT, DEFAULT_METRICS_PORT,
};
use selsi_protocol::crypto::{Keyring, SelsiKeypair};
use selsi_protocol::primitives::{tokens, Address};
use selsi_protocol::storage::{Block, Ledger};

use crate::logging::LogFormat;

pub const DEFAULT_LOG_LEVEL: &str = "selsi_node=info,selsi_protocol=info,tower_http=info";

/// Devnet validator stakes, in whole tokens.
const DEVNET_STAKES: [u64; 3] = [5_000, 3_000, 7_000];

/// Devnet balance of each validator, in whole tokens.
const DEVNET_BALANCE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Unix seconds of the genesis header.
    pub time: u64,
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisConfig {
    pub fn block(&self) -> Block {
        Block::genesis(self.time)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::with_genesis(&self.accounts)
    }
}

/// A validator key this node signs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorKey {
    pub address: Address,
    /// Hex-encoded Ed25519 secret key.
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: Network,
    pub log_level: String,
    pub log_format: LogFormat,
    pub api_port: u16,
    pub metrics_port: u16,
    /// Receives the miner share of blocks this node produces.
    pub coinbase: Address,
    pub consensus: ConsensusConfig,
    pub genesis: GenesisConfig,
    #[serde(default)]
    pub validators: Vec<ValidatorKey>,
}

impl NodeConfig {
    /// A self-contained network with three freshly generated validators.
    pub fn generate(network: Network) -> Self {
        let keys: Vec<SelsiKeypair> = DEVNET_STAKES.iter().map(|_| SelsiKeypair::generate()).collect();

        let accounts = keys
            .iter()
            .zip(DEVNET_STAKES)
            .map(|(key, stake)| GenesisAccount {
                address: key.address(),
                balance: tokens(DEVNET_BALANCE),
                stake: tokens(stake),
            })
            .collect();

        let validators = keys
            .iter()
            .map(|key| ValidatorKey {
                address: key.address(),
                secret_key: hex::encode(key.secret_key_bytes()),
            })
            .collect();

        let genesis_time = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);

        Self {
            network,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
            api_port: DEFAULT_API_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            coinbase: keys[0].address(),
            consensus: network.consensus(),
            genesis: GenesisConfig {
                time: genesis_time,
                accounts,
            },
            validators,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).context("failed to serialize config")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(path, body)
            .with_context(|| format!("failed to write config file {}", path.display()))?;

        // Validator secrets live in this file.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.consensus
            .validate()
            .context("invalid [consensus] section")?;
        if self.genesis.accounts.is_empty() {
            bail!("[genesis] must fund at least one account");
        }
        self.keyring()?;
        Ok(())
    }

    /// Keys for every configured validator. Each secret must derive the
    /// address it is listed under.
    pub fn keyring(&self) -> Result<Keyring> {
        let mut ring = Keyring::new();
        for validator in &self.validators {
            let key = SelsiKeypair::from_hex(&validator.secret_key)
                .with_context(|| format!("invalid secret key for validator {}", validator.address))?;
            if key.address() != validator.address {
                bail!(
                    "secret key for {} derives address {}",
                    validator.address,
                    key.address()
                );
            }
            ring.insert(validator.address, key);
        }
        Ok(ring)
    }
}
