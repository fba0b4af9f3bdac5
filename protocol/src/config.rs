//! # Protocol Configuration & Constants
//!
//! Consensus parameters, network presets and the default genesis
//! allocation. Anything consensus-critical that is not derived from chain
//! state is defined here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::primitives::{amount_str, tokens, Address, Amount};

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Chain ID of the default (devnet) network.
pub const CHAIN_ID_DEVNET: u64 = 769;

/// Chain ID of the public testnet.
pub const CHAIN_ID_TESTNET: u64 = 1337;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Consensus Defaults
// ---------------------------------------------------------------------------

/// Every Nth block is a PoW checkpoint.
pub const DEFAULT_POW_BLOCK_INTERVAL: u64 = 5;

/// Testnet checkpoints more often.
pub const TESTNET_POW_BLOCK_INTERVAL: u64 = 3;

/// Expected number of hash trials per checkpoint block.
pub const DEFAULT_MINING_DIFFICULTY: u64 = 1_000_000;

/// Stake below this does not make a validator eligible.
pub const DEFAULT_MINIMUM_STAKE: Amount = tokens(1_000);

pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(12);

pub const TESTNET_BLOCK_TIME: Duration = Duration::from_secs(10);

/// Total reward minted per block before the split.
pub const DEFAULT_BLOCK_REWARD: Amount = tokens(10);

/// Give up on a checkpoint after this many hash trials (64x the expected
/// count at the default difficulty).
pub const DEFAULT_MAX_MINING_ATTEMPTS: u64 = 64 * DEFAULT_MINING_DIFFICULTY;

/// The miner checks its cancel flag once per this many trials.
pub const MINING_CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Blocks stamped further than this past the local clock are refused.
pub const MAX_FUTURE_BLOCK_SECS: u64 = 120;

/// Receives the ecosystem share and every rounding remainder.
pub const DEFAULT_ECOSYSTEM_ADDRESS: Address = Address::tagged(0xEC);

// ---------------------------------------------------------------------------
// Mempool Limits
// ---------------------------------------------------------------------------

/// Pending transactions held before new ones are refused.
pub const MAX_MEMPOOL_SIZE: usize = 10_000;

/// Transactions drained into a single block.
pub const MAX_BLOCK_TRANSACTIONS: usize = 500;

/// A sender may queue at most this many nonces ahead of its ledger nonce.
pub const MAX_NONCE_GAP: u64 = 64;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_API_PORT: u16 = 7690;

pub const DEFAULT_METRICS_PORT: u16 = 7691;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pow_block_interval must be at least 1")]
    ZeroBlockInterval,

    #[error("mining_difficulty must be at least 1")]
    ZeroDifficulty,

    #[error("max_mining_attempts must be at least 1")]
    ZeroMiningAttempts,

    #[error("block_time must be non-zero")]
    ZeroBlockTime,

    #[error("reward percentages must sum to 100, got {total}")]
    RewardPercentages { total: u32 },

    #[error("unknown network {0:?} (expected devnet or testnet)")]
    UnknownNetwork(String),
}

// ---------------------------------------------------------------------------
// RewardConfig
// ---------------------------------------------------------------------------

/// Percentages of the block reward. Must sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardConfig {
    pub miner_percent: u8,
    pub staker_percent: u8,
    pub ecosystem_percent: u8,
    pub burn_percent: u8,
}

impl RewardConfig {
    pub fn total(&self) -> u32 {
        self.miner_percent as u32
            + self.staker_percent as u32
            + self.ecosystem_percent as u32
            + self.burn_percent as u32
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            miner_percent: 45,
            staker_percent: 45,
            ecosystem_percent: 7,
            burn_percent: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// ConsensusConfig
// ---------------------------------------------------------------------------

/// Parameters every node on a network must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub pow_block_interval: u64,
    pub mining_difficulty: u64,
    #[serde(with = "amount_str")]
    pub minimum_stake: Amount,
    #[serde(with = "duration_secs")]
    pub block_time: Duration,
    pub reward_distribution: RewardConfig,
    #[serde(with = "amount_str")]
    pub block_reward: Amount,
    pub max_mining_attempts: u64,
    pub ecosystem_address: Address,
}

impl ConsensusConfig {
    /// Default network: checkpoint every 5th block, 12 s target.
    pub fn devnet() -> Self {
        Self {
            pow_block_interval: DEFAULT_POW_BLOCK_INTERVAL,
            mining_difficulty: DEFAULT_MINING_DIFFICULTY,
            minimum_stake: DEFAULT_MINIMUM_STAKE,
            block_time: DEFAULT_BLOCK_TIME,
            reward_distribution: RewardConfig::default(),
            block_reward: DEFAULT_BLOCK_REWARD,
            max_mining_attempts: DEFAULT_MAX_MINING_ATTEMPTS,
            ecosystem_address: DEFAULT_ECOSYSTEM_ADDRESS,
        }
    }

    /// Testnet: checkpoint every 3rd block, 10 s target.
    pub fn testnet() -> Self {
        Self {
            pow_block_interval: TESTNET_POW_BLOCK_INTERVAL,
            block_time: TESTNET_BLOCK_TIME,
            ..Self::devnet()
        }
    }

    /// Reject parameter sets the engines cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pow_block_interval == 0 {
            return Err(ConfigError::ZeroBlockInterval);
        }
        if self.mining_difficulty == 0 {
            return Err(ConfigError::ZeroDifficulty);
        }
        if self.max_mining_attempts == 0 {
            return Err(ConfigError::ZeroMiningAttempts);
        }
        if self.block_time.is_zero() {
            return Err(ConfigError::ZeroBlockTime);
        }
        let total = self.reward_distribution.total();
        if total != 100 {
            return Err(ConfigError::RewardPercentages { total });
        }
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::devnet()
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Devnet,
    Testnet,
}

impl Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Self::Devnet => CHAIN_ID_DEVNET,
            Self::Testnet => CHAIN_ID_TESTNET,
        }
    }

    /// Consensus preset for this network.
    pub fn consensus(self) -> ConsensusConfig {
        match self {
            Self::Devnet => ConsensusConfig::devnet(),
            Self::Testnet => ConsensusConfig::testnet(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Devnet => write!(f, "devnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// One pre-funded account at height 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    #[serde(with = "amount_str")]
    pub balance: Amount,
    #[serde(with = "amount_str", default)]
    pub stake: Amount,
}

/// Three founding validators, each with a million tokens and stakes of
/// 5000, 3000 and 7000.
pub fn default_genesis() -> Vec<GenesisAccount> {
    [(1u8, 5_000u64), (2, 3_000), (3, 7_000)]
        .into_iter()
        .map(|(tag, stake)| GenesisAccount {
            address: Address::tagged(tag),
            balance: tokens(1_000_000),
            stake: tokens(stake),
        })
        .collect()
}

/// Serde for a [`Duration`] as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        assert!(ConsensusConfig::devnet().validate().is_ok());
        assert!(ConsensusConfig::testnet().validate().is_ok());
    }

    #[test]
    fn testnet_differs_only_in_cadence() {
        let dev = ConsensusConfig::devnet();
        let test = ConsensusConfig::testnet();
        assert_eq!(test.pow_block_interval, 3);
        assert_eq!(test.block_time, Duration::from_secs(10));
        assert_eq!(dev.pow_block_interval, 5);
        assert_eq!(dev.block_time, Duration::from_secs(12));
        assert_eq!(test.mining_difficulty, dev.mining_difficulty);
        assert_eq!(test.reward_distribution, dev.reward_distribution);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut cfg = ConsensusConfig::devnet();
        cfg.pow_block_interval = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBlockInterval));

        let mut cfg = ConsensusConfig::devnet();
        cfg.mining_difficulty = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroDifficulty));

        let mut cfg = ConsensusConfig::devnet();
        cfg.max_mining_attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMiningAttempts));

        let mut cfg = ConsensusConfig::devnet();
        cfg.reward_distribution.burn_percent = 4;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::RewardPercentages { total: 101 })
        );
    }

    #[test]
    fn default_rewards_sum_to_100() {
        assert_eq!(RewardConfig::default().total(), 100);
    }

    #[test]
    fn network_parsing() {
        assert_eq!("Testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!(Network::Devnet.to_string(), "devnet");
        assert!("mainnet".parse::<Network>().is_err());
        assert_ne!(Network::Devnet.chain_id(), Network::Testnet.chain_id());
        assert_eq!(Network::Testnet.consensus(), ConsensusConfig::testnet());
    }

    #[test]
    fn default_genesis_matches_founding_allocation() {
        let genesis = default_genesis();
        assert_eq!(genesis.len(), 3);
        assert_eq!(genesis[0].address, Address::tagged(1));
        assert_eq!(genesis[2].stake, tokens(7_000));
        assert!(genesis.iter().all(|g| g.balance == tokens(1_000_000)));
    }

    #[test]
    fn consensus_config_json_roundtrip() {
        let cfg = ConsensusConfig::testnet();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"block_time\":10"));
        let back: ConsensusConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
