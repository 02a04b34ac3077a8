use anyhow::bail;
use log::warn;
use serde::Deserialize;

use crate::blockchain::block::MAX_DIFFICULTY;

use std::env;
use std::fs;
use std::str::FromStr;

const CONFIG_PATH_KEY: &str = "LEDGER_CONFIG";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";
const MINING_REWARD_KEY: &str = "LEDGER_MINING_REWARD";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const HOST_KEY: &str = "HOST";
const PORT_KEY: &str = "PORT";

/// Runtime settings for the ledger node
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex characters required for a mined block
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,

    /// Amount credited to the miner of each block
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,

    /// sled data directory; empty keeps the ledger in memory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_difficulty() -> u32 {
    4
}

fn default_mining_reward() -> f64 {
    100.0
}

fn default_data_dir() -> String {
    "./data/blockchain".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            data_dir: default_data_dir(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl LedgerConfig {
    /// Parses a TOML document; missing fields take their defaults
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Loads the file named by `LEDGER_CONFIG` (if any), then applies env overrides
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match env::var(CONFIG_PATH_KEY) {
            Ok(path) => {
                let contents = fs::read_to_string(&path)?;
                Self::from_toml(&contents)?
            }
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the ledger cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            bail!(
                "difficulty {} exceeds the maximum of {}",
                self.difficulty,
                MAX_DIFFICULTY
            );
        }
        if !(self.mining_reward.is_finite() && self.mining_reward > 0.0) {
            bail!("mining_reward must be positive, got {}", self.mining_reward);
        }
        Ok(())
    }

    /// Applies overrides from `lookup`; unparsable values are logged and ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(difficulty) = parse_override::<u32, _>(&lookup, DIFFICULTY_KEY) {
            if difficulty <= MAX_DIFFICULTY {
                self.difficulty = difficulty;
            } else {
                warn!("Ignoring {}={} above {}", DIFFICULTY_KEY, difficulty, MAX_DIFFICULTY);
            }
        }
        if let Some(reward) = parse_override::<f64, _>(&lookup, MINING_REWARD_KEY) {
            if reward.is_finite() && reward > 0.0 {
                self.mining_reward = reward;
            } else {
                warn!("Ignoring non-positive {}={}", MINING_REWARD_KEY, reward);
            }
        }
        if let Some(data_dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = data_dir;
        }
        if let Some(host) = lookup(HOST_KEY) {
            self.host = host;
        }
        if let Some(port) = parse_override(&lookup, PORT_KEY) {
            self.port = port;
        }
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}
