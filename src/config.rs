use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::swap::overpayment::OverpaymentConfig;

/// Bitcoin Core refuses to relay a transaction with more than 25 unconfirmed
/// ancestors, so a deeper chain cannot be waiting in its mempool anyway.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store_path: PathBuf,

    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u32,

    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,

    #[serde(default)]
    pub overpayment: OverpaymentConfig,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub symbol: String,
    pub network: String,
    pub max_zero_conf_risk: u64,
}

impl ChainConfig {
    pub fn network(&self) -> Result<Network> {
        Network::from_str(&self.network)
            .with_context(|| format!("invalid network {} for {}", self.network, self.symbol))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for chain in &self.chains {
            chain.network()?;
            anyhow::ensure!(
                seen.insert(chain.symbol.as_str(), ()).is_none(),
                "chain {} configured twice",
                chain.symbol
            );
        }
        anyhow::ensure!(
            self.max_ancestor_depth > 0,
            "max_ancestor_depth must be > 0"
        );
        Ok(())
    }

    /// Maximum zero-conf exposure per chain symbol.
    pub fn max_risks(&self) -> HashMap<String, u64> {
        self.chains
            .iter()
            .map(|chain| (chain.symbol.clone(), chain.max_zero_conf_risk))
            .collect()
    }
}

fn default_required_confirmations() -> u32 {
    1
}

fn default_max_ancestor_depth() -> usize {
    DEFAULT_MAX_ANCESTOR_DEPTH
}
