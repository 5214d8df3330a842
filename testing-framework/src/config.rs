// File: testing-framework/src/config.rs
//
// Configuration
//
// `InterchainConfig` holds every default that would otherwise be process-wide
// state (timeouts, cadences, budgets). It is passed explicitly to the
// `Interchain` and from there to every component, so two topologies in the
// same test binary never share settings.

use crate::error::Result;
use crate::poller::HeightBound;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Orchestration settings threaded through build, handshakes, polling and
/// relay loops.
///
/// # Example
///
/// ```rust
/// use interchain_testing_framework::config::InterchainConfig;
///
/// let yaml = r#"
/// handshake_block_budget: 30
/// height_poll_interval_ms: 100
/// "#;
/// let config = InterchainConfig::from_yaml_str(yaml).unwrap();
/// assert_eq!(config.handshake_block_budget, 30);
/// assert_eq!(config.relay_interval_ms, 500); // default kept
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterchainConfig {
    /// Label key attached to every network and process group
    pub label_key: String,
    /// Pause between two height queries while waiting for a block
    pub height_poll_interval_ms: u64,
    /// A chain whose height does not move for this long is reported stalled
    pub stall_timeout_ms: u64,
    /// Upper bound for a chain to start producing blocks
    pub chain_ready_timeout_ms: u64,
    /// Blocks each handshake step may take to become queryable
    pub handshake_block_budget: u64,
    /// How the handshake budget is counted across the two chains of a link
    pub handshake_height_bound: HeightBound,
    /// Pause between two relay attempts of a relay loop
    pub relay_interval_ms: u64,
    /// Genesis funding of each generated relayer wallet
    pub relayer_wallet_amount: u128,
    /// Blocks to wait on both chains after a link is established
    pub post_handshake_blocks: u64,
}

impl Default for InterchainConfig {
    fn default() -> Self {
        Self {
            label_key: "interchain-test".to_string(),
            height_poll_interval_ms: 250,
            stall_timeout_ms: 120_000,
            chain_ready_timeout_ms: 180_000,
            handshake_block_budget: 10,
            handshake_height_bound: HeightBound::Slowest,
            relay_interval_ms: 500,
            relayer_wallet_amount: 10_000_000_000,
            post_handshake_blocks: 1,
        }
    }
}

impl InterchainConfig {
    /// Parse from YAML; missing fields keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = serde_yaml::from_str(yaml).context("Failed to parse interchain config")?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `INTERCHAIN_*` environment overrides
    ///
    /// Recognized variables: `INTERCHAIN_HANDSHAKE_BLOCKS`,
    /// `INTERCHAIN_POLL_INTERVAL_MS`, `INTERCHAIN_STALL_TIMEOUT_MS`,
    /// `INTERCHAIN_CHAIN_READY_TIMEOUT_MS`, `INTERCHAIN_RELAY_INTERVAL_MS`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                Some(raw) => {
                    let value = raw
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be an unsigned integer, got '{}'", key, raw))?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        };

        if let Some(v) = read("INTERCHAIN_HANDSHAKE_BLOCKS")? {
            self.handshake_block_budget = v;
        }
        if let Some(v) = read("INTERCHAIN_POLL_INTERVAL_MS")? {
            self.height_poll_interval_ms = v;
        }
        if let Some(v) = read("INTERCHAIN_STALL_TIMEOUT_MS")? {
            self.stall_timeout_ms = v;
        }
        if let Some(v) = read("INTERCHAIN_CHAIN_READY_TIMEOUT_MS")? {
            self.chain_ready_timeout_ms = v;
        }
        if let Some(v) = read("INTERCHAIN_RELAY_INTERVAL_MS")? {
            self.relay_interval_ms = v;
        }
        Ok(self)
    }

    /// Height poll interval as a `Duration`
    pub fn height_poll_interval(&self) -> Duration {
        Duration::from_millis(self.height_poll_interval_ms)
    }

    /// Stall timeout as a `Duration`
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Chain readiness timeout as a `Duration`
    pub fn chain_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.chain_ready_timeout_ms)
    }

    /// Relay interval as a `Duration`
    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }
}

/// Protocol family of a chain. Selects adapter-specific defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Cosmos SDK chains
    Cosmos,
    /// Polkadot relay chain + parachain
    Polkadot,
    /// Penumbra
    Penumbra,
    /// Anything else, identified by its tag
    Other(String),
}

impl ChainFamily {
    /// Default light-client trusting period for chains of this family
    pub fn default_trusting_period(&self) -> Duration {
        match self {
            // 14 days, two thirds of the default 21 day unbonding period
            Self::Cosmos | Self::Penumbra => Duration::from_secs(14 * 24 * 3600),
            Self::Polkadot => Duration::from_secs(7 * 24 * 3600),
            Self::Other(_) => Duration::from_secs(24 * 3600),
        }
    }

    /// Default light-client trust level for chains of this family
    pub fn default_trust_level(&self) -> crate::ibc::TrustLevel {
        crate::ibc::TrustLevel::ONE_THIRD
    }
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosmos => f.write_str("cosmos"),
            Self::Polkadot => f.write_str("polkadot"),
            Self::Penumbra => f.write_str("penumbra"),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

/// Container image of a chain or relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerImage {
    /// Image repository
    pub repository: String,
    /// Image tag
    pub version: String,
    /// `uid:gid` to run as, if not the image default
    #[serde(default)]
    pub uid_gid: Option<String>,
}

/// Static description of a chain, consumed by chain adapters and relayers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Protocol family
    pub family: ChainFamily,
    /// Logical name, unique within a topology
    pub name: String,
    /// On-chain chain identifier
    pub chain_id: String,
    /// Images used to run the chain's nodes
    #[serde(default)]
    pub images: Vec<DockerImage>,
    /// Node binary name
    #[serde(default)]
    pub bin: String,
    /// Address prefix
    #[serde(default)]
    pub bech32_prefix: String,
    /// Native fee / staking denom
    pub denom: String,
    /// Gas price string, e.g. `0.01uatom`
    #[serde(default)]
    pub gas_prices: String,
    /// Gas adjustment multiplier
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    /// Light-client trusting period in seconds; family default when absent
    #[serde(default)]
    pub trusting_period_secs: Option<u64>,
    /// BIP-44 coin type
    #[serde(default = "default_coin_type")]
    pub coin_type: u32,
    /// Number of validator nodes
    #[serde(default = "default_validators")]
    pub num_validators: usize,
    /// Number of full nodes
    #[serde(default)]
    pub num_full_nodes: usize,
}

fn default_gas_adjustment() -> f64 {
    1.3
}

fn default_coin_type() -> u32 {
    118
}

fn default_validators() -> usize {
    1
}

impl ChainConfig {
    /// Minimal descriptor; the remaining fields take their defaults
    pub fn new(
        family: ChainFamily,
        name: impl Into<String>,
        chain_id: impl Into<String>,
        denom: impl Into<String>,
    ) -> Self {
        Self {
            family,
            name: name.into(),
            chain_id: chain_id.into(),
            images: Vec::new(),
            bin: String::new(),
            bech32_prefix: String::new(),
            denom: denom.into(),
            gas_prices: String::new(),
            gas_adjustment: default_gas_adjustment(),
            trusting_period_secs: None,
            coin_type: default_coin_type(),
            num_validators: default_validators(),
            num_full_nodes: 0,
        }
    }

    /// Set the address prefix
    pub fn with_bech32_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bech32_prefix = prefix.into();
        self
    }

    /// Set the node binary
    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    /// Add a container image
    pub fn with_image(mut self, image: DockerImage) -> Self {
        self.images.push(image);
        self
    }

    /// Set gas prices
    pub fn with_gas_prices(mut self, gas_prices: impl Into<String>) -> Self {
        self.gas_prices = gas_prices.into();
        self
    }

    /// Set the light-client trusting period
    pub fn with_trusting_period(mut self, period: Duration) -> Self {
        self.trusting_period_secs = Some(period.as_secs());
        self
    }

    /// Set the node counts
    pub fn with_nodes(mut self, validators: usize, full_nodes: usize) -> Self {
        self.num_validators = validators;
        self.num_full_nodes = full_nodes;
        self
    }

    /// Trusting period: explicit value or the family default
    pub fn trusting_period(&self) -> Duration {
        self.trusting_period_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.family.default_trusting_period())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = InterchainConfig::default();
        assert_eq!(config.label_key, "interchain-test");
        assert_eq!(config.handshake_block_budget, 10);
        assert_eq!(config.handshake_height_bound, HeightBound::Slowest);
        assert_eq!(config.relay_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = InterchainConfig::from_yaml_str(
            "stall_timeout_ms: 5000\nhandshake_height_bound: fastest\n",
        )
        .unwrap();
        assert_eq!(config.stall_timeout(), Duration::from_secs(5));
        assert_eq!(config.handshake_height_bound, HeightBound::Fastest);
        assert_eq!(config.height_poll_interval_ms, 250);
    }

    #[test]
    fn test_yaml_rejects_garbage() {
        assert!(InterchainConfig::from_yaml_str("handshake_block_budget: many").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INTERCHAIN_HANDSHAKE_BLOCKS", "42"),
            ("INTERCHAIN_RELAY_INTERVAL_MS", " 75 "),
        ]
        .into_iter()
        .collect();

        let config = InterchainConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.handshake_block_budget, 42);
        assert_eq!(config.relay_interval_ms, 75);
        assert_eq!(config.stall_timeout_ms, 120_000);
    }

    #[test]
    fn test_env_override_must_be_numeric() {
        let result = InterchainConfig::default().with_overrides(|key| {
            (key == "INTERCHAIN_POLL_INTERVAL_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_chain_config_trusting_period_falls_back_to_family() {
        let gaia = ChainConfig::new(ChainFamily::Cosmos, "gaia", "cosmoshub-1004", "uatom");
        assert_eq!(gaia.trusting_period(), Duration::from_secs(14 * 24 * 3600));

        let custom = gaia.with_trusting_period(Duration::from_secs(504 * 3600));
        assert_eq!(custom.trusting_period(), Duration::from_secs(504 * 3600));
    }

    #[test]
    fn test_chain_config_yaml() {
        let yaml = r#"
family: cosmos
name: osmosis
chain_id: osmosis-1001
denom: uosmo
bech32_prefix: osmo
images:
  - repository: ghcr.io/strangelove-ventures/heighliner/osmosis
    version: v7.0.4
"#;
        let config: ChainConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.family, ChainFamily::Cosmos);
        assert_eq!(config.coin_type, 118);
        assert_eq!(config.num_validators, 1);
        assert_eq!(config.images[0].version, "v7.0.4");
    }
}
