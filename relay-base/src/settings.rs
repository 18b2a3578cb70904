use std::collections::HashMap;
use std::path::Path;

use ethers_core::types::{H160, U256};
use serde::Deserialize;
use thiserror::Error;

use relay_core::ChainId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("chain {0} is missing a required setting: {1}")]
    MissingSetting(u32, &'static str),
}

fn default_new_orders_delay_ms() -> u64 {
    0
}
fn default_retry_interval_ms() -> u64 {
    2_000
}
fn default_processing_interval_ms() -> u64 {
    100
}
fn default_max_tries() -> u32 {
    3
}
fn default_max_pending_transactions() -> usize {
    1_000
}
fn default_confirmations() -> u64 {
    1
}
fn default_confirmation_timeout_ms() -> u64 {
    600_000
}
fn default_balance_update_interval() -> u64 {
    50
}
fn default_gas_limit_buffer_default() -> f64 {
    0.0
}
fn default_block_delay() -> u64 {
    0
}
fn default_interval_ms() -> u64 {
    1_000
}

/// Per-order-kind gas limit buffer with a mandatory `default` fallback
/// (SPEC_FULL.md §4 Open Question resolution for `gasLimitBuffer`).
#[derive(Debug, Clone, Deserialize)]
pub struct GasLimitBuffer {
    #[serde(default = "default_gas_limit_buffer_default")]
    pub default: f64,
    #[serde(default)]
    pub delivery: Option<f64>,
    #[serde(default)]
    pub ack: Option<f64>,
}

impl Default for GasLimitBuffer {
    fn default() -> Self {
        Self {
            default: default_gas_limit_buffer_default(),
            delivery: None,
            ack: None,
        }
    }
}

impl GasLimitBuffer {
    pub fn for_kind(&self, kind: relay_core::OrderKind) -> f64 {
        match kind {
            relay_core::OrderKind::Delivery => self.delivery.unwrap_or(self.default),
            relay_core::OrderKind::Ack => self.ack.unwrap_or(self.default),
        }
    }
}

/// All tunables for a single chain worker (spec.md §6 "Configuration keys (per chain, with
/// defaults)").
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    pub chain_id: u32,
    /// The other chain in this escrow pair: deliveries observed as `BountyPlaced` here land
    /// on this chain, and acks for messages delivered here get submitted back on this chain's
    /// origin worker (SPEC_FULL.md §4, resolving spec.md §3's delivery/ack routing, which is
    /// silent on how a worker picks a destination beyond "its destination chain").
    pub counterparty_chain_id: u32,
    pub rpc_url: String,
    pub escrow_address: H160,
    pub signer_key_path: String,

    #[serde(default = "default_new_orders_delay_ms")]
    pub new_orders_delay_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_processing_interval_ms")]
    pub processing_interval_ms: u64,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    #[serde(default = "default_max_pending_transactions")]
    pub max_pending_transactions: usize,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_balance_update_interval")]
    pub balance_update_interval: u64,
    #[serde(default)]
    pub gas_limit_buffer: GasLimitBuffer,

    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_adjustment_factor: Option<f64>,
    pub max_allowed_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub gas_price_adjustment_factor: Option<f64>,
    pub max_allowed_gas_price: Option<U256>,
    #[serde(default)]
    pub priority_adjustment_factor: Option<f64>,

    pub low_balance_warning: Option<U256>,

    #[serde(default = "default_block_delay")]
    pub block_delay: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    pub max_blocks: Option<u64>,
    pub starting_block: Option<u64>,
    pub stopping_block: Option<u64>,

    #[serde(default)]
    pub min_delivery_reward: Option<U256>,
    #[serde(default)]
    pub relative_min_delivery_reward: Option<f64>,
    #[serde(default)]
    pub min_ack_reward: Option<U256>,
    #[serde(default)]
    pub relative_min_ack_reward: Option<f64>,

    /// CoinGecko-style id for this chain's native token, used to look up its price from
    /// `PricingSettings::base_url`. No symbol configured means the chain prices its own gas
    /// at a flat 1 (i.e. treats its native token as the common denomination).
    #[serde(default)]
    pub price_feed_symbol: Option<String>,
}

fn default_price_cache_duration_ms() -> u64 {
    60_000
}
fn default_price_max_tries() -> u32 {
    3
}

/// Global (not per-chain) configuration for the Pricing oracle (spec.md §4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct PricingSettings {
    /// Base URL of a CoinGecko-shaped price API. Omitted in deployments that are fine with
    /// every chain pricing its own gas at 1 (e.g. single-chain setups, or local testing).
    #[serde(default)]
    pub base_url: Option<url::Url>,
    #[serde(default = "default_price_cache_duration_ms")]
    pub cache_duration_ms: u64,
    #[serde(default = "default_price_max_tries")]
    pub max_tries: u32,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_duration_ms: default_price_cache_duration_ms(),
            max_tries: default_price_max_tries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub port: u16,
    pub chains: HashMap<String, ChainSettings>,
    #[serde(default)]
    pub pricing: PricingSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("RELAYER").separator("__"))
            .build()?;
        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for chain in self.chains.values() {
            if chain.rpc_url.is_empty() {
                return Err(ConfigError::MissingSetting(chain.chain_id, "rpc_url"));
            }
        }
        Ok(())
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.values().map(|c| ChainId(c.chain_id)).collect()
    }
}
