//! Adapter-scoped configuration.
//!
//! Every chain constant an adapter consults (dust threshold, input ceiling,
//! fee targets, gas parameters) lives in one of these structs, built once
//! when the adapter is created. Defaults carry mainnet values; `ChainKind`
//! fills in the per-network differences.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fee::GasTiers;
use crate::select::SelectionPolicy;

/// One network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    /// Outbound request budget for this endpoint. Unlimited when unset.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            pass: None,
            requests_per_second: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_rate_limit(mut self, requests_per_second: Option<u32>) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    pub fn with_auth(mut self, user: Option<String>, pass: Option<String>) -> Self {
        self.user = user;
        self.pass = pass;
        self
    }

    /// Parse a comma-separated list of URLs.
    pub fn parse_list(urls: &str) -> Result<Vec<Self>, CoreError> {
        let endpoints: Vec<Self> = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Self::new)
            .collect();
        if endpoints.is_empty() {
            return Err(CoreError::Config("no provider URLs given".to_owned()));
        }
        Ok(endpoints)
    }
}

/// Confirmation targets, in blocks, requested from the fee estimator for
/// each priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTargets {
    pub priority: u16,
    pub normal: u16,
    pub minimum: u16,
}

impl Default for FeeTargets {
    fn default() -> Self {
        Self {
            priority: 1,
            normal: 4,
            minimum: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcoinConfig {
    pub network: bitcoin::Network,
    /// Smallest change output worth creating, in satoshi.
    pub dust_threshold: u64,
    pub max_inputs: u32,
    pub fee_targets: FeeTargets,
    /// Floor applied to every estimated rate, in sat/vB.
    pub min_fee_rate: u64,
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            network: bitcoin::Network::Bitcoin,
            dust_threshold: 546,
            max_inputs: 500,
            fee_targets: FeeTargets::default(),
            min_fee_rate: 1,
        }
    }
}

impl BitcoinConfig {
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            max_inputs: self.max_inputs,
            dust_threshold: u128::from(self.dust_threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvmConfig {
    pub chain_id: u64,
    pub gas_limit: u64,
    pub gas_tiers: GasTiers,
    /// Decimal exponent of the native asset.
    pub exponent: u8,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            gas_limit: 21_000,
            gas_tiers: GasTiers::default(),
            exponent: 18,
        }
    }
}
