//! Chain adapter interface and the closed registry of supported chains.
//!
//! A [`ChainTxAdapter`] is the only chain-specific piece the pipeline talks
//! to. It fetches state, turns state plus a request into an unsigned draft,
//! derives the digests to sign, and assembles the signed payload. The
//! pipeline sequences those steps identically for every chain.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chains::bitcoin::BitcoinAdapter;
use crate::chains::evm::EvmAdapter;
use crate::config::{BitcoinConfig, EndpointConfig, EvmConfig};
use crate::error::CoreError;
use crate::provider::{HttpEndpoint, ProviderPool};
use crate::signature::NormalizedSignature;
use crate::types::{
    ChainState, Curve, SignedPayload, SigningRequest, TransferRequest, TxId, UnsignedDraft,
};

// ==============================================================================
// Adapter Trait
// ==============================================================================

#[async_trait]
pub trait ChainTxAdapter: Send + Sync {
    fn kind(&self) -> ChainKind;

    fn curve(&self) -> Curve {
        self.kind().curve()
    }

    /// Decimal exponent of the chain's native asset.
    fn exponent(&self) -> u8;

    /// Public key the signer is asked to sign with.
    fn public_key(&self) -> &[u8];

    /// Wallet address derived from the public key. Change returns here.
    fn address(&self) -> String;

    /// Endpoint the next network call will use.
    fn host(&self) -> String;

    /// Fetch a fresh, immutable snapshot of everything `build` needs.
    async fn fetch_state(&self, address: &str) -> Result<ChainState, CoreError>;

    /// Turn a snapshot and a request into an unsigned draft. No I/O.
    fn build(
        &self,
        state: &ChainState,
        request: &TransferRequest,
    ) -> Result<UnsignedDraft, CoreError>;

    /// Digests to sign, in the order `assemble` expects the signatures.
    fn derive_preimages(&self, draft: &UnsignedDraft) -> Result<Vec<SigningRequest>, CoreError>;

    /// Combine the draft with one normalized signature per preimage.
    fn assemble(
        &self,
        draft: UnsignedDraft,
        signatures: Vec<NormalizedSignature>,
    ) -> Result<SignedPayload, CoreError>;

    async fn broadcast(&self, payload: &SignedPayload) -> Result<TxId, CoreError>;
}

// ==============================================================================
// Chain Registry
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Bitcoin,
    BitcoinTestnet,
    BitcoinSignet,
    BitcoinRegtest,
    Ethereum,
    Sepolia,
    Polygon,
    BscMainnet,
}

/// Transaction model and configuration a chain is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Bitcoin(BitcoinConfig),
    Evm(EvmConfig),
}

impl ChainKind {
    pub const ALL: [ChainKind; 8] = [
        Self::Bitcoin,
        Self::BitcoinTestnet,
        Self::BitcoinSignet,
        Self::BitcoinRegtest,
        Self::Ethereum,
        Self::Sepolia,
        Self::Polygon,
        Self::BscMainnet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::BitcoinTestnet => "bitcoin-testnet",
            Self::BitcoinSignet => "bitcoin-signet",
            Self::BitcoinRegtest => "bitcoin-regtest",
            Self::Ethereum => "ethereum",
            Self::Sepolia => "sepolia",
            Self::Polygon => "polygon",
            Self::BscMainnet => "bsc",
        }
    }

    pub fn curve(&self) -> Curve {
        Curve::Secp256k1
    }

    /// Default configuration for this chain.
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Bitcoin => ChainFamily::Bitcoin(BitcoinConfig::default()),
            Self::BitcoinTestnet => ChainFamily::Bitcoin(BitcoinConfig {
                network: bitcoin::Network::Testnet,
                ..BitcoinConfig::default()
            }),
            Self::BitcoinSignet => ChainFamily::Bitcoin(BitcoinConfig {
                network: bitcoin::Network::Signet,
                ..BitcoinConfig::default()
            }),
            Self::BitcoinRegtest => ChainFamily::Bitcoin(BitcoinConfig {
                network: bitcoin::Network::Regtest,
                ..BitcoinConfig::default()
            }),
            Self::Ethereum => ChainFamily::Evm(EvmConfig::default()),
            Self::Sepolia => ChainFamily::Evm(EvmConfig {
                chain_id: 11_155_111,
                ..EvmConfig::default()
            }),
            Self::Polygon => ChainFamily::Evm(EvmConfig {
                chain_id: 137,
                ..EvmConfig::default()
            }),
            Self::BscMainnet => ChainFamily::Evm(EvmConfig {
                chain_id: 56,
                ..EvmConfig::default()
            }),
        }
    }

    pub fn bitcoin_config(&self) -> Option<BitcoinConfig> {
        match self.family() {
            ChainFamily::Bitcoin(config) => Some(config),
            ChainFamily::Evm(_) => None,
        }
    }

    pub fn evm_config(&self) -> Option<EvmConfig> {
        match self.family() {
            ChainFamily::Evm(config) => Some(config),
            ChainFamily::Bitcoin(_) => None,
        }
    }

    pub fn exponent(&self) -> u8 {
        match self.family() {
            ChainFamily::Bitcoin(_) => 8,
            ChainFamily::Evm(config) => config.exponent,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        match needle.as_str() {
            "btc" => return Ok(Self::Bitcoin),
            "eth" => return Ok(Self::Ethereum),
            "matic" => return Ok(Self::Polygon),
            "bnb" | "bsc-mainnet" => return Ok(Self::BscMainnet),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(ChainKind::as_str).collect();
                format!("unknown chain `{s}`; expected one of {}", known.join(", "))
            })
    }
}

/// Build the adapter for `kind` over HTTP endpoints, with the chain's
/// default configuration.
pub fn build_adapter(
    kind: ChainKind,
    public_key: &[u8],
    endpoints: &[EndpointConfig],
) -> Result<Arc<dyn ChainTxAdapter>, CoreError> {
    let providers = endpoints
        .iter()
        .map(HttpEndpoint::new)
        .collect::<Result<Vec<_>, _>>()?;
    let pool = ProviderPool::new(providers)?;

    let adapter: Arc<dyn ChainTxAdapter> = match kind.family() {
        ChainFamily::Bitcoin(config) => {
            Arc::new(BitcoinAdapter::new(kind, config, public_key, pool)?)
        }
        ChainFamily::Evm(config) => Arc::new(EvmAdapter::new(kind, config, public_key, pool)?),
    };
    Ok(adapter)
}
