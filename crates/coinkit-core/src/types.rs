//! Domain types for the transfer pipeline.
//!
//! Contains the chain-state snapshot (`ChainState`, `UnspentOutput`), the
//! unsigned draft and its parts, signing requests, raw signatures, and the
//! final signed payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::fee::FeeQuote;

// ==============================================================================
// Curves and Priorities
// ==============================================================================

/// Signature scheme a chain expects from the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    Secp256k1,
    Ed25519,
    Bls12381,
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secp256k1 => write!(f, "secp256k1"),
            Self::Ed25519 => write!(f, "ed25519"),
            Self::Bls12381 => write!(f, "bls12-381"),
        }
    }
}

/// Fee tier a transfer is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePriority {
    Minimum,
    #[default]
    Normal,
    Priority,
}

impl FeePriority {
    pub const ALL: [FeePriority; 3] = [Self::Priority, Self::Normal, Self::Minimum];
}

impl fmt::Display for FeePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimum => write!(f, "minimum"),
            Self::Normal => write!(f, "normal"),
            Self::Priority => write!(f, "priority"),
        }
    }
}

impl FromStr for FeePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimum" | "min" | "low" => Ok(Self::Minimum),
            "normal" | "market" => Ok(Self::Normal),
            "priority" | "fast" => Ok(Self::Priority),
            other => Err(format!(
                "unknown fee priority `{other}`; expected minimum, normal or priority"
            )),
        }
    }
}

// ==============================================================================
// Chain State Snapshot
// ==============================================================================

/// A spendable output owned by the wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Identifier of the transaction that created the output, in the byte
    /// order the chain displays it.
    pub outpoint_id: Vec<u8>,
    pub output_index: u32,
    pub amount: u128,
    pub locking_script: Vec<u8>,
    /// `None` while the funding transaction is unconfirmed.
    pub confirmed_height: Option<u64>,
}

/// Spendable funds as seen by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ledger {
    Utxo(Vec<UnspentOutput>),
    Account { nonce: u64, balance: u128 },
}

impl Ledger {
    pub fn balance(&self) -> u128 {
        match self {
            Self::Utxo(utxos) => utxos.iter().map(|u| u.amount).sum(),
            Self::Account { balance, .. } => *balance,
        }
    }
}

/// Fee inputs fetched alongside the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeMarket {
    /// Price per unit of transaction mass (satoshi per vbyte, sompi per
    /// gram), one rate per tier.
    MassRates(FeeQuote<u64>),
    /// Node-reported gas price in the smallest unit.
    GasPrice(u128),
    /// The adapter charges a configured fee and needs nothing from the node.
    Configured,
}

/// Immutable snapshot handed to `ChainTxAdapter::build`.
///
/// Fetched fresh for every estimate and every send. Each pipeline run owns
/// its snapshot, so concurrent runs never observe each other's UTXO set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub address: String,
    pub ledger: Ledger,
    pub fee_market: FeeMarket,
}

// ==============================================================================
// Transfer Request and Draft
// ==============================================================================

/// What the caller wants to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination: String,
    pub amount: Amount,
    pub priority: FeePriority,
}

impl TransferRequest {
    pub fn new(destination: impl Into<String>, amount: Amount) -> Self {
        Self {
            destination: destination.into(),
            amount,
            priority: FeePriority::default(),
        }
    }

    pub fn with_priority(mut self, priority: FeePriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftOutput {
    pub destination: String,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftInputs {
    Utxo(Vec<UnspentOutput>),
    Account { nonce: u64 },
}

/// How the draft's fee was derived. Adapters read this back when encoding
/// fee fields (gas price, gas limit) into the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum FeeDetail {
    Flat,
    Mass { mass: u64, rate: u64 },
    Gas { limit: u64, price: u128 },
}

/// An unsigned transfer. Produced once by `build`, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedDraft {
    pub inputs: DraftInputs,
    pub outputs: Vec<DraftOutput>,
    pub change: Option<DraftOutput>,
    /// Effective fee in minor units, after any dust was folded in.
    pub fee: u128,
    pub fee_detail: FeeDetail,
}

impl UnsignedDraft {
    pub fn input_count(&self) -> usize {
        match &self.inputs {
            DraftInputs::Utxo(utxos) => utxos.len(),
            DraftInputs::Account { .. } => 1,
        }
    }

    pub fn total_input(&self) -> Option<u128> {
        match &self.inputs {
            DraftInputs::Utxo(utxos) => Some(utxos.iter().map(|u| u.amount).sum()),
            DraftInputs::Account { .. } => None,
        }
    }

    pub fn total_output(&self) -> u128 {
        self.outputs.iter().map(|o| o.amount).sum::<u128>()
            + self.change.as_ref().map_or(0, |c| c.amount)
    }
}

// ==============================================================================
// Signing
// ==============================================================================

/// Per-digest metadata carried alongside a signing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningContext {
    pub input_index: Option<u32>,
    pub script: Option<Vec<u8>>,
}

/// One digest the external signer must sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub digest: Vec<u8>,
    pub context: SigningContext,
}

impl SigningRequest {
    pub fn new(digest: impl Into<Vec<u8>>) -> Self {
        Self {
            digest: digest.into(),
            context: SigningContext::default(),
        }
    }

    pub fn for_input(digest: impl Into<Vec<u8>>, index: u32, script: Vec<u8>) -> Self {
        Self {
            digest: digest.into(),
            context: SigningContext {
                input_index: Some(index),
                script: Some(script),
            },
        }
    }
}

/// Signature exactly as the signer produced it. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub bytes: Vec<u8>,
    pub curve: Curve,
}

impl RawSignature {
    pub fn new(bytes: impl Into<Vec<u8>>, curve: Curve) -> Self {
        Self {
            bytes: bytes.into(),
            curve,
        }
    }
}

// ==============================================================================
// Signed Payload
// ==============================================================================

/// Chain transaction identifier, in the chain's display encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub bytes: Vec<u8>,
    pub txid: TxId,
}

impl SignedPayload {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}
