//! Fee models.
//!
//! A [`FeeModel`] turns the shape of a transaction (input and output counts)
//! into a [`FeeQuote`]. Three shapes cover every supported chain: a fixed
//! charge per input, gas limit times gas price, and transaction mass times a
//! tiered fee rate. The coin selector and the pipeline only ever see the
//! quote, never which model produced it.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::types::{FeeDetail, FeePriority};

// ==============================================================================
// Fee Quote
// ==============================================================================

/// A fee, either one value or one value per priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeQuote<T = u128> {
    Single(T),
    Choosable { priority: T, normal: T, minimum: T },
}

impl<T: Copy + PartialEq> FeeQuote<T> {
    /// Collapses identical tiers into `Single`.
    pub fn from_tiers(priority: T, normal: T, minimum: T) -> Self {
        if priority == normal && normal == minimum {
            Self::Single(normal)
        } else {
            Self::Choosable {
                priority,
                normal,
                minimum,
            }
        }
    }

    pub fn pick(&self, priority: FeePriority) -> T {
        match (self, priority) {
            (Self::Single(value), _) => *value,
            (Self::Choosable { priority, .. }, FeePriority::Priority) => *priority,
            (Self::Choosable { normal, .. }, FeePriority::Normal) => *normal,
            (Self::Choosable { minimum, .. }, FeePriority::Minimum) => *minimum,
        }
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<FeeQuote<U>, E> {
        Ok(match self {
            Self::Single(value) => FeeQuote::Single(f(value)?),
            Self::Choosable {
                priority,
                normal,
                minimum,
            } => FeeQuote::Choosable {
                priority: f(priority)?,
                normal: f(normal)?,
                minimum: f(minimum)?,
            },
        })
    }
}

/// Input/output counts the fee is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxShape {
    pub inputs: usize,
    pub outputs: usize,
}

impl TxShape {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }
}

// ==============================================================================
// Fee Model Trait
// ==============================================================================

pub trait FeeModel: Send + Sync {
    fn estimate(&self, shape: TxShape) -> Result<FeeQuote, BuildError>;

    /// Parameters behind the fee picked for `priority`, recorded on the draft.
    fn detail(&self, _shape: TxShape, _priority: FeePriority) -> Result<FeeDetail, BuildError> {
        Ok(FeeDetail::Flat)
    }

    fn fee_for(&self, shape: TxShape, priority: FeePriority) -> Result<u128, BuildError> {
        Ok(self.estimate(shape)?.pick(priority))
    }
}

fn widen(value: usize) -> u128 {
    value as u128
}

// ==============================================================================
// Fixed Per-Input Fee
// ==============================================================================

/// `base + per_input * inputs`. With `per_input == 0` this is a flat fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerInputFee {
    pub base: u128,
    pub per_input: u128,
}

impl PerInputFee {
    pub fn flat(fee: u128) -> Self {
        Self {
            base: fee,
            per_input: 0,
        }
    }
}

impl FeeModel for PerInputFee {
    fn estimate(&self, shape: TxShape) -> Result<FeeQuote, BuildError> {
        let fee = self
            .per_input
            .checked_mul(widen(shape.inputs))
            .and_then(|v| v.checked_add(self.base))
            .ok_or(BuildError::Overflow("computing per-input fee"))?;
        Ok(FeeQuote::Single(fee))
    }
}

// ==============================================================================
// Gas Fee
// ==============================================================================

/// Percentages applied to the node gas price for each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasTiers {
    pub minimum: u16,
    pub normal: u16,
    pub priority: u16,
}

impl Default for GasTiers {
    fn default() -> Self {
        Self {
            minimum: 100,
            normal: 120,
            priority: 150,
        }
    }
}

/// `gas_limit * gas_price`, with the price scaled per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFee {
    pub limit: u64,
    pub price: u128,
    pub tiers: GasTiers,
}

impl GasFee {
    pub fn price_for(&self, priority: FeePriority) -> Result<u128, BuildError> {
        let percent = match priority {
            FeePriority::Minimum => self.tiers.minimum,
            FeePriority::Normal => self.tiers.normal,
            FeePriority::Priority => self.tiers.priority,
        };
        self.price
            .checked_mul(u128::from(percent))
            .map(|v| v / 100)
            .ok_or(BuildError::Overflow("scaling gas price"))
    }

    fn total(&self, priority: FeePriority) -> Result<u128, BuildError> {
        self.price_for(priority)?
            .checked_mul(u128::from(self.limit))
            .ok_or(BuildError::Overflow("computing gas fee"))
    }
}

impl FeeModel for GasFee {
    fn estimate(&self, _shape: TxShape) -> Result<FeeQuote, BuildError> {
        Ok(FeeQuote::from_tiers(
            self.total(FeePriority::Priority)?,
            self.total(FeePriority::Normal)?,
            self.total(FeePriority::Minimum)?,
        ))
    }

    fn detail(&self, _shape: TxShape, priority: FeePriority) -> Result<FeeDetail, BuildError> {
        Ok(FeeDetail::Gas {
            limit: self.limit,
            price: self.price_for(priority)?,
        })
    }
}

// ==============================================================================
// Mass Fee
// ==============================================================================

/// `mass * rate`, where mass grows linearly with inputs and outputs.
///
/// Mass is `ceil((overhead + per_input*inputs + per_output*outputs) / divisor)`.
/// Bitcoin-family chains count weight units and divide by four to get vbytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MassFee {
    pub overhead: u64,
    pub per_input: u64,
    pub per_output: u64,
    pub divisor: u64,
    pub rates: FeeQuote<u64>,
}

impl MassFee {
    /// Weight-unit coefficients for P2WPKH inputs and outputs.
    pub fn p2wpkh(rates: FeeQuote<u64>) -> Self {
        Self {
            overhead: 42,
            per_input: 272,
            per_output: 124,
            divisor: 4,
            rates,
        }
    }

    pub fn mass(&self, shape: TxShape) -> Result<u64, BuildError> {
        let inputs = u64::try_from(shape.inputs).map_err(|_| BuildError::Overflow("counting inputs"))?;
        let outputs =
            u64::try_from(shape.outputs).map_err(|_| BuildError::Overflow("counting outputs"))?;
        let units = self
            .per_input
            .checked_mul(inputs)
            .and_then(|v| v.checked_add(self.per_output.checked_mul(outputs)?))
            .and_then(|v| v.checked_add(self.overhead))
            .ok_or(BuildError::Overflow("computing transaction mass"))?;
        let divisor = self.divisor.max(1);
        Ok(units.div_ceil(divisor))
    }
}

impl FeeModel for MassFee {
    fn estimate(&self, shape: TxShape) -> Result<FeeQuote, BuildError> {
        let mass = u128::from(self.mass(shape)?);
        self.rates.try_map(|rate| {
            mass.checked_mul(u128::from(rate))
                .ok_or(BuildError::Overflow("computing mass fee"))
        })
    }

    fn detail(&self, shape: TxShape, priority: FeePriority) -> Result<FeeDetail, BuildError> {
        Ok(FeeDetail::Mass {
            mass: self.mass(shape)?,
            rate: self.rates.pick(priority),
        })
    }
}
