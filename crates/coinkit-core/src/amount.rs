//! Fixed-point asset quantities.
//!
//! An [`Amount`] pairs a decimal value with the asset's decimal exponent
//! (8 for BTC, 18 for ETH). Conversion to minor units never rounds: a value
//! with more fractional digits than the exponent allows is an error.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest exponent a `Decimal` can represent as a scale.
const MAX_EXPONENT: u8 = 28;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is negative")]
    Negative,

    #[error("amount {value} has more than {exponent} fractional digits")]
    Precision { value: String, exponent: u8 },

    #[error("amount does not fit in minor units")]
    Overflow,

    #[error("asset exponent {0} is out of range")]
    Exponent(u8),

    #[error("invalid amount `{0}`")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAmount")]
pub struct Amount {
    value: Decimal,
    exponent: u8,
}

/// Wire shape of [`Amount`]; decoding goes through [`Amount::new`].
#[derive(Deserialize)]
struct RawAmount {
    value: Decimal,
    exponent: u8,
}

impl TryFrom<RawAmount> for Amount {
    type Error = AmountError;

    fn try_from(raw: RawAmount) -> Result<Self, Self::Error> {
        Self::new(raw.value, raw.exponent)
    }
}

impl Amount {
    pub fn new(value: Decimal, exponent: u8) -> Result<Self, AmountError> {
        if exponent > MAX_EXPONENT {
            return Err(AmountError::Exponent(exponent));
        }
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self { value, exponent })
    }

    /// Parse a human-readable decimal string such as `"0.015"`.
    pub fn parse(text: &str, exponent: u8) -> Result<Self, AmountError> {
        let value = Decimal::from_str_exact(text.trim())
            .map_err(|_| AmountError::Parse(text.to_owned()))?;
        Self::new(value, exponent)
    }

    pub fn zero(exponent: u8) -> Self {
        Self {
            value: Decimal::ZERO,
            exponent,
        }
    }

    /// Build an amount from an integer count of minor units.
    pub fn from_minor_units(units: u128, exponent: u8) -> Result<Self, AmountError> {
        if exponent > MAX_EXPONENT {
            return Err(AmountError::Exponent(exponent));
        }
        let mantissa = i128::try_from(units).map_err(|_| AmountError::Overflow)?;
        let value = Decimal::try_from_i128_with_scale(mantissa, u32::from(exponent))
            .map_err(|_| AmountError::Overflow)?;
        Ok(Self { value, exponent })
    }

    /// Exact conversion to minor units.
    pub fn to_minor_units(&self) -> Result<u128, AmountError> {
        let normalized = self.value.normalize();
        let scale = normalized.scale();
        if scale > u32::from(self.exponent) {
            return Err(AmountError::Precision {
                value: self.value.to_string(),
                exponent: self.exponent,
            });
        }
        let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| AmountError::Negative)?;
        let factor = 10u128
            .checked_pow(u32::from(self.exponent) - scale)
            .ok_or(AmountError::Overflow)?;
        mantissa.checked_mul(factor).ok_or(AmountError::Overflow)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn exponent(&self) -> u8 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.normalize())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `"<value>e<exponent>"`, e.g. `"0.5e8"` for half a bitcoin.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, exponent) = s
            .rsplit_once('e')
            .ok_or_else(|| AmountError::Parse(s.to_owned()))?;
        let exponent = exponent
            .parse::<u8>()
            .map_err(|_| AmountError::Parse(s.to_owned()))?;
        Self::parse(value, exponent)
    }
}
