//! Raw signature normalization.
//!
//! [`normalize`] turns what the external signer returned into the form a
//! chain will accept. Every path here is pure: the same
//! `(raw, digest, public_key)` triple always yields the same result, and
//! normalizing an already-normalized signature changes nothing.

pub mod bls;
pub mod ecdsa;
pub mod ed25519;

pub use bls::{aggregate, BlsAggregator, BlsSignature};
pub use ecdsa::EcdsaSignature;
pub use ed25519::Ed25519Signature;

use crate::error::SignatureError;
use crate::types::{Curve, RawSignature};

/// Curve-specific canonical signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedSignature {
    Ecdsa(EcdsaSignature),
    Ed25519(Ed25519Signature),
    Bls(BlsSignature),
}

impl NormalizedSignature {
    pub fn curve(&self) -> Curve {
        match self {
            Self::Ecdsa(_) => Curve::Secp256k1,
            Self::Ed25519(_) => Curve::Ed25519,
            Self::Bls(_) => Curve::Bls12381,
        }
    }

    pub fn as_ecdsa(&self) -> Result<&EcdsaSignature, SignatureError> {
        match self {
            Self::Ecdsa(sig) => Ok(sig),
            other => Err(SignatureError::CurveMismatch {
                expected: Curve::Secp256k1,
                actual: other.curve(),
            }),
        }
    }

    /// Bytes in the chain-neutral wire form: compact `r || s` for ECDSA,
    /// the unchanged 64 bytes for Ed25519, the compressed point for BLS.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ecdsa(sig) => sig.to_compact().to_vec(),
            Self::Ed25519(sig) => sig.to_bytes().to_vec(),
            Self::Bls(sig) => sig.to_bytes().to_vec(),
        }
    }
}

/// Normalize one raw signature over `digest` for `public_key`.
///
/// Ed25519 and BLS ignore `digest` and `public_key`; ECDSA needs both to
/// pick the recovery id.
pub fn normalize(
    raw: &RawSignature,
    digest: &[u8],
    public_key: &[u8],
) -> Result<NormalizedSignature, SignatureError> {
    match raw.curve {
        Curve::Secp256k1 => {
            ecdsa::normalize(&raw.bytes, digest, public_key).map(NormalizedSignature::Ecdsa)
        }
        Curve::Ed25519 => ed25519::normalize(&raw.bytes).map(NormalizedSignature::Ed25519),
        Curve::Bls12381 => BlsSignature::from_bytes(&raw.bytes).map(NormalizedSignature::Bls),
    }
}
