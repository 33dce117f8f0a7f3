//! secp256k1 ECDSA canonicalization.
//!
//! Signers return a bare `(r, s)` pair, sometimes with a trailing byte the
//! chain does not trust. We force `s` into the lower half of the curve order
//! and recover the recovery id by trial: whichever of `0` and `1` recovers
//! the wallet's public key from the digest is the one every consumer needs.

use std::sync::OnceLock;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};

use crate::error::SignatureError;

const COMPACT_LEN: usize = 64;
const DIGEST_LEN: usize = 32;

fn context() -> &'static Secp256k1<VerifyOnly> {
    static CONTEXT: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::verification_only)
}

/// A low-S ECDSA signature with its recovery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Always `0` or `1`.
    pub recovery_id: u8,
}

impl EcdsaSignature {
    /// `r || s`.
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; COMPACT_LEN];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    /// `r || s || (recovery_id + offset)`. Legacy EVM signatures use an
    /// offset of 27.
    pub fn to_rsv(&self, offset: u8) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..COMPACT_LEN].copy_from_slice(&self.to_compact());
        out[COMPACT_LEN] = self.recovery_id + offset;
        out
    }

    /// DER encoding as used in Bitcoin-family witnesses and script sigs,
    /// without the sighash byte.
    pub fn to_der(&self) -> Result<Vec<u8>, SignatureError> {
        Ok(self.as_secp()?.serialize_der().to_vec())
    }

    pub fn as_secp(&self) -> Result<Signature, SignatureError> {
        Signature::from_compact(&self.to_compact())
            .map_err(|e| SignatureError::Malformed(e.to_string()))
    }
}

/// Canonicalize `raw` against `digest` and `public_key`.
///
/// `raw` is 64 bytes (`r || s`) or 65 bytes with a trailing recovery byte,
/// which is ignored. `public_key` may be compressed or uncompressed SEC1.
pub fn normalize(
    raw: &[u8],
    digest: &[u8],
    public_key: &[u8],
) -> Result<EcdsaSignature, SignatureError> {
    let compact = match raw.len() {
        64 | 65 => &raw[..COMPACT_LEN],
        actual => {
            return Err(SignatureError::InvalidLength {
                expected: COMPACT_LEN,
                actual,
            })
        }
    };
    let digest: [u8; DIGEST_LEN] =
        digest
            .try_into()
            .map_err(|_| SignatureError::InvalidDigest {
                expected: DIGEST_LEN,
                actual: digest.len(),
            })?;
    let expected = PublicKey::from_slice(public_key)
        .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;

    let mut signature =
        Signature::from_compact(compact).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    signature.normalize_s();
    let canonical = signature.serialize_compact();

    let message = Message::from_digest(digest);
    let recovery_id = recover_id(&canonical, &message, &expected)?;

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&canonical[..32]);
    s.copy_from_slice(&canonical[32..]);
    Ok(EcdsaSignature { r, s, recovery_id })
}

fn recover_id(
    compact: &[u8; 64],
    message: &Message,
    expected: &PublicKey,
) -> Result<u8, SignatureError> {
    for id in 0..2i32 {
        let recovery = RecoveryId::from_i32(id).map_err(|_| SignatureError::RecoveryFailed)?;
        let Ok(candidate) = RecoverableSignature::from_compact(compact, recovery) else {
            continue;
        };
        if let Ok(recovered) = context().recover_ecdsa(message, &candidate) {
            if &recovered == expected {
                return Ok(id as u8);
            }
        }
    }
    Err(SignatureError::RecoveryFailed)
}

/// Recover the public key a normalized signature commits to.
pub fn recover(signature: &EcdsaSignature, digest: &[u8]) -> Result<PublicKey, SignatureError> {
    let digest: [u8; DIGEST_LEN] =
        digest
            .try_into()
            .map_err(|_| SignatureError::InvalidDigest {
                expected: DIGEST_LEN,
                actual: digest.len(),
            })?;
    let recovery = RecoveryId::from_i32(i32::from(signature.recovery_id))
        .map_err(|_| SignatureError::RecoveryFailed)?;
    let candidate = RecoverableSignature::from_compact(&signature.to_compact(), recovery)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    context()
        .recover_ecdsa(&Message::from_digest(digest), &candidate)
        .map_err(|_| SignatureError::RecoveryFailed)
}
