//! BLS12-381 signatures (public keys in G1, signatures in G2).
//!
//! UTXO chains built on BLS sign every coin separately and then publish a
//! single aggregate. Aggregation is point addition in G2, so it is
//! associative and commutative: signatures can be folded in as they arrive
//! and the result does not depend on arrival order. Every point is
//! subgroup-checked on the way in; a point that fails the check is never
//! retried.

use blst::min_pk::{AggregateSignature, Signature};
use blst::BLST_ERROR;

use crate::error::SignatureError;

/// Domain separation tag of the augmented scheme, where each message is
/// prefixed with the signer's public key before hashing to G2.
pub const AUG_SCHEME_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_AUG_";

const COMPRESSED_LEN: usize = 96;

/// A validated, compressed G2 point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature([u8; COMPRESSED_LEN]);

impl BlsSignature {
    /// Decode and subgroup-check a compressed signature.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, SignatureError> {
        if raw.len() != COMPRESSED_LEN {
            return Err(SignatureError::InvalidLength {
                expected: COMPRESSED_LEN,
                actual: raw.len(),
            });
        }
        let point = decode(raw)?;
        Ok(Self(point.compress()))
    }

    pub fn to_bytes(&self) -> [u8; COMPRESSED_LEN] {
        self.0
    }

    fn point(&self) -> Result<Signature, SignatureError> {
        decode(&self.0)
    }
}

fn decode(raw: &[u8]) -> Result<Signature, SignatureError> {
    Signature::sig_validate(raw, true).map_err(|err| {
        SignatureError::AggregationFailed(format!("invalid G2 point: {}", describe(err)))
    })
}

fn describe(err: BLST_ERROR) -> &'static str {
    match err {
        BLST_ERROR::BLST_BAD_ENCODING => "bad encoding",
        BLST_ERROR::BLST_POINT_NOT_ON_CURVE => "point not on curve",
        BLST_ERROR::BLST_POINT_NOT_IN_GROUP => "point not in subgroup",
        BLST_ERROR::BLST_PK_IS_INFINITY => "point at infinity",
        _ => "rejected by blst",
    }
}

/// Aggregate a complete set of signatures in one call.
pub fn aggregate(signatures: &[BlsSignature]) -> Result<BlsSignature, SignatureError> {
    let mut aggregator = BlsAggregator::new();
    for signature in signatures {
        aggregator.add(signature)?;
    }
    aggregator.finish()
}

/// Incremental aggregation for signatures that arrive one at a time.
#[derive(Default)]
pub struct BlsAggregator {
    sum: Option<AggregateSignature>,
    count: usize,
}

impl BlsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, signature: &BlsSignature) -> Result<(), SignatureError> {
        let point = signature.point()?;
        match &mut self.sum {
            None => self.sum = Some(AggregateSignature::from_signature(&point)),
            Some(sum) => sum.add_signature(&point, true).map_err(|err| {
                SignatureError::AggregationFailed(format!("point addition: {}", describe(err)))
            })?,
        }
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Result<BlsSignature, SignatureError> {
        let sum = self.sum.ok_or_else(|| {
            SignatureError::AggregationFailed("no signatures to aggregate".to_owned())
        })?;
        Ok(BlsSignature(sum.to_signature().compress()))
    }
}

#[cfg(test)]
mod tests {
    use blst::min_pk::{PublicKey, SecretKey};

    use super::*;

    fn keypair(seed: u8) -> (SecretKey, PublicKey) {
        let secret = SecretKey::key_gen(&[seed; 32], &[]).expect("32-byte ikm is valid");
        let public = secret.sk_to_pk();
        (secret, public)
    }

    fn sign(secret: &SecretKey, message: &[u8]) -> BlsSignature {
        let raw = secret.sign(message, AUG_SCHEME_DST, &[]).compress();
        BlsSignature::from_bytes(&raw).expect("fresh signature is valid")
    }

    #[test]
    fn aggregate_verifies_against_all_messages() {
        let (sk_a, pk_a) = keypair(1);
        let (sk_b, pk_b) = keypair(2);
        let msg_a: &[u8] = b"coin-a";
        let msg_b: &[u8] = b"coin-b";

        let aggregated = aggregate(&[sign(&sk_a, msg_a), sign(&sk_b, msg_b)]).expect("aggregates");
        let point = Signature::from_bytes(&aggregated.to_bytes()).expect("decodes");
        let result =
            point.aggregate_verify(true, &[msg_a, msg_b], AUG_SCHEME_DST, &[&pk_a, &pk_b], true);
        assert_eq!(result, BLST_ERROR::BLST_SUCCESS);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let sigs: Vec<BlsSignature> = (1..=3u8)
            .map(|seed| sign(&keypair(seed).0, &[seed; 8]))
            .collect();

        let forward = aggregate(&sigs).expect("forward");
        let reversed: Vec<BlsSignature> = sigs.iter().rev().copied().collect();
        assert_eq!(aggregate(&reversed).expect("reversed"), forward);

        let mut incremental = BlsAggregator::new();
        incremental.add(&sigs[1]).expect("add");
        incremental.add(&sigs[2]).expect("add");
        incremental.add(&sigs[0]).expect("add");
        assert_eq!(incremental.len(), 3);
        assert_eq!(incremental.finish().expect("finish"), forward);
    }

    #[test]
    fn single_signature_aggregates_to_itself() {
        let sig = sign(&keypair(7).0, b"only");
        assert_eq!(aggregate(&[sig]).expect("aggregates"), sig);
    }

    #[test]
    fn invalid_point_is_rejected() {
        let err = BlsSignature::from_bytes(&[0x11; 96]).expect_err("not a point");
        assert!(matches!(err, SignatureError::AggregationFailed(_)));

        let err = BlsSignature::from_bytes(&[0u8; 48]).expect_err("wrong length");
        assert_eq!(
            err,
            SignatureError::InvalidLength {
                expected: 96,
                actual: 48
            }
        );
    }

    #[test]
    fn empty_aggregate_is_an_error() {
        assert!(matches!(
            aggregate(&[]),
            Err(SignatureError::AggregationFailed(_))
        ));
    }
}
