//! External signer boundary.
//!
//! The signing device only ever sees digests. It returns one raw signature
//! per request, in request order, or fails the whole call.

use async_trait::async_trait;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, SignOnly};

use crate::error::SignerError;
use crate::types::{Curve, RawSignature, SigningRequest};

#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Whether all digests can be signed in a single call. When `false` the
    /// pipeline calls [`sign`](Self::sign) once per digest, in order.
    fn supports_batch(&self) -> bool {
        true
    }

    /// Sign `requests` with the key identified by `public_key`.
    ///
    /// Must return exactly one signature per request, in the same order.
    async fn sign(
        &self,
        requests: &[SigningRequest],
        public_key: &[u8],
    ) -> Result<Vec<RawSignature>, SignerError>;
}

/// In-process secp256k1 signer holding the secret key in memory.
///
/// Produces bare 64-byte `r || s` signatures, the same shape a card returns.
pub struct SoftwareSigner {
    secp: Secp256k1<SignOnly>,
    secret: SecretKey,
    public: PublicKey,
}

impl SoftwareSigner {
    pub fn new(secret: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self {
            secp,
            secret,
            public,
        }
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, SignerError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| SignerError::Other(format!("secret key is not hex: {e}")))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| SignerError::Other(format!("invalid secret key: {e}")))?;
        Ok(Self::new(secret))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    fn sign_digest(&self, digest: &[u8]) -> Result<RawSignature, SignerError> {
        let digest: [u8; 32] = digest.try_into().map_err(|_| {
            SignerError::Rejected(format!("expected a 32-byte digest, got {}", digest.len()))
        })?;
        let signature = self
            .secp
            .sign_ecdsa(&Message::from_digest(digest), &self.secret);
        Ok(RawSignature::new(
            signature.serialize_compact(),
            Curve::Secp256k1,
        ))
    }
}

#[async_trait]
impl ExternalSigner for SoftwareSigner {
    async fn sign(
        &self,
        requests: &[SigningRequest],
        public_key: &[u8],
    ) -> Result<Vec<RawSignature>, SignerError> {
        let matches_key = PublicKey::from_slice(public_key)
            .map(|key| key == self.public)
            .unwrap_or(false);
        if !matches_key {
            return Err(SignerError::Rejected(
                "requested public key does not belong to this signer".to_owned(),
            ));
        }
        requests
            .iter()
            .map(|request| self.sign_digest(&request.digest))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature;
    use crate::test_util::secret_key;

    #[tokio::test]
    async fn signs_each_digest_in_order() {
        let signer = SoftwareSigner::new(secret_key(0x21));
        let public = signer.public_key().serialize();
        let requests = vec![
            SigningRequest::new(vec![1u8; 32]),
            SigningRequest::new(vec![2u8; 32]),
        ];

        let signatures = signer
            .sign(&requests, &public)
            .await
            .expect("signer must sign");
        assert_eq!(signatures.len(), 2);
        for (request, raw) in requests.iter().zip(&signatures) {
            assert_eq!(raw.bytes.len(), 64);
            signature::normalize(raw, &request.digest, &public)
                .expect("signature recovers to the signer key");
        }
    }

    #[tokio::test]
    async fn rejects_foreign_public_key() {
        let signer = SoftwareSigner::new(secret_key(0x21));
        let other = SoftwareSigner::new(secret_key(0x22)).public_key().serialize();
        let err = signer
            .sign(&[SigningRequest::new(vec![0u8; 32])], &other)
            .await
            .expect_err("wrong key");
        assert!(matches!(err, SignerError::Rejected(_)));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(SoftwareSigner::from_hex("zz").is_err());
        assert!(SoftwareSigner::from_hex(&"00".repeat(32)).is_err());
    }
}
