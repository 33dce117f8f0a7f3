//! Ed25519 signatures are already canonical; only the length is checked.

use crate::error::SignatureError;

const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature([u8; SIGNATURE_LEN]);

impl Ed25519Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0
    }

    pub fn as_dalek(&self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

pub fn normalize(raw: &[u8]) -> Result<Ed25519Signature, SignatureError> {
    let bytes: [u8; SIGNATURE_LEN] =
        raw.try_into()
            .map_err(|_| SignatureError::InvalidLength {
                expected: SIGNATURE_LEN,
                actual: raw.len(),
            })?;
    Ok(Ed25519Signature(bytes))
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey, Verifier};

    use super::*;

    #[test]
    fn passes_real_signatures_through_unchanged() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let message = b"transfer";
        let signature = key.sign(message);

        let normalized = normalize(&signature.to_bytes()).expect("64 bytes");
        assert_eq!(normalized.to_bytes(), signature.to_bytes());
        key.verifying_key()
            .verify(message, &normalized.as_dalek())
            .expect("still verifies");
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            normalize(&[0u8; 65]),
            Err(SignatureError::InvalidLength {
                expected: 64,
                actual: 65
            })
        );
    }
}
