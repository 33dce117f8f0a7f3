//! The transfer state machine: `Draft -> PreImage -> Signed -> Broadcast`.
//!
//! Stages run strictly in order and each consumes the output of the one
//! before it. Any failure ends the run with a [`PipelineError`] naming the
//! stage; nothing built so far survives it. Chain state is fetched fresh for
//! every run, so concurrent runs never share a UTXO set or nonce.

use std::fmt;
use std::slice;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::ChainTxAdapter;
use crate::amount::Amount;
use crate::error::{CoreError, ErrorKind, Remedy, SignatureError, SignerError};
use crate::fee::FeeQuote;
use crate::signature::{self, NormalizedSignature};
use crate::signer::ExternalSigner;
use crate::types::{FeePriority, RawSignature, SigningRequest, TransferRequest, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Draft,
    PreImage,
    Signed,
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::PreImage => write!(f, "pre-image"),
            Self::Signed => write!(f, "signing"),
            Self::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A run that ended in the failed state.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: CoreError,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(CoreError) -> PipelineError {
        move |source| PipelineError { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn remedy(&self) -> Remedy {
        self.source.remedy()
    }
}

pub struct TransactionPipeline {
    adapter: Arc<dyn ChainTxAdapter>,
}

impl TransactionPipeline {
    pub fn new(adapter: Arc<dyn ChainTxAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn ChainTxAdapter> {
        &self.adapter
    }

    /// Provider the next network call will go to.
    pub fn host(&self) -> String {
        self.adapter.host()
    }

    /// Quote the fee for `request` without signing anything.
    ///
    /// One draft is built per priority tier and the quote reports each
    /// draft's effective fee, so dust folded into the fee is included. The
    /// drafts are discarded.
    pub async fn estimate_fee(
        &self,
        address: &str,
        request: &TransferRequest,
    ) -> Result<FeeQuote<Amount>, PipelineError> {
        let state = self
            .adapter
            .fetch_state(address)
            .await
            .map_err(PipelineError::at(Stage::Draft))?;

        let fee_for = |priority: FeePriority| -> Result<u128, PipelineError> {
            let tiered = request.clone().with_priority(priority);
            let draft = self
                .adapter
                .build(&state, &tiered)
                .map_err(PipelineError::at(Stage::Draft))?;
            Ok(draft.fee)
        };
        let fees = FeeQuote::from_tiers(
            fee_for(FeePriority::Priority)?,
            fee_for(FeePriority::Normal)?,
            fee_for(FeePriority::Minimum)?,
        );
        let exponent = self.adapter.exponent();
        let quote = fees
            .try_map(|fee| Amount::from_minor_units(fee, exponent))
            .map_err(|err| PipelineError::at(Stage::Draft)(err.into()))?;
        debug!(chain = %self.adapter.kind(), ?quote, "estimated fee");
        Ok(quote)
    }

    /// Run the whole pipeline and return the broadcast transaction id.
    ///
    /// Returns as soon as one node accepts the transaction; confirmation is
    /// not awaited.
    pub async fn send(
        &self,
        address: &str,
        request: &TransferRequest,
        signer: &dyn ExternalSigner,
    ) -> Result<TxId, PipelineError> {
        let chain = self.adapter.kind();

        // Draft
        let state = self
            .adapter
            .fetch_state(address)
            .await
            .map_err(PipelineError::at(Stage::Draft))?;
        let draft = self
            .adapter
            .build(&state, request)
            .map_err(PipelineError::at(Stage::Draft))?;
        info!(
            %chain,
            inputs = draft.input_count(),
            fee = %draft.fee,
            change = draft.change.is_some(),
            "draft built"
        );

        // PreImage
        let requests = self
            .adapter
            .derive_preimages(&draft)
            .map_err(PipelineError::at(Stage::PreImage))?;
        debug!(%chain, digests = requests.len(), "pre-images derived");

        // Signed
        let signatures = self
            .collect_signatures(&requests, signer)
            .await
            .map_err(PipelineError::at(Stage::Signed))?;
        info!(%chain, signatures = signatures.len(), "signatures normalized");

        // Broadcast
        let payload = self
            .adapter
            .assemble(draft, signatures)
            .map_err(PipelineError::at(Stage::Broadcast))?;
        let txid = self
            .adapter
            .broadcast(&payload)
            .await
            .map_err(PipelineError::at(Stage::Broadcast))?;
        info!(%chain, %txid, host = %self.adapter.host(), "transaction broadcast");
        Ok(txid)
    }

    async fn collect_signatures(
        &self,
        requests: &[SigningRequest],
        signer: &dyn ExternalSigner,
    ) -> Result<Vec<NormalizedSignature>, CoreError> {
        let public_key = self.adapter.public_key();

        let raw: Vec<RawSignature> = if signer.supports_batch() {
            signer.sign(requests, public_key).await?
        } else {
            let mut raw = Vec::with_capacity(requests.len());
            for request in requests {
                let mut one = signer.sign(slice::from_ref(request), public_key).await?;
                if one.len() != 1 {
                    return Err(SignerError::CountMismatch {
                        expected: 1,
                        actual: one.len(),
                    }
                    .into());
                }
                raw.append(&mut one);
            }
            raw
        };

        if raw.len() != requests.len() {
            warn!(
                expected = requests.len(),
                actual = raw.len(),
                "signer returned the wrong number of signatures"
            );
            return Err(SignerError::CountMismatch {
                expected: requests.len(),
                actual: raw.len(),
            }
            .into());
        }

        let curve = self.adapter.curve();
        requests
            .iter()
            .zip(&raw)
            .map(|(request, raw)| -> Result<NormalizedSignature, CoreError> {
                if raw.curve != curve {
                    return Err(SignatureError::CurveMismatch {
                        expected: curve,
                        actual: raw.curve,
                    }
                    .into());
                }
                Ok(signature::normalize(raw, &request.digest, public_key)?)
            })
            .collect()
    }
}
