//! Bitcoin-family adapter for P2WPKH wallets.
//!
//! State comes from an Esplora-compatible REST backend (`/address/{a}/utxo`,
//! `/fee-estimates`, `POST /tx`). Each input is signed separately over its
//! BIP143 digest; the witness carries the DER signature with `SIGHASH_ALL`
//! and the compressed public key. Inputs signal replace-by-fee.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    absolute, transaction, Address, Amount, CompressedPublicKey, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::adapter::{ChainKind, ChainTxAdapter};
use crate::config::BitcoinConfig;
use crate::error::{BuildError, CoreError, SignerError};
use crate::fee::{FeeModel, FeeQuote, MassFee, TxShape};
use crate::provider::{Endpoint, HttpEndpoint, ProviderPool};
use crate::select::CoinSelector;
use crate::signature::NormalizedSignature;
use crate::types::{
    ChainState, DraftInputs, DraftOutput, FeeMarket, Ledger, SignedPayload, SigningRequest,
    TransferRequest, TxId, UnsignedDraft, UnspentOutput,
};

const EXPONENT: u8 = 8;

// ==============================================================================
// Esplora Backend
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EsploraUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub status: EsploraStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EsploraStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// The Esplora REST calls the adapter needs.
#[async_trait]
pub trait EsploraApi: Endpoint {
    async fn utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>, CoreError>;

    /// Confirmation target in blocks mapped to a fee rate in sat/vB.
    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, CoreError>;

    /// Submit a raw transaction in hex. Returns the txid the node reports.
    async fn broadcast(&self, raw_hex: String) -> Result<String, CoreError>;
}

#[async_trait]
impl EsploraApi for HttpEndpoint {
    async fn utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>, CoreError> {
        self.get_json(&format!("address/{address}/utxo")).await
    }

    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, CoreError> {
        self.get_json("fee-estimates").await
    }

    async fn broadcast(&self, raw_hex: String) -> Result<String, CoreError> {
        self.post_text("tx", raw_hex).await
    }
}

/// Rate for `target` blocks: the estimate for the largest target not above
/// it, or the fastest estimate when every target is slower.
fn rate_for_target(estimates: &HashMap<String, f64>, target: u16, floor: u64) -> Option<u64> {
    let mut parsed: Vec<(u16, f64)> = estimates
        .iter()
        .filter_map(|(blocks, rate)| Some((blocks.parse::<u16>().ok()?, *rate)))
        .filter(|(_, rate)| rate.is_finite() && *rate >= 0.0)
        .collect();
    parsed.sort_by_key(|(blocks, _)| *blocks);

    let rate = parsed
        .iter()
        .rev()
        .find(|(blocks, _)| *blocks <= target)
        .or_else(|| parsed.first())
        .map(|(_, rate)| *rate)?;
    Some((rate.ceil() as u64).max(floor))
}

// ==============================================================================
// Adapter
// ==============================================================================

pub struct BitcoinAdapter<E> {
    kind: ChainKind,
    config: BitcoinConfig,
    public_key: CompressedPublicKey,
    public_key_bytes: Vec<u8>,
    address: Address,
    pool: ProviderPool<E>,
}

impl<E: EsploraApi> BitcoinAdapter<E> {
    pub fn new(
        kind: ChainKind,
        config: BitcoinConfig,
        public_key: &[u8],
        pool: ProviderPool<E>,
    ) -> Result<Self, CoreError> {
        let public_key = CompressedPublicKey::from_slice(public_key).map_err(|e| {
            CoreError::Config(format!("bitcoin wallets need a compressed public key: {e}"))
        })?;
        let address = Address::p2wpkh(&public_key, config.network);
        Ok(Self {
            kind,
            config,
            public_key_bytes: public_key.to_bytes().to_vec(),
            public_key,
            address,
            pool,
        })
    }

    pub fn config(&self) -> &BitcoinConfig {
        &self.config
    }

    fn parse_address(&self, text: &str) -> Result<Address, BuildError> {
        let invalid = |reason: String| BuildError::InvalidDestination {
            destination: text.to_owned(),
            reason,
        };
        text.parse::<Address<NetworkUnchecked>>()
            .map_err(|e| invalid(e.to_string()))?
            .require_network(self.config.network)
            .map_err(|e| invalid(e.to_string()))
    }

    fn script_for(&self, destination: &str) -> Result<ScriptBuf, BuildError> {
        Ok(self.parse_address(destination)?.script_pubkey())
    }

    fn to_utxo(&self, utxo: EsploraUtxo) -> Result<UnspentOutput, CoreError> {
        let outpoint_id = hex::decode(&utxo.txid)
            .map_err(|e| CoreError::Network(format!("backend returned bad txid {}: {e}", utxo.txid)))?;
        Ok(UnspentOutput {
            outpoint_id,
            output_index: utxo.vout,
            amount: u128::from(utxo.value),
            locking_script: self.address.script_pubkey().into_bytes(),
            confirmed_height: utxo.status.block_height.filter(|_| utxo.status.confirmed),
        })
    }

    fn fee_rates(&self, estimates: &HashMap<String, f64>) -> Result<FeeQuote<u64>, BuildError> {
        let targets = self.config.fee_targets;
        let floor = self.config.min_fee_rate;
        let rate = |target| {
            rate_for_target(estimates, target, floor).ok_or_else(|| {
                BuildError::FeeUnavailable("backend returned no fee estimates".to_owned())
            })
        };
        Ok(FeeQuote::from_tiers(
            rate(targets.priority)?,
            rate(targets.normal)?,
            rate(targets.minimum)?,
        ))
    }

    fn unsigned_transaction(&self, draft: &UnsignedDraft) -> Result<Transaction, CoreError> {
        let DraftInputs::Utxo(utxos) = &draft.inputs else {
            return Err(BuildError::StateMismatch("bitcoin drafts spend UTXOs".to_owned()).into());
        };

        let input = utxos
            .iter()
            .map(|utxo| -> Result<TxIn, CoreError> {
                let txid = Txid::from_str(&hex::encode(&utxo.outpoint_id)).map_err(|e| {
                    BuildError::StateMismatch(format!("outpoint id is not a txid: {e}"))
                })?;
                Ok(TxIn {
                    previous_output: OutPoint::new(txid, utxo.output_index),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let output = draft
            .outputs
            .iter()
            .chain(draft.change.as_ref())
            .map(|out| -> Result<TxOut, CoreError> {
                Ok(TxOut {
                    value: sats(out.amount)?,
                    script_pubkey: self.script_for(&out.destination)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        })
    }
}

fn sats(amount: u128) -> Result<Amount, BuildError> {
    u64::try_from(amount)
        .map(Amount::from_sat)
        .map_err(|_| BuildError::Overflow("converting to satoshi"))
}

#[async_trait]
impl<E: EsploraApi + 'static> ChainTxAdapter for BitcoinAdapter<E> {
    fn kind(&self) -> ChainKind {
        self.kind
    }

    fn exponent(&self) -> u8 {
        EXPONENT
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key_bytes
    }

    fn address(&self) -> String {
        self.address.to_string()
    }

    fn host(&self) -> String {
        self.pool.host()
    }

    async fn fetch_state(&self, address: &str) -> Result<ChainState, CoreError> {
        if self.parse_address(address)? != self.address {
            return Err(BuildError::StateMismatch(format!(
                "{address} is not this wallet's address {}",
                self.address
            ))
            .into());
        }
        let owned = address.to_owned();
        let utxos = self.pool.perform(|p| {
            let address = owned.clone();
            async move { p.utxos(&address).await }
        });
        let estimates = self.pool.perform(|p| async move { p.fee_estimates().await });
        let (utxos, estimates) = futures::try_join!(utxos, estimates)?;

        let utxos = utxos
            .into_iter()
            .map(|utxo| self.to_utxo(utxo))
            .collect::<Result<Vec<_>, _>>()?;
        let rates = self.fee_rates(&estimates)?;
        debug!(
            chain = %self.kind,
            address,
            utxos = utxos.len(),
            ?rates,
            "fetched bitcoin state"
        );

        Ok(ChainState {
            address: address.to_owned(),
            ledger: Ledger::Utxo(utxos),
            fee_market: FeeMarket::MassRates(rates),
        })
    }

    fn build(
        &self,
        state: &ChainState,
        request: &TransferRequest,
    ) -> Result<UnsignedDraft, CoreError> {
        let Ledger::Utxo(utxos) = &state.ledger else {
            return Err(BuildError::StateMismatch("expected a UTXO ledger".to_owned()).into());
        };
        let FeeMarket::MassRates(rates) = state.fee_market else {
            return Err(BuildError::StateMismatch("expected mass fee rates".to_owned()).into());
        };
        if request.amount.exponent() != EXPONENT {
            return Err(BuildError::Amount(crate::amount::AmountError::Exponent(
                request.amount.exponent(),
            ))
            .into());
        }
        self.parse_address(&request.destination)?;

        let target = request.amount.to_minor_units()?;
        let dust = u128::from(self.config.dust_threshold);
        if target > 0 && target < dust {
            return Err(BuildError::BelowDust { minimum: dust }.into());
        }

        let model = MassFee::p2wpkh(rates);
        let selection = CoinSelector::new(self.config.selection_policy()).select(
            utxos,
            target,
            1,
            &model,
            request.priority,
        )?;

        let change = selection.change.map(|amount| DraftOutput {
            destination: self.address.to_string(),
            amount,
        });
        let shape = TxShape::new(selection.inputs.len(), 1 + usize::from(change.is_some()));
        Ok(UnsignedDraft {
            inputs: DraftInputs::Utxo(selection.inputs),
            outputs: vec![DraftOutput {
                destination: request.destination.clone(),
                amount: target,
            }],
            change,
            fee: selection.fee,
            fee_detail: model.detail(shape, request.priority)?,
        })
    }

    fn derive_preimages(&self, draft: &UnsignedDraft) -> Result<Vec<SigningRequest>, CoreError> {
        let DraftInputs::Utxo(utxos) = &draft.inputs else {
            return Err(BuildError::StateMismatch("bitcoin drafts spend UTXOs".to_owned()).into());
        };
        let tx = self.unsigned_transaction(draft)?;
        let mut cache = SighashCache::new(&tx);

        utxos
            .iter()
            .enumerate()
            .map(|(index, utxo)| -> Result<SigningRequest, CoreError> {
                let script = ScriptBuf::from_bytes(utxo.locking_script.clone());
                let sighash = cache
                    .p2wpkh_signature_hash(index, &script, sats(utxo.amount)?, EcdsaSighashType::All)
                    .map_err(|e| BuildError::StateMismatch(format!("input {index}: {e}")))?;
                let index = u32::try_from(index)
                    .map_err(|_| BuildError::Overflow("counting inputs"))?;
                Ok(SigningRequest::for_input(
                    sighash.to_byte_array(),
                    index,
                    utxo.locking_script.clone(),
                ))
            })
            .collect()
    }

    fn assemble(
        &self,
        draft: UnsignedDraft,
        signatures: Vec<NormalizedSignature>,
    ) -> Result<SignedPayload, CoreError> {
        let mut tx = self.unsigned_transaction(&draft)?;
        if signatures.len() != tx.input.len() {
            return Err(SignerError::CountMismatch {
                expected: tx.input.len(),
                actual: signatures.len(),
            }
            .into());
        }

        for (input, signature) in tx.input.iter_mut().zip(&signatures) {
            let mut der = signature.as_ecdsa()?.to_der()?;
            der.push(EcdsaSighashType::All as u8);
            input.witness = Witness::from_slice(&[der, self.public_key_bytes.clone()]);
        }

        let txid = tx.compute_txid();
        let bytes = bitcoin::consensus::encode::serialize(&tx);
        info!(
            chain = %self.kind,
            %txid,
            vsize = tx.vsize(),
            fee = %draft.fee,
            "assembled bitcoin transaction"
        );
        Ok(SignedPayload {
            bytes,
            txid: TxId(txid.to_string()),
        })
    }

    async fn broadcast(&self, payload: &SignedPayload) -> Result<TxId, CoreError> {
        let raw = payload.to_hex();
        let reported = self
            .pool
            .perform(|p| {
                let raw = raw.clone();
                async move { p.broadcast(raw).await }
            })
            .await?;
        let reported = reported.trim();
        if reported != payload.txid.0 {
            warn!(
                expected = %payload.txid,
                reported,
                "backend reported a different txid"
            );
        }
        Ok(payload.txid.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bitcoin::consensus::encode::deserialize;
    use secp256k1::{Message, Secp256k1};

    use super::*;
    use crate::amount::Amount as CoinAmount;
    use crate::signature;
    use crate::signer::{ExternalSigner, SoftwareSigner};
    use crate::test_util::{public_key_bytes, secret_key};
    use crate::types::FeePriority;

    struct MockEsplora {
        utxos: Vec<EsploraUtxo>,
        estimates: HashMap<String, f64>,
        broadcasts: Mutex<Vec<String>>,
    }

    impl Endpoint for MockEsplora {
        fn base_url(&self) -> &str {
            "mock://esplora"
        }
    }

    #[async_trait]
    impl EsploraApi for MockEsplora {
        async fn utxos(&self, _address: &str) -> Result<Vec<EsploraUtxo>, CoreError> {
            Ok(self.utxos.clone())
        }

        async fn fee_estimates(&self) -> Result<HashMap<String, f64>, CoreError> {
            Ok(self.estimates.clone())
        }

        async fn broadcast(&self, raw_hex: String) -> Result<String, CoreError> {
            let tx: Transaction = deserialize(&hex::decode(&raw_hex).expect("hex"))
                .expect("valid transaction");
            self.broadcasts.lock().expect("lock").push(raw_hex);
            Ok(tx.compute_txid().to_string())
        }
    }

    fn esplora_utxo(id: u8, value: u64) -> EsploraUtxo {
        EsploraUtxo {
            txid: hex::encode([id; 32]),
            vout: u32::from(id),
            value,
            status: EsploraStatus {
                confirmed: true,
                block_height: Some(800_000),
            },
        }
    }

    fn estimates() -> HashMap<String, f64> {
        [("1", 20.3), ("4", 10.0), ("8", 2.0), ("144", 1.0)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    fn adapter(values: &[u64]) -> BitcoinAdapter<MockEsplora> {
        let backend = MockEsplora {
            utxos: values
                .iter()
                .enumerate()
                .map(|(i, v)| esplora_utxo(i as u8 + 1, *v))
                .collect(),
            estimates: estimates(),
            broadcasts: Mutex::new(Vec::new()),
        };
        BitcoinAdapter::new(
            ChainKind::BitcoinRegtest,
            ChainKind::BitcoinRegtest
                .bitcoin_config()
                .expect("bitcoin family"),
            &public_key_bytes(&secret_key(0x41)),
            ProviderPool::new(vec![backend]).expect("pool"),
        )
        .expect("adapter")
    }

    fn destination() -> String {
        let key = CompressedPublicKey::from_slice(&public_key_bytes(&secret_key(0x42)))
            .expect("compressed key");
        Address::p2wpkh(&key, bitcoin::Network::Regtest).to_string()
    }

    fn request(sats: u64) -> TransferRequest {
        TransferRequest::new(
            destination(),
            CoinAmount::from_minor_units(u128::from(sats), 8).expect("amount"),
        )
    }

    #[test]
    fn rate_for_target_picks_nearest_faster_estimate() {
        let estimates = estimates();
        assert_eq!(rate_for_target(&estimates, 1, 1), Some(21));
        assert_eq!(rate_for_target(&estimates, 6, 1), Some(10));
        assert_eq!(rate_for_target(&estimates, 200, 1), Some(1));
        assert_eq!(rate_for_target(&estimates, 200, 3), Some(3));
        assert_eq!(rate_for_target(&HashMap::new(), 1, 1), None);
    }

    #[tokio::test]
    async fn fetch_state_snapshots_utxos_and_fee_tiers() {
        let adapter = adapter(&[5000, 3000]);
        let state = adapter
            .fetch_state(&adapter.address())
            .await
            .expect("state");

        let Ledger::Utxo(utxos) = &state.ledger else {
            panic!("expected utxo ledger");
        };
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].confirmed_height, Some(800_000));
        assert_eq!(
            utxos[0].locking_script,
            adapter.address.script_pubkey().into_bytes()
        );
        assert_eq!(
            state.fee_market,
            FeeMarket::MassRates(FeeQuote::Choosable {
                priority: 21,
                normal: 10,
                minimum: 2
            })
        );
    }

    #[tokio::test]
    async fn fetch_state_refuses_an_address_the_wallet_does_not_own() {
        let adapter = adapter(&[5000]);
        let err = adapter
            .fetch_state(&destination())
            .await
            .expect_err("someone else's address");
        assert!(matches!(
            err,
            CoreError::Build(BuildError::StateMismatch(_))
        ));
    }

    #[tokio::test]
    async fn fetch_state_rejects_foreign_network_address() {
        let adapter = adapter(&[5000]);
        let err = adapter
            .fetch_state("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .await
            .expect_err("mainnet address on regtest");
        assert!(matches!(
            err,
            CoreError::Build(BuildError::InvalidDestination { .. })
        ));
    }

    #[tokio::test]
    async fn build_sign_assemble_produces_valid_witnesses() {
        let adapter = adapter(&[50_000, 30_000, 10_000]);
        let state = adapter
            .fetch_state(&adapter.address())
            .await
            .expect("state");
        let request = request(60_000).with_priority(FeePriority::Minimum);

        let draft = adapter.build(&state, &request).expect("draft");
        assert_eq!(draft.input_count(), 2);
        assert_eq!(draft.fee, 209 * 2);
        assert_eq!(
            draft.total_input(),
            Some(draft.total_output() + draft.fee)
        );

        let preimages = adapter.derive_preimages(&draft).expect("preimages");
        assert_eq!(preimages.len(), 2);
        assert_eq!(preimages[1].context.input_index, Some(1));

        let signer = SoftwareSigner::new(secret_key(0x41));
        let raw = signer
            .sign(&preimages, adapter.public_key())
            .await
            .expect("signatures");
        let normalized = preimages
            .iter()
            .zip(&raw)
            .map(|(p, r)| signature::normalize(r, &p.digest, adapter.public_key()))
            .collect::<Result<Vec<_>, _>>()
            .expect("normalized");

        let payload = adapter.assemble(draft, normalized).expect("payload");
        let tx: Transaction = deserialize(&payload.bytes).expect("decodes");
        assert_eq!(tx.compute_txid().to_string(), payload.txid.0);
        assert!(tx
            .input
            .iter()
            .all(|i| i.sequence == Sequence::ENABLE_RBF_NO_LOCKTIME));

        let secp = Secp256k1::verification_only();
        for (input, preimage) in tx.input.iter().zip(&preimages) {
            let sig = bitcoin::ecdsa::Signature::from_slice(input.witness.nth(0).expect("sig"))
                .expect("der + sighash");
            assert_eq!(sig.sighash_type, EcdsaSighashType::All);
            let digest: [u8; 32] = preimage.digest.clone().try_into().expect("32 bytes");
            secp.verify_ecdsa(&Message::from_digest(digest), &sig.signature, &adapter.public_key.0)
                .expect("witness signature verifies");
            assert_eq!(input.witness.nth(1), Some(adapter.public_key()));
        }

        let txid = adapter.broadcast(&payload).await.expect("broadcast");
        assert_eq!(txid, payload.txid);
    }

    #[tokio::test]
    async fn assemble_rejects_missing_signatures() {
        let adapter = adapter(&[50_000, 30_000]);
        let state = adapter
            .fetch_state(&adapter.address())
            .await
            .expect("state");
        let draft = adapter.build(&state, &request(60_000)).expect("draft");
        let err = adapter.assemble(draft, Vec::new()).expect_err("no signatures");
        assert!(matches!(
            err,
            CoreError::Signer(SignerError::CountMismatch {
                expected: 2,
                actual: 0
            })
        ));
    }

    #[tokio::test]
    async fn dust_amounts_are_rejected() {
        let adapter = adapter(&[50_000]);
        let state = adapter
            .fetch_state(&adapter.address())
            .await
            .expect("state");
        let err = adapter.build(&state, &request(100)).expect_err("dust");
        assert!(matches!(
            err,
            CoreError::Build(BuildError::BelowDust { minimum: 546 })
        ));
    }
}
