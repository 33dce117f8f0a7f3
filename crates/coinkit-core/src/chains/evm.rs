//! EVM adapter for legacy (EIP-155) native-asset transfers.
//!
//! Account-model chains sign exactly one digest: the Keccak-256 hash of the
//! RLP list `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`.
//! The signed transaction replaces the last three items with
//! `v = recovery_id + 2 * chainId + 35`, `r` and `s`.

use async_trait::async_trait;
use rlp::RlpStream;
use secp256k1::PublicKey;
use sha3::{Digest, Keccak256};
use tracing::{debug, info, warn};

use crate::adapter::{ChainKind, ChainTxAdapter};
use crate::config::EvmConfig;
use crate::error::{BuildError, CoreError, SignerError};
use crate::fee::{FeeModel, GasFee, TxShape};
use crate::provider::{Endpoint, HttpEndpoint, ProviderPool};
use crate::signature::{EcdsaSignature, NormalizedSignature};
use crate::types::{
    ChainState, DraftInputs, DraftOutput, FeeDetail, FeeMarket, Ledger, SignedPayload,
    SigningRequest, TransferRequest, TxId, UnsignedDraft,
};

// ==============================================================================
// JSON-RPC Backend
// ==============================================================================

#[async_trait]
pub trait EvmRpc: Endpoint {
    /// Nonce for the next transaction, counting pending ones.
    async fn transaction_count(&self, address: &str) -> Result<u64, CoreError>;
    async fn balance(&self, address: &str) -> Result<u128, CoreError>;
    async fn gas_price(&self) -> Result<u128, CoreError>;
    /// Returns the transaction hash the node reports.
    async fn send_raw_transaction(&self, raw_hex: String) -> Result<String, CoreError>;
}

/// Parse a JSON-RPC hex quantity such as `"0x1bc16d674ec80000"`.
pub fn parse_quantity(value: &serde_json::Value) -> Result<u128, CoreError> {
    let text = value
        .as_str()
        .ok_or_else(|| CoreError::Network(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| CoreError::Network(format!("hex quantity `{text}` lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| CoreError::Network(format!("invalid hex quantity `{text}`: {e}")))
}

#[async_trait]
impl EvmRpc for HttpEndpoint {
    async fn transaction_count(&self, address: &str) -> Result<u64, CoreError> {
        let raw = self
            .rpc_call(
                "eth_getTransactionCount",
                vec![serde_json::json!(address), serde_json::json!("pending")],
            )
            .await?;
        u64::try_from(parse_quantity(&raw)?)
            .map_err(|_| CoreError::Network(format!("nonce {raw} out of range")))
    }

    async fn balance(&self, address: &str) -> Result<u128, CoreError> {
        let raw = self
            .rpc_call(
                "eth_getBalance",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await?;
        parse_quantity(&raw)
    }

    async fn gas_price(&self) -> Result<u128, CoreError> {
        let raw = self.rpc_call("eth_gasPrice", Vec::new()).await?;
        parse_quantity(&raw)
    }

    async fn send_raw_transaction(&self, raw_hex: String) -> Result<String, CoreError> {
        let raw = self
            .rpc_call("eth_sendRawTransaction", vec![serde_json::json!(raw_hex)])
            .await?;
        raw.as_str()
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Network(format!("unexpected send result {raw}")))
    }
}

// ==============================================================================
// Address Helpers
// ==============================================================================

fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Lower-case hex address of a secp256k1 public key.
pub fn address_of(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

fn parse_address(text: &str) -> Result<[u8; 20], BuildError> {
    let invalid = |reason: &str| BuildError::InvalidDestination {
        destination: text.to_owned(),
        reason: reason.to_owned(),
    };
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    let bytes = hex::decode(digits).map_err(|_| invalid("not hex"))?;
    bytes
        .try_into()
        .map_err(|_| invalid("expected 20 bytes"))
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

// ==============================================================================
// Adapter
// ==============================================================================

/// Fields of a legacy transaction, recovered from a draft.
struct LegacyTx {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: [u8; 20],
    value: u128,
}

impl LegacyTx {
    fn rlp_unsigned(&self, chain_id: u64) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        stream.out().to_vec()
    }

    fn rlp_signed(&self, chain_id: u64, signature: &EcdsaSignature) -> Result<Vec<u8>, BuildError> {
        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(signature.recovery_id)))
            .ok_or(BuildError::Overflow("computing EIP-155 v"))?;
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&signature.r));
        stream.append(&trim_leading_zeros(&signature.s));
        Ok(stream.out().to_vec())
    }

    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_vec());
        stream.append(&self.value);
        stream.append(&Vec::<u8>::new());
    }
}

pub struct EvmAdapter<E> {
    kind: ChainKind,
    config: EvmConfig,
    public_key: Vec<u8>,
    address: String,
    pool: ProviderPool<E>,
}

impl<E: EvmRpc> EvmAdapter<E> {
    pub fn new(
        kind: ChainKind,
        config: EvmConfig,
        public_key: &[u8],
        pool: ProviderPool<E>,
    ) -> Result<Self, CoreError> {
        let parsed = PublicKey::from_slice(public_key)
            .map_err(|e| CoreError::Config(format!("invalid secp256k1 public key: {e}")))?;
        Ok(Self {
            kind,
            config,
            public_key: public_key.to_vec(),
            address: address_of(&parsed),
            pool,
        })
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    fn legacy_tx(&self, draft: &UnsignedDraft) -> Result<LegacyTx, BuildError> {
        let DraftInputs::Account { nonce } = draft.inputs else {
            return Err(BuildError::StateMismatch(
                "EVM drafts spend from an account".to_owned(),
            ));
        };
        let FeeDetail::Gas { limit, price } = draft.fee_detail else {
            return Err(BuildError::StateMismatch(
                "EVM drafts carry gas parameters".to_owned(),
            ));
        };
        let [output] = draft.outputs.as_slice() else {
            return Err(BuildError::StateMismatch(
                "EVM transfers have exactly one recipient".to_owned(),
            ));
        };
        Ok(LegacyTx {
            nonce,
            gas_price: price,
            gas_limit: limit,
            to: parse_address(&output.destination)?,
            value: output.amount,
        })
    }
}

#[async_trait]
impl<E: EvmRpc + 'static> ChainTxAdapter for EvmAdapter<E> {
    fn kind(&self) -> ChainKind {
        self.kind
    }

    fn exponent(&self) -> u8 {
        self.config.exponent
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn host(&self) -> String {
        self.pool.host()
    }

    async fn fetch_state(&self, address: &str) -> Result<ChainState, CoreError> {
        // Hex comparison on bytes, so checksummed spellings still match.
        if parse_address(address)? != parse_address(&self.address)? {
            return Err(BuildError::StateMismatch(format!(
                "{address} is not this wallet's address {}",
                self.address
            ))
            .into());
        }
        let owned = address.to_owned();
        let nonce = self.pool.perform(|p| {
            let address = owned.clone();
            async move { p.transaction_count(&address).await }
        });
        let balance = self.pool.perform(|p| {
            let address = owned.clone();
            async move { p.balance(&address).await }
        });
        let gas_price = self.pool.perform(|p| async move { p.gas_price().await });
        let (nonce, balance, gas_price) = futures::try_join!(nonce, balance, gas_price)?;
        debug!(
            chain = %self.kind,
            address,
            nonce,
            balance = %balance,
            gas_price = %gas_price,
            "fetched account state"
        );

        Ok(ChainState {
            address: address.to_owned(),
            ledger: Ledger::Account { nonce, balance },
            fee_market: FeeMarket::GasPrice(gas_price),
        })
    }

    fn build(
        &self,
        state: &ChainState,
        request: &TransferRequest,
    ) -> Result<UnsignedDraft, CoreError> {
        let Ledger::Account { nonce, balance } = state.ledger else {
            return Err(BuildError::StateMismatch("expected an account ledger".to_owned()).into());
        };
        let FeeMarket::GasPrice(price) = state.fee_market else {
            return Err(BuildError::StateMismatch("expected a gas price".to_owned()).into());
        };
        if request.amount.exponent() != self.config.exponent {
            return Err(BuildError::Amount(crate::amount::AmountError::Exponent(
                request.amount.exponent(),
            ))
            .into());
        }
        parse_address(&request.destination)?;

        let value = request.amount.to_minor_units()?;
        if value == 0 {
            return Err(BuildError::ZeroAmount.into());
        }

        let model = GasFee {
            limit: self.config.gas_limit,
            price,
            tiers: self.config.gas_tiers,
        };
        let shape = TxShape::new(1, 1);
        let fee = model.fee_for(shape, request.priority)?;
        let required = value
            .checked_add(fee)
            .ok_or(BuildError::Overflow("adding fee to value"))?;
        if required > balance {
            return Err(BuildError::InsufficientFunds {
                shortfall: required - balance,
            }
            .into());
        }

        Ok(UnsignedDraft {
            inputs: DraftInputs::Account { nonce },
            outputs: vec![DraftOutput {
                destination: request.destination.clone(),
                amount: value,
            }],
            change: None,
            fee,
            fee_detail: model.detail(shape, request.priority)?,
        })
    }

    fn derive_preimages(&self, draft: &UnsignedDraft) -> Result<Vec<SigningRequest>, CoreError> {
        let tx = self.legacy_tx(draft)?;
        let digest = keccak(&tx.rlp_unsigned(self.config.chain_id));
        Ok(vec![SigningRequest::new(digest)])
    }

    fn assemble(
        &self,
        draft: UnsignedDraft,
        signatures: Vec<NormalizedSignature>,
    ) -> Result<SignedPayload, CoreError> {
        let [signature] = signatures.as_slice() else {
            return Err(SignerError::CountMismatch {
                expected: 1,
                actual: signatures.len(),
            }
            .into());
        };
        let tx = self.legacy_tx(&draft)?;
        let bytes = tx.rlp_signed(self.config.chain_id, signature.as_ecdsa()?)?;
        let txid = TxId(format!("0x{}", hex::encode(keccak(&bytes))));
        info!(
            chain = %self.kind,
            %txid,
            nonce = tx.nonce,
            fee = %draft.fee,
            "assembled EVM transaction"
        );
        Ok(SignedPayload { bytes, txid })
    }

    async fn broadcast(&self, payload: &SignedPayload) -> Result<TxId, CoreError> {
        let raw = format!("0x{}", payload.to_hex());
        let reported = self
            .pool
            .perform(|p| {
                let raw = raw.clone();
                async move { p.send_raw_transaction(raw).await }
            })
            .await?;
        if !reported.eq_ignore_ascii_case(&payload.txid.0) {
            warn!(
                expected = %payload.txid,
                reported = %reported,
                "node reported a different transaction hash"
            );
        }
        Ok(payload.txid.clone())
    }
}
