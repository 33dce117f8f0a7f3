pub mod adapter;
pub mod amount;
pub mod chains;
pub mod config;
pub mod error;
pub mod fee;
pub mod pipeline;
pub mod provider;
pub mod select;
pub mod signature;
pub mod signer;
pub mod types;

#[cfg(test)]
mod test_util;

pub use adapter::{build_adapter, ChainKind, ChainTxAdapter};
pub use amount::Amount;
pub use error::{CoreError, ErrorKind, Remedy};
pub use fee::FeeQuote;
pub use pipeline::{PipelineError, Stage, TransactionPipeline};
pub use signer::{ExternalSigner, SoftwareSigner};
pub use types::{FeePriority, TransferRequest, TxId};
