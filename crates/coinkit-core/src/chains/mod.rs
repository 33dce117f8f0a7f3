//! Concrete chain adapters.

pub mod bitcoin;
pub mod evm;

pub use self::bitcoin::{BitcoinAdapter, EsploraApi};
pub use self::evm::{EvmAdapter, EvmRpc};
