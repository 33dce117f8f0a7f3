//! Error taxonomy shared by the pipeline and the network layer.
//!
//! Every fallible operation in the crate returns [`CoreError`]. The provider
//! pool only retries errors whose [`ErrorKind`] is `Network`; everything else
//! aborts the current operation and is handed back to the caller, who can use
//! [`CoreError::remedy`] to decide what to tell the user.

use std::fmt;

use crate::amount::AmountError;

// ==============================================================================
// Classification
// ==============================================================================

/// Coarse error category used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient transport failure. Retried on the next provider.
    Network,
    /// Definitive rejection from a well-formed node response.
    Application,
    /// Draft construction failed before anything touched the network.
    Build,
    /// Signature could not be normalized or aggregated.
    Signature,
    /// The external signer refused or failed.
    Signer,
    /// Invalid configuration or caller-supplied data.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Application => write!(f, "application"),
            Self::Build => write!(f, "build"),
            Self::Signature => write!(f, "signature"),
            Self::Signer => write!(f, "signer"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// What a caller can do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// The same request may succeed later.
    TryAgain,
    /// The request has to change (amount, destination, fee tier).
    ChangeInput,
    /// The request will never succeed against this chain.
    Never,
}

// ==============================================================================
// Top-level Error
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by node: {0}")]
    Application(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Application(_) => ErrorKind::Application,
            Self::Build(_) => ErrorKind::Build,
            Self::Signature(_) => ErrorKind::Signature,
            Self::Signer(_) => ErrorKind::Signer,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Only network errors are retryable by the provider pool.
    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    pub fn remedy(&self) -> Remedy {
        match self {
            Self::Network(_) | Self::Signer(_) => Remedy::TryAgain,
            Self::Build(_) | Self::Config(_) => Remedy::ChangeInput,
            Self::Application(_) | Self::Signature(_) => Remedy::Never,
        }
    }
}

impl From<AmountError> for CoreError {
    fn from(err: AmountError) -> Self {
        Self::Build(BuildError::Amount(err))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ==============================================================================
// Stage Errors
// ==============================================================================

/// Failures while turning chain state into an unsigned draft.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("insufficient funds: short by {shortfall} minor units")]
    InsufficientFunds { shortfall: u128 },

    #[error(
        "too many inputs: only {max_inputs} outputs fit in one transaction, \
         spendable at most {max_spendable} minor units"
    )]
    TooManyInputs { max_inputs: u32, max_spendable: u128 },

    #[error("fee unavailable: {0}")]
    FeeUnavailable(String),

    #[error("invalid destination `{destination}`: {reason}")]
    InvalidDestination { destination: String, reason: String },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount is below the dust threshold of {minimum} minor units")]
    BelowDust { minimum: u128 },

    #[error("arithmetic overflow while {0}")]
    Overflow(&'static str),

    #[error("chain state does not match this adapter: {0}")]
    StateMismatch(String),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Failures normalizing or aggregating raw signatures. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigest { expected: usize, actual: usize },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("no recovery id reproduces the expected public key")]
    RecoveryFailed,

    #[error("signature aggregation failed: {0}")]
    AggregationFailed(String),

    #[error("signature curve {actual} does not match chain curve {expected}")]
    CurveMismatch {
        expected: crate::types::Curve,
        actual: crate::types::Curve,
    },
}

/// Failures reported by the external signer, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("signer rejected the request: {0}")]
    Rejected(String),

    #[error("signer timed out")]
    Timeout,

    #[error("signer returned {actual} signatures for {expected} digests")]
    CountMismatch { expected: usize, actual: usize },

    #[error("signer failure: {0}")]
    Other(String),
}
