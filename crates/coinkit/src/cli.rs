use clap::{Parser, Subcommand};

use coinkit_core::{ChainKind, FeePriority};

/// Fee quotes and transfers for Bitcoin-family and EVM chains.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Chain to operate on (bitcoin, bitcoin-testnet, bitcoin-signet,
    /// bitcoin-regtest, ethereum, sepolia, polygon, bsc).
    #[arg(long, default_value = "bitcoin", env = "COINKIT_CHAIN")]
    pub chain: ChainKind,

    /// Comma-separated provider URLs, tried round-robin on network errors.
    /// Esplora base URLs for Bitcoin-family chains, JSON-RPC URLs for EVM.
    #[arg(long, env = "COINKIT_PROVIDERS")]
    pub providers: String,

    /// Basic-auth username applied to every provider (optional).
    #[arg(long, env = "COINKIT_PROVIDER_USER")]
    pub provider_user: Option<String>,

    /// Basic-auth password applied to every provider (optional).
    #[arg(long, env = "COINKIT_PROVIDER_PASS", hide_env_values = true)]
    pub provider_pass: Option<String>,

    /// Per-provider request rate limit, in requests per second.
    #[arg(long, env = "COINKIT_RPS")]
    pub rps: Option<u32>,

    /// Wallet public key (SEC1 hex). Derived from the secret key if omitted.
    #[arg(long, env = "COINKIT_PUBLIC_KEY")]
    pub public_key: Option<String>,

    /// Wallet secret key (hex). Only `send` needs it.
    #[arg(long, env = "COINKIT_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Quote the fee for a transfer without signing anything.
    Fee {
        #[command(flatten)]
        transfer: TransferArgs,

        /// Print the quote as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Build, sign, and broadcast a transfer.
    Send {
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Show the wallet address and the provider currently in use.
    Host,
}

#[derive(clap::Args)]
pub struct TransferArgs {
    /// Destination address.
    #[arg(long)]
    pub to: String,

    /// Amount in whole units of the chain's native asset, e.g. `0.015`.
    #[arg(long)]
    pub amount: String,

    /// Fee tier: minimum, normal, or priority.
    #[arg(long, default_value = "normal")]
    pub priority: FeePriority,
}
