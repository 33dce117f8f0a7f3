mod cli;

use clap::Parser;
use eyre::{bail, eyre, WrapErr};

use coinkit_core::config::EndpointConfig;
use coinkit_core::{
    build_adapter, Amount, FeeQuote, PipelineError, Remedy, SoftwareSigner, TransactionPipeline,
    TransferRequest,
};

use cli::{Cli, Command, TransferArgs};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let endpoints: Vec<EndpointConfig> = EndpointConfig::parse_list(&args.providers)
        .context("parse provider list")?
        .into_iter()
        .map(|endpoint| {
            endpoint
                .with_auth(args.provider_user.clone(), args.provider_pass.clone())
                .with_rate_limit(args.rps)
        })
        .collect();

    let signer = args
        .secret_key
        .as_deref()
        .map(SoftwareSigner::from_hex)
        .transpose()
        .context("load secret key")?;
    let public_key = match (&args.public_key, &signer) {
        (Some(hex_key), _) => hex::decode(hex_key.trim()).context("decode public key")?,
        (None, Some(signer)) => signer.public_key().serialize().to_vec(),
        (None, None) => bail!("either --public-key or --secret-key is required"),
    };

    let adapter = build_adapter(args.chain, &public_key, &endpoints)
        .with_context(|| format!("set up {} adapter", args.chain))?;
    let address = adapter.address();
    tracing::info!(chain = %args.chain, %address, host = %adapter.host(), "wallet ready");
    let pipeline = TransactionPipeline::new(adapter);

    match args.command {
        Command::Host => {
            println!("chain:    {}", args.chain);
            println!("address:  {address}");
            println!("provider: {}", pipeline.host());
        }
        Command::Fee { transfer, json } => {
            let request = transfer_request(&transfer, args.chain.exponent())?;
            let quote = pipeline
                .estimate_fee(&address, &request)
                .await
                .map_err(report)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&quote)?);
            } else {
                print_quote(&quote, &args.chain.to_string());
            }
        }
        Command::Send { transfer } => {
            let Some(signer) = signer else {
                bail!("sending requires --secret-key");
            };
            let request = transfer_request(&transfer, args.chain.exponent())?;

            // Nothing is persisted before broadcast, so an interrupted run
            // leaves no trace.
            let txid = tokio::select! {
                result = pipeline.send(&address, &request, &signer) => result.map_err(report)?,
                _ = tokio::signal::ctrl_c() => bail!("interrupted before broadcast completed"),
            };
            println!("{txid}");
        }
    }

    Ok(())
}

fn transfer_request(args: &TransferArgs, exponent: u8) -> eyre::Result<TransferRequest> {
    let amount = Amount::parse(&args.amount, exponent)
        .with_context(|| format!("parse amount `{}`", args.amount))?;
    Ok(TransferRequest::new(args.to.clone(), amount).with_priority(args.priority))
}

fn print_quote(quote: &FeeQuote<Amount>, chain: &str) {
    match quote {
        FeeQuote::Single(fee) => println!("fee: {fee} ({chain})"),
        FeeQuote::Choosable {
            priority,
            normal,
            minimum,
        } => {
            println!("priority: {priority} ({chain})");
            println!("normal:   {normal} ({chain})");
            println!("minimum:  {minimum} ({chain})");
        }
    }
}

/// Attach a hint matching what the caller can do about the failure.
fn report(err: PipelineError) -> eyre::Report {
    let hint = match err.remedy() {
        Remedy::TryAgain => {
            "hint: the failure looks temporary; try again or add more providers"
        }
        Remedy::ChangeInput => "hint: adjust the amount, destination, or fee tier",
        Remedy::Never => "hint: the chain rejected this transfer; retrying will not help",
    };
    eyre!(err).wrap_err(hint)
}
