//! One-shot domain verification from the command line.
//!
//! Runs the same pipeline as the server and prints the status code and
//! message it would have answered with.
//!
//! Usage:
//!   tlscheck-probe example.com --config /etc/tlscheck/config.toml

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tlscheck::{CheckConfig, DomainVerifier};
use tracing_subscriber::EnvFilter;

/// Check a single domain and exit 0 if it is allowed.
#[derive(Parser, Debug)]
#[command(name = "tlscheck-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Domain to verify.
    domain: String,

    /// Path to configuration file.
    #[arg(long, short, env = "TLSCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Disable the Cloudflare fallback.
    #[arg(long)]
    no_cdn: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match args.config {
        Some(ref path) => CheckConfig::from_file(path)?,
        None => CheckConfig::default(),
    };
    if args.no_cdn {
        config.cdn.enabled = false;
    }

    let verifier = DomainVerifier::from_config(&config)?;
    let outcome = verifier.verify(&args.domain).await;

    println!("{} {}", outcome.status_code(), outcome.message());

    Ok(if outcome.is_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
