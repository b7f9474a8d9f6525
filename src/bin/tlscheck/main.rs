//! tlscheck server entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use tlscheck::ServerBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();
    let json_logs = cli.json_logs;

    // Build configuration
    let config = cli.into_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("tlscheck v{}", env!("CARGO_PKG_VERSION"));

    // Build and run the server
    let server = ServerBuilder::new(config).build().await?;

    // Run until shutdown
    server.run().await?;

    info!("Goodbye!");
    Ok(())
}
