//! Command-line interface definition.

use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tlscheck::config::CheckConfig;

/// Domain ownership gate for TLS certificate issuance.
#[derive(Parser, Debug)]
#[command(name = "tlscheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "TLSCHECK_HOST")]
    pub host: Option<String>,

    /// Listening port.
    #[arg(long, short, env = "TLSCHECK_PORT")]
    pub port: Option<u16>,

    /// Domain to reject outright (repeatable).
    #[arg(long = "block", env = "TLSCHECK_BLOCK_LIST", value_delimiter = ',')]
    pub block_list: Vec<String>,

    /// IP that counts as pointing to us (repeatable).
    #[arg(long = "ip", env = "TLSCHECK_IPS", value_delimiter = ',')]
    pub ips: Vec<Ipv4Addr>,

    /// Maximum number of dots allowed in a domain.
    #[arg(long, env = "TLSCHECK_SUBDOMAIN_AMOUNT")]
    pub subdomain_amount: Option<usize>,

    /// Disable the Cloudflare fallback.
    #[arg(long, env = "TLSCHECK_NO_CDN")]
    pub no_cdn: bool,

    /// URL of the Cloudflare IPv4 range list.
    #[arg(long, env = "TLSCHECK_RANGES_URL")]
    pub ranges_url: Option<String>,

    /// Log level.
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "TLSCHECK_JSON_LOGS")]
    pub json_logs: bool,

    /// Path to configuration file (TOML, or JSON with a `.json` extension).
    #[arg(long, short, env = "TLSCHECK_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into a `CheckConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<CheckConfig> {
        let mut config = load_config(self.config.as_deref())?;

        // Override with CLI arguments that were actually given
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if !self.block_list.is_empty() {
            config.block_list = self.block_list;
        }
        if !self.ips.is_empty() {
            config.ips = self.ips;
        }
        if let Some(amount) = self.subdomain_amount {
            config.subdomain_amount = amount;
        }
        if self.no_cdn {
            config.cdn.enabled = false;
        }
        if let Some(url) = self.ranges_url {
            config.cdn.ranges_url = url;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        Ok(config)
    }
}

/// Load the given file, else the platform default file if present, else
/// defaults.
pub fn load_config(path: Option<&std::path::Path>) -> color_eyre::Result<CheckConfig> {
    if let Some(path) = path {
        return Ok(CheckConfig::from_file(path)?);
    }

    match CheckConfig::default_path() {
        Some(path) if path.exists() => Ok(CheckConfig::from_file(&path)?),
        _ => Ok(CheckConfig::default()),
    }
}
