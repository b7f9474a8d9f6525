//! Configuration for tlscheck.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cloudflare's published IPv4 range list.
pub const DEFAULT_RANGES_URL: &str = "https://www.cloudflare.com/ips-v4";

/// Service configuration.
///
/// Field aliases keep the older `config.json` layout
/// (`blockList`, `subdomainAmount`) loadable as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Domains that are rejected outright.
    #[serde(default, alias = "blockList")]
    pub block_list: Vec<String>,

    /// IPs that count as "pointing to us".
    #[serde(default)]
    pub ips: Vec<Ipv4Addr>,

    /// Maximum number of dots allowed in a domain.
    #[serde(default = "default_subdomain_amount", alias = "subdomainAmount")]
    pub subdomain_amount: usize,

    /// Log level.
    #[serde(default = "default_log_level", alias = "logLevel")]
    pub log_level: String,

    /// DNS resolver settings.
    #[serde(default)]
    pub dns: DnsConfig,

    /// CDN fallback settings.
    #[serde(default)]
    pub cdn: CdnConfig,
}

/// DNS resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Lookup timeout in seconds.
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
}

/// CDN (Cloudflare) fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Accept Cloudflare-proxied domains.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where to fetch the newline-delimited IPv4 range list.
    #[serde(default = "default_ranges_url")]
    pub ranges_url: String,

    /// How long a fetched range list stays fresh.
    #[serde(default = "default_ranges_ttl")]
    pub ranges_ttl_secs: u64,

    /// After a failed fetch, how long the stale list is served without retrying.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Range list fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// HEAD probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            block_list: Vec::new(),
            ips: Vec::new(),
            subdomain_amount: default_subdomain_amount(),
            log_level: default_log_level(),
            dns: DnsConfig::default(),
            cdn: CdnConfig::default(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dns_timeout(),
        }
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ranges_url: default_ranges_url(),
            ranges_ttl_secs: default_ranges_ttl(),
            retry_backoff_secs: default_retry_backoff(),
            fetch_timeout_secs: default_fetch_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    5555
}

const fn default_subdomain_amount() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_dns_timeout() -> u64 {
    5
}

const fn default_true() -> bool {
    true
}

fn default_ranges_url() -> String {
    DEFAULT_RANGES_URL.to_string()
}

const fn default_ranges_ttl() -> u64 {
    6 * 60 * 60 // 6 hours
}

const fn default_retry_backoff() -> u64 {
    30
}

const fn default_fetch_timeout() -> u64 {
    5
}

const fn default_probe_timeout() -> u64 {
    3
}

impl DnsConfig {
    /// Lookup timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CdnConfig {
    /// Range list time-to-live.
    #[must_use]
    pub fn ranges_ttl(&self) -> Duration {
        Duration::from_secs(self.ranges_ttl_secs)
    }

    /// Retry backoff after a failed range fetch.
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// Range list fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// HEAD probe timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl CheckConfig {
    /// Load configuration from a file.
    ///
    /// `.json` files are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        }
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Platform config file location (`~/.config/tlscheck/config.toml` on Linux).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tlscheck")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Socket address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
