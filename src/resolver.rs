//! IPv4 resolution.
//!
//! Uses the host's resolver configuration (`/etc/resolv.conf`) through
//! hickory, falling back to hickory's defaults when that cannot be read.

use crate::error::{Error, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Resolves a domain to its IPv4 addresses.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Look up A records for `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails for any reason (NXDOMAIN,
    /// timeout, server failure).
    async fn resolve_ipv4(&self, domain: &str) -> Result<Vec<Ipv4Addr>>;
}

/// Resolver backed by hickory's tokio resolver.
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryResolver {
    /// Create a resolver from the system configuration with the given
    /// per-lookup timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("Could not read system DNS config ({}), using defaults", e);
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }
}

#[async_trait]
impl Resolve for HickoryResolver {
    #[instrument(skip(self))]
    async fn resolve_ipv4(&self, domain: &str) -> Result<Vec<Ipv4Addr>> {
        // The resolver may try several name servers; bound the whole lookup.
        let lookup = tokio::time::timeout(self.timeout, self.resolver.ipv4_lookup(domain))
            .await
            .map_err(|_| Error::Dns(format!("lookup of {domain} timed out")))?
            .map_err(|e| Error::Dns(format!("lookup of {domain} failed: {e}")))?;

        let addrs: Vec<Ipv4Addr> = lookup.iter().map(|a| a.0).collect();
        debug!("{} resolved to {:?}", domain, addrs);
        Ok(addrs)
    }
}
