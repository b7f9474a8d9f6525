//! Cloudflare fallback path.
//!
//! When none of a domain's addresses are ours, the domain may still be
//! acceptable if it is proxied through Cloudflare:
//!
//! ```text
//! resolved addresses
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ CidrRangeCache      │  (one snapshot, every address checked)
//! └─────────┬───────────┘
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  MATCH        NO MATCH
//!    │             │
//!    ▼             ▼
//! HEAD probe    Rejected
//!    │
//! ┌──┴─────┐
//! │        │
//! CF hdrs  none
//!  │        │
//!  ▼        ▼
//! Allowed  Rejected
//! ```

mod cache;
mod classifier;
mod probe;
mod source;

pub use cache::{CacheStats, CidrRangeCache, Ranges, DEFAULT_RANGES_TTL, DEFAULT_RETRY_BACKOFF};
pub use classifier::{is_in_ranges, parse_ranges};
pub use probe::{
    headers_indicate_cloudflare, probe_url, HttpProxyProbe, ProxyProbe, CF_CACHE_STATUS, CF_RAY,
    CLOUDFLARE_SERVER, DEFAULT_PROBE_TIMEOUT,
};
pub use source::{HttpRangeSource, RangeSource};

use crate::config::CdnConfig;
use crate::error::Result;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// Range cache plus header probe.
#[derive(Clone)]
pub struct CdnDetector {
    ranges: Arc<CidrRangeCache>,
    probe: Arc<dyn ProxyProbe>,
}

impl CdnDetector {
    /// Assemble a detector from its parts.
    #[must_use]
    pub fn new(ranges: Arc<CidrRangeCache>, probe: Arc<dyn ProxyProbe>) -> Self {
        Self { ranges, probe }
    }

    /// Build the HTTP-backed detector described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &CdnConfig) -> Result<Self> {
        let source = HttpRangeSource::new(&config.ranges_url, config.fetch_timeout())?;
        let ranges = CidrRangeCache::with_ttl(Arc::new(source), config.ranges_ttl())
            .with_retry_backoff(config.retry_backoff());
        let probe = HttpProxyProbe::with_timeout(config.probe_timeout())?;

        info!(
            "CDN detector initialized (ttl={:?}, probe_timeout={:?})",
            config.ranges_ttl(),
            config.probe_timeout()
        );

        Ok(Self::new(Arc::new(ranges), Arc::new(probe)))
    }

    /// Returns `true` if any of `addrs` lies in a published CDN range.
    ///
    /// The cache is read once; every address is checked against that
    /// snapshot.
    pub async fn any_in_ranges(&self, addrs: &[Ipv4Addr]) -> bool {
        let ranges = self.ranges.get_ranges().await;
        addrs.iter().any(|ip| {
            let found = is_in_ranges(*ip, &ranges);
            debug!("{} in CDN ranges: {}", ip, found);
            found
        })
    }

    /// Full fallback check: range match, then header confirmation.
    pub async fn is_proxied(&self, domain: &str, addrs: &[Ipv4Addr]) -> bool {
        if !self.any_in_ranges(addrs).await {
            debug!("{}: no address in CDN ranges", domain);
            return false;
        }

        let confirmed = self.probe.confirms_cdn(domain).await;
        debug!("{}: in CDN ranges, header confirmation: {}", domain, confirmed);
        confirmed
    }

    /// Fetch the range list ahead of the first request.
    pub async fn warm(&self) {
        let ranges = self.ranges.get_ranges().await;
        info!("CDN range cache warmed with {} ranges", ranges.len());
    }

    /// The underlying range cache.
    #[must_use]
    pub fn ranges(&self) -> &Arc<CidrRangeCache> {
        &self.ranges
    }
}
