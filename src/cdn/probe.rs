//! Live HEAD probe confirming a domain is proxied by the CDN.
//!
//! Resolving into Cloudflare's anycast space does not prove the domain is
//! enrolled there: anyone can point an A record at a Cloudflare IP. Only a
//! response carrying Cloudflare's own headers does.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SERVER};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

/// Default probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Name matched case-insensitively in the `Server` header.
pub const CLOUDFLARE_SERVER: &str = "cloudflare";

/// Cloudflare's per-request trace header.
pub const CF_RAY: &str = "cf-ray";

/// Cloudflare's cache status header.
pub const CF_CACHE_STATUS: &str = "cf-cache-status";

/// Confirms that a domain is actually served through the CDN.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Returns `true` only on positive evidence; any failure is `false`.
    async fn confirms_cdn(&self, domain: &str) -> bool;
}

/// Returns `true` if the response headers carry a Cloudflare fingerprint.
#[must_use]
pub fn headers_indicate_cloudflare(headers: &HeaderMap) -> bool {
    let server_is_cf = headers
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains(CLOUDFLARE_SERVER));

    server_is_cf || headers.contains_key(CF_RAY) || headers.contains_key(CF_CACHE_STATUS)
}

/// URL probed for `domain`.
#[must_use]
pub fn probe_url(domain: &str) -> String {
    format!("https://{domain}")
}

/// HEAD-request probe over HTTPS.
pub struct HttpProxyProbe {
    client: Client,
}

impl HttpProxyProbe {
    /// Create a probe with the default 3 second timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Create a probe with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        // Redirects are not followed: only the domain's own response counts.
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .pool_max_idle_per_host(0)
            .user_agent(format!("tlscheck/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Send the HEAD request and inspect whatever comes back.
    async fn probe(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let found = headers_indicate_cloudflare(response.headers());
                debug!(
                    "Probe {} -> {} (cloudflare headers: {})",
                    url,
                    response.status(),
                    found
                );
                found
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProxyProbe {
    async fn confirms_cdn(&self, domain: &str) -> bool {
        self.probe(&probe_url(domain)).await
    }
}
