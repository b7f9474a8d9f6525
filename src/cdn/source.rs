//! Where CDN range lists come from.

use crate::cdn::classifier::parse_ranges;
use crate::error::{Error, Result};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// A source of published CDN IPv4 ranges.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetch the current range list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be retrieved or contains no
    /// usable entry.
    async fn fetch(&self) -> Result<Vec<Ipv4Net>>;
}

/// Fetches a newline-delimited CIDR list over HTTP(S).
pub struct HttpRangeSource {
    client: Client,
    url: String,
}

impl HttpRangeSource {
    /// Create a source for `url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!("tlscheck/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        info!("CDN range source: {} (timeout {:?})", url, timeout);

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// The URL this source fetches from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn fetch(&self) -> Result<Vec<Ipv4Net>> {
        debug!("Fetching CDN ranges from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::RangeFetch(format!("GET {}: {e}", self.url)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::RangeFetch(format!(
                "GET {} returned {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::RangeFetch(format!("reading body of {}: {e}", self.url)))?;

        let ranges = parse_ranges(&body);
        if ranges.is_empty() {
            return Err(Error::RangeFetch(format!(
                "no valid CIDR entries in response from {}",
                self.url
            )));
        }

        Ok(ranges)
    }
}
