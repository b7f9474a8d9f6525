//! Test harness that runs a real tlscheck server against scripted upstreams.
//!
//! The `TestHarness` wires:
//! - a local HTTP server publishing a Cloudflare-style range list
//! - a table-driven DNS resolver
//! - a header-driven CDN probe
//!
//! into a `RunningServer` bound to an ephemeral port, and exposes helpers
//! for issuing check requests.

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tlscheck::cdn::{headers_indicate_cloudflare, ProxyProbe};
use tlscheck::{
    CdnDetector, CheckConfig, CheckEventsChannel, CidrRangeCache, DomainPolicy, DomainVerifier,
    HttpRangeSource, Resolve, ServerBuilder, ShutdownHandle,
};
use tokio::task::JoinHandle;
use tracing::info;

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] tlscheck::Error),

    /// Request error
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Ranges published by the fake range server.
pub const CLOUDFLARE_RANGES: &str = "173.245.48.0/20\n103.21.244.0/22\n104.16.0.0/13\n172.64.0.0/13\n";

/// Resolver answering from a fixed table and counting lookups.
#[derive(Default)]
pub struct TableResolver {
    table: HashMap<String, Vec<Ipv4Addr>>,
    lookups: AtomicUsize,
}

impl TableResolver {
    /// Number of lookups performed so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolve for TableResolver {
    async fn resolve_ipv4(&self, domain: &str) -> tlscheck::Result<Vec<Ipv4Addr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(domain)
            .cloned()
            .ok_or_else(|| tlscheck::Error::Dns(format!("NXDOMAIN {domain}")))
    }
}

/// Probe that "receives" scripted response headers per domain.
#[derive(Default)]
pub struct HeaderProbe {
    responses: HashMap<String, HeaderMap>,
    probes: AtomicUsize,
}

impl HeaderProbe {
    /// Number of probes performed so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyProbe for HeaderProbe {
    async fn confirms_cdn(&self, domain: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(domain)
            .is_some_and(headers_indicate_cloudflare)
    }
}

/// Declarative setup for a harness.
#[derive(Default)]
pub struct Scenario {
    config: CheckConfig,
    resolver: TableResolver,
    probe: HeaderProbe,
}

impl Scenario {
    /// Start from the given configuration (host and port are overridden).
    pub fn with_config(config: CheckConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Make `domain` resolve to `addrs`.
    pub fn resolves(mut self, domain: &str, addrs: &[Ipv4Addr]) -> Self {
        self.resolver.table.insert(domain.to_string(), addrs.to_vec());
        self
    }

    /// Make a HEAD probe of `domain` return the given headers.
    pub fn responds(mut self, domain: &str, headers: &[(&str, &str)]) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        self.probe.responses.insert(domain.to_string(), map);
        self
    }
}

/// A running server plus handles on its scripted upstreams.
pub struct TestHarness {
    addr: SocketAddr,
    client: reqwest::Client,
    resolver: Arc<TableResolver>,
    probe: Arc<HeaderProbe>,
    ranges: Arc<CidrRangeCache>,
    events: Option<CheckEventsChannel>,
    shutdown: ShutdownHandle,
    server: JoinHandle<tlscheck::Result<()>>,
    range_server: JoinHandle<()>,
}

impl TestHarness {
    /// Start the range server and the tlscheck server for `scenario`.
    ///
    /// # Errors
    ///
    /// Returns an error if either server fails to start.
    pub async fn setup(scenario: Scenario) -> Result<Self> {
        let (ranges_url, range_server) = spawn_range_server().await?;

        let Scenario {
            mut config,
            resolver,
            probe,
        } = scenario;
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.cdn.ranges_url = ranges_url;

        let resolver = Arc::new(resolver);
        let probe = Arc::new(probe);
        let source = HttpRangeSource::new(&config.cdn.ranges_url, config.cdn.fetch_timeout())?;
        let ranges = Arc::new(
            CidrRangeCache::with_ttl(Arc::new(source), config.cdn.ranges_ttl())
                .with_retry_backoff(config.cdn.retry_backoff()),
        );
        let cdn = config
            .cdn
            .enabled
            .then(|| CdnDetector::new(Arc::clone(&ranges), probe.clone()));

        let verifier = DomainVerifier::new(
            DomainPolicy::from_config(&config),
            resolver.clone(),
            cdn,
        );

        let mut server = ServerBuilder::new(config).verifier(verifier).build().await?;
        let addr = server.local_addr();
        let events = server.events();
        let shutdown = server.shutdown_handle();
        let server = tokio::spawn(server.run());

        info!("Test harness listening on {}", addr);

        Ok(Self {
            addr,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            resolver,
            probe,
            ranges,
            events,
            shutdown,
            server,
            range_server,
        })
    }

    /// `GET /?domain=<domain>`, returning status code and body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn check(&self, domain: &str) -> Result<(u16, String)> {
        let response = self
            .client
            .get(format!("http://{}/", self.addr))
            .query(&[("domain", domain)])
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.text().await?))
    }

    /// Number of DNS lookups the server performed.
    pub fn lookups(&self) -> usize {
        self.resolver.lookups()
    }

    /// Number of HEAD probes the server performed.
    pub fn probes(&self) -> usize {
        self.probe.probes()
    }

    /// The server's range cache.
    pub fn ranges(&self) -> &CidrRangeCache {
        &self.ranges
    }

    /// Take the server's event receiver.
    pub fn events(&mut self) -> Option<CheckEventsChannel> {
        self.events.take()
    }

    /// Stop both servers.
    ///
    /// # Errors
    ///
    /// Returns an error if the server exited with an error.
    pub async fn teardown(self) -> Result<()> {
        self.shutdown.shutdown();
        let result = self.server.await;
        self.range_server.abort();
        match result {
            Ok(run) => Ok(run?),
            Err(e) => Err(HarnessError::Io(std::io::Error::other(e))),
        }
    }
}

/// Serve `CLOUDFLARE_RANGES` at `/ips-v4` on an ephemeral port.
async fn spawn_range_server() -> Result<(String, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/ips-v4", get(|| async { CLOUDFLARE_RANGES }));
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/ips-v4"), handle))
}
