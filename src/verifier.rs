//! The verification pipeline.
//!
//! Runs the local checks first, then DNS, then the direct-IP match, and
//! only then the Cloudflare fallback. The first determining step wins.

use crate::cdn::CdnDetector;
use crate::config::CheckConfig;
use crate::error::Result;
use crate::resolver::{HickoryResolver, Resolve};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// Why a domain was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// An A record points at one of our IPs.
    PredefinedMatch,
    /// The domain is proxied by Cloudflare.
    CdnMatch,
}

/// Why a domain was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Empty or on the blocklist.
    Blocklisted,
    /// More dots than the configured limit.
    TooManySubdomains,
    /// Malformed name, failed lookup, or no A records.
    ResolutionFailed,
    /// Neither our IPs nor a confirmed Cloudflare proxy.
    NoMatch,
}

/// Result of verifying one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The domain points to us.
    Allowed(AllowReason),
    /// The domain does not.
    Rejected(RejectReason),
}

impl Outcome {
    /// Returns true if the domain passed verification.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// HTTP status code reported to the caller.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Allowed(_) => 200,
            Self::Rejected(RejectReason::Blocklisted) => 400,
            Self::Rejected(_) => 403,
        }
    }

    /// Plain-text body reported to the caller.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Allowed(AllowReason::PredefinedMatch) => "DNS is pointing to the predefined IP",
            Self::Allowed(AllowReason::CdnMatch) => "Cloudflare-proxied and allowed",
            Self::Rejected(RejectReason::Blocklisted) => "Disallowed",
            Self::Rejected(RejectReason::TooManySubdomains) => "Too many subdomains",
            Self::Rejected(RejectReason::ResolutionFailed) => "DNS resolution failed",
            Self::Rejected(RejectReason::NoMatch) => {
                "DNS is not pointing to allowed IP or Cloudflare"
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message())
    }
}

/// Lowercase, trim, and drop a single trailing root dot.
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Returns true if `domain` (already normalized) is a plausible host name:
/// dot-separated labels of 1-63 letters, digits, hyphens or underscores,
/// not starting or ending with a hyphen, 253 characters at most.
#[must_use]
pub fn is_valid_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

/// Static, startup-time policy: blocklist, allowlist and depth limit.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    block_list: HashSet<String>,
    allowed_ips: HashSet<Ipv4Addr>,
    subdomain_limit: usize,
}

impl DomainPolicy {
    /// Create a policy. Blocklist entries are normalized.
    #[must_use]
    pub fn new<I, S>(block_list: I, allowed_ips: &[Ipv4Addr], subdomain_limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            block_list: block_list
                .into_iter()
                .map(|d| normalize_domain(d.as_ref()))
                .collect(),
            allowed_ips: allowed_ips.iter().copied().collect(),
            subdomain_limit,
        }
    }

    /// Build the policy from configuration.
    #[must_use]
    pub fn from_config(config: &CheckConfig) -> Self {
        Self::new(&config.block_list, &config.ips, config.subdomain_amount)
    }

    /// Returns true if the (normalized) domain is blocklisted.
    #[must_use]
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.block_list.contains(domain)
    }

    /// Returns true if `domain` has more dots than allowed.
    #[must_use]
    pub fn exceeds_depth(&self, domain: &str) -> bool {
        domain.matches('.').count() > self.subdomain_limit
    }

    /// Returns true if any address is one of ours.
    #[must_use]
    pub fn any_allowed(&self, addrs: &[Ipv4Addr]) -> bool {
        addrs.iter().any(|ip| self.allowed_ips.contains(ip))
    }

    /// The configured dot limit.
    #[must_use]
    pub fn subdomain_limit(&self) -> usize {
        self.subdomain_limit
    }
}

/// Domain verifier combining policy, DNS and the optional CDN fallback.
#[derive(Clone)]
pub struct DomainVerifier {
    policy: Arc<DomainPolicy>,
    resolver: Arc<dyn Resolve>,
    cdn: Option<CdnDetector>,
}

impl DomainVerifier {
    /// Assemble a verifier from its parts. `cdn = None` disables the
    /// Cloudflare fallback.
    #[must_use]
    pub fn new(policy: DomainPolicy, resolver: Arc<dyn Resolve>, cdn: Option<CdnDetector>) -> Self {
        Self {
            policy: Arc::new(policy),
            resolver,
            cdn,
        }
    }

    /// Build the production verifier described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the CDN detector's HTTP clients cannot be built.
    pub fn from_config(config: &CheckConfig) -> Result<Self> {
        let policy = DomainPolicy::from_config(config);
        let resolver = Arc::new(HickoryResolver::new(config.dns.timeout()));
        let cdn = if config.cdn.enabled {
            Some(CdnDetector::from_config(&config.cdn)?)
        } else {
            None
        };

        info!(
            "Domain verifier initialized (blocklist={}, ips={}, subdomain_limit={}, cdn_enabled={})",
            config.block_list.len(),
            config.ips.len(),
            config.subdomain_amount,
            cdn.is_some()
        );

        Ok(Self::new(policy, resolver, cdn))
    }

    /// Verify a domain.
    ///
    /// This is the main entry point:
    /// 1. Reject empty or blocklisted domains
    /// 2. Reject domains deeper than the subdomain limit
    /// 3. Resolve A records (malformed names fail without a lookup)
    /// 4. Accept if any address is one of ours
    /// 5. Otherwise accept only a confirmed Cloudflare proxy
    pub async fn verify(&self, domain: &str) -> Outcome {
        let raw = domain.trim();
        let domain = normalize_domain(raw);

        if domain.is_empty() || self.policy.is_blocked(&domain) {
            debug!("{:?} disallowed", domain);
            return Outcome::Rejected(RejectReason::Blocklisted);
        }

        // Separators are counted before the root dot is stripped.
        if self.policy.exceeds_depth(raw) {
            debug!(
                "{} has more than {} dots",
                raw,
                self.policy.subdomain_limit()
            );
            return Outcome::Rejected(RejectReason::TooManySubdomains);
        }

        // No resolver could answer for this name; skip the lookup.
        if !is_valid_hostname(&domain) {
            debug!("{:?} is not a host name", domain);
            return Outcome::Rejected(RejectReason::ResolutionFailed);
        }

        let addrs = match self.resolver.resolve_ipv4(&domain).await {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => {
                debug!("{} has no A records", domain);
                return Outcome::Rejected(RejectReason::ResolutionFailed);
            }
            Err(e) => {
                debug!("Resolution of {} failed: {}", domain, e);
                return Outcome::Rejected(RejectReason::ResolutionFailed);
            }
        };

        if self.policy.any_allowed(&addrs) {
            info!("{} points to a predefined IP", domain);
            return Outcome::Allowed(AllowReason::PredefinedMatch);
        }

        if let Some(ref cdn) = self.cdn {
            if cdn.is_proxied(&domain, &addrs).await {
                info!("{} is Cloudflare-proxied", domain);
                return Outcome::Allowed(AllowReason::CdnMatch);
            }
        }

        info!("{} does not point to us ({:?})", domain, addrs);
        Outcome::Rejected(RejectReason::NoMatch)
    }

    /// The CDN detector, if the fallback is enabled.
    #[must_use]
    pub fn cdn(&self) -> Option<&CdnDetector> {
        self.cdn.as_ref()
    }

    /// The static policy.
    #[must_use]
    pub fn policy(&self) -> &DomainPolicy {
        &self.policy
    }
}
