//! # tlscheck
//!
//! Domain ownership gate run in front of TLS certificate issuance.
//!
//! A domain passes when its A records point at one of our configured IPs,
//! or when it resolves into Cloudflare's published IPv4 ranges *and* a live
//! HEAD probe shows Cloudflare is actually proxying it.
//!
//! ## Architecture
//!
//! ```text
//! GET /?domain=example.com
//!        │
//!        ▼
//! ┌─────────────────────┐   blocklisted / malformed ──► 400 Disallowed
//! │ DomainPolicy        │   too many dots ────────────► 403
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   error / no A records ─────► 403
//! │ Resolve (hickory)   │
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   predefined IP hit ────────► 200
//! │ allowlist           │
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   ┌───────────────────┐
//! │ CidrRangeCache      │──►│ ProxyProbe (HEAD) │──► 200 / 403
//! │ (6h TTL, stale ok)  │   └───────────────────┘
//! └─────────────────────┘
//! ```

pub mod cdn;
pub mod config;
pub mod error;
pub mod event;
pub mod resolver;
pub mod server;
pub mod verifier;

pub use cdn::{CdnDetector, CidrRangeCache, HttpProxyProbe, HttpRangeSource};
pub use config::CheckConfig;
pub use error::{Error, Result};
pub use event::{CheckEvent, CheckEventsChannel};
pub use resolver::{HickoryResolver, Resolve};
pub use server::{RunningServer, ServerBuilder, ShutdownHandle};
pub use verifier::{AllowReason, DomainPolicy, DomainVerifier, Outcome, RejectReason};
