//! Error types for tlscheck.

use thiserror::Error;

/// Errors produced by the library.
///
/// None of these ever reach an HTTP caller: the verification pipeline folds
/// every upstream failure into one of the fixed [`crate::Outcome`]s.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// DNS resolution failed or returned nothing usable.
    #[error("DNS error: {0}")]
    Dns(String),

    /// Outbound HTTP client error.
    #[error("Network error: {0}")]
    Network(String),

    /// The CDN range list could not be fetched or parsed.
    #[error("Range fetch failed: {0}")]
    RangeFetch(String),

    /// The HTTP server failed to bind or serve.
    #[error("Server error: {0}")]
    Server(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
