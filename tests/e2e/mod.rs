//! End-to-end tests for tlscheck.
//!
//! Each test starts a real server on an ephemeral port. DNS answers and
//! probe responses are scripted; the Cloudflare range list is served over
//! HTTP by a local fake so the real fetch path is exercised.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test e2e
//! ```

mod harness;
mod integration_tests;

pub use harness::{Scenario, TestHarness};
