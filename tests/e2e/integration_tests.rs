//! Request-level scenarios against a running server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Scenario, TestHarness};
use std::net::Ipv4Addr;
use tlscheck::{AllowReason, CheckConfig, CheckEvent, Outcome};

const OURS: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
const CLOUDFLARE: Ipv4Addr = Ipv4Addr::new(104, 16, 1, 1);
const ELSEWHERE: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 9);

fn config() -> CheckConfig {
    CheckConfig {
        block_list: vec!["evil.example".to_string()],
        ips: vec![OURS],
        subdomain_amount: 3,
        ..CheckConfig::default()
    }
}

/// Scenario A: blocklisted domain.
#[tokio::test]
async fn test_blocklisted_domain() {
    let harness = TestHarness::setup(
        Scenario::with_config(config()).resolves("evil.example", &[OURS]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, body) = harness.check("evil.example").await.expect("request");
    assert_eq!(status, 400);
    assert_eq!(body, "Disallowed");
    assert_eq!(harness.lookups(), 0, "blocklisted domains must not hit DNS");

    harness.teardown().await.expect("Failed to teardown");
}

/// Scenario B: too many subdomains.
#[tokio::test]
async fn test_too_many_subdomains() {
    let harness = TestHarness::setup(
        Scenario::with_config(config()).resolves("a.b.c.d.e.f.example.com", &[OURS]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, body) = harness.check("a.b.c.d.e.f.example.com").await.expect("request");
    assert_eq!(status, 403);
    assert_eq!(body, "Too many subdomains");
    assert_eq!(harness.lookups(), 0);

    harness.teardown().await.expect("Failed to teardown");
}

/// Scenario C: resolves to a predefined IP.
#[tokio::test]
async fn test_predefined_ip() {
    let harness = TestHarness::setup(
        Scenario::with_config(config()).resolves("ours.example.com", &[OURS]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, body) = harness.check("ours.example.com").await.expect("request");
    assert_eq!(status, 200);
    assert_eq!(body, "DNS is pointing to the predefined IP");
    assert_eq!(harness.probes(), 0);

    harness.teardown().await.expect("Failed to teardown");
}

/// Scenario D: resolves into Cloudflare and the probe sees `cf-ray`.
#[tokio::test]
async fn test_cloudflare_proxied() {
    let mut harness = TestHarness::setup(
        Scenario::with_config(config())
            .resolves("proxied.example.com", &[CLOUDFLARE])
            .responds("proxied.example.com", &[("cf-ray", "123")]),
    )
    .await
    .expect("Failed to setup harness");
    let mut events = harness.events().expect("events");

    let (status, body) = harness.check("proxied.example.com").await.expect("request");
    assert_eq!(status, 200);
    assert_eq!(body, "Cloudflare-proxied and allowed");
    assert_eq!(harness.probes(), 1);
    assert!(!harness.ranges().is_empty(), "ranges fetched from the range server");

    // Started, then the check.
    assert!(matches!(events.recv().await, Ok(CheckEvent::Started { .. })));
    let checked = events.recv().await.expect("checked event");
    assert!(matches!(
        checked,
        CheckEvent::DomainChecked {
            outcome: Outcome::Allowed(AllowReason::CdnMatch),
            ..
        }
    ));

    harness.teardown().await.expect("Failed to teardown");
}

/// Scenario E: resolves somewhere else entirely.
#[tokio::test]
async fn test_no_match() {
    let harness = TestHarness::setup(
        Scenario::with_config(config()).resolves("elsewhere.example.com", &[ELSEWHERE]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, body) = harness.check("elsewhere.example.com").await.expect("request");
    assert_eq!(status, 403);
    assert_eq!(body, "DNS is not pointing to allowed IP or Cloudflare");
    assert_eq!(harness.probes(), 0, "no CDN range match, so no probe");

    harness.teardown().await.expect("Failed to teardown");
}

/// A Cloudflare IP without Cloudflare headers is not enough.
#[tokio::test]
async fn test_cloudflare_ip_without_headers() {
    let harness = TestHarness::setup(
        Scenario::with_config(config())
            .resolves("squatter.example.com", &[CLOUDFLARE])
            .responds("squatter.example.com", &[("server", "nginx")]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, body) = harness.check("squatter.example.com").await.expect("request");
    assert_eq!(status, 403);
    assert_eq!(body, "DNS is not pointing to allowed IP or Cloudflare");
    assert_eq!(harness.probes(), 1);

    harness.teardown().await.expect("Failed to teardown");
}

#[tokio::test]
async fn test_resolution_failure() {
    let harness = TestHarness::setup(Scenario::with_config(config()))
        .await
        .expect("Failed to setup harness");

    let (status, body) = harness.check("unknown.example.com").await.expect("request");
    assert_eq!(status, 403);
    assert_eq!(body, "DNS resolution failed");

    harness.teardown().await.expect("Failed to teardown");
}

#[tokio::test]
async fn test_cdn_disabled_rejects_cloudflare_domains() {
    let mut cfg = config();
    cfg.cdn.enabled = false;
    let harness = TestHarness::setup(
        Scenario::with_config(cfg)
            .resolves("proxied.example.com", &[CLOUDFLARE])
            .responds("proxied.example.com", &[("cf-ray", "123")]),
    )
    .await
    .expect("Failed to setup harness");

    let (status, _) = harness.check("proxied.example.com").await.expect("request");
    assert_eq!(status, 403);
    assert_eq!(harness.probes(), 0);

    harness.teardown().await.expect("Failed to teardown");
}

/// Concurrent requests share one range fetch and all get answers.
#[tokio::test]
async fn test_concurrent_requests() {
    let harness = TestHarness::setup(
        Scenario::with_config(config())
            .resolves("proxied.example.com", &[CLOUDFLARE])
            .responds("proxied.example.com", &[("server", "cloudflare")])
            .resolves("ours.example.com", &[OURS]),
    )
    .await
    .expect("Failed to setup harness");

    let requests = (0..16).map(|i| {
        let domain = if i % 2 == 0 {
            "proxied.example.com"
        } else {
            "ours.example.com"
        };
        harness.check(domain)
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        let (status, _) = result.expect("request");
        assert_eq!(status, 200);
    }
    assert!(harness.ranges().stats().refreshes <= 1);

    harness.teardown().await.expect("Failed to teardown");
}
