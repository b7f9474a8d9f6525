//! CIDR parsing and address membership.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tracing::debug;

/// Parse a newline-delimited CIDR list.
///
/// Blank lines and `#` comments are ignored. Entries that are not valid
/// `a.b.c.d/len` blocks are skipped rather than failing the whole list.
#[must_use]
pub fn parse_ranges(text: &str) -> Vec<Ipv4Net> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.parse::<Ipv4Net>().ok().or_else(|| {
                debug!("Skipping malformed CIDR entry: {:?}", line);
                None
            })
        })
        .collect()
}

/// Returns `true` if `ip` falls inside any block in `ranges`.
#[must_use]
pub fn is_in_ranges(ip: Ipv4Addr, ranges: &[Ipv4Net]) -> bool {
    ranges.iter().any(|net| net.contains(&ip))
}
