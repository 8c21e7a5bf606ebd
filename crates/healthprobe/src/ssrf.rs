//! SSRF protection for checks that reach out to configured targets.
//!
//! Validation happens in two phases:
//! - [`validate_url`] runs at construction. It enforces the scheme and, when
//!   private hosts are blocked, rejects literal addresses in blocked ranges and
//!   localhost names. Hostnames are not resolved here.
//! - [`validate_host`] runs before every request. It resolves the host and
//!   rejects it if any answer falls in a blocked range. Results are never
//!   cached, so a host that rebinds to a private address is caught on the
//!   next request.

use async_trait::async_trait;
use common::SsrfError;
use reqwest::Url;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

const LOCALHOST_NAMES: [&str; 4] = [
    "localhost",
    "localhost.",
    "localhost6",
    "localhost6.localdomain6",
];

/// Resolves a hostname to its addresses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Construction-time validation of a target URL.
///
/// The scheme must be http or https regardless of `block_private_hosts`.
/// With `block_private_hosts`, a literal IP host in a blocked range or a
/// localhost name is rejected. URLs without a host only get the scheme check.
pub fn validate_url(url: &str, block_private_hosts: bool) -> Result<(), SsrfError> {
    let scheme = url_scheme(url).to_ascii_lowercase();
    if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        return Err(SsrfError::DisallowedScheme(scheme));
    }
    if !block_private_hosts {
        return Ok(());
    }

    let Ok(parsed) = Url::parse(url.trim()) else {
        return Ok(());
    };
    match parsed.host_str() {
        Some(host) => validate_literal_host(host),
        None => Ok(()),
    }
}

/// Reject localhost names and blocked literal addresses without resolving.
///
/// Any other hostname passes.
pub fn validate_literal_host(host: &str) -> Result<(), SsrfError> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Ok(());
    }
    if is_localhost_name(host) {
        return Err(SsrfError::Localhost(host.to_string()));
    }
    match host.parse::<IpAddr>() {
        Ok(addr) if is_blocked_ip(addr) => Err(SsrfError::BlockedAddress(addr)),
        _ => Ok(()),
    }
}

/// Request-time validation of `host`. Call only when private hosts are blocked.
///
/// Localhost names are rejected without resolving. Otherwise the host is
/// resolved and rejected if any address is blocked. A failed resolution is
/// not an SSRF signal: it returns `Ok` and leaves the failure to the
/// connection attempt.
pub async fn validate_host(host: &str, resolver: &dyn HostResolver) -> Result<(), SsrfError> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Ok(());
    }
    if is_localhost_name(host) {
        return Err(SsrfError::Localhost(host.to_string()));
    }
    if let Ok(addr) = host.parse::<IpAddr>() {
        return if is_blocked_ip(addr) {
            Err(SsrfError::BlockedAddress(addr))
        } else {
            Ok(())
        };
    }

    let addrs = match resolver.resolve(host).await {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!(host, error = %e, "Host resolution failed; deferring to connection attempt");
            return Ok(());
        }
    };

    match addrs.into_iter().find(|addr| is_blocked_ip(*addr)) {
        Some(addr) => Err(SsrfError::ResolvesToBlocked {
            host: host.to_string(),
            addr,
        }),
        None => Ok(()),
    }
}

/// Whether `addr` is loopback, private, link-local or otherwise not publicly routable.
pub fn is_blocked_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(addr: Ipv4Addr) -> bool {
    let [a, b, c, _] = addr.octets();
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.is_documentation()
        || addr.is_multicast()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_blocked_ipv6(addr: Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }
    let segments = addr.segments();
    addr.is_loopback()
        || addr.is_unspecified()
        || addr.is_multicast()
        || addr.is_unique_local()
        || addr.is_unicast_link_local()
        // ::/8 reserved, including IPv4-compatible addresses
        || (segments[0] & 0xff00) == 0
        // 64:ff9b:1::/48 local-use translation
        || (segments[0] == 0x64 && segments[1] == 0xff9b && segments[2] == 1)
        // 100::/64 discard-only
        || (segments[0] == 0x100 && segments[1] == 0 && segments[2] == 0 && segments[3] == 0)
        // 2001::/23 protocol assignments
        || (segments[0] == 0x2001 && segments[1] < 0x200)
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0xdb8)
        // fec0::/10 deprecated site-local
        || (segments[0] & 0xffc0) == 0xfec0
}

fn is_localhost_name(host: &str) -> bool {
    LOCALHOST_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(host))
}

fn normalize_host(host: &str) -> &str {
    let host = host.trim();
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Scheme of `url` per RFC 3986, or `""` when there is none.
pub(crate) fn url_scheme(url: &str) -> &str {
    let Some((scheme, _)) = url.trim_start().split_once(':') else {
        return "";
    };
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid { scheme } else { "" }
}
