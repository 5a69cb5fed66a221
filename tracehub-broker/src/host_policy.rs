// crates/tracehub-broker/src/host_policy.rs
// ============================================================================
// Module: Webhook Host Policy
// Description: SSRF-hardened host validation for outbound webhook targets.
// Purpose: Reject webhook URLs that resolve to private, link-local, or
//          otherwise internal network ranges before any request is sent.
// Dependencies: url
// ============================================================================

//! ## Overview
//! Webhook delivery is at-most-once and caller-configured (§4.7 of the
//! design document does not name SSRF hardening explicitly, but treats
//! outbound delivery as ambient hygiene, not an unrestricted network
//! capability). [`HostPolicy`] enforces that a target URL's scheme is
//! `http`/`https` and that its host does not resolve to a private or
//! link-local address, mirroring the host allow/deny pattern used
//! elsewhere in this workspace for outbound HTTP sources.

use std::net::IpAddr;
use std::net::ToSocketAddrs;

use url::Host;
use url::Url;

/// Errors raised while validating a webhook target URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostPolicyError {
    /// The URL failed to parse.
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),
    /// The URL's scheme is not `http` or `https`.
    #[error("unsupported webhook scheme: {0}")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("webhook url has no host")]
    MissingHost,
    /// The host resolves to a private, link-local, loopback, or otherwise
    /// internal address.
    #[error("webhook host resolves to a private or link-local address: {0}")]
    PrivateNetwork(String),
    /// DNS resolution of the host failed.
    #[error("webhook host dns lookup failed: {0}")]
    DnsLookup(String),
}

/// Validates a webhook target URL against the default host policy: only
/// `http`/`https` schemes, and no private/link-local/loopback targets
/// unless `allow_private_networks` was set.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPolicy {
    /// Whether private and link-local IP ranges are permitted. Intended
    /// only for local development and integration tests.
    pub allow_private_networks: bool,
}

impl HostPolicy {
    /// Creates the default (production) policy: private networks denied.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_private_networks: false }
    }

    /// Creates a policy that permits private/link-local targets, for tests
    /// that deliver to a loopback HTTP server.
    #[must_use]
    pub const fn allow_private_networks() -> Self {
        Self { allow_private_networks: true }
    }

    /// Validates `raw_url`, returning the parsed [`Url`] on success.
    ///
    /// # Errors
    /// Returns [`HostPolicyError`] if the URL is malformed, uses an
    /// unsupported scheme, or resolves to a disallowed network range.
    pub fn validate(&self, raw_url: &str) -> Result<Url, HostPolicyError> {
        let url = Url::parse(raw_url).map_err(|err| HostPolicyError::InvalidUrl(err.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(HostPolicyError::UnsupportedScheme(scheme.to_string())),
        }
        if self.allow_private_networks {
            return Ok(url);
        }
        let host = url.host().ok_or(HostPolicyError::MissingHost)?;
        let ips = resolve_host_ips(&host, &url)?;
        if ips.iter().any(is_private_or_link_local) {
            return Err(HostPolicyError::PrivateNetwork(normalize_host_label(&host)));
        }
        Ok(url)
    }
}

fn normalize_host_label(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn resolve_host_ips(host: &Host<&str>, url: &Url) -> Result<Vec<IpAddr>, HostPolicyError> {
    match host {
        Host::Ipv4(ip) => Ok(vec![IpAddr::V4(*ip)]),
        Host::Ipv6(ip) => Ok(vec![IpAddr::V6(*ip)]),
        Host::Domain(domain) => {
            let port = url.port_or_known_default().ok_or(HostPolicyError::MissingHost)?;
            (*domain, port)
                .to_socket_addrs()
                .map(|iter| iter.map(|addr| addr.ip()).collect::<Vec<IpAddr>>())
                .map_err(|err| HostPolicyError::DnsLookup(err.to_string()))
        }
    }
}

/// Returns true if the IP is private, link-local, loopback, or unspecified.
const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HostPolicy;
    use super::HostPolicyError;

    #[test]
    fn rejects_non_http_scheme() {
        let policy = HostPolicy::new();
        let err = policy.validate("ftp://example.com/hook").unwrap_err();
        assert!(matches!(err, HostPolicyError::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_loopback_by_default() {
        let policy = HostPolicy::new();
        let err = policy.validate("http://127.0.0.1:8080/hook").unwrap_err();
        assert!(matches!(err, HostPolicyError::PrivateNetwork(_)));
    }

    #[test]
    fn allows_loopback_when_configured() {
        let policy = HostPolicy::allow_private_networks();
        assert!(policy.validate("http://127.0.0.1:8080/hook").is_ok());
    }
}
