//! DNS probe.

use crate::deps::{DnsResolver, ResolvePath};
use crate::error::ProbeError;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Resolve `host` over `path`, bounded by `timeout`.
///
/// An empty answer is reported as [`ProbeError::DnsNotFound`].
pub async fn probe_dns(
    resolver: &dyn DnsResolver,
    host: &str,
    path: ResolvePath,
    timeout: Duration,
) -> Result<Vec<IpAddr>, ProbeError> {
    let started = tokio::time::Instant::now();
    let result = match tokio::time::timeout(timeout, resolver.resolve(host, path)).await {
        Ok(Ok(addrs)) if addrs.is_empty() => Err(ProbeError::DnsNotFound(host.to_string())),
        Ok(res) => res,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };
    match &result {
        Ok(addrs) => debug!(
            "DNS probe {} ({:?}) OK in {:?}: {:?}",
            host,
            path,
            started.elapsed(),
            addrs
        ),
        Err(e) => debug!("DNS probe {} ({:?}) failed: {}", host, path, e),
    }
    result
}

/// Link-local, site-local or unique-local addresses.
pub fn is_private_address(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_unicast_link_local() || v6.is_unique_local() || first & 0xffc0 == 0xfec0
        }
    }
}

pub fn has_private_address(addrs: &[IpAddr]) -> bool {
    addrs.iter().any(is_private_address)
}
