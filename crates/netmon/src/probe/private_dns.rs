//! Strict-mode private DNS probe.

use crate::deps::{DnsResolver, RandomSource, ResolvePath};
use crate::error::ProbeError;
use crate::probe::dns::probe_dns;
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;

/// One-off names end with this so every probe misses resolver caches.
pub const ONE_OFF_HOSTNAME_SUFFIX: &str = "-dnsotls-ds.metric.gstatic.com";

pub fn one_off_hostname(random: &dyn RandomSource) -> String {
    format!("{:08x}{}", random.next_u32(), ONE_OFF_HOSTNAME_SUFFIX)
}

/// Addresses learned while validating the private DNS provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateDnsResolution {
    pub hostname: String,
    pub provider_addresses: Vec<IpAddr>,
}

/// Resolve the provider over plain DNS, then a one-off name through the
/// private DNS path.
pub async fn probe_private_dns(
    resolver: &dyn DnsResolver,
    random: &dyn RandomSource,
    hostname: &str,
    timeout: Duration,
) -> Result<PrivateDnsResolution, ProbeError> {
    let provider_addresses =
        probe_dns(resolver, hostname, ResolvePath::BypassPrivateDns, timeout).await?;
    let one_off = one_off_hostname(random);
    match probe_dns(resolver, &one_off, ResolvePath::Network, timeout).await {
        Ok(_) => {
            info!("Private DNS provider {} validated via {}", hostname, one_off);
            Ok(PrivateDnsResolution {
                hostname: hostname.to_string(),
                provider_addresses,
            })
        }
        Err(e) => {
            info!("Private DNS provider {} failed: {}", hostname, e);
            Err(e)
        }
    }
}
