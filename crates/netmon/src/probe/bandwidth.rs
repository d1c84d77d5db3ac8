//! Bandwidth check for unmetered Wi-Fi networks.

use crate::deps::HttpClient;
use crate::types::NetworkCapabilities;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// Result of one bandwidth download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthOutcome {
    /// Downloaded this many bytes.
    Completed(u64),
    /// Transport error; the check is considered done.
    Errored,
    TimedOut,
}

/// Whether a bandwidth check should run for this network.
pub fn needs_bandwidth_check(
    caps: &NetworkCapabilities,
    url: Option<&Url>,
    already_done: bool,
) -> bool {
    !already_done && url.is_some() && !caps.is_metered() && caps.is_wifi_only()
}

pub async fn check_bandwidth(client: &dyn HttpClient, url: &Url, timeout: Duration) -> BandwidthOutcome {
    let started = tokio::time::Instant::now();
    match tokio::time::timeout(timeout, client.download(url)).await {
        Ok(Ok(bytes)) => {
            info!(
                "Bandwidth check {} downloaded {} bytes in {:?}",
                url,
                bytes,
                started.elapsed()
            );
            BandwidthOutcome::Completed(bytes)
        }
        Ok(Err(e)) => {
            debug!("Bandwidth check {} failed: {}", url, e);
            BandwidthOutcome::Errored
        }
        Err(_) => {
            info!("Bandwidth check {} timed out after {:?}", url, timeout);
            BandwidthOutcome::TimedOut
        }
    }
}

/// Doubling retry delay, capped.
pub fn next_retry_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
