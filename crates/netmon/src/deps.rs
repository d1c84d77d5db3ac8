//! Dependencies facade.
//!
//! Every platform service the engine touches goes through one of these
//! traits so the engine can run against real sockets ([`crate::transport`])
//! or in-process fakes in tests.
//!
//! ```text
//!   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//!   │ DnsResolver │   │  HttpClient  │   │ ConfigStore │
//!   └──────┬──────┘   └──────┬───────┘   └──────┬──────┘
//!          └────────────┬────┴──────────────────┘
//!                 Dependencies (Arc<dyn ...>)
//!          ┌────────────┴────┬──────────────────┐
//!   ┌──────┴──────┐   ┌──────┴───────┐   ┌──────┴──────────────┐
//!   │ Clock / Rng │   │ TcpHealth    │   │ SignalContextSource │
//!   └─────────────┘   └──────────────┘   └─────────────────────┘
//! ```

use crate::config::ConfigStore;
use crate::error::ProbeError;
use crate::stall::report::TransportContext;
use crate::types::MccMnc;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Monotonic and wall clock.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary fixed origin.
    fn elapsed_realtime(&self) -> Duration;

    fn now_utc(&self) -> DateTime<Utc>;
}

/// Source of randomness used for fallback selection and one-off hostnames.
pub trait RandomSource: Send + Sync {
    fn next_u32(&self) -> u32;
}

/// Which resolver path a lookup takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvePath {
    /// Plain DNS, bypassing any private DNS configuration.
    BypassPrivateDns,
    /// The network's configured resolver, including private DNS.
    Network,
}

#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, host: &str, path: ResolvePath) -> Result<Vec<IpAddr>, ProbeError>;
}

/// A single HTTP probe request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub follow_redirects: bool,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Body bytes beyond this limit are not read.
    pub max_body: usize,
}

impl HttpRequest {
    pub fn get(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            follow_redirects: false,
            headers: Vec::new(),
            timeout,
            max_body: 0,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn max_body(mut self, limit: usize) -> Self {
        self.max_body = limit;
        self
    }
}

/// Response to an [`HttpRequest`].
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub content_length: Option<u64>,
    /// Body truncated to the request's `max_body`.
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, ProbeError>;

    /// Download the full body of `url`, returning the byte count.
    async fn download(&self, url: &Url) -> Result<u64, ProbeError>;
}

/// TCP health over the last polling period, collected by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TcpHealthSummary {
    pub sent_packets: u32,
    /// Packets received during the latest period.
    pub received_packets: u32,
    /// Lost plus retransmitted over sent, in percent.
    pub fail_rate_percent: u32,
    pub collection_period: Duration,
}

pub trait TcpHealthSource: Send + Sync {
    /// Collect a fresh summary; `None` when statistics are unavailable.
    fn poll(&self) -> Option<TcpHealthSummary>;
}

/// Radio and carrier information gathered at report time.
pub trait SignalContextSource: Send + Sync {
    fn transport_context(&self) -> TransportContext;

    fn sim_carrier_id(&self) -> Option<i32> {
        None
    }

    /// Country the device is currently located in, when known.
    fn location_mcc_mnc(&self) -> Option<MccMnc> {
        None
    }
}

/// Bundle of facade implementations handed to the engine.
#[derive(Clone)]
pub struct Dependencies {
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub config: Arc<dyn ConfigStore>,
    pub dns: Arc<dyn DnsResolver>,
    pub http: Arc<dyn HttpClient>,
    pub tcp: Option<Arc<dyn TcpHealthSource>>,
    pub signal: Arc<dyn SignalContextSource>,
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("tcp", &self.tcp.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), "http://login.example/".to_string());
        let resp = HttpResponse {
            status: 302,
            headers,
            ..Default::default()
        };
        assert_eq!(resp.header("Location"), Some("http://login.example/"));
        assert_eq!(resp.header("content-type"), None);
    }

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://capport.example/api").unwrap();
        let req = HttpRequest::get(url, Duration::from_secs(10))
            .header("Accept", "application/captive+json")
            .max_body(4096);
        assert!(!req.follow_redirects);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.max_body, 4096);
    }
}
