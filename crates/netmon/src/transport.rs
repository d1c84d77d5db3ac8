//! Production implementations of the dependency facade.
//!
//! HTTP goes through reqwest with rustls, DNS through the system resolver
//! via `tokio::net::lookup_host`. The system resolver has no way to bypass
//! private DNS, so both [`ResolvePath`]s use the same lookup.

use crate::config::ConfigStore;
use crate::deps::{
    Clock, Dependencies, DnsResolver, HttpClient, HttpRequest, HttpResponse, RandomSource,
    ResolvePath, SignalContextSource,
};
use crate::error::ProbeError;
use crate::stall::report::TransportContext;
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Redirect hops followed when a request asks for it.
const MAX_REDIRECTS: usize = 10;

fn is_tls_failure(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<rustls::Error>() {
            return true;
        }
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

fn map_error(e: reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else if is_tls_failure(&e) {
        ProbeError::Tls(e.to_string())
    } else if e.is_connect() {
        ProbeError::Connect(e.to_string())
    } else if e.is_builder() {
        ProbeError::InvalidUrl(e.to_string())
    } else if e.is_body() || e.is_decode() {
        ProbeError::Body(e.to_string())
    } else {
        ProbeError::Http(e.to_string())
    }
}

/// [`HttpClient`] backed by two reqwest clients, one per redirect policy.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    direct: reqwest::Client,
    following: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, ProbeError> {
        let build = |policy: Policy| {
            reqwest::Client::builder()
                .redirect(policy)
                .connect_timeout(connect_timeout)
                .no_proxy()
                .build()
                .map_err(|e| ProbeError::Http(e.to_string()))
        };
        Ok(Self {
            direct: build(Policy::none())?,
            following: build(Policy::limited(MAX_REDIRECTS))?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, ProbeError> {
        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.direct
        };
        let mut builder = client.get(request.url.clone()).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut response = builder
            .send()
            .await
            .map_err(|e| map_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        let mut body = BytesMut::new();
        while body.len() < request.max_body {
            match response
                .chunk()
                .await
                .map_err(|e| map_error(e, request.timeout))?
            {
                Some(chunk) => body.extend_from_slice(&chunk),
                None => break,
            }
        }
        body.truncate(request.max_body);

        debug!("GET {} -> {} ({} body bytes)", request.url, status, body.len());
        Ok(HttpResponse {
            status,
            headers,
            content_length,
            body: body.freeze(),
        })
    }

    async fn download(&self, url: &Url) -> Result<u64, ProbeError> {
        let mut response = self
            .following
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_error(e, Duration::ZERO))?;
        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_error(e, Duration::ZERO))?
        {
            total += chunk.len() as u64;
        }
        Ok(total)
    }
}

/// Resolver using the operating system's configured DNS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsResolver;

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(&self, host: &str, path: ResolvePath) -> Result<Vec<IpAddr>, ProbeError> {
        debug!("Resolving {} via {:?}", host, path);
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ProbeError::Dns(format!("{}: {}", host, e)))?;
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        if ips.is_empty() {
            return Err(ProbeError::DnsNotFound(host.to_string()));
        }
        Ok(ips)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed_realtime(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u32(&self) -> u32 {
        rand::random::<u32>()
    }
}

/// Signal source for hosts without radio information.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownSignal;

impl SignalContextSource for UnknownSignal {
    fn transport_context(&self) -> TransportContext {
        TransportContext::Unknown
    }
}

impl Dependencies {
    /// Wire the system resolver and a reqwest client. TCP statistics are
    /// left unset; hosts that collect them supply their own source.
    pub fn system(
        config: Arc<dyn ConfigStore>,
        connect_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        Ok(Self {
            clock: Arc::new(SystemClock::default()),
            random: Arc::new(ThreadRandom),
            config,
            dns: Arc::new(SystemDnsResolver),
            http: Arc::new(ReqwestHttpClient::new(connect_timeout)?),
            tcp: None,
            signal: Arc::new(UnknownSignal),
        })
    }
}
