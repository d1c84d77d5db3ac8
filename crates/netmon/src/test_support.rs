//! In-process fakes for the dependency facade.

use crate::config::{InMemoryConfig, MonitorSettings};
use crate::deps::{
    Clock, Dependencies, DnsResolver, HttpClient, HttpRequest, HttpResponse, RandomSource,
    ResolvePath, SignalContextSource, TcpHealthSource, TcpHealthSummary,
};
use crate::error::ProbeError;
use crate::stall::report::{TransportContext, WifiContext};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PUBLIC_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum DnsAnswer {
    Reply(Result<Vec<IpAddr>, ProbeError>),
    Hang,
}

/// Resolver answering from a table; unknown hosts get [`PUBLIC_ADDR`].
#[derive(Debug, Default)]
pub struct FakeDns {
    answers: Mutex<HashMap<String, DnsAnswer>>,
    failed_paths: Mutex<HashSet<ResolvePath>>,
    queries: Mutex<Vec<(String, ResolvePath)>>,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, host: &str, answer: Result<Vec<IpAddr>, ProbeError>) {
        lock(&self.answers).insert(host.to_string(), DnsAnswer::Reply(answer));
    }

    pub fn hang(&self, host: &str) {
        lock(&self.answers).insert(host.to_string(), DnsAnswer::Hang);
    }

    /// Every lookup over `path` fails.
    pub fn fail_path(&self, path: ResolvePath) {
        lock(&self.failed_paths).insert(path);
    }

    pub fn queries(&self) -> Vec<(String, ResolvePath)> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl DnsResolver for FakeDns {
    async fn resolve(&self, host: &str, path: ResolvePath) -> Result<Vec<IpAddr>, ProbeError> {
        lock(&self.queries).push((host.to_string(), path));
        if lock(&self.failed_paths).contains(&path) {
            return Err(ProbeError::Dns(format!("{:?} path down", path)));
        }
        let answer = lock(&self.answers).get(host).cloned();
        match answer {
            Some(DnsAnswer::Reply(res)) => res,
            Some(DnsAnswer::Hang) => std::future::pending().await,
            None => Ok(vec![PUBLIC_ADDR]),
        }
    }
}

#[derive(Debug, Clone)]
enum HttpAnswer {
    Reply(HttpResponse),
    Error(ProbeError),
    Delayed(Duration, HttpResponse),
    Hang,
}

#[derive(Debug, Clone, Copy)]
enum DownloadAnswer {
    Bytes(u64),
    Hang,
}

/// HTTP client answering from a table keyed by URL; unknown URLs fail to
/// connect.
#[derive(Debug, Default)]
pub struct FakeHttp {
    answers: Mutex<HashMap<String, HttpAnswer>>,
    downloads: Mutex<HashMap<String, DownloadAnswer>>,
    requests: Mutex<Vec<HttpRequest>>,
    download_calls: AtomicU32,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: HttpResponse) {
        lock(&self.answers).insert(normalize(url), HttpAnswer::Reply(response));
    }

    pub fn respond_after(&self, url: &str, delay: Duration, response: HttpResponse) {
        lock(&self.answers).insert(normalize(url), HttpAnswer::Delayed(delay, response));
    }

    pub fn fail(&self, url: &str, error: ProbeError) {
        lock(&self.answers).insert(normalize(url), HttpAnswer::Error(error));
    }

    pub fn hang(&self, url: &str) {
        lock(&self.answers).insert(normalize(url), HttpAnswer::Hang);
    }

    pub fn download_size(&self, url: &str, bytes: u64) {
        lock(&self.downloads).insert(normalize(url), DownloadAnswer::Bytes(bytes));
    }

    pub fn hang_download(&self, url: &str) {
        lock(&self.downloads).insert(normalize(url), DownloadAnswer::Hang);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests sent to `url`.
    pub fn calls(&self, url: &str) -> usize {
        let url = normalize(url);
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    pub fn download_calls(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn truncate(mut response: HttpResponse, max_body: usize) -> HttpResponse {
    if response.body.len() > max_body {
        response.body.truncate(max_body);
    }
    response
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, ProbeError> {
        let max_body = request.max_body;
        let answer = lock(&self.answers).get(request.url.as_str()).cloned();
        lock(&self.requests).push(request);
        match answer {
            Some(HttpAnswer::Reply(resp)) => Ok(truncate(resp, max_body)),
            Some(HttpAnswer::Error(e)) => Err(e),
            Some(HttpAnswer::Delayed(delay, resp)) => {
                tokio::time::sleep(delay).await;
                Ok(truncate(resp, max_body))
            }
            Some(HttpAnswer::Hang) => std::future::pending().await,
            None => Err(ProbeError::Connect("connection refused".into())),
        }
    }

    async fn download(&self, url: &Url) -> Result<u64, ProbeError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let answer = lock(&self.downloads).get(url.as_str()).copied();
        match answer {
            Some(DownloadAnswer::Bytes(n)) => Ok(n),
            Some(DownloadAnswer::Hang) => std::future::pending().await,
            None => Err(ProbeError::Connect("connection refused".into())),
        }
    }
}

pub fn response(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        ..Default::default()
    }
}

pub fn redirect(status: u16, location: &str) -> HttpResponse {
    let mut resp = response(status);
    resp.headers.insert("location".into(), location.into());
    resp
}

pub fn ok_with_body(body: &str, content_length: Option<u64>) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        content_length,
        body: body.to_string().into(),
    }
}

pub fn json_response(body: &str) -> HttpResponse {
    let mut resp = ok_with_body(body, Some(body.len() as u64));
    resp.headers
        .insert("content-type".into(), "application/captive+json".into());
    resp
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Duration, DateTime<Utc>)>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        let wall = Utc
            .with_ymd_and_hms(2026, 1, 15, 9, 0, 0)
            .single()
            .unwrap_or_default();
        Self {
            state: Mutex::new((Duration::from_secs(1000), wall)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = lock(&self.state);
        state.0 += by;
        state.1 += chrono::Duration::from_std(by).unwrap_or_default();
    }
}

impl Clock for ManualClock {
    fn elapsed_realtime(&self) -> Duration {
        lock(&self.state).0
    }

    fn now_utc(&self) -> DateTime<Utc> {
        lock(&self.state).1
    }
}

/// Random source returning a fixed value.
#[derive(Debug)]
pub struct FixedRandom(AtomicU32);

impl FixedRandom {
    pub fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl RandomSource for FixedRandom {
    fn next_u32(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeTcp {
    summary: Mutex<Option<TcpHealthSummary>>,
    polls: AtomicU32,
}

impl FakeTcp {
    pub fn set(&self, summary: TcpHealthSummary) {
        *lock(&self.summary) = Some(summary);
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

impl TcpHealthSource for FakeTcp {
    fn poll(&self) -> Option<TcpHealthSummary> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.summary)
    }
}

#[derive(Debug, Default)]
pub struct FakeSignal;

impl SignalContextSource for FakeSignal {
    fn transport_context(&self) -> TransportContext {
        TransportContext::Wifi(WifiContext {
            frequency_mhz: 5180,
            rssi_dbm: -55,
        })
    }
}

/// Fakes wired into a [`Dependencies`] bundle.
pub struct TestHarness {
    pub deps: Dependencies,
    pub dns: Arc<FakeDns>,
    pub http: Arc<FakeHttp>,
    pub clock: Arc<ManualClock>,
    pub random: Arc<FixedRandom>,
    pub config: Arc<InMemoryConfig>,
    pub tcp: Arc<FakeTcp>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        let dns = Arc::new(FakeDns::new());
        let http = Arc::new(FakeHttp::new());
        let clock = Arc::new(ManualClock::new());
        let random = Arc::new(FixedRandom::new(0));
        let config = Arc::new(InMemoryConfig::new());
        let tcp = Arc::new(FakeTcp::default());
        let deps = Dependencies {
            clock: clock.clone(),
            random: random.clone(),
            config: config.clone(),
            dns: dns.clone(),
            http: http.clone(),
            tcp: Some(tcp.clone()),
            signal: Arc::new(FakeSignal),
        };
        Self {
            deps,
            dns,
            http,
            clock,
            random,
            config,
            tcp,
        }
    }
}

/// Settings with short timers so tests finish quickly.
pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        dns_probe_timeout: Duration::from_millis(500),
        http_probe_timeout: Duration::from_millis(500),
        probe_timeout: Duration::from_millis(300),
        initial_reevaluate_delay: Duration::from_millis(20),
        tcp_polling_interval: Duration::ZERO,
        bandwidth_min_retry: Duration::from_millis(20),
        bandwidth_max_retry: Duration::from_millis(80),
        ..MonitorSettings::default()
    }
}
