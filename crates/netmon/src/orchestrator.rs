//! Probe orchestration for one evaluation.
//!
//! ```text
//!  private DNS (strict mode only)
//!        │
//!  capport API ──captive──────────────────────────────► PORTAL
//!        │ not captive / absent
//!  DNS probes (all probe hosts, concurrently)
//!        │
//!  HTTPS + HTTP probes (bounded concurrency)
//!        │   first conclusive result wins ──────────────► PORTAL / VALID
//!        │   probe_timeout or all inconclusive
//!  fallback probe (spec or URL) ──portal────────────────► PORTAL
//!        │
//!  fold: HTTPS failed + HTTP/fallback ok ► PARTIAL, else INVALID
//! ```
//!
//! After an HTTPS success, HTTP probes still in flight get a short grace
//! period so their outcome lands in the probe masks. Anything else still
//! in flight when a conclusive result arrives is dropped.

use crate::config::{CaptivePortalMode, MonitorSettings, ProbeConfig};
use crate::deps::{Dependencies, ResolvePath};
use crate::probe::capport::{CaptivePortalData, fetch_capport, is_capport_url_allowed};
use crate::probe::dns::{has_private_address, probe_dns};
use crate::probe::http::HttpProber;
use crate::probe::private_dns::{PrivateDnsResolution, probe_private_dns};
use crate::probe::result::{PortalProbeResult, ProbeStatus};
use crate::selection::FallbackSelection;
use crate::types::NetworkCapabilities;
use crate::verdict::{ProbeKind, ProbeSet};
use futures::future::{BoxFuture, Fuse, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Url;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long HTTP probes may keep running once HTTPS has validated.
const HTTPS_SETTLE_GRACE: Duration = Duration::from_millis(100);

/// Per-evaluation inputs owned by the state machine.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub evaluation_id: Uuid,
    pub capabilities: NetworkCapabilities,
    pub fallback: FallbackSelection,
}

/// Classification produced by one evaluation.
#[derive(Debug, Clone)]
pub enum ProbeVerdict {
    Valid,
    Partial,
    Portal(PortalProbeResult),
    Invalid,
}

impl std::fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeVerdict::Valid => write!(f, "VALID"),
            ProbeVerdict::Partial => write!(f, "PARTIAL"),
            ProbeVerdict::Portal(r) => write!(f, "PORTAL ({})", r),
            ProbeVerdict::Invalid => write!(f, "INVALID"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub verdict: ProbeVerdict,
    pub attempted: ProbeSet,
    pub succeeded: ProbeSet,
    pub capport_data: Option<CaptivePortalData>,
    pub private_dns: Option<PrivateDnsResolution>,
    /// A fallback probe ran and neither succeeded nor found a portal.
    pub fallback_inconclusive: bool,
    /// Validation was disabled by configuration; no probes ran.
    pub validation_skipped: bool,
}

/// Attempted/succeeded bookkeeping for one evaluation.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    attempted: ProbeSet,
    succeeded: ProbeSet,
}

impl Tally {
    fn note(&mut self, kind: ProbeKind, success: bool) {
        self.attempted.insert(kind);
        if success {
            self.succeeded.insert(kind);
            // Reaching an HTTP(S) server proves name resolution works.
            if matches!(kind, ProbeKind::Http | ProbeKind::Https) {
                self.attempted.insert(ProbeKind::Dns);
                self.succeeded.insert(ProbeKind::Dns);
            }
        }
    }

    fn note_result(&mut self, result: &PortalProbeResult) {
        if result.status == ProbeStatus::PrivateIp {
            return;
        }
        for kind in result.probe_kinds.iter() {
            self.note(kind, result.is_success());
        }
    }
}

pub struct ProbeOrchestrator {
    deps: Dependencies,
    settings: Arc<MonitorSettings>,
}

impl ProbeOrchestrator {
    pub fn new(deps: Dependencies, settings: Arc<MonitorSettings>) -> Self {
        Self { deps, settings }
    }

    /// Run one full evaluation. Never fails: every probe error is folded
    /// into the verdict.
    pub async fn evaluate(&self, config: &ProbeConfig, ctx: &EvaluationContext) -> EvaluationOutcome {
        let mut tally = Tally::default();
        let mut outcome = EvaluationOutcome {
            verdict: ProbeVerdict::Invalid,
            attempted: ProbeSet::EMPTY,
            succeeded: ProbeSet::EMPTY,
            capport_data: None,
            private_dns: None,
            fallback_inconclusive: false,
            validation_skipped: false,
        };

        if config.mode == CaptivePortalMode::Ignore {
            info!("Validation disabled by captive portal mode");
            outcome.verdict = ProbeVerdict::Valid;
            outcome.validation_skipped = true;
            return outcome;
        }

        if config.http_urls.is_empty() || (config.use_https && config.https_urls.is_empty()) {
            warn!("No usable probe URLs configured");
            return outcome;
        }

        if let Some(hostname) = &config.private_dns_hostname {
            match probe_private_dns(
                self.deps.dns.as_ref(),
                self.deps.random.as_ref(),
                hostname,
                self.settings.dns_probe_timeout,
            )
            .await
            {
                Ok(resolution) => {
                    tally.note(ProbeKind::PrivateDns, true);
                    outcome.private_dns = Some(resolution);
                }
                Err(_) => tally.note(ProbeKind::PrivateDns, false),
            }
        }
        let private_dns_failed =
            config.private_dns_hostname.is_some() && outcome.private_dns.is_none();

        let mut api_not_captive = false;
        if let Some(url) = self.capport_url(config, &ctx.capabilities) {
            let data = fetch_capport(
                self.deps.http.as_ref(),
                &url,
                self.settings.http_probe_timeout,
                self.deps.clock.now_utc(),
            )
            .await;
            tally.note(ProbeKind::Capport, data.is_some());
            if let Some(data) = &data {
                if data.captive {
                    let result = PortalProbeResult::portal(
                        ProbeKind::Capport,
                        None,
                        data.user_portal_url.clone(),
                        Some(url.to_string()),
                    );
                    info!("Capport API reports captive, portal at {:?}", data.user_portal_url);
                    outcome.capport_data = Some(data.clone());
                    outcome.verdict = ProbeVerdict::Portal(result);
                    outcome.attempted = tally.attempted;
                    outcome.succeeded = tally.succeeded;
                    return outcome;
                }
                api_not_captive = true;
            }
            outcome.capport_data = data;
        }

        let (verdict, fallback_inconclusive) = self
            .run_http_probes(config, ctx, &mut tally, api_not_captive)
            .await;
        outcome.verdict = match verdict {
            ProbeVerdict::Valid if private_dns_failed => {
                info!("Probes succeeded but private DNS failed");
                ProbeVerdict::Invalid
            }
            v => v,
        };
        outcome.fallback_inconclusive = fallback_inconclusive;
        outcome.attempted = tally.attempted;
        outcome.succeeded = tally.succeeded;
        debug!(
            "Evaluation {} finished: {} attempted={} succeeded={}",
            ctx.evaluation_id, outcome.verdict, outcome.attempted, outcome.succeeded
        );
        outcome
    }

    fn capport_url(&self, config: &ProbeConfig, caps: &NetworkCapabilities) -> Option<Url> {
        let raw = config.capport_url.as_deref()?;
        match Url::parse(raw) {
            Ok(url) if is_capport_url_allowed(&url, caps.is_test_network()) => Some(url),
            Ok(url) => {
                warn!("Ignoring capport API URL with disallowed scheme: {}", url);
                None
            }
            Err(e) => {
                warn!("Ignoring invalid capport API URL {:?}: {}", raw, e);
                None
            }
        }
    }

    async fn resolve_probe_hosts(
        &self,
        config: &ProbeConfig,
        tally: &mut Tally,
    ) -> HashMap<String, Vec<IpAddr>> {
        let mut hosts: Vec<String> = Vec::new();
        let https = if config.use_https { config.https_urls.as_slice() } else { &[] };
        for url in config.http_urls.iter().chain(https) {
            if let Some(host) = url.host_str() {
                if !hosts.iter().any(|h| h == host) {
                    hosts.push(host.to_string());
                }
            }
        }

        let timeout = self.settings.dns_probe_timeout;
        let lookups = hosts.into_iter().map(|host| async move {
            let res = probe_dns(
                self.deps.dns.as_ref(),
                &host,
                ResolvePath::BypassPrivateDns,
                timeout,
            )
            .await;
            (host, res)
        });
        let mut resolved = HashMap::new();
        let mut any_ok = false;
        for (host, res) in futures::future::join_all(lookups).await {
            if let Ok(addrs) = res {
                any_ok = true;
                resolved.insert(host, addrs);
            }
        }
        tally.note(ProbeKind::Dns, any_ok);
        resolved
    }

    async fn run_http_probes(
        &self,
        config: &ProbeConfig,
        ctx: &EvaluationContext,
        tally: &mut Tally,
        api_not_captive: bool,
    ) -> (ProbeVerdict, bool) {
        let resolved = self.resolve_probe_hosts(config, tally).await;

        let prober = HttpProber {
            client: self.deps.http.as_ref(),
            timeout: self.settings.http_probe_timeout,
            user_agent: config.user_agent.as_deref(),
            content: &config.content,
        };

        let mut queue: Vec<BoxFuture<'_, PortalProbeResult>> = Vec::new();
        if config.use_https {
            for url in &config.https_urls {
                queue.push(prober.probe(url, ProbeKind::Https, None).boxed());
            }
        }
        for url in &config.http_urls {
            let private = self.settings.private_ip_no_internet
                && url
                    .host_str()
                    .and_then(|h| resolved.get(h))
                    .is_some_and(|addrs| has_private_address(addrs));
            if private {
                info!("{} resolves to a private address", url);
                queue.push(futures::future::ready(PortalProbeResult::private_ip(ProbeKind::Http)).boxed());
            } else {
                queue.push(prober.probe(url, ProbeKind::Http, None).boxed());
            }
        }

        // Bounded concurrency: start the next probe each time one finishes.
        let limit = self.settings.max_probe_concurrency.max(1);
        let mut waiting = queue.into_iter();
        let mut running = FuturesUnordered::new();
        for fut in waiting.by_ref().take(limit) {
            running.push(fut);
        }

        let https_total = if config.use_https { config.https_urls.len() } else { 0 };
        let mut https_failed = 0usize;
        let mut http_success = false;
        let mut http_private_ip = false;
        let mut probes_done = false;

        let fallback_target = ctx.fallback.target(config);
        let mut fallback: Fuse<BoxFuture<'_, PortalProbeResult>> = Fuse::terminated();
        let mut fallback_started = false;
        let mut fallback_result: Option<PortalProbeResult> = None;
        let deadline = tokio::time::sleep(self.settings.probe_timeout);
        tokio::pin!(deadline);

        loop {
            let can_start_fallback =
                !fallback_started && !http_private_ip && fallback_target.is_some();
            if probes_done && !can_start_fallback && fallback_result.is_some() == fallback_started {
                break;
            }
            if probes_done && can_start_fallback {
                deadline.as_mut().reset(tokio::time::Instant::now());
            }

            tokio::select! {
                next = running.next(), if !probes_done => {
                    let Some(mut result) = next else {
                        probes_done = true;
                        continue;
                    };
                    if let Some(fut) = waiting.next() {
                        running.push(fut);
                    }
                    if api_not_captive && result.is_portal() {
                        debug!("Capport API says not captive; {} treated as failure", result);
                        result.status = ProbeStatus::Failed;
                    }
                    tally.note_result(&result);
                    match result.status {
                        ProbeStatus::Portal if result.concluded_by(ProbeKind::Http) => {
                            return (ProbeVerdict::Portal(result), false);
                        }
                        ProbeStatus::Success if result.concluded_by(ProbeKind::Https) => {
                            settle_running(&mut running, tally).await;
                            return (ProbeVerdict::Valid, false);
                        }
                        ProbeStatus::Success if !config.use_https => {
                            return (ProbeVerdict::Valid, false);
                        }
                        ProbeStatus::Success => http_success = true,
                        ProbeStatus::PrivateIp => http_private_ip = true,
                        _ if result.concluded_by(ProbeKind::Https) => https_failed += 1,
                        _ => {}
                    }
                }
                _ = &mut deadline, if can_start_fallback => {
                    if let Some(target) = fallback_target {
                        info!("No conclusive result, probing fallback {}", target.url());
                        fallback = prober.probe(target.url(), ProbeKind::Fallback, target.spec()).boxed().fuse();
                        fallback_started = true;
                    }
                }
                result = &mut fallback, if fallback_started && fallback_result.is_none() => {
                    tally.note_result(&result);
                    if result.is_portal() && !api_not_captive {
                        return (ProbeVerdict::Portal(result), false);
                    }
                    fallback_result = Some(result);
                }
            }
        }

        let fallback_success = fallback_result.as_ref().is_some_and(|r| r.is_success());
        let fallback_inconclusive = fallback_result.as_ref().is_some_and(|r| !r.is_success());
        if config.use_https && https_failed == https_total && (http_success || fallback_success) {
            return (ProbeVerdict::Partial, fallback_inconclusive);
        }
        if !config.use_https && fallback_success {
            return (ProbeVerdict::Valid, false);
        }
        (ProbeVerdict::Invalid, fallback_inconclusive)
    }
}

/// Record whatever the still-running probes report within the grace
/// period. The verdict is already decided.
async fn settle_running(
    running: &mut FuturesUnordered<BoxFuture<'_, PortalProbeResult>>,
    tally: &mut Tally,
) {
    if running.is_empty() {
        return;
    }
    let drained = tokio::time::timeout(HTTPS_SETTLE_GRACE, async {
        while let Some(result) = running.next().await {
            tally.note_result(&result);
        }
    })
    .await;
    if drained.is_err() {
        debug!("{} probes still running after HTTPS success", running.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_FALLBACK_URL, DEFAULT_HTTPS_URL, DEFAULT_HTTP_URL, keys};
    use crate::deps::Clock;
    use crate::error::ProbeError;
    use crate::test_support::{
        TestHarness, fast_settings, json_response, redirect, response,
    };

    fn orchestrator(h: &TestHarness) -> ProbeOrchestrator {
        ProbeOrchestrator::new(h.deps.clone(), Arc::new(fast_settings()))
    }

    fn config(h: &TestHarness) -> ProbeConfig {
        ProbeConfig::build(h.config.as_ref(), &fast_settings(), None, h.clock.now_utc())
    }

    fn context(h: &TestHarness, config: &ProbeConfig) -> EvaluationContext {
        EvaluationContext {
            evaluation_id: Uuid::new_v4(),
            capabilities: NetworkCapabilities::default(),
            fallback: FallbackSelection::select(config, h.random.as_ref(), None),
        }
    }

    async fn evaluate(h: &TestHarness, config: &ProbeConfig) -> EvaluationOutcome {
        orchestrator(h).evaluate(config, &context(h, config)).await
    }

    #[tokio::test]
    async fn test_all_success_is_valid() {
        let h = TestHarness::new();
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        h.http.respond(DEFAULT_HTTP_URL, response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert_eq!(out.succeeded, ProbeKind::Dns | ProbeKind::Http | ProbeKind::Https);
        assert!(!out.attempted.contains(ProbeKind::Fallback));
    }

    #[tokio::test]
    async fn test_slow_http_after_https_success_is_recorded() {
        let h = TestHarness::new();
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        h.http.respond_after(DEFAULT_HTTP_URL, Duration::from_millis(30), response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert!(out.succeeded.contains(ProbeKind::Http));
        assert!(out.succeeded.contains(ProbeKind::Https));
    }

    #[tokio::test]
    async fn test_hanging_http_does_not_hold_https_success() {
        let h = TestHarness::new();
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        h.http.hang(DEFAULT_HTTP_URL);
        let started = tokio::time::Instant::now();
        let out = evaluate(&h, &config(&h)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert!(out.attempted.contains(ProbeKind::Https));
        assert!(!out.succeeded.contains(ProbeKind::Http));
    }

    #[tokio::test]
    async fn test_http_redirect_is_portal() {
        let h = TestHarness::new();
        h.http.hang(DEFAULT_HTTPS_URL);
        h.http.respond(DEFAULT_HTTP_URL, redirect(302, "http://portal.example/login"));
        let out = evaluate(&h, &config(&h)).await;
        let ProbeVerdict::Portal(result) = out.verdict else {
            panic!("expected portal, got {}", out.verdict);
        };
        assert_eq!(result.redirect_url.as_deref(), Some("http://portal.example/login"));
        assert!(out.attempted.contains(ProbeKind::Http));
        assert!(!out.succeeded.contains(ProbeKind::Http));
    }

    #[tokio::test]
    async fn test_https_fail_http_ok_is_partial() {
        let h = TestHarness::new();
        h.http.fail(DEFAULT_HTTPS_URL, ProbeError::Tls("handshake".into()));
        h.http.respond(DEFAULT_HTTP_URL, response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Partial), "{}", out.verdict);
        assert!(out.succeeded.contains(ProbeKind::Http));
        assert!(!out.succeeded.contains(ProbeKind::Https));
        assert!(out.attempted.contains(ProbeKind::Https));
    }

    #[tokio::test]
    async fn test_all_fail_escalates_to_fallback() {
        let h = TestHarness::new();
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Invalid));
        assert!(out.attempted.contains(ProbeKind::Fallback));
        assert!(out.fallback_inconclusive);
        assert_eq!(h.http.calls(DEFAULT_FALLBACK_URL), 1);
    }

    #[tokio::test]
    async fn test_fallback_portal() {
        let h = TestHarness::new();
        h.http.respond(DEFAULT_FALLBACK_URL, redirect(302, "http://portal.example/"));
        let out = evaluate(&h, &config(&h)).await;
        let ProbeVerdict::Portal(result) = out.verdict else {
            panic!("expected portal, got {}", out.verdict);
        };
        assert!(result.concluded_by(ProbeKind::Fallback));
        assert!(!out.fallback_inconclusive);
    }

    #[tokio::test]
    async fn test_fallback_spec_success_gives_partial() {
        let h = TestHarness::new();
        h.config.set(
            keys::FALLBACK_PROBE_SPECS,
            "http://spec.example/probe@@/@@204@@/@@.*@@,@@not valid",
        );
        h.http.respond("http://spec.example/probe", response(204));
        let out = evaluate(&h, &config(&h)).await;
        // The spec needs a location to match; a bare 204 is a portal.
        assert!(matches!(out.verdict, ProbeVerdict::Portal(_)), "{}", out.verdict);

        h.http.respond(
            "http://spec.example/probe",
            redirect(204, "http://anything.example/"),
        );
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Partial), "{}", out.verdict);
        assert!(out.succeeded.contains(ProbeKind::Fallback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probes_trigger_fallback_after_timeout() {
        let h = TestHarness::new();
        h.http.respond_after(DEFAULT_HTTPS_URL, Duration::from_millis(450), response(204));
        h.http.hang(DEFAULT_HTTP_URL);
        h.http.respond(DEFAULT_FALLBACK_URL, response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert_eq!(h.http.calls(DEFAULT_FALLBACK_URL), 1);
    }

    #[tokio::test]
    async fn test_capport_captive_short_circuits() {
        let h = TestHarness::new();
        let api = "https://capport.example/api";
        h.http.respond(
            api,
            json_response(r#"{"captive": true, "user-portal-url": "https://login.example/"}"#),
        );
        let mut cfg = config(&h);
        cfg.capport_url = Some(api.into());
        let out = evaluate(&h, &cfg).await;
        let ProbeVerdict::Portal(result) = out.verdict else {
            panic!("expected portal");
        };
        assert_eq!(result.redirect_url.as_deref(), Some("https://login.example/"));
        assert!(out.capport_data.is_some());
        assert_eq!(h.http.calls(DEFAULT_HTTP_URL), 0);
        assert_eq!(h.http.calls(DEFAULT_HTTPS_URL), 0);
    }

    #[tokio::test]
    async fn test_capport_not_captive_overrides_http_redirect() {
        let h = TestHarness::new();
        let api = "https://capport.example/api";
        h.http.respond(api, json_response(r#"{"captive": false}"#));
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        h.http.respond_after(
            DEFAULT_HTTP_URL,
            Duration::from_millis(50),
            redirect(302, "http://portal.example/"),
        );
        let mut cfg = config(&h);
        cfg.capport_url = Some(api.into());
        let out = evaluate(&h, &cfg).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid), "{}", out.verdict);
        assert!(out.succeeded.contains(ProbeKind::Capport));
        assert_eq!(out.capport_data.map(|d| d.captive), Some(false));
    }

    #[tokio::test]
    async fn test_plain_http_capport_rejected_outside_test_network() {
        let h = TestHarness::new();
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        let mut cfg = config(&h);
        cfg.capport_url = Some("http://capport.example/api".into());
        let out = evaluate(&h, &cfg).await;
        assert!(!out.attempted.contains(ProbeKind::Capport));
        assert_eq!(h.http.calls("http://capport.example/api"), 0);
    }

    #[tokio::test]
    async fn test_private_ip_is_not_portal() {
        let h = TestHarness::new();
        let mut settings = fast_settings();
        settings.private_ip_no_internet = true;
        h.dns.answer(
            "connectivitycheck.gstatic.com",
            Ok(vec!["192.168.0.1".parse().unwrap()]),
        );
        h.http.respond(DEFAULT_HTTP_URL, redirect(302, "http://portal.example/"));
        let cfg = config(&h);
        let orch = ProbeOrchestrator::new(h.deps.clone(), Arc::new(settings));
        let out = orch.evaluate(&cfg, &context(&h, &cfg)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Invalid), "{}", out.verdict);
        assert_eq!(h.http.calls(DEFAULT_HTTP_URL), 0);
        assert!(!out.attempted.contains(ProbeKind::Fallback));
    }

    #[tokio::test]
    async fn test_dns_failure_still_runs_http() {
        let h = TestHarness::new();
        h.dns.fail_path(ResolvePath::BypassPrivateDns);
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        // The HTTPS success implies working DNS.
        assert!(out.succeeded.contains(ProbeKind::Dns));
    }

    #[tokio::test]
    async fn test_private_dns_failure_invalidates() {
        let h = TestHarness::new();
        h.dns.fail_path(ResolvePath::Network);
        h.http.respond(DEFAULT_HTTPS_URL, response(204));
        let mut cfg = config(&h);
        cfg.private_dns_hostname = Some("dns.example".into());
        let out = evaluate(&h, &cfg).await;
        assert!(matches!(out.verdict, ProbeVerdict::Invalid));
        assert!(out.attempted.contains(ProbeKind::PrivateDns));
        assert!(!out.succeeded.contains(ProbeKind::PrivateDns));
    }

    #[tokio::test]
    async fn test_ignore_mode_skips_probes() {
        let h = TestHarness::new();
        h.config.set(keys::CAPTIVE_PORTAL_MODE, "0");
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert!(out.validation_skipped);
        assert!(h.http.requests().is_empty());
    }

    #[tokio::test]
    async fn test_https_disabled() {
        let h = TestHarness::new();
        h.config.set(keys::USE_HTTPS, "0");
        h.http.respond(DEFAULT_HTTP_URL, response(204));
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
        assert_eq!(h.http.calls(DEFAULT_HTTPS_URL), 0);
    }

    #[tokio::test]
    async fn test_multiple_urls_any_https_success() {
        let h = TestHarness::new();
        h.config.set(keys::OTHER_HTTPS_URLS, "https://second.example/generate_204");
        h.http.fail(DEFAULT_HTTPS_URL, ProbeError::Tls("bad cert".into()));
        h.http.respond_after(
            "https://second.example/generate_204",
            Duration::from_millis(20),
            response(204),
        );
        let out = evaluate(&h, &config(&h)).await;
        assert!(matches!(out.verdict, ProbeVerdict::Valid));
    }
}
