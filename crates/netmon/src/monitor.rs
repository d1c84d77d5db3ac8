//! Evaluation state machine.
//!
//! One [`NetworkMonitor`] actor runs per network attachment. The host
//! drives it through a cloneable [`MonitorHandle`] and receives
//! [`MonitorEvent`]s on a channel it supplies at spawn time.
//!
//! ```text
//!                    connected / trigger
//!   UNEVALUATED ───────────────────────────► EVALUATING
//!                                               │
//!        ┌────────────────┬───────────────┬─────┴──────────┐
//!        ▼                ▼               ▼                ▼
//!      VALID           PARTIAL          PORTAL          INVALID
//!   (TCP polling,   (accept-partial  (sign-in       (one delayed retry
//!    bandwidth,      ► VALID|PARTIAL) registration)   after an
//!    stall checks)                                    inconclusive
//!                                                     fallback)
//! ```
//!
//! Any trigger from a terminal state starts a new evaluation. A trigger
//! that arrives while probes are running is coalesced into one follow-up
//! evaluation. Every spawned task reports back through this actor's own
//! channel tagged with the epoch it was started in; results from an older
//! epoch are discarded.

use crate::config::{CaptivePortalMode, MonitorSettings, ProbeConfig};
use crate::deps::{Dependencies, TcpHealthSummary};
use crate::orchestrator::{EvaluationContext, EvaluationOutcome, ProbeOrchestrator, ProbeVerdict};
use crate::portal::{AppResult, CaptivePortalController, PortalAction, SignInLaunch};
use crate::probe::bandwidth::{BandwidthOutcome, check_bandwidth, needs_bandwidth_check, next_retry_delay};
use crate::probe::capport::CaptivePortalData;
use crate::probe::private_dns::PrivateDnsResolution;
use crate::probe::result::PortalProbeResult;
use crate::selection::FallbackSelection;
use crate::stall::report::StallReport;
use crate::stall::{DataStallDetector, StallCheck};
use crate::types::{LinkProperties, NetworkCapabilities, NetworkId, PrivateDnsConfig};
use crate::verdict::{NetworkTestResult, ProbeSet, ValidationResult, ValidationState, Verdict};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Notifications emitted to the host.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    NetworkTested(NetworkTestResult),
    ProbeStatusChanged {
        attempted: ProbeSet,
        succeeded: ProbeSet,
    },
    DataStallSuspected(StallReport),
    ShowSignInNotification {
        network: NetworkId,
        redirect_url: Option<String>,
    },
    HideSignInNotification {
        network: NetworkId,
    },
    LaunchSignIn(SignInLaunch),
    CaptivePortalDataChanged(Option<CaptivePortalData>),
    PrivateDnsConfigResolved(PrivateDnsResolution),
}

fn event_name(event: &MonitorEvent) -> &'static str {
    match event {
        MonitorEvent::NetworkTested(_) => "NetworkTested",
        MonitorEvent::ProbeStatusChanged { .. } => "ProbeStatusChanged",
        MonitorEvent::DataStallSuspected(_) => "DataStallSuspected",
        MonitorEvent::ShowSignInNotification { .. } => "ShowSignInNotification",
        MonitorEvent::HideSignInNotification { .. } => "HideSignInNotification",
        MonitorEvent::LaunchSignIn(_) => "LaunchSignIn",
        MonitorEvent::CaptivePortalDataChanged(_) => "CaptivePortalDataChanged",
        MonitorEvent::PrivateDnsConfigResolved(_) => "PrivateDnsConfigResolved",
    }
}

/// Send an event without blocking the state machine.
pub fn send_monitor_event(tx: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) {
    if let Err(e) = tx.try_send(event) {
        match e {
            mpsc::error::TrySendError::Full(ev) => {
                warn!("Monitor event channel full, dropping event: {}", event_name(&ev));
            }
            mpsc::error::TrySendError::Closed(ev) => {
                debug!("Monitor event channel closed, dropping event: {}", event_name(&ev));
            }
        }
    }
}

/// Point-in-time view of a monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub network: NetworkId,
    pub state: ValidationState,
    pub verdict: Verdict,
    pub probes_attempted: ProbeSet,
    pub probes_succeeded: ProbeSet,
    pub evaluation_in_flight: bool,
    pub evaluation_count: u32,
    pub accept_partial: bool,
    pub use_https: bool,
    pub bandwidth_check_passed: bool,
    pub sign_in_registered: bool,
    pub consecutive_dns_timeouts: usize,
    pub capport_data: Option<CaptivePortalData>,
}

#[derive(Debug)]
enum Command {
    Connected {
        link: LinkProperties,
        capabilities: NetworkCapabilities,
    },
    CapabilitiesChanged(NetworkCapabilities),
    LinkPropertiesChanged(LinkProperties),
    PrivateDnsChanged(PrivateDnsConfig),
    ForceReevaluation {
        uid: u32,
    },
    AcceptPartial,
    AppFinished(AppResult),
    LaunchApp,
    DnsResponse(i32),
    PollTcpNow,
    Disconnected,
    Status(oneshot::Sender<MonitorStatus>),

    ProbeComplete {
        epoch: u64,
        outcome: Box<EvaluationOutcome>,
    },
    RetryEvaluation {
        epoch: u64,
    },
    TcpPollTimer {
        epoch: u64,
    },
    BandwidthDone {
        epoch: u64,
        outcome: BandwidthOutcome,
    },
    BandwidthRetry {
        epoch: u64,
    },
}

/// Cloneable handle to a running monitor. Dropping every handle stops
/// the monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    network: NetworkId,
    tx: mpsc::UnboundedSender<Command>,
}

impl MonitorHandle {
    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            debug!("Monitor for {} has stopped", self.network);
        }
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// Whether the monitor task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn notify_network_connected(&self, link: LinkProperties, capabilities: NetworkCapabilities) {
        self.send(Command::Connected { link, capabilities });
    }

    pub fn notify_network_capabilities_changed(&self, capabilities: NetworkCapabilities) {
        self.send(Command::CapabilitiesChanged(capabilities));
    }

    pub fn notify_link_properties_changed(&self, link: LinkProperties) {
        self.send(Command::LinkPropertiesChanged(link));
    }

    pub fn notify_private_dns_settings_changed(&self, config: PrivateDnsConfig) {
        self.send(Command::PrivateDnsChanged(config));
    }

    pub fn force_reevaluation(&self, requestor_uid: u32) {
        self.send(Command::ForceReevaluation { uid: requestor_uid });
    }

    pub fn set_accept_partial_connectivity(&self) {
        self.send(Command::AcceptPartial);
    }

    pub fn notify_captive_portal_app_finished(&self, result: AppResult) {
        self.send(Command::AppFinished(result));
    }

    pub fn launch_captive_portal_app(&self) {
        self.send(Command::LaunchApp);
    }

    /// Feed one DNS query result (255 = timeout) into stall detection.
    pub fn notify_dns_response(&self, return_code: i32) {
        self.send(Command::DnsResponse(return_code));
    }

    /// Poll TCP health immediately instead of waiting for the timer.
    pub fn poll_tcp_now(&self) {
        self.send(Command::PollTcpNow);
    }

    pub fn notify_network_disconnected(&self) {
        self.send(Command::Disconnected);
    }

    /// Snapshot of the monitor, or `None` once it has stopped.
    pub async fn status(&self) -> Option<MonitorStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx));
        rx.await.ok()
    }
}

enum Flow {
    Continue,
    Stop,
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

/// Per-attachment evaluation actor.
pub struct NetworkMonitor {
    network: NetworkId,
    deps: Dependencies,
    settings: Arc<MonitorSettings>,
    orchestrator: Arc<ProbeOrchestrator>,
    events: mpsc::Sender<MonitorEvent>,
    self_tx: mpsc::WeakUnboundedSender<Command>,

    connected: bool,
    link: LinkProperties,
    capabilities: NetworkCapabilities,
    private_dns: PrivateDnsConfig,

    state: ValidationState,
    verdict: Verdict,
    attempted: ProbeSet,
    succeeded: ProbeSet,
    last_emitted_probes: Option<(ProbeSet, ProbeSet)>,

    epoch: u64,
    in_flight: bool,
    pending_reevaluation: bool,
    retry_used: bool,
    evaluation_count: u32,
    fallback: Option<FallbackSelection>,
    portal_mode: CaptivePortalMode,
    user_agent: Option<String>,
    bandwidth_url: Option<Url>,

    accept_partial: bool,
    use_https: bool,
    wanted_as_is: bool,
    user_unwanted: bool,
    bandwidth_passed: bool,
    bandwidth_delay: Duration,

    stall: DataStallDetector,
    last_probe_time: Option<Duration>,
    last_tcp_summary: Option<TcpHealthSummary>,
    portal: CaptivePortalController,

    probe_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    tcp_task: Option<JoinHandle<()>>,
    bandwidth_task: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    /// Spawn a monitor for `network` on the current tokio runtime.
    pub fn spawn(
        network: NetworkId,
        deps: Dependencies,
        settings: MonitorSettings,
        events: mpsc::Sender<MonitorEvent>,
    ) -> MonitorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = Arc::new(settings);
        let monitor = NetworkMonitor {
            network,
            orchestrator: Arc::new(ProbeOrchestrator::new(deps.clone(), settings.clone())),
            stall: DataStallDetector::new(&settings),
            portal: CaptivePortalController::new(
                network,
                settings.dismiss_portal_in_validated_network,
            ),
            bandwidth_delay: settings.bandwidth_min_retry,
            deps,
            settings,
            events,
            self_tx: tx.downgrade(),
            connected: false,
            link: LinkProperties::default(),
            capabilities: NetworkCapabilities::default(),
            private_dns: PrivateDnsConfig::default(),
            state: ValidationState::Unevaluated,
            verdict: Verdict::default(),
            attempted: ProbeSet::EMPTY,
            succeeded: ProbeSet::EMPTY,
            last_emitted_probes: None,
            epoch: 0,
            in_flight: false,
            pending_reevaluation: false,
            retry_used: false,
            evaluation_count: 0,
            fallback: None,
            portal_mode: CaptivePortalMode::Prompt,
            user_agent: None,
            bandwidth_url: None,
            accept_partial: false,
            use_https: true,
            wanted_as_is: false,
            user_unwanted: false,
            bandwidth_passed: false,
            last_probe_time: None,
            last_tcp_summary: None,
            probe_task: None,
            retry_task: None,
            tcp_task: None,
            bandwidth_task: None,
        };
        tokio::spawn(monitor.run(rx));
        MonitorHandle { network, tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        debug!("Monitor for {} started", self.network);
        while let Some(cmd) = rx.recv().await {
            if let Flow::Stop = self.handle(cmd) {
                break;
            }
        }
        self.shutdown();
        info!("Monitor for {} stopped", self.network);
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Connected { link, capabilities } => {
                info!("Network {} connected", self.network);
                self.link = link;
                self.capabilities = capabilities;
                self.connected = true;
                self.start_evaluation("network connected", false);
            }
            Command::CapabilitiesChanged(caps) => {
                debug!("Capabilities of {} changed", self.network);
                self.capabilities = caps;
            }
            Command::LinkPropertiesChanged(link) => self.on_link_properties_changed(link),
            Command::PrivateDnsChanged(config) => {
                self.private_dns = config;
                self.start_evaluation("private DNS settings changed", false);
            }
            Command::ForceReevaluation { uid } => {
                info!("Forcing reevaluation of {} for UID {}", self.network, uid);
                self.start_evaluation("forced", false);
            }
            Command::AcceptPartial => self.on_accept_partial(),
            Command::AppFinished(result) => self.on_app_finished(result),
            Command::LaunchApp => match self.portal.launch(self.user_agent.as_deref()) {
                Some(launch) => self.emit(MonitorEvent::LaunchSignIn(launch)),
                None => debug!("No captive portal to sign in to on {}", self.network),
            },
            Command::DnsResponse(code) => {
                let now = self.deps.clock.elapsed_realtime();
                self.stall.accumulate_dns(now, code);
                if self.state == ValidationState::Valid && !self.in_flight {
                    self.check_data_stall();
                }
            }
            Command::PollTcpNow => self.poll_tcp(),
            Command::Disconnected => {
                info!("Network {} disconnected", self.network);
                return Flow::Stop;
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::ProbeComplete { epoch, outcome } => {
                if epoch != self.epoch {
                    debug!("Discarding stale probe result from epoch {}", epoch);
                } else {
                    self.on_probe_complete(*outcome);
                }
            }
            Command::RetryEvaluation { epoch } => {
                if epoch == self.epoch {
                    self.retry_task = None;
                    self.start_evaluation("fallback retry", true);
                }
            }
            Command::TcpPollTimer { epoch } => {
                if epoch == self.epoch {
                    self.tcp_task = None;
                    self.poll_tcp();
                }
            }
            Command::BandwidthDone { epoch, outcome } => {
                if epoch == self.epoch {
                    self.on_bandwidth_done(outcome);
                }
            }
            Command::BandwidthRetry { epoch } => {
                if epoch == self.epoch && self.state == ValidationState::Valid {
                    self.bandwidth_task = None;
                    self.maybe_start_bandwidth_check();
                }
            }
        }
        Flow::Continue
    }

    fn emit(&self, event: MonitorEvent) {
        send_monitor_event(&self.events, event);
    }

    fn status(&self) -> MonitorStatus {
        MonitorStatus {
            network: self.network,
            state: self.state,
            verdict: self.verdict.clone(),
            probes_attempted: self.attempted,
            probes_succeeded: self.succeeded,
            evaluation_in_flight: self.in_flight,
            evaluation_count: self.evaluation_count,
            accept_partial: self.accept_partial,
            use_https: self.use_https,
            bandwidth_check_passed: self.bandwidth_passed,
            sign_in_registered: self.portal.is_registered(),
            consecutive_dns_timeouts: self.stall.consecutive_dns_timeouts(),
            capport_data: self.portal.capport_data().cloned(),
        }
    }

    fn spawn_delayed(&self, delay: Duration, cmd: Command) -> JoinHandle<()> {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd);
            }
        })
    }

    fn cancel_timers(&mut self) {
        abort(&mut self.retry_task);
        abort(&mut self.tcp_task);
        abort(&mut self.bandwidth_task);
    }

    fn start_evaluation(&mut self, reason: &str, retry: bool) {
        if !self.connected {
            debug!("Ignoring {} trigger before connection", reason);
            return;
        }
        if self.user_unwanted {
            debug!("Ignoring {} trigger: network is unwanted", reason);
            return;
        }
        if self.in_flight {
            debug!("Evaluation in flight, coalescing {} trigger", reason);
            self.pending_reevaluation = true;
            return;
        }

        self.cancel_timers();
        self.epoch += 1;
        if !retry {
            self.retry_used = false;
        }
        self.state = ValidationState::Evaluating;
        self.attempted = ProbeSet::EMPTY;
        self.succeeded = ProbeSet::EMPTY;

        if !self.capabilities.validation_required() {
            info!("Network {} does not require validation", self.network);
            self.state = ValidationState::Valid;
            self.report(Verdict::new(ValidationResult::VALID));
            return;
        }

        let region = self.settings.resolve_region(
            self.deps.signal.sim_carrier_id(),
            self.deps.signal.location_mcc_mnc(),
        );
        let mut config = ProbeConfig::build(
            self.deps.config.as_ref(),
            &self.settings,
            region,
            self.deps.clock.now_utc(),
        );
        config.use_https &= self.use_https;
        config.capport_url = self.link.captive_portal_api_url.clone();
        if self.capabilities.private_dns_validation_required() {
            config.private_dns_hostname = self.private_dns.strict_hostname().map(str::to_string);
        }
        self.portal_mode = config.mode;
        self.user_agent = config.user_agent.clone();
        self.bandwidth_url = config.bandwidth_url.clone();

        let previous = if retry { self.fallback } else { None };
        let fallback = FallbackSelection::select(&config, self.deps.random.as_ref(), previous);
        self.fallback = Some(fallback);

        let ctx = EvaluationContext {
            evaluation_id: Uuid::new_v4(),
            capabilities: self.capabilities.clone(),
            fallback,
        };
        info!(
            "Starting evaluation {} of {} ({})",
            ctx.evaluation_id, self.network, reason
        );
        self.in_flight = true;
        self.evaluation_count += 1;

        let orchestrator = self.orchestrator.clone();
        let tx = self.self_tx.clone();
        let epoch = self.epoch;
        self.probe_task = Some(tokio::spawn(async move {
            let outcome = orchestrator.evaluate(&config, &ctx).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ProbeComplete {
                    epoch,
                    outcome: Box::new(outcome),
                });
            }
        }));
    }

    fn on_probe_complete(&mut self, outcome: EvaluationOutcome) {
        self.in_flight = false;
        self.probe_task = None;
        self.last_probe_time = Some(self.deps.clock.elapsed_realtime());
        self.attempted = outcome.attempted;
        self.succeeded = outcome.succeeded;
        self.maybe_notify_probe_status();

        if let Some(resolution) = outcome.private_dns {
            self.emit(MonitorEvent::PrivateDnsConfigResolved(resolution));
        }
        if let Some(data) = outcome.capport_data {
            if self.portal.capport_data() != Some(&data) {
                self.portal.set_capport_data(Some(data.clone()));
                self.emit(MonitorEvent::CaptivePortalDataChanged(Some(data)));
            }
        }

        info!("Evaluation of {} concluded {}", self.network, outcome.verdict);
        match outcome.verdict {
            ProbeVerdict::Valid => self.enter_validated(),
            ProbeVerdict::Partial if self.accept_partial => {
                self.use_https = false;
                self.enter_validated();
            }
            ProbeVerdict::Partial => {
                self.state = ValidationState::Partial;
                self.report(Verdict::new(ValidationResult::PARTIAL));
                self.maybe_schedule_retry(outcome.fallback_inconclusive);
            }
            ProbeVerdict::Portal(_) if self.wanted_as_is => self.enter_validated(),
            ProbeVerdict::Portal(result) => self.enter_portal(result),
            ProbeVerdict::Invalid => {
                self.state = ValidationState::Invalid;
                self.report(Verdict::new(ValidationResult::INVALID));
                self.maybe_schedule_retry(outcome.fallback_inconclusive);
            }
        }

        if self.pending_reevaluation {
            self.pending_reevaluation = false;
            self.start_evaluation("coalesced trigger", false);
        }
    }

    fn maybe_notify_probe_status(&mut self) {
        let current = (self.attempted, self.succeeded);
        if self.last_emitted_probes == Some(current) {
            return;
        }
        self.last_emitted_probes = Some(current);
        self.emit(MonitorEvent::ProbeStatusChanged {
            attempted: self.attempted,
            succeeded: self.succeeded,
        });
    }

    fn report(&mut self, verdict: Verdict) {
        let result = NetworkTestResult {
            result: verdict.result,
            probes_succeeded: self.succeeded,
            probes_attempted: self.attempted,
            redirect_url: verdict.redirect_url.clone(),
            timestamp: self.deps.clock.now_utc(),
        };
        info!("Network {} tested: {}", self.network, result);
        self.verdict = verdict;
        self.emit(MonitorEvent::NetworkTested(result));
    }

    fn enter_validated(&mut self) {
        self.state = ValidationState::Valid;
        let result = if self.accept_partial && !self.use_https {
            ValidationResult::VALID | ValidationResult::PARTIAL
        } else {
            ValidationResult::VALID
        };
        self.report(Verdict::new(result));
        if self.portal.unregister() {
            self.emit(MonitorEvent::HideSignInNotification {
                network: self.network,
            });
        }
        self.start_tcp_polling();
        self.maybe_start_bandwidth_check();
    }

    fn enter_portal(&mut self, result: PortalProbeResult) {
        if self.portal_mode == CaptivePortalMode::Avoid {
            info!("Avoiding captive portal network {}", self.network);
            self.user_unwanted = true;
            self.state = ValidationState::Invalid;
            self.report(Verdict::new(ValidationResult::INVALID));
            return;
        }
        self.state = ValidationState::Portal;
        self.report(Verdict::portal(result.redirect_url.clone()));
        if self.portal.on_portal_detected(&result) {
            self.emit(MonitorEvent::ShowSignInNotification {
                network: self.network,
                redirect_url: self.portal.best_url(),
            });
        }
    }

    fn maybe_schedule_retry(&mut self, fallback_inconclusive: bool) {
        if !fallback_inconclusive || self.retry_used {
            return;
        }
        self.retry_used = true;
        let delay = self.settings.initial_reevaluate_delay;
        debug!("Scheduling fallback retry of {} in {:?}", self.network, delay);
        self.retry_task = Some(self.spawn_delayed(delay, Command::RetryEvaluation { epoch: self.epoch }));
    }

    fn on_link_properties_changed(&mut self, link: LinkProperties) {
        let capport_changed = link.captive_portal_api_url != self.link.captive_portal_api_url;
        self.link = link;
        if !capport_changed {
            return;
        }
        if self.link.captive_portal_api_url.is_none() && self.portal.capport_data().is_some() {
            self.portal.set_capport_data(None);
            self.emit(MonitorEvent::CaptivePortalDataChanged(None));
        }
        self.start_evaluation("captive portal API URL changed", false);
    }

    fn on_accept_partial(&mut self) {
        info!("Partial connectivity accepted on {}", self.network);
        self.accept_partial = true;
        if self.state == ValidationState::Partial {
            self.use_https = false;
            self.enter_validated();
        }
    }

    fn on_app_finished(&mut self, result: AppResult) {
        let action = self.portal.on_app_finished(result);
        if action == PortalAction::Ignored {
            return;
        }
        self.use_https = false;
        self.emit(MonitorEvent::HideSignInNotification {
            network: self.network,
        });
        match action {
            PortalAction::Reevaluate => self.start_evaluation("sign-in dismissed", false),
            PortalAction::UseAsIs => {
                self.stop_evaluation();
                self.wanted_as_is = true;
                self.bandwidth_passed = true;
                self.enter_validated();
            }
            PortalAction::Unwanted => {
                self.stop_evaluation();
                self.user_unwanted = true;
                self.cancel_timers();
                self.state = ValidationState::Invalid;
                self.report(Verdict::new(ValidationResult::INVALID));
            }
            PortalAction::Ignored => {}
        }
    }

    /// Drop the running evaluation, if any, and every trigger queued
    /// behind it. Its result will arrive under a stale epoch.
    fn stop_evaluation(&mut self) {
        abort(&mut self.probe_task);
        self.epoch += 1;
        self.in_flight = false;
        self.pending_reevaluation = false;
    }

    fn tcp_polling_available(&self) -> bool {
        self.stall.tcp_enabled()
            && self.deps.tcp.is_some()
            && self.capabilities.validation_required()
    }

    fn start_tcp_polling(&mut self) {
        if !self.tcp_polling_available() {
            return;
        }
        if self.settings.tcp_polling_interval.is_zero() {
            self.poll_tcp();
        } else {
            self.schedule_tcp_poll();
        }
    }

    fn schedule_tcp_poll(&mut self) {
        let interval = self.settings.tcp_polling_interval;
        if interval.is_zero() {
            return;
        }
        abort(&mut self.tcp_task);
        self.tcp_task = Some(self.spawn_delayed(interval, Command::TcpPollTimer { epoch: self.epoch }));
    }

    fn poll_tcp(&mut self) {
        if self.state != ValidationState::Valid || !self.tcp_polling_available() {
            return;
        }
        self.last_tcp_summary = self.deps.tcp.as_ref().and_then(|t| t.poll());
        if !self.check_data_stall() {
            self.schedule_tcp_poll();
        }
    }

    /// Returns true when a stall was reported.
    fn check_data_stall(&mut self) -> bool {
        let check = StallCheck {
            capabilities: &self.capabilities,
            now: self.deps.clock.elapsed_realtime(),
            last_probe_time: self.last_probe_time,
            tcp_summary: self.last_tcp_summary,
        };
        let Some(finding) = self.stall.is_data_stall(check) else {
            return false;
        };
        let report = finding.into_report(
            self.network,
            self.deps.clock.now_utc(),
            self.deps.signal.transport_context(),
        );
        warn!("{}", report);
        self.emit(MonitorEvent::DataStallSuspected(report));
        self.start_evaluation("data stall", false);
        true
    }

    fn maybe_start_bandwidth_check(&mut self) {
        if !needs_bandwidth_check(
            &self.capabilities,
            self.bandwidth_url.as_ref(),
            self.bandwidth_passed,
        ) {
            return;
        }
        let Some(url) = self.bandwidth_url.clone() else {
            return;
        };
        let http = self.deps.http.clone();
        let timeout = self.settings.bandwidth_timeout;
        let tx = self.self_tx.clone();
        let epoch = self.epoch;
        abort(&mut self.bandwidth_task);
        self.bandwidth_task = Some(tokio::spawn(async move {
            let outcome = check_bandwidth(http.as_ref(), &url, timeout).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::BandwidthDone { epoch, outcome });
            }
        }));
    }

    fn on_bandwidth_done(&mut self, outcome: BandwidthOutcome) {
        self.bandwidth_task = None;
        match outcome {
            BandwidthOutcome::Completed(_) | BandwidthOutcome::Errored => {
                self.bandwidth_passed = true;
                self.bandwidth_delay = self.settings.bandwidth_min_retry;
            }
            BandwidthOutcome::TimedOut => {
                let delay = self.bandwidth_delay;
                self.bandwidth_delay = next_retry_delay(delay, self.settings.bandwidth_max_retry);
                debug!("Retrying bandwidth check on {} in {:?}", self.network, delay);
                self.bandwidth_task =
                    Some(self.spawn_delayed(delay, Command::BandwidthRetry { epoch: self.epoch }));
            }
        }
    }

    fn shutdown(&mut self) {
        self.connected = false;
        self.epoch += 1;
        abort(&mut self.probe_task);
        self.cancel_timers();
        if self.portal.unregister() {
            self.emit(MonitorEvent::HideSignInNotification {
                network: self.network,
            });
        }
        self.state = ValidationState::Unevaluated;
    }
}
