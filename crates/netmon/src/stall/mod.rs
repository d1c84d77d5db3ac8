//! Data stall detection.
//!
//! Runs only while a network is VALID. Two signals are combined:
//!
//! - **TCP**: host-collected TCP summaries, polled periodically. Any packet
//!   received during the latest period rules a stall out.
//! - **DNS**: a ring of recent DNS results. A burst of consecutive
//!   timeouts that started recently enough is a stall.
//!
//! A detected stall produces exactly one [`report::StallReport`]; the
//! caller then re-evaluates the network. The detector itself never
//! changes the verdict.

pub mod dns;
pub mod report;
pub mod tcp;

use crate::config::{MonitorSettings, StallEvaluationTypes};
use crate::deps::TcpHealthSummary;
use crate::stall::dns::DnsStallDetector;
use crate::stall::report::{
    DetectionMethod, DnsStallInfo, StallReport, TcpStallInfo, TransportContext,
};
use crate::stall::tcp::{TcpStallDetector, TcpVerdict};
use crate::types::{NetworkCapabilities, NetworkId};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Inputs for one stall check.
#[derive(Debug, Clone, Copy)]
pub struct StallCheck<'a> {
    pub capabilities: &'a NetworkCapabilities,
    pub now: Duration,
    pub last_probe_time: Option<Duration>,
    pub tcp_summary: Option<TcpHealthSummary>,
}

/// A stall found by [`DataStallDetector::is_data_stall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallFinding {
    pub method: DetectionMethod,
    pub dns: Option<DnsStallInfo>,
    pub tcp: Option<TcpStallInfo>,
}

impl StallFinding {
    pub fn into_report(
        self,
        network: NetworkId,
        timestamp: DateTime<Utc>,
        transport: TransportContext,
    ) -> StallReport {
        StallReport {
            network,
            method: self.method,
            timestamp,
            dns: self.dns,
            tcp: self.tcp,
            transport,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataStallDetector {
    evaluation: StallEvaluationTypes,
    dns_threshold: usize,
    valid_dns_time: Duration,
    min_evaluate_interval: Duration,
    tcp_polling_interval: Duration,
    dns: DnsStallDetector,
    tcp: TcpStallDetector,
    last_report_time: Option<Duration>,
}

impl DataStallDetector {
    pub fn new(settings: &MonitorSettings) -> Self {
        Self {
            evaluation: settings.data_stall_evaluation,
            dns_threshold: settings.consecutive_dns_timeout_threshold,
            valid_dns_time: settings.data_stall_valid_dns_time_threshold,
            min_evaluate_interval: settings.data_stall_min_evaluate_interval,
            tcp_polling_interval: settings.tcp_polling_interval,
            dns: DnsStallDetector::new(settings.consecutive_dns_timeout_threshold),
            tcp: TcpStallDetector::new(
                settings.tcp_fail_rate_threshold_percent,
                settings.tcp_min_packets,
            ),
            last_report_time: None,
        }
    }

    pub fn tcp_enabled(&self) -> bool {
        self.evaluation.tcp
    }

    pub fn accumulate_dns(&mut self, now: Duration, return_code: i32) {
        self.dns.accumulate(now, return_code);
    }

    pub fn consecutive_dns_timeouts(&self) -> usize {
        self.dns.consecutive_timeouts()
    }

    /// Check for a stall. A finding is remembered so the same stall is not
    /// reported again within the minimum evaluation interval.
    pub fn is_data_stall(&mut self, check: StallCheck<'_>) -> Option<StallFinding> {
        if !check.capabilities.validation_required() {
            return None;
        }
        if check.capabilities.is_metered()
            && check
                .last_probe_time
                .is_some_and(|t| check.now.saturating_sub(t) < self.min_evaluate_interval)
        {
            return None;
        }
        if self
            .last_report_time
            .is_some_and(|t| check.now.saturating_sub(t) < self.min_evaluate_interval)
        {
            return None;
        }

        let finding = self.evaluate_tcp(check.tcp_summary)?.or_else(|| self.evaluate_dns(check.now));
        if let Some(f) = &finding {
            debug!("Data stall suspected via {}", f.method);
            self.last_report_time = Some(check.now);
        }
        finding
    }

    // Outer None: TCP ruled the stall out. Inner None: defer to DNS.
    fn evaluate_tcp(&self, summary: Option<TcpHealthSummary>) -> Option<Option<StallFinding>> {
        if !self.evaluation.tcp {
            return Some(None);
        }
        let Some(summary) = summary else {
            return Some(None);
        };
        match self.tcp.evaluate(&summary) {
            TcpVerdict::Healthy => None,
            TcpVerdict::Suspected => Some(Some(StallFinding {
                method: DetectionMethod::Tcp,
                dns: None,
                tcp: Some(TcpStallInfo {
                    fail_rate_percent: summary.fail_rate_percent,
                    sent_packets: summary.sent_packets,
                    polling_interval: self.tcp_polling_interval,
                }),
            })),
            TcpVerdict::Inconclusive => Some(None),
        }
    }

    fn evaluate_dns(&self, now: Duration) -> Option<StallFinding> {
        if !self.evaluation.dns {
            return None;
        }
        if !self
            .dns
            .is_suspected(self.dns_threshold, self.valid_dns_time, now)
        {
            return None;
        }
        Some(StallFinding {
            method: DetectionMethod::Dns,
            dns: Some(DnsStallInfo {
                consecutive_timeouts: self.dns.consecutive_timeouts(),
                recent_events: self.dns.recent_events(),
            }),
            tcp: None,
        })
    }
}
