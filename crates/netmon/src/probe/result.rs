use crate::probe::spec::FallbackSpec;
use crate::verdict::{ProbeKind, ProbeSet};
use std::fmt;

/// Classification of a single HTTP-family probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Got the expected 204 (or a successful content match).
    Success,
    /// Redirected or served content other than the expected response.
    Portal,
    Failed,
    /// The probe host resolved to a private address.
    PrivateIp,
}

/// Outcome of one HTTP, HTTPS, fallback or capport probe.
#[derive(Debug, Clone)]
pub struct PortalProbeResult {
    pub status: ProbeStatus,
    /// Raw HTTP status when a response was received.
    pub http_status: Option<u16>,
    pub redirect_url: Option<String>,
    /// URL the probe was sent to.
    pub detect_url: Option<String>,
    pub probe_spec: Option<FallbackSpec>,
    /// Probe kinds that concluded this result.
    pub probe_kinds: ProbeSet,
}

impl PortalProbeResult {
    pub fn success(kind: ProbeKind) -> Self {
        Self::with_status(ProbeStatus::Success, kind)
    }

    pub fn failed(kind: ProbeKind) -> Self {
        Self::with_status(ProbeStatus::Failed, kind)
    }

    pub fn private_ip(kind: ProbeKind) -> Self {
        Self::with_status(ProbeStatus::PrivateIp, kind)
    }

    pub fn portal(
        kind: ProbeKind,
        http_status: Option<u16>,
        redirect_url: Option<String>,
        detect_url: Option<String>,
    ) -> Self {
        Self {
            http_status,
            redirect_url,
            detect_url,
            ..Self::with_status(ProbeStatus::Portal, kind)
        }
    }

    fn with_status(status: ProbeStatus, kind: ProbeKind) -> Self {
        Self {
            status,
            http_status: None,
            redirect_url: None,
            detect_url: None,
            probe_spec: None,
            probe_kinds: ProbeSet::of(kind),
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_detect_url(mut self, url: impl Into<String>) -> Self {
        self.detect_url = Some(url.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }

    pub fn is_portal(&self) -> bool {
        self.status == ProbeStatus::Portal
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ProbeStatus::Failed | ProbeStatus::PrivateIp)
    }

    pub fn concluded_by(&self, kind: ProbeKind) -> bool {
        self.probe_kinds.contains(kind)
    }
}

impl fmt::Display for PortalProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} via {}", self.status, self.probe_kinds)?;
        if let Some(code) = self.http_status {
            write!(f, " ret={}", code)?;
        }
        if let Some(url) = &self.redirect_url {
            write!(f, " redirect={}", url)?;
        }
        Ok(())
    }
}
