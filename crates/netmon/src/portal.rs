//! Captive portal sign-in bookkeeping.
//!
//! The controller holds at most one sign-in registration per attachment.
//! A registration is created when a portal is first detected, produces a
//! single sign-in notification, and is released when the sign-in app
//! reports back, the network validates, or the network goes away. The
//! controller never probes on its own.

use crate::probe::capport::CaptivePortalData;
use crate::probe::result::PortalProbeResult;
use crate::types::NetworkId;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How the sign-in app finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppResult {
    /// The user signed in or closed the app; re-check the network.
    Dismissed,
    /// Use the network even though it is behind a portal.
    WantedAsIs,
    /// The user does not want this network.
    Unwanted,
}

/// What the state machine should do after the app finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    Reevaluate,
    UseAsIs,
    Unwanted,
    /// No registration was active.
    Ignored,
}

/// Everything the sign-in UI needs to open the portal page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInLaunch {
    pub network: NetworkId,
    pub url: String,
    pub detect_url: Option<String>,
    pub probe_spec: Option<String>,
    pub user_agent: Option<String>,
    pub venue_info_url: Option<String>,
}

#[derive(Debug)]
pub struct CaptivePortalController {
    network: NetworkId,
    use_portal_url: bool,
    registration: Option<u64>,
    next_token: u64,
    dont_display_signin: bool,
    last_portal: Option<PortalProbeResult>,
    capport_data: Option<CaptivePortalData>,
}

impl CaptivePortalController {
    /// `use_portal_url` prefers the portal's own URL over the probe URL
    /// when launching sign-in.
    pub fn new(network: NetworkId, use_portal_url: bool) -> Self {
        Self {
            network,
            use_portal_url,
            registration: None,
            next_token: 1,
            dont_display_signin: false,
            last_portal: None,
            capport_data: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn set_capport_data(&mut self, data: Option<CaptivePortalData>) {
        self.capport_data = data;
    }

    pub fn capport_data(&self) -> Option<&CaptivePortalData> {
        self.capport_data.as_ref()
    }

    /// Record a detected portal. Returns true when a sign-in notification
    /// should be shown now.
    pub fn on_portal_detected(&mut self, result: &PortalProbeResult) -> bool {
        self.last_portal = Some(result.clone());
        if self.dont_display_signin || self.registration.is_some() {
            debug!("Sign-in notification for {} already handled", self.network);
            return false;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.registration = Some(token);
        info!("Registered sign-in {} for {}", token, self.network);
        true
    }

    /// Best URL to open for sign-in.
    pub fn best_url(&self) -> Option<String> {
        let portal = self.last_portal.as_ref()?;
        if self.use_portal_url {
            if let Some(url) = self
                .capport_data
                .as_ref()
                .and_then(|d| d.user_portal_url.clone())
            {
                return Some(url);
            }
            if let Some(url) = portal
                .redirect_url
                .as_ref()
                .filter(|u| Url::parse(u).is_ok())
            {
                return Some(url.clone());
            }
        }
        portal.detect_url.clone()
    }

    /// Launch parameters for the sign-in UI, if a registration is active.
    pub fn launch(&self, user_agent: Option<&str>) -> Option<SignInLaunch> {
        self.registration?;
        let portal = self.last_portal.as_ref()?;
        Some(SignInLaunch {
            network: self.network,
            url: self.best_url()?,
            detect_url: portal.detect_url.clone(),
            probe_spec: portal.probe_spec.as_ref().map(ToString::to_string),
            user_agent: user_agent.map(str::to_string),
            venue_info_url: self
                .capport_data
                .as_ref()
                .and_then(|d| d.venue_info_url.clone()),
        })
    }

    /// Handle the app's result, releasing the registration.
    pub fn on_app_finished(&mut self, result: AppResult) -> PortalAction {
        if self.registration.take().is_none() {
            debug!("Ignoring sign-in result {:?} without registration", result);
            return PortalAction::Ignored;
        }
        info!("Sign-in app finished on {}: {:?}", self.network, result);
        match result {
            AppResult::Dismissed => PortalAction::Reevaluate,
            AppResult::WantedAsIs => {
                self.dont_display_signin = true;
                PortalAction::UseAsIs
            }
            AppResult::Unwanted => {
                self.dont_display_signin = true;
                PortalAction::Unwanted
            }
        }
    }

    /// Drop any registration. Returns whether one was active.
    pub fn unregister(&mut self) -> bool {
        let was = self.registration.take().is_some();
        if was {
            debug!("Unregistered sign-in for {}", self.network);
        }
        was
    }
}
