//! Monitor configuration.
//!
//! Two layers:
//!
//! - [`MonitorSettings`]: static thresholds and timeouts, read once when a
//!   monitor is spawned. Serde-loadable from YAML or JSON with
//!   human-readable durations (`"12s"`, `"30m"`).
//! - [`ConfigStore`]: dynamic key/value settings (probe URLs, content
//!   rules, test overrides). A fresh [`ProbeConfig`] snapshot is built from
//!   the store at the start of every evaluation, so updates apply to the
//!   next evaluation without restarting the monitor.

use crate::error::ConfigError;
use crate::probe::spec::FallbackSpec;
use crate::types::MccMnc;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Key/value setting names.
pub mod keys {
    pub const CAPTIVE_PORTAL_MODE: &str = "captive_portal_mode";
    pub const USE_HTTPS: &str = "captive_portal_use_https";
    pub const HTTP_URL: &str = "captive_portal_http_url";
    pub const HTTPS_URL: &str = "captive_portal_https_url";
    pub const OTHER_HTTP_URLS: &str = "captive_portal_other_http_urls";
    pub const OTHER_HTTPS_URLS: &str = "captive_portal_other_https_urls";
    pub const FALLBACK_URL: &str = "captive_portal_fallback_url";
    pub const OTHER_FALLBACK_URLS: &str = "captive_portal_other_fallback_urls";
    pub const FALLBACK_PROBE_SPECS: &str = "captive_portal_fallback_probe_specs";
    pub const USER_AGENT: &str = "captive_portal_user_agent";
    pub const TEST_HTTP_URL: &str = "test_captive_portal_http_url";
    pub const TEST_HTTPS_URL: &str = "test_captive_portal_https_url";
    pub const TEST_URL_EXPIRATION_TIME: &str = "test_url_expiration_time";
    pub const FAILED_CONTENT_REGEX: &str = "network_validation_failed_content_regexp";
    pub const SUCCESS_CONTENT_REGEX: &str = "network_validation_success_content_regexp";
    pub const MIN_CONTENT_LENGTH: &str = "min_matches_http_content_length";
    pub const MAX_CONTENT_LENGTH: &str = "max_matches_http_content_length";
    pub const BANDWIDTH_URL: &str = "evaluating_bandwidth_url";
}

pub const DEFAULT_HTTPS_URL: &str = "https://www.google.com/generate_204";
pub const DEFAULT_HTTP_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";
pub const DEFAULT_FALLBACK_URL: &str = "http://www.google.com/gen_204";

/// Test URLs may not be configured further ahead than this.
pub const TEST_URL_MAX_HORIZON: Duration = Duration::from_secs(10 * 60);

/// Dynamic key/value configuration.
pub trait ConfigStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get_string(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring non-integer value for {}: {:?}", key, raw);
                default
            }),
            None => default,
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).as_deref().map(str::trim) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => {
                warn!("Ignoring non-boolean value for {}: {:?}", key, other);
                default
            }
            None => default,
        }
    }
}

/// In-memory [`ConfigStore`] with change notification.
#[derive(Debug)]
pub struct InMemoryConfig {
    values: RwLock<HashMap<String, String>>,
    version: watch::Sender<u64>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConfig {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            values: RwLock::new(HashMap::new()),
            version,
        }
    }

    /// Build a store from a flat YAML (or JSON) mapping of keys to scalars.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(content)?;
        let store = Self::new();
        for (key, value) in raw {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(ConfigError::Invalid {
                        key,
                        reason: format!("expected a scalar, got {:?}", other),
                    });
                }
            };
            store.set(key, value);
        }
        Ok(store)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        debug!("Setting {} updated", key);
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.into());
        self.version.send_modify(|v| *v += 1);
    }

    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        self.version.send_modify(|v| *v += 1);
    }

    /// Receiver that changes whenever any key is set or removed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl ConfigStore for InMemoryConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

/// What to do when the network is found behind a captive portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptivePortalMode {
    /// Skip validation entirely and report the network as valid.
    Ignore,
    /// Notify the user so they can sign in.
    Prompt,
    /// Treat portal networks as unwanted without prompting.
    Avoid,
}

impl CaptivePortalMode {
    fn from_int(value: i64) -> Self {
        match value {
            0 => CaptivePortalMode::Ignore,
            2 => CaptivePortalMode::Avoid,
            _ => CaptivePortalMode::Prompt,
        }
    }
}

/// Probe URLs used when the device is in a given country.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalProbeUrls {
    pub http_url: Option<String>,
    pub https_url: Option<String>,
    pub fallback_url: Option<String>,
}

/// Which data stall detection methods are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallEvaluationTypes {
    pub dns: bool,
    pub tcp: bool,
}

impl Default for StallEvaluationTypes {
    fn default() -> Self {
        Self {
            dns: true,
            tcp: true,
        }
    }
}

/// Static monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    #[serde(with = "humantime_serde")]
    pub dns_probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub http_probe_timeout: Duration,
    /// Wait before escalating to a fallback probe.
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    pub max_probe_concurrency: usize,
    /// Delay of the automatic retry after an inconclusive fallback.
    #[serde(with = "humantime_serde")]
    pub initial_reevaluate_delay: Duration,
    /// Classify HTTP probes whose host resolves to a private address as
    /// failures instead of portals.
    pub private_ip_no_internet: bool,
    /// Launch sign-in with the portal's own URL rather than the probe URL.
    pub dismiss_portal_in_validated_network: bool,

    pub consecutive_dns_timeout_threshold: usize,
    #[serde(with = "humantime_serde")]
    pub data_stall_min_evaluate_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub data_stall_valid_dns_time_threshold: Duration,
    pub data_stall_evaluation: StallEvaluationTypes,
    /// Zero disables periodic polling.
    #[serde(with = "humantime_serde")]
    pub tcp_polling_interval: Duration,
    pub tcp_fail_rate_threshold_percent: u32,
    pub tcp_min_packets: u32,

    #[serde(with = "humantime_serde")]
    pub bandwidth_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub bandwidth_min_retry: Duration,
    #[serde(with = "humantime_serde")]
    pub bandwidth_max_retry: Duration,

    pub carrier_mcc_mnc_overrides: HashMap<i32, MccMnc>,
    pub regional_probe_urls: HashMap<u16, RegionalProbeUrls>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            dns_probe_timeout: Duration::from_millis(12_500),
            http_probe_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            max_probe_concurrency: 5,
            initial_reevaluate_delay: Duration::from_secs(1),
            private_ip_no_internet: false,
            dismiss_portal_in_validated_network: true,
            consecutive_dns_timeout_threshold: 5,
            data_stall_min_evaluate_interval: Duration::from_secs(60),
            data_stall_valid_dns_time_threshold: Duration::from_secs(30 * 60),
            data_stall_evaluation: StallEvaluationTypes::default(),
            tcp_polling_interval: Duration::from_secs(20),
            tcp_fail_rate_threshold_percent: 80,
            tcp_min_packets: 10,
            bandwidth_timeout: Duration::from_secs(10),
            bandwidth_min_retry: Duration::from_secs(1),
            bandwidth_max_retry: Duration::from_secs(10 * 60),
            carrier_mcc_mnc_overrides: HashMap::new(),
            regional_probe_urls: HashMap::new(),
        }
    }
}

impl MonitorSettings {
    /// Load settings from a YAML or JSON file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consecutive_dns_timeout_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "consecutive_dns_timeout_threshold".into(),
                reason: "must be positive".into(),
            });
        }
        if self.max_probe_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "max_probe_concurrency".into(),
                reason: "must be positive".into(),
            });
        }
        if self.tcp_fail_rate_threshold_percent > 100 {
            return Err(ConfigError::Invalid {
                key: "tcp_fail_rate_threshold_percent".into(),
                reason: "must be at most 100".into(),
            });
        }
        if self.bandwidth_min_retry > self.bandwidth_max_retry {
            return Err(ConfigError::Invalid {
                key: "bandwidth_min_retry".into(),
                reason: "exceeds bandwidth_max_retry".into(),
            });
        }
        Ok(())
    }

    /// Region used for default probe URLs: carrier override first, then
    /// the reported location.
    pub fn resolve_region(
        &self,
        carrier_id: Option<i32>,
        location: Option<MccMnc>,
    ) -> Option<MccMnc> {
        carrier_id
            .and_then(|id| self.carrier_mcc_mnc_overrides.get(&id).copied())
            .or(location)
    }
}

/// Rules applied to the body of a 200 response.
#[derive(Debug, Clone)]
pub struct ContentPolicy {
    pub failed_regex: Option<Regex>,
    pub success_regex: Option<Regex>,
    /// Bodies are matched only when `min < Content-Length < max`. The
    /// defaults leave the window empty.
    pub min_content_length: u64,
    pub max_content_length: u64,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            failed_regex: None,
            success_regex: None,
            min_content_length: i32::MAX as u64,
            max_content_length: 0,
        }
    }
}

impl ContentPolicy {
    fn from_store(store: &dyn ConfigStore) -> Self {
        Self {
            failed_regex: compile_full_match(store, keys::FAILED_CONTENT_REGEX),
            success_regex: compile_full_match(store, keys::SUCCESS_CONTENT_REGEX),
            min_content_length: store
                .get_int(keys::MIN_CONTENT_LENGTH, i64::from(i32::MAX))
                .max(0) as u64,
            max_content_length: store.get_int(keys::MAX_CONTENT_LENGTH, 0).max(0) as u64,
        }
    }

    pub fn length_in_window(&self, length: u64) -> bool {
        length > 0 && self.min_content_length < length && length < self.max_content_length
    }
}

// An invalid pattern never matches.
fn compile_full_match(store: &dyn ConfigStore, key: &str) -> Option<Regex> {
    let pattern = store.get_string(key).filter(|p| !p.is_empty())?;
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid regex in {}: {}", key, e);
            None
        }
    }
}

/// Snapshot of everything the orchestrator needs for one evaluation.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub mode: CaptivePortalMode,
    pub use_https: bool,
    pub http_urls: Vec<Url>,
    pub https_urls: Vec<Url>,
    pub fallback_urls: Vec<Url>,
    pub fallback_specs: Vec<FallbackSpec>,
    pub capport_url: Option<String>,
    pub private_dns_hostname: Option<String>,
    pub bandwidth_url: Option<Url>,
    pub content: ContentPolicy,
    pub user_agent: Option<String>,
}

impl ProbeConfig {
    /// Build a snapshot from the store, falling back to regional and
    /// global defaults.
    pub fn build(
        store: &dyn ConfigStore,
        settings: &MonitorSettings,
        region: Option<MccMnc>,
        now: DateTime<Utc>,
    ) -> Self {
        let regional = region.and_then(|r| settings.regional_probe_urls.get(&r.mcc));

        let http_primary = test_url_override(store, keys::TEST_HTTP_URL, now)
            .or_else(|| store_url(store, keys::HTTP_URL))
            .or_else(|| regional.and_then(|r| parse_url_logged(r.http_url.as_deref()?)))
            .or_else(|| parse_url_logged(DEFAULT_HTTP_URL));
        let https_primary = test_url_override(store, keys::TEST_HTTPS_URL, now)
            .or_else(|| store_url(store, keys::HTTPS_URL))
            .or_else(|| regional.and_then(|r| parse_url_logged(r.https_url.as_deref()?)))
            .or_else(|| parse_url_logged(DEFAULT_HTTPS_URL));
        let fallback_primary = store_url(store, keys::FALLBACK_URL)
            .or_else(|| regional.and_then(|r| parse_url_logged(r.fallback_url.as_deref()?)))
            .or_else(|| parse_url_logged(DEFAULT_FALLBACK_URL));

        let fallback_specs = store
            .get_string(keys::FALLBACK_PROBE_SPECS)
            .map(|raw| FallbackSpec::parse_list(&raw))
            .unwrap_or_default();

        Self {
            mode: CaptivePortalMode::from_int(store.get_int(keys::CAPTIVE_PORTAL_MODE, 1)),
            use_https: store.get_bool(keys::USE_HTTPS, true),
            http_urls: with_others(http_primary, store, keys::OTHER_HTTP_URLS),
            https_urls: with_others(https_primary, store, keys::OTHER_HTTPS_URLS),
            fallback_urls: with_others(fallback_primary, store, keys::OTHER_FALLBACK_URLS),
            fallback_specs,
            capport_url: None,
            private_dns_hostname: None,
            bandwidth_url: store_url(store, keys::BANDWIDTH_URL),
            content: ContentPolicy::from_store(store),
            user_agent: store.get_string(keys::USER_AGENT).filter(|s| !s.is_empty()),
        }
    }
}

fn parse_url_logged(raw: &str) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Dropping invalid probe URL {:?}: {}", raw, e);
            None
        }
    }
}

fn store_url(store: &dyn ConfigStore, key: &str) -> Option<Url> {
    let raw = store.get_string(key).filter(|s| !s.trim().is_empty())?;
    parse_url_logged(&raw)
}

fn with_others(primary: Option<Url>, store: &dyn ConfigStore, key: &str) -> Vec<Url> {
    let mut urls: Vec<Url> = primary.into_iter().collect();
    if let Some(raw) = store.get_string(key) {
        urls.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(parse_url_logged),
        );
    }
    urls
}

/// Test URL from `key`, honored only on localhost and only while the
/// expiration time is in the future and within [`TEST_URL_MAX_HORIZON`].
fn test_url_override(store: &dyn ConfigStore, key: &str, now: DateTime<Utc>) -> Option<Url> {
    let raw = store.get_string(key).filter(|s| !s.is_empty())?;
    let expiration_ms = store.get_int(keys::TEST_URL_EXPIRATION_TIME, 0);
    let remaining_ms = expiration_ms - now.timestamp_millis();
    if remaining_ms < 0 || remaining_ms > TEST_URL_MAX_HORIZON.as_millis() as i64 {
        debug!("Ignoring test URL {}: expiration out of range", key);
        return None;
    }
    let url = parse_url_logged(&raw)?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    if !scheme_ok || url.host_str() != Some("localhost") {
        warn!("Ignoring test URL {}: must be http(s) on localhost", url);
        return None;
    }
    Some(url)
}
