//! Error types.
//!
//! Probe errors never leave the orchestrator: every probe maps a
//! [`ProbeError`] to a failed probe result. [`ConfigError`] is returned when
//! loading static settings; bad dynamic settings are dropped and logged.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single network probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("no addresses found for {0}")]
    DnsNotFound(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("response body rejected: {0}")]
    Body(String),
}

impl ProbeError {
    /// Whether the error was produced by a deadline rather than the network.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }
}

/// Failure loading static monitor settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(String),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detection() {
        assert!(ProbeError::Timeout(Duration::from_secs(3)).is_timeout());
        assert!(!ProbeError::Tls("bad cert".into()).is_timeout());
    }

    #[test]
    fn test_invalid_display() {
        let e = ConfigError::Invalid {
            key: "consecutive_dns_timeout_threshold".into(),
            reason: "must be positive".into(),
        };
        assert_eq!(
            e.to_string(),
            "invalid setting consecutive_dns_timeout_threshold: must be positive"
        );
    }
}
