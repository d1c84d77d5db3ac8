//! Network attachment descriptors supplied by the host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one network attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net{}", self.0)
    }
}

/// Link-layer transport of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Cellular,
    Wifi,
    Ethernet,
    Bluetooth,
    Vpn,
    /// Networks created by test tooling; allow localhost capport URLs.
    Test,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Cellular => write!(f, "cellular"),
            Transport::Wifi => write!(f, "wifi"),
            Transport::Ethernet => write!(f, "ethernet"),
            Transport::Bluetooth => write!(f, "bluetooth"),
            Transport::Vpn => write!(f, "vpn"),
            Transport::Test => write!(f, "test"),
        }
    }
}

/// Capabilities of a network attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    pub transports: Vec<Transport>,
    /// Network claims to provide Internet access.
    pub internet: bool,
    pub not_metered: bool,
    pub not_roaming: bool,
    pub not_restricted: bool,
    pub trusted: bool,
}

impl Default for NetworkCapabilities {
    fn default() -> Self {
        Self {
            transports: vec![Transport::Wifi],
            internet: true,
            not_metered: true,
            not_roaming: true,
            not_restricted: true,
            trusted: true,
        }
    }
}

impl NetworkCapabilities {
    /// Create capabilities for an unmetered, trusted Internet network.
    pub fn internet(transports: Vec<Transport>) -> Self {
        Self {
            transports,
            ..Self::default()
        }
    }

    pub fn has_transport(&self, transport: Transport) -> bool {
        self.transports.contains(&transport)
    }

    /// Whether this network must be validated before it can be used.
    #[must_use]
    pub fn validation_required(&self) -> bool {
        self.internet
            && self.not_restricted
            && self.trusted
            && !self.has_transport(Transport::Vpn)
    }

    /// Whether private DNS must be validated on this network.
    ///
    /// Restricted VPNs are excluded; everything else that offers Internet
    /// and is not restricted qualifies.
    #[must_use]
    pub fn private_dns_validation_required(&self) -> bool {
        self.internet && self.not_restricted
    }

    pub fn is_metered(&self) -> bool {
        !self.not_metered
    }

    pub fn is_wifi_only(&self) -> bool {
        self.transports == [Transport::Wifi]
    }

    pub fn is_test_network(&self) -> bool {
        self.has_transport(Transport::Test)
    }
}

/// Link-level configuration of a network attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    pub interface_name: Option<String>,
    /// RFC 8908 captive portal API URL advertised by DHCP or RA.
    pub captive_portal_api_url: Option<String>,
}

impl LinkProperties {
    pub fn with_capport_url(url: impl Into<String>) -> Self {
        Self {
            interface_name: None,
            captive_portal_api_url: Some(url.into()),
        }
    }
}

/// Private DNS mode chosen by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateDnsConfig {
    #[default]
    Off,
    Opportunistic,
    /// Strict mode pinned to a provider hostname.
    Strict { hostname: String },
}

impl PrivateDnsConfig {
    /// The strict-mode provider hostname, if any.
    pub fn strict_hostname(&self) -> Option<&str> {
        match self {
            PrivateDnsConfig::Strict { hostname } if !hostname.is_empty() => Some(hostname),
            _ => None,
        }
    }
}

/// Mobile country and network code pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MccMnc {
    pub mcc: u16,
    pub mnc: u16,
}

impl fmt::Display for MccMnc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}{:02}", self.mcc, self.mnc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_required() {
        let caps = NetworkCapabilities::default();
        assert!(caps.validation_required());

        let no_internet = NetworkCapabilities {
            internet: false,
            ..NetworkCapabilities::default()
        };
        assert!(!no_internet.validation_required());

        let vpn = NetworkCapabilities::internet(vec![Transport::Vpn, Transport::Wifi]);
        assert!(!vpn.validation_required());
    }

    #[test]
    fn test_wifi_only() {
        assert!(NetworkCapabilities::internet(vec![Transport::Wifi]).is_wifi_only());
        assert!(
            !NetworkCapabilities::internet(vec![Transport::Wifi, Transport::Cellular])
                .is_wifi_only()
        );
    }

    #[test]
    fn test_strict_hostname() {
        assert_eq!(PrivateDnsConfig::Off.strict_hostname(), None);
        let strict = PrivateDnsConfig::Strict {
            hostname: "dns.example".into(),
        };
        assert_eq!(strict.strict_hostname(), Some("dns.example"));
        let empty = PrivateDnsConfig::Strict {
            hostname: String::new(),
        };
        assert_eq!(empty.strict_hostname(), None);
    }

    #[test]
    fn test_mcc_mnc_display() {
        assert_eq!(MccMnc { mcc: 310, mnc: 4 }.to_string(), "31004");
    }
}
