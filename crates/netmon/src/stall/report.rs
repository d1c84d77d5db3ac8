//! Data stall reports.

use crate::stall::dns::DnsEvent;
use crate::types::NetworkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which detector flagged the stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Dns,
    Tcp,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Dns => write!(f, "DNS"),
            DetectionMethod::Tcp => write!(f, "TCP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellularContext {
    /// Radio access technology, e.g. "LTE" or "NR".
    pub radio_type: String,
    pub roaming: bool,
    pub network_mcc_mnc: Option<String>,
    pub sim_mcc_mnc: Option<String>,
    /// Signal level bucket, 0 (none) to 4 (great).
    pub signal_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiContext {
    pub frequency_mhz: u32,
    pub rssi_dbm: i32,
}

impl WifiContext {
    pub fn band(&self) -> &'static str {
        match self.frequency_mhz {
            2400..=2500 => "2.4GHz",
            4900..=5900 => "5GHz",
            5925..=7125 => "6GHz",
            _ => "unknown",
        }
    }
}

/// Radio conditions at the time a stall was reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportContext {
    Cellular(CellularContext),
    Wifi(WifiContext),
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsStallInfo {
    pub consecutive_timeouts: usize,
    pub recent_events: Vec<DnsEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpStallInfo {
    pub fail_rate_percent: u32,
    pub sent_packets: u32,
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
}

/// Report emitted once per detected stall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallReport {
    pub network: NetworkId,
    pub method: DetectionMethod,
    pub timestamp: DateTime<Utc>,
    pub dns: Option<DnsStallInfo>,
    pub tcp: Option<TcpStallInfo>,
    pub transport: TransportContext,
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} data stall on {} at {}", self.method, self.network, self.timestamp)?;
        if let Some(dns) = &self.dns {
            write!(f, ", {} consecutive DNS timeouts", dns.consecutive_timeouts)?;
        }
        if let Some(tcp) = &self.tcp {
            write!(
                f,
                ", TCP fail rate {}% over {} packets",
                tcp.fail_rate_percent, tcp.sent_packets
            )?;
        }
        match &self.transport {
            TransportContext::Cellular(c) => write!(f, " [cell {} level {}]", c.radio_type, c.signal_level),
            TransportContext::Wifi(w) => write!(f, " [wifi {} {}dBm]", w.band(), w.rssi_dbm),
            TransportContext::Unknown => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_band() {
        let w = |frequency_mhz| WifiContext {
            frequency_mhz,
            rssi_dbm: -60,
        };
        assert_eq!(w(2437).band(), "2.4GHz");
        assert_eq!(w(5180).band(), "5GHz");
        assert_eq!(w(6115).band(), "6GHz");
    }

    #[test]
    fn test_transport_context_json() {
        let ctx = TransportContext::Cellular(CellularContext {
            radio_type: "LTE".into(),
            roaming: false,
            network_mcc_mnc: Some("310260".into()),
            sim_mcc_mnc: Some("310260".into()),
            signal_level: 3,
        });
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["transport"], "cellular");
        assert_eq!(json["radio_type"], "LTE");
    }
}
