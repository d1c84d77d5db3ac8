//! TCP health evaluation over host-collected summaries.

use crate::deps::TcpHealthSummary;

/// What the latest TCP summary says about a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpVerdict {
    /// Packets were received recently; the network is alive.
    Healthy,
    /// High failure rate over enough traffic.
    Suspected,
    /// Not enough signal either way; defer to DNS.
    Inconclusive,
}

#[derive(Debug, Clone, Copy)]
pub struct TcpStallDetector {
    fail_rate_threshold_percent: u32,
    min_packets: u32,
}

impl TcpStallDetector {
    pub fn new(fail_rate_threshold_percent: u32, min_packets: u32) -> Self {
        Self {
            fail_rate_threshold_percent,
            min_packets,
        }
    }

    pub fn evaluate(&self, summary: &TcpHealthSummary) -> TcpVerdict {
        if summary.received_packets > 0 {
            return TcpVerdict::Healthy;
        }
        if summary.sent_packets >= self.min_packets
            && summary.fail_rate_percent >= self.fail_rate_threshold_percent
        {
            TcpVerdict::Suspected
        } else {
            TcpVerdict::Inconclusive
        }
    }
}
