//! DNS timeout tracking.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Return code the host reports for a DNS query that timed out.
pub const RETURN_CODE_DNS_TIMEOUT: i32 = 255;
pub const RETURN_CODE_DNS_SUCCESS: i32 = 0;

/// Minimum number of DNS events kept in the ring.
pub const DEFAULT_DNS_LOG_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsEvent {
    pub return_code: i32,
    /// Monotonic time of the response.
    pub timestamp: Duration,
}

impl DnsEvent {
    pub fn is_timeout(&self) -> bool {
        self.return_code == RETURN_CODE_DNS_TIMEOUT
    }
}

/// Bounded log of DNS results plus a consecutive-timeout counter.
#[derive(Debug, Clone)]
pub struct DnsStallDetector {
    events: VecDeque<DnsEvent>,
    capacity: usize,
    consecutive_timeouts: usize,
}

impl DnsStallDetector {
    pub fn new(threshold: usize) -> Self {
        let capacity = threshold.max(DEFAULT_DNS_LOG_SIZE);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            consecutive_timeouts: 0,
        }
    }

    pub fn accumulate(&mut self, timestamp: Duration, return_code: i32) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(DnsEvent {
            return_code,
            timestamp,
        });
        if return_code == RETURN_CODE_DNS_TIMEOUT {
            self.consecutive_timeouts += 1;
        } else {
            self.consecutive_timeouts = 0;
        }
    }

    pub fn consecutive_timeouts(&self) -> usize {
        self.consecutive_timeouts
    }

    /// Whether the last `threshold` events are all timeouts and the oldest
    /// of them is younger than `valid_time`.
    pub fn is_suspected(&self, threshold: usize, valid_time: Duration, now: Duration) -> bool {
        if threshold == 0 || self.consecutive_timeouts < threshold {
            return false;
        }
        let Some(first) = self.events.len().checked_sub(threshold).and_then(|i| self.events.get(i))
        else {
            return false;
        };
        now.saturating_sub(first.timestamp) < valid_time
    }

    pub fn recent_events(&self) -> Vec<DnsEvent> {
        self.events.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: Duration = Duration::from_secs(30 * 60);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_ring_capacity() {
        let mut det = DnsStallDetector::new(5);
        for i in 0..30 {
            det.accumulate(secs(i), RETURN_CODE_DNS_SUCCESS);
        }
        assert_eq!(det.len(), DEFAULT_DNS_LOG_SIZE);
        assert_eq!(det.recent_events()[0].timestamp, secs(10));

        let large = DnsStallDetector::new(40);
        assert_eq!(large.capacity, 40);
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let mut det = DnsStallDetector::new(5);
        for i in 0..4 {
            det.accumulate(secs(i), RETURN_CODE_DNS_TIMEOUT);
        }
        det.accumulate(secs(4), RETURN_CODE_DNS_SUCCESS);
        assert_eq!(det.consecutive_timeouts(), 0);
        det.accumulate(secs(5), RETURN_CODE_DNS_TIMEOUT);
        assert_eq!(det.consecutive_timeouts(), 1);
        assert!(!det.is_suspected(5, VALID, secs(6)));
    }

    #[test]
    fn test_suspected_within_valid_window() {
        let mut det = DnsStallDetector::new(5);
        for i in 0..5 {
            det.accumulate(secs(100 + i), RETURN_CODE_DNS_TIMEOUT);
        }
        assert!(det.is_suspected(5, VALID, secs(200)));
        // The burst started too long ago.
        assert!(!det.is_suspected(5, VALID, secs(100) + VALID));
        assert!(!det.is_suspected(0, VALID, secs(200)));
    }

    #[test]
    fn test_threshold_above_log_size() {
        let mut det = DnsStallDetector::new(25);
        for i in 0..25 {
            det.accumulate(secs(i), RETURN_CODE_DNS_TIMEOUT);
        }
        assert!(det.is_suspected(25, VALID, secs(30)));
    }
}
