//! Per-forwarder counters.

use core::ops::AddAssign;

/// Counts of what one forwarder decided. Monotonic for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderMetrics {
    pub requests_received: u64,
    /// Copies whose nonce was already known (loops and overheard relays).
    pub duplicates_received: u64,
    pub requests_sent: u64,
    pub relays_scheduled: u64,
    pub relays_suppressed: u64,
    pub relays_canceled: u64,
    pub requests_rejected: u64,
    pub responses_received: u64,
    /// Responses with no matching pending-request record.
    pub responses_unsolicited: u64,
    pub responses_scheduled: u64,
    pub responses_sent: u64,
    pub responses_canceled: u64,
    /// Timers that fired after their record or link went away.
    pub stale_timers: u64,
    pub entries_expired: u64,
    pub malformed_descriptors: u64,
}

impl ForwarderMetrics {
    /// Total transmissions of any kind.
    pub fn transmissions(&self) -> u64 {
        self.requests_sent + self.responses_sent
    }
}

impl AddAssign for ForwarderMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.requests_received += rhs.requests_received;
        self.duplicates_received += rhs.duplicates_received;
        self.requests_sent += rhs.requests_sent;
        self.relays_scheduled += rhs.relays_scheduled;
        self.relays_suppressed += rhs.relays_suppressed;
        self.relays_canceled += rhs.relays_canceled;
        self.requests_rejected += rhs.requests_rejected;
        self.responses_received += rhs.responses_received;
        self.responses_unsolicited += rhs.responses_unsolicited;
        self.responses_scheduled += rhs.responses_scheduled;
        self.responses_sent += rhs.responses_sent;
        self.responses_canceled += rhs.responses_canceled;
        self.stale_timers += rhs.stale_timers;
        self.entries_expired += rhs.entries_expired;
        self.malformed_descriptors += rhs.malformed_descriptors;
    }
}
