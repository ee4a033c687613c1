//! Metrics collection for simulation analysis.

use geocast::{Duration, ForwarderMetrics, Timestamp};
use hashbrown::HashMap;

use crate::event::NodeId;

/// Medium and application level counters collected by the simulator.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Radio transmissions.
    pub packets_sent: u64,
    /// Per-receiver deliveries over the radio.
    pub packets_delivered: u64,
    /// Per-receiver copies lost to the loss rate.
    pub packets_dropped: u64,
    pub requests_issued: u64,
    /// First copy of each response to reach its consumer.
    pub responses_delivered: u64,
    /// Further copies of an already delivered response.
    pub duplicate_responses: u64,
    /// Request-to-response latency of each delivered response.
    pub latencies: Vec<Duration>,
    /// Issue time per (consumer, sequence) still awaiting a response.
    pub(crate) outstanding: HashMap<(NodeId, u64), Timestamp>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_issued(&mut self, consumer: NodeId, seq: u64, at: Timestamp) {
        self.requests_issued += 1;
        self.outstanding.insert((consumer, seq), at);
    }

    /// Returns false when the response was already delivered.
    pub(crate) fn record_delivered(&mut self, consumer: NodeId, seq: u64, at: Timestamp) -> bool {
        match self.outstanding.remove(&(consumer, seq)) {
            Some(issued) => {
                self.responses_delivered += 1;
                self.latencies.push(at.saturating_sub(issued));
                true
            }
            None => {
                self.duplicate_responses += 1;
                false
            }
        }
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: u64 = self.latencies.iter().map(|d| d.as_micros()).sum();
        Some(Duration::from_micros(total / self.latencies.len() as u64))
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.latencies.iter().copied().max()
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    pub metrics: SimMetrics,
    /// Forwarder counters summed over all nodes.
    pub forwarders: ForwarderMetrics,
    /// Losses reported by the consumers' sliding-window counters.
    pub window_lost: u32,
    /// Whether the event queue was exhausted.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Fraction of issued requests that got a response.
    pub fn delivery_ratio(&self) -> f64 {
        if self.metrics.requests_issued == 0 {
            return 0.0;
        }
        self.metrics.responses_delivered as f64 / self.metrics.requests_issued as f64
    }

    /// Radio transmissions per delivered response.
    pub fn transmissions_per_delivery(&self) -> Option<f64> {
        if self.metrics.responses_delivered == 0 {
            return None;
        }
        Some(self.metrics.packets_sent as f64 / self.metrics.responses_delivered as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_and_duplicates() {
        let mut metrics = SimMetrics::new();
        metrics.record_issued(0, 1, Timestamp::from_millis(100));
        metrics.record_issued(0, 2, Timestamp::from_millis(200));

        assert!(metrics.record_delivered(0, 1, Timestamp::from_millis(150)));
        assert!(metrics.record_delivered(0, 2, Timestamp::from_millis(300)));
        assert!(!metrics.record_delivered(0, 2, Timestamp::from_millis(310)));

        assert_eq!(metrics.responses_delivered, 2);
        assert_eq!(metrics.duplicate_responses, 1);
        assert_eq!(metrics.mean_latency(), Some(Duration::from_millis(75)));
        assert_eq!(metrics.max_latency(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_delivery_ratio_without_requests() {
        let result = SimulationResult {
            end_time: Timestamp::ZERO,
            metrics: SimMetrics::new(),
            forwarders: ForwarderMetrics::default(),
            window_lost: 0,
            queue_exhausted: true,
        };
        assert_eq!(result.delivery_ratio(), 0.0);
        assert_eq!(result.transmissions_per_delivery(), None);
    }
}
