//! Event types and priority queue for discrete event simulation.

use std::cmp::Ordering;

use geocast::{Packet, Timestamp, Vector3};

/// Index of a node in the simulation.
pub type NodeId = usize;

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Change a node's velocity, keeping its current position.
    SetVelocity { node: NodeId, velocity: Vector3 },
    /// Set the loss rate of the shared medium.
    SetLossRate(f64),
    /// Set the radio range of every node.
    SetRange(f64),
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A packet heard over the radio by `to`.
    Delivery {
        to: NodeId,
        from: NodeId,
        packet: Packet,
    },
    /// Wake a node's forwarder for its timers and expiries.
    TimerFire { node: NodeId, at: Timestamp },
    /// The consumer application on `node` issues request number `seq`.
    AppRequest { node: NodeId, seq: u64 },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Min-heap ordering (BinaryHeap is a max-heap).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn timer(time: Timestamp, seq: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            time,
            SequenceNumber::new(seq),
            Event::TimerFire { node: 0, at: time },
        )
    }

    #[test]
    fn test_event_ordering() {
        let e1 = timer(Timestamp::from_secs(10), 1);
        let e2 = timer(Timestamp::from_secs(5), 2);

        // Earlier time is "greater" in min-heap terms.
        assert!(e2 > e1);
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        let e1 = timer(Timestamp::from_secs(10), 1);
        let e2 = timer(Timestamp::from_secs(10), 2);
        assert!(e1 > e2);
    }

    #[test]
    fn test_sub_millisecond_times_are_ordered() {
        let mut heap = BinaryHeap::new();
        heap.push(timer(Timestamp::from_micros(1_500), 1));
        heap.push(timer(Timestamp::from_micros(1_200), 2));
        assert_eq!(heap.pop().map(|e| e.time), Some(Timestamp::from_micros(1_200)));
    }
}
