//! Discrete event simulator for geocast forwarding.

use std::collections::BinaryHeap;

use geocast::{
    ConfigError, Duration, ForwarderConfig, ForwarderMetrics, Name, Packet, Position, Response,
    RouteDescriptor, Timestamp,
};
use hashbrown::HashMap;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::event::{Event, NodeId, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::loss::{LossCounter, LossCounterError};
use crate::metrics::{SimMetrics, SimulationResult};
use crate::node::{AppRole, SimNode};
use crate::topology::Topology;

/// Default sliding window for consumer loss counters, in sequence numbers.
pub const DEFAULT_LOSS_WINDOW: u32 = 64;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid forwarder configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    LossWindow(#[from] LossCounterError),
    #[error("no node {0}")]
    UnknownNode(NodeId),
}

/// A protocol event together with when and where it happened.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub time: Timestamp,
    pub node: NodeId,
    pub event: geocast::Event,
}

/// Discrete event simulator for geocast networks.
pub struct Simulator {
    nodes: Vec<SimNode>,
    topology: Topology,
    config: ForwarderConfig,
    seed: u64,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// Loss draws and request nonces.
    rng: ChaCha8Rng,
    loss_window: u32,
    loss_counters: HashMap<NodeId, LossCounter>,
    event_log: Option<Vec<LoggedEvent>>,
}

impl Simulator {
    /// Create a simulator with one relay node per topology node.
    pub fn new(seed: u64, topology: Topology, config: ForwarderConfig) -> Result<Self, SimError> {
        config.validate()?;
        let nodes = (0..topology.len())
            .map(|id| SimNode::new(id, node_seed(seed, id), config.clone(), AppRole::Relay))
            .collect();
        Ok(Self {
            nodes,
            topology,
            config,
            seed,
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            loss_window: DEFAULT_LOSS_WINDOW,
            loss_counters: HashMap::new(),
            event_log: None,
        })
    }

    /// Keep every protocol event for inspection.
    pub fn with_event_log(mut self) -> Self {
        self.event_log = Some(Vec::new());
        self
    }

    pub fn with_loss_window(mut self, window: u32) -> Result<Self, SimError> {
        LossCounter::new(window)?;
        self.loss_window = window;
        Ok(self)
    }

    /// Replace a node's application.
    pub fn set_role(&mut self, node: NodeId, role: AppRole) -> Result<(), SimError> {
        if node >= self.nodes.len() {
            return Err(SimError::UnknownNode(node));
        }
        if matches!(role, AppRole::Consumer { .. }) {
            self.loss_counters.insert(node, LossCounter::new(self.loss_window)?);
        } else {
            self.loss_counters.remove(&node);
        }
        self.nodes[node] = SimNode::new(node, node_seed(self.seed, node), self.config.clone(), role);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn event_log(&self) -> &[LoggedEvent] {
        self.event_log.as_deref().unwrap_or_default()
    }

    /// Forwarder counters summed over all nodes.
    pub fn forwarder_metrics(&self) -> ForwarderMetrics {
        let mut total = ForwarderMetrics::default();
        for node in &self.nodes {
            total += *node.metrics();
        }
        total
    }

    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Have `consumer` issue `count` requests, `interval` apart from `start`.
    pub fn schedule_requests(&mut self, consumer: NodeId, count: u64, start: Timestamp, interval: Duration) {
        let mut at = start;
        for seq in 0..count {
            self.schedule(at, Event::AppRequest { node: consumer, seq });
            at += interval;
        }
    }

    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self.event_queue.peek().is_some_and(|e| e.time <= end_time) {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
        }
        self.advance_time(end_time);

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            forwarders: self.forwarder_metrics(),
            window_lost: self.loss_counters.values().map(LossCounter::lost).sum(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Delivery { to, from, packet } => self.deliver_packet(to, from, packet),
            Event::TimerFire { node, at } => self.fire_timer(node, at),
            Event::AppRequest { node, seq } => self.app_request(node, seq),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver_packet(&mut self, to: NodeId, from: NodeId, packet: Packet) {
        let now = self.current_time;
        self.sync_node(to);
        let Some(node) = self.nodes.get_mut(to) else {
            return;
        };
        trace!(node = to, from, name = %packet.name(), "delivery");
        node.handle_radio_rx(packet, now);
        self.metrics.packets_delivered += 1;
        self.after_step(to);
    }

    fn fire_timer(&mut self, node_id: NodeId, at: Timestamp) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        // Superseded by an earlier wake.
        if node.scheduled_wake() != Some(at) {
            return;
        }
        node.set_scheduled_wake(None);
        self.sync_node(node_id);
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.handle_timer(now);
        }
        self.after_step(node_id);
    }

    fn app_request(&mut self, node_id: NodeId, seq: u64) {
        let now = self.current_time;
        let prefix = match self.nodes.get(node_id).map(SimNode::role) {
            Some(AppRole::Consumer { prefix }) => prefix.clone(),
            _ => {
                warn!(node = node_id, seq, "request from a node that is not a consumer");
                return;
            }
        };
        let Some(target) = self.producer_position(&prefix, now) else {
            warn!(node = node_id, %prefix, "no producer for prefix");
            return;
        };

        let descriptor = RouteDescriptor {
            source: self.topology.position(node_id, now),
            target,
            arrival: Some(now + self.config.request_lifetime),
            limit: None,
        };
        let name = descriptor.append_to(&prefix, seq);
        let nonce = self.rng.next_u32();
        debug!(node = node_id, %name, nonce, "request issued");
        self.metrics.record_issued(node_id, seq, now);

        self.sync_node(node_id);
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.app_request(name, nonce, now);
        }
        self.after_step(node_id);
    }

    fn producer_position(&self, prefix: &Name, now: Timestamp) -> Option<Position> {
        self.nodes
            .iter()
            .find(|node| matches!(node.role(), AppRole::Producer { prefix: p, .. } if p == prefix))
            .and_then(|node| self.topology.position(node.id(), now))
    }

    fn sync_node(&self, node_id: NodeId) {
        if let Some(node) = self.nodes.get(node_id) {
            node.set_state(self.current_time, self.topology.position(node_id, self.current_time));
        }
    }

    /// Route what a node sent, then requeue its wake-up.
    fn after_step(&mut self, node_id: NodeId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let out = node.take_outgoing(now);
        let events = node.take_events();

        for response in out.delivered {
            self.deliver_to_app(node_id, &response);
        }
        for packet in out.radio {
            self.broadcast(node_id, packet);
        }
        for event in events {
            trace!(node = node_id, name = %event.name, kind = ?event.kind, "protocol event");
            if let Some(log) = self.event_log.as_mut() {
                log.push(LoggedEvent {
                    time: now,
                    node: node_id,
                    event,
                });
            }
        }
        self.reschedule(node_id);
    }

    fn deliver_to_app(&mut self, consumer: NodeId, response: &Response) {
        let now = self.current_time;
        let Some(seq) = response.name.get(-1).and_then(|s| s.parse::<u64>().ok()) else {
            warn!(node = consumer, name = %response.name, "response without sequence number");
            return;
        };
        if self.metrics.record_delivered(consumer, seq, now) {
            debug!(node = consumer, name = %response.name, "response delivered");
            if let (Some(counter), Ok(seq)) = (self.loss_counters.get_mut(&consumer), u32::try_from(seq)) {
                counter.notify_received(seq);
            }
        }
    }

    /// Put a packet on the air; every node in range may hear it.
    fn broadcast(&mut self, sender: NodeId, packet: Packet) {
        self.metrics.packets_sent += 1;
        let now = self.current_time;
        let medium = self.topology.medium().clone();

        for neighbor in self.topology.neighbors(sender, now) {
            if medium.loss_rate > 0.0 && self.rng.gen::<f64>() < medium.loss_rate {
                self.metrics.packets_dropped += 1;
                continue;
            }
            self.schedule(
                now + medium.delay,
                Event::Delivery {
                    to: neighbor,
                    from: sender,
                    packet: packet.clone(),
                },
            );
        }
    }

    fn reschedule(&mut self, node_id: NodeId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let Some(deadline) = node.next_deadline() else {
            return;
        };
        let at = deadline.max(now);
        if node.scheduled_wake().map_or(true, |wake| at < wake) {
            node.set_scheduled_wake(Some(at));
            self.schedule(at, Event::TimerFire { node: node_id, at });
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        let now = self.current_time;
        match action {
            ScenarioAction::SetVelocity { node, velocity } => {
                self.topology.set_velocity(node, velocity, now);
            }
            ScenarioAction::SetLossRate(rate) => {
                self.topology.medium_mut().loss_rate = rate.clamp(0.0, 1.0);
            }
            ScenarioAction::SetRange(range) => self.topology.set_range(range),
        }
    }
}

/// Per-node random stream derived from the scenario seed.
fn node_seed(seed: u64, node: NodeId) -> u64 {
    seed ^ (node as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use geocast::ActionKind;

    use super::*;

    fn line_sim(count: usize, consumer: NodeId, producer: NodeId) -> Simulator {
        let mut sim = Simulator::new(7, Topology::line(count, 100.0, 150.0), ForwarderConfig::default())
            .unwrap()
            .with_event_log();
        let prefix = Name::parse("/geo");
        sim.set_role(consumer, AppRole::Consumer { prefix: prefix.clone() }).unwrap();
        sim.set_role(
            producer,
            AppRole::Producer {
                prefix,
                payload_size: 32,
            },
        )
        .unwrap();
        sim
    }

    #[test]
    fn test_single_request_over_line() {
        let mut sim = line_sim(5, 0, 4);
        sim.schedule_requests(0, 1, Timestamp::ZERO, Duration::from_secs(1));
        let result = sim.run_for(Duration::from_secs(5));

        assert_eq!(result.metrics.requests_issued, 1);
        assert_eq!(result.metrics.responses_delivered, 1);
        assert_eq!(result.delivery_ratio(), 1.0);
        // Radio: consumer plus three relays each way, producer answering once.
        // Application face: one request to the producer, one response to the consumer.
        assert_eq!(result.metrics.packets_sent, 8);
        assert_eq!(result.forwarders.requests_sent, 4 + 1);
        assert_eq!(result.forwarders.responses_sent, 4 + 1);
        assert!(result.queue_exhausted);
        assert!(sim.nodes().iter().all(|n| n.inner().pending().is_empty()));
    }

    #[test]
    fn test_unknown_node_role() {
        let mut sim = line_sim(2, 0, 1);
        assert!(matches!(sim.set_role(9, AppRole::Relay), Err(SimError::UnknownNode(9))));
    }

    #[test]
    fn test_bad_loss_window() {
        let sim = Simulator::new(1, Topology::line(2, 100.0, 150.0), ForwarderConfig::default()).unwrap();
        assert!(matches!(sim.with_loss_window(10), Err(SimError::LossWindow(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ForwarderConfig::default()
            .with_delay_bounds(Duration::from_millis(50), Duration::from_millis(10));
        assert!(matches!(
            Simulator::new(1, Topology::line(2, 100.0, 150.0), config),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_event_log_records_relay_decisions() {
        let mut sim = line_sim(4, 0, 3);
        sim.schedule_requests(0, 1, Timestamp::ZERO, Duration::from_secs(1));
        sim.run_for(Duration::from_secs(5));

        let scheduled = sim
            .event_log()
            .iter()
            .filter(|e| e.event.kind == ActionKind::RelayScheduled)
            .count();
        // Nodes 1 and 2 contend for the request.
        assert_eq!(scheduled, 2);
        assert!(sim.event_log().windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_total_loss_delivers_nothing() {
        let mut sim = line_sim(3, 0, 2);
        sim.topology_mut().medium_mut().loss_rate = 1.0;
        sim.schedule_requests(0, 3, Timestamp::ZERO, Duration::from_millis(500));
        let result = sim.run_for(Duration::from_secs(10));

        assert_eq!(result.metrics.requests_issued, 3);
        assert_eq!(result.metrics.responses_delivered, 0);
        assert_eq!(result.metrics.packets_sent, 3);
        assert_eq!(result.metrics.packets_dropped, 3);
        // The consumer's records expire.
        assert_eq!(result.forwarders.entries_expired, 3);
    }
}
