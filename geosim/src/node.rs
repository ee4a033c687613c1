//! SimNode wrapper for simulated geocast forwarders.
//!
//! Every node has two links: the shared radio (broadcast) and a
//! point-to-point face to its local application. Consumer applications issue
//! requests on the application face; producer applications answer the
//! requests the forwarder hands them there.

use std::cell::Cell;
use std::future::{ready, Ready};

use embassy_sync::channel::Channel;
use geocast::traits::TransportInChannel;
use geocast::{
    Clock, Event, Fib, Forwarder, ForwarderConfig, ForwarderMetrics, Incoming, LinkId, LinkKind,
    Name, NextHop, Packet, Position, PositionSource, Request, Response, SeededRandom, Timestamp,
    Transport,
};
use tracing::trace;

use crate::event::NodeId;

/// Local application face.
pub const APP: LinkId = LinkId(0);
/// Shared radio.
pub const RADIO: LinkId = LinkId(1);

/// Transport that buffers sends for the simulator to collect.
pub struct SimTransport {
    incoming: TransportInChannel,
    outbox: Vec<(LinkId, Packet)>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            incoming: Channel::new(),
            outbox: Vec::new(),
        }
    }

    /// Take all packets sent since the last call.
    pub fn take_sent(&mut self) -> Vec<(LinkId, Packet)> {
        std::mem::take(&mut self.outbox)
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn incoming(&self) -> &TransportInChannel {
        &self.incoming
    }

    fn send(&mut self, link: LinkId, packet: Packet) {
        self.outbox.push((link, packet));
    }

    fn link_kind(&self, link: LinkId) -> Option<LinkKind> {
        match link {
            APP => Some(LinkKind::PointToPoint),
            RADIO => Some(LinkKind::Broadcast),
            _ => None,
        }
    }
}

/// Longest-prefix routes over the two links.
#[derive(Debug, Clone, Default)]
pub struct SimFib {
    routes: Vec<(Name, Vec<NextHop>)>,
}

impl SimFib {
    /// Everything goes out on the radio.
    pub fn radio() -> Self {
        Self::default().with_route(Name::new(), vec![NextHop::broadcast(RADIO)])
    }

    pub fn with_route(mut self, prefix: Name, hops: Vec<NextHop>) -> Self {
        self.routes.push((prefix, hops));
        self
    }
}

impl Fib for SimFib {
    fn next_hops(&self, name: &Name) -> Vec<NextHop> {
        self.routes
            .iter()
            .filter(|(prefix, _)| prefix.is_prefix_of(name))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, hops)| hops.clone())
            .unwrap_or_default()
    }
}

/// Position set by the simulator before each handler call.
pub struct SimPosition {
    current: Cell<Option<Position>>,
}

impl SimPosition {
    pub fn new(at: Option<Position>) -> Self {
        Self {
            current: Cell::new(at),
        }
    }

    pub fn set(&self, at: Option<Position>) {
        self.current.set(at);
    }
}

impl PositionSource for SimPosition {
    fn position(&self) -> Option<Position> {
        self.current.get()
    }
}

/// Clock controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            current: Cell::new(Timestamp::ZERO),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Application running on a node.
#[derive(Debug, Clone, PartialEq)]
pub enum AppRole {
    /// Only forwards.
    Relay,
    /// Issues requests under `prefix`.
    Consumer { prefix: Name },
    /// Answers requests under `prefix` with `payload_size` bytes.
    Producer { prefix: Name, payload_size: usize },
}

pub type SimForwarder = Forwarder<SimTransport, SimFib, SimPosition, SeededRandom, SimClock>;

/// What a node put on the air and handed its application after one step.
#[derive(Debug, Default)]
pub struct Outgoing {
    pub radio: Vec<Packet>,
    /// Responses delivered to a consumer application.
    pub delivered: Vec<Response>,
}

/// A simulated node: a forwarder plus its local application.
pub struct SimNode {
    id: NodeId,
    role: AppRole,
    inner: SimForwarder,
    /// Earliest wake already queued with the simulator.
    scheduled_wake: Option<Timestamp>,
}

impl SimNode {
    pub fn new(id: NodeId, seed: u64, config: ForwarderConfig, role: AppRole) -> Self {
        let fib = match &role {
            AppRole::Producer { prefix, .. } => {
                SimFib::radio().with_route(prefix.clone(), vec![NextHop::point_to_point(APP)])
            }
            _ => SimFib::radio(),
        };
        let inner = Forwarder::new(
            SimTransport::new(),
            fib,
            SimPosition::new(None),
            SeededRandom::new(seed),
            SimClock::new(),
            config,
        );
        Self {
            id,
            role,
            inner,
            scheduled_wake: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> &AppRole {
        &self.role
    }

    pub fn inner(&self) -> &SimForwarder {
        &self.inner
    }

    pub fn metrics(&self) -> &ForwarderMetrics {
        self.inner.metrics()
    }

    /// Sync clock and position before a handler runs.
    pub fn set_state(&self, now: Timestamp, position: Option<Position>) {
        self.inner.clock().set(now);
        self.inner.position_source().set(position);
    }

    pub fn handle_radio_rx(&mut self, packet: Packet, now: Timestamp) {
        self.inner.handle_incoming(Incoming { link: RADIO, packet }, now);
    }

    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.handle_timer(now);
    }

    /// The consumer application asks for `name`.
    pub fn app_request(&mut self, name: Name, nonce: u32, now: Timestamp) {
        self.inner.handle_request(APP, Request::new(name, nonce), now);
    }

    /// Collect sends, letting a producer answer what reached its application.
    pub fn take_outgoing(&mut self, now: Timestamp) -> Outgoing {
        let mut out = Outgoing::default();
        loop {
            let sent = self.inner.transport_mut().take_sent();
            if sent.is_empty() {
                return out;
            }
            for (link, packet) in sent {
                match (link, packet) {
                    (RADIO, packet) => out.radio.push(packet),
                    (APP, Packet::Request(request)) => self.answer(request, now),
                    (APP, Packet::Response(response)) => out.delivered.push(response),
                    (link, packet) => trace!(node = self.id, %link, name = %packet.name(), "send on unknown link"),
                }
            }
        }
    }

    fn answer(&mut self, request: Request, now: Timestamp) {
        let AppRole::Producer { prefix, payload_size } = &self.role else {
            return;
        };
        if !prefix.is_prefix_of(&request.name) {
            return;
        }
        let response = Response::new(request.name, vec![0u8; *payload_size]);
        self.inner.handle_incoming(
            Incoming {
                link: APP,
                packet: Packet::Response(response),
            },
            now,
        );
    }

    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.inner.next_deadline()
    }

    pub(crate) fn scheduled_wake(&self) -> Option<Timestamp> {
        self.scheduled_wake
    }

    pub(crate) fn set_scheduled_wake(&mut self, wake: Option<Timestamp>) {
        self.scheduled_wake = wake;
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.inner.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Name {
        Name::parse("/geo")
    }

    #[test]
    fn test_sim_fib_prefers_longest_prefix() {
        let fib = SimFib::radio().with_route(prefix(), vec![NextHop::point_to_point(APP)]);
        assert_eq!(
            fib.next_hops(&Name::parse("/geo/1")),
            vec![NextHop::point_to_point(APP)]
        );
        assert_eq!(
            fib.next_hops(&Name::parse("/other/1")),
            vec![NextHop::broadcast(RADIO)]
        );
    }

    #[test]
    fn test_consumer_request_goes_out_on_radio() {
        let mut node = SimNode::new(0, 1, ForwarderConfig::default(), AppRole::Consumer { prefix: prefix() });
        node.set_state(Timestamp::ZERO, Some(Position::ZERO));
        node.app_request(Name::parse("/geo/1"), 7, Timestamp::ZERO);

        let out = node.take_outgoing(Timestamp::ZERO);
        assert_eq!(out.radio.len(), 1);
        assert_eq!(out.radio[0].geo_tag(), Some(Position::ZERO));
        assert!(out.delivered.is_empty());
    }

    #[test]
    fn test_producer_answers_and_schedules_response() {
        let role = AppRole::Producer {
            prefix: prefix(),
            payload_size: 16,
        };
        let mut node = SimNode::new(1, 1, ForwarderConfig::default(), role);
        let at = Position::new(300.0, 0.0, 0.0);
        node.set_state(Timestamp::ZERO, Some(at));

        let request = Request::new(Name::parse("/geo/1"), 7).with_geo_tag(Position::new(200.0, 0.0, 0.0));
        node.handle_radio_rx(Packet::Request(request), Timestamp::ZERO);
        let out = node.take_outgoing(Timestamp::ZERO);
        assert!(out.radio.is_empty());
        assert_eq!(node.metrics().responses_scheduled, 1);

        let wake = node.next_deadline().unwrap();
        node.set_state(wake, Some(at));
        node.handle_timer(wake);
        let out = node.take_outgoing(wake);
        assert_eq!(out.radio.len(), 1);
        match &out.radio[0] {
            Packet::Response(response) => assert_eq!(response.content.len(), 16),
            other => panic!("expected response, got {other:?}"),
        }
    }
}
