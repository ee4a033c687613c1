//! Response relay scheduling toward waiting downstreams.
//!
//! Mirrors the request path: point-to-point downstreams get the response at
//! once, broadcast downstreams get it after a jittered delay drawn from the
//! same distribution as request relays. Hearing the same response again on
//! the link a send is pending for means a neighbor already answered there, so
//! the pending send is cancelled and the downstream counts as satisfied.

use alloc::vec::Vec;

use tracing::debug;

use crate::forwarder::{Forwarder, TimerAction};
use crate::pit::EntryId;
use crate::policy::draw_jitter;
use crate::time::Timestamp;
use crate::timer::TimerId;
use crate::traits::{Clock, Fib, PositionSource, Random, Transport};
use crate::types::{ActionKind, LinkId, LinkKind, Name, Packet, Response};

/// What to do for one downstream.
enum Step {
    SendNow(LinkId),
    Schedule(LinkId),
    Cancel(LinkId, TimerId),
    Drop(LinkId),
}

impl<T, F, P, R, Clk> Forwarder<T, F, P, R, Clk>
where
    T: Transport,
    F: Fib,
    P: PositionSource,
    R: Random,
    Clk: Clock,
{
    /// A response arrived on `ingress`.
    pub fn on_response_received(&mut self, ingress: LinkId, response: Response, now: Timestamp) {
        self.metrics.responses_received += 1;
        self.emit(&response.name, ActionKind::ResponseReceived, Some(ingress));

        let Some(entry) = self.pit.get_mut(&response.name) else {
            debug!(name = %response.name, "unsolicited response");
            self.metrics.responses_unsolicited += 1;
            return;
        };
        let entry_id = entry.id();

        // The request is answered; pending request relays are moot.
        let canceled_relays = entry.drain_scheduled_relays();

        let mut steps = Vec::new();
        for down in entry.live_downstreams(now) {
            let step = match self.transport.link_kind(down) {
                None => Step::Drop(down),
                Some(LinkKind::PointToPoint) if down == ingress => Step::Drop(down),
                Some(LinkKind::PointToPoint) => Step::SendNow(down),
                Some(LinkKind::Broadcast) => match entry.scheduled_response(down) {
                    Some(timer) if down == ingress => Step::Cancel(down, timer),
                    Some(_) => continue,
                    None => Step::Schedule(down),
                },
            };
            steps.push(step);
        }

        for (link, relay) in canceled_relays {
            self.timers.cancel(relay.timer);
            debug!(name = %response.name, %link, "relay canceled by response");
            self.metrics.relays_canceled += 1;
            self.emit(&response.name, ActionKind::RelayCanceled, Some(link));
        }

        for step in steps {
            match step {
                Step::SendNow(link) => {
                    self.remove_downstream(&response.name, link);
                    self.send_response(link, &response);
                }
                Step::Schedule(link) => self.schedule_response(&response, entry_id, link, now),
                Step::Cancel(link, timer) => {
                    self.timers.cancel(timer);
                    if let Some(entry) = self.pit.get_mut(&response.name) {
                        entry.take_scheduled_response(link);
                        entry.remove_in_record(link);
                    }
                    debug!(name = %response.name, %link, "response already delivered");
                    self.metrics.responses_canceled += 1;
                    self.emit(&response.name, ActionKind::ResponseCanceled, Some(link));
                }
                Step::Drop(link) => self.remove_downstream(&response.name, link),
            }
        }

        self.remove_if_finished(&response.name, now);
    }

    pub(crate) fn fire_response(
        &mut self,
        id: TimerId,
        name: &Name,
        entry: EntryId,
        link: LinkId,
        response: &Response,
        now: Timestamp,
    ) {
        let live = self
            .pit
            .get_live_mut(name, entry)
            .is_some_and(|entry| entry.finish_scheduled_response(link, id));
        if !live {
            debug!(%name, %link, "stale response timer");
            self.metrics.stale_timers += 1;
            return;
        }
        self.remove_downstream(name, link);
        if self.transport.link_kind(link).is_some() {
            self.send_response(link, response);
        } else {
            debug!(%name, %link, "response link gone");
            self.metrics.stale_timers += 1;
        }
        self.remove_if_finished(name, now);
    }

    fn schedule_response(&mut self, response: &Response, entry: EntryId, link: LinkId, now: Timestamp) {
        let delay = draw_jitter(&self.config, &mut self.random);
        let timer = self.timers.schedule(
            now + delay,
            TimerAction::RelayResponse {
                name: response.name.clone(),
                entry,
                link,
                response: response.clone(),
            },
        );
        if let Some(entry) = self.pit.get_mut(&response.name) {
            entry.set_scheduled_response(link, timer);
        }
        debug!(name = %response.name, %link, %delay, "response scheduled");
        self.metrics.responses_scheduled += 1;
        self.emit(&response.name, ActionKind::ResponseScheduled, Some(link));
    }

    fn send_response(&mut self, link: LinkId, response: &Response) {
        let mut copy = response.clone();
        copy.geo_tag = self.position.position();
        debug!(name = %copy.name, %link, "response sent");
        self.transport.send(link, Packet::Response(copy));
        self.metrics.responses_sent += 1;
        self.emit(&response.name, ActionKind::ResponseSent, Some(link));
    }

    fn remove_downstream(&mut self, name: &Name, link: LinkId) {
        if let Some(entry) = self.pit.get_mut(name) {
            entry.remove_in_record(link);
        }
    }

    fn remove_if_finished(&mut self, name: &Name, now: Timestamp) {
        if self.pit.get(name).is_some_and(|entry| entry.is_finished()) {
            self.remove_entry(name, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::config::ForwarderConfig;
    use crate::geometry::Position;
    use crate::traits::test_impls::{MockClock, MockFib, MockPosition, MockRandom, MockTransport};
    use crate::types::{NextHop, Request};

    const RADIO: LinkId = LinkId(1);
    const APP: LinkId = LinkId(2);

    type TestForwarder = Forwarder<MockTransport, MockFib, MockPosition, MockRandom, MockClock>;

    fn forwarder(at: Position) -> TestForwarder {
        let transport = MockTransport::new()
            .with_link(RADIO, LinkKind::Broadcast)
            .with_link(APP, LinkKind::PointToPoint);
        let fib = MockFib::new().with_route(Name::parse("/road"), vec![NextHop::broadcast(RADIO)]);
        Forwarder::new(
            transport,
            fib,
            MockPosition::at(at),
            MockRandom::new(),
            MockClock::new(),
            ForwarderConfig::default(),
        )
    }

    fn name() -> Name {
        Name::parse("/road/0,0,0/1000,0,0/9000/50/1")
    }

    fn response() -> Response {
        Response::new(name(), vec![0xAB; 8]).with_geo_tag(Position::new(600.0, 0.0, 0.0))
    }

    #[test]
    fn test_unsolicited_response_dropped() {
        let mut f = forwarder(Position::ZERO);
        f.on_response_received(RADIO, response(), Timestamp::ZERO);
        assert_eq!(f.metrics().responses_unsolicited, 1);
        assert!(f.transport().sent().is_empty());

        let events = f.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActionKind::ResponseReceived);
        assert_eq!(events[0].link, Some(RADIO));
    }

    #[test]
    fn test_point_to_point_downstream_satisfied_at_once() {
        let mut f = forwarder(Position::new(300.0, 0.0, 0.0));
        // Local application asked; relayed out on the radio right away.
        f.handle_request(APP, Request::new(name(), 1), Timestamp::ZERO);
        f.transport_mut().take_sent();

        f.on_response_received(RADIO, response(), Timestamp::from_millis(50));
        let sent = f.transport_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, APP);
        assert_eq!(sent[0].1.geo_tag(), Some(Position::new(300.0, 0.0, 0.0)));
        assert!(f.pending().is_empty());
    }

    #[test]
    fn test_broadcast_downstream_gets_delayed_response() {
        let mut f = forwarder(Position::new(300.0, 0.0, 0.0));
        f.handle_request(
            RADIO,
            Request::new(name(), 1).with_geo_tag(Position::new(200.0, 0.0, 0.0)),
            Timestamp::ZERO,
        );
        // Relay pending; the response makes it moot.
        assert_eq!(f.pending_timers(), 1);
        f.take_events();
        f.on_response_received(RADIO, response(), Timestamp::from_millis(5));

        let kinds: Vec<ActionKind> = f.take_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&ActionKind::ResponseReceived));
        assert!(!kinds.contains(&ActionKind::Received));
        assert!(kinds.contains(&ActionKind::ResponseScheduled));
        assert_eq!(f.metrics().relays_canceled, 1);
        assert_eq!(f.metrics().responses_scheduled, 1);
        assert_eq!(f.pending_timers(), 1);
        assert!(f.transport().sent().is_empty());

        f.handle_timer(Timestamp::from_millis(200));
        let sent = f.transport_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].1, Packet::Response(_)));
        assert!(f.pending().is_empty());
    }

    #[test]
    fn test_second_copy_on_same_link_cancels() {
        let mut f = forwarder(Position::new(300.0, 0.0, 0.0));
        f.handle_request(RADIO, Request::new(name(), 1), Timestamp::ZERO);
        f.transport_mut().take_sent();

        f.on_response_received(RADIO, response(), Timestamp::from_millis(1));
        assert_eq!(f.pending_timers(), 1);
        f.on_response_received(RADIO, response(), Timestamp::from_millis(2));

        assert_eq!(f.metrics().responses_canceled, 1);
        assert_eq!(f.pending_timers(), 0);
        assert!(f.pending().is_empty());
        f.handle_timer(Timestamp::from_secs(1));
        assert!(f.transport().sent().is_empty());
    }

    #[test]
    fn test_copy_on_other_link_leaves_schedule() {
        let mut f = forwarder(Position::new(300.0, 0.0, 0.0));
        f.handle_request(RADIO, Request::new(name(), 1), Timestamp::ZERO);
        f.transport_mut().take_sent();

        f.on_response_received(RADIO, response(), Timestamp::from_millis(1));
        f.on_response_received(APP, response(), Timestamp::from_millis(2));
        assert_eq!(f.metrics().responses_canceled, 0);
        assert_eq!(f.pending_timers(), 1);

        f.handle_timer(Timestamp::from_secs(1));
        assert_eq!(f.transport().sent().len(), 1);
    }

    #[test]
    fn test_fire_after_expiry_is_noop() {
        let mut f = forwarder(Position::new(300.0, 0.0, 0.0));
        f.handle_request(RADIO, Request::new(name(), 1), Timestamp::ZERO);
        f.transport_mut().take_sent();
        f.on_response_received(RADIO, response(), Timestamp::from_millis(1));

        let id = f.pending().get(&name()).map(|e| e.id()).unwrap();
        f.pit.remove(&name(), Timestamp::ZERO);
        // Timer still queued; its record is gone.
        let (timer, action) = f.timers.pop_due(Timestamp::from_secs(1)).unwrap();
        if let TimerAction::RelayResponse { link, response, .. } = action {
            f.fire_response(timer, &name(), id, link, &response, Timestamp::from_secs(1));
        }
        assert!(f.transport().sent().is_empty());
        assert_eq!(f.metrics().stale_timers, 1);
    }
}
