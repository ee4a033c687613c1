//! The forwarding-decision engine.
//!
//! A [`Forwarder`] owns the pending-request table and the timer queue of one
//! node. It is driven either by the async [`Forwarder::run`] loop or by
//! calling the handlers directly with an explicit `now`, which is how the
//! simulator and the tests drive it.
//!
//! Per request and broadcast egress link the engine is in one of two states:
//!
//! ```text
//!   no-timer --(not suppressed)--> pending-relay --(timer fires)--> relayed
//!      ^                                |
//!      +------(duplicate, cancel)-------+
//! ```
//!
//! Point-to-point egress links never contend and are relayed immediately.

use alloc::vec::Vec;

use tracing::{debug, warn};

use crate::config::ForwarderConfig;
use crate::descriptor::{DescriptorError, RouteDescriptor};
use crate::geometry::Position;
use crate::metrics::ForwarderMetrics;
use crate::pit::{EntryId, PendingTable, ScheduledRelay};
use crate::policy::{compute_relay_delay, should_cancel_scheduled_relay, should_suppress_relay};
use crate::time::{Duration, Timestamp};
use crate::timer::{TimerId, TimerQueue};
use crate::traits::{Clock, EventChannel, Fib, PositionSource, Random, Transport};
use crate::types::{
    ActionKind, Event, Incoming, LinkId, LinkKind, Name, Packet, RejectReason, Request, Response,
};

/// Idle wake-up interval of the run loop when nothing is scheduled.
const IDLE_WAKE: Duration = Duration::from_secs(60);

/// Work deferred to a timer. Holds the record by name and id only.
#[derive(Debug, Clone)]
pub(crate) enum TimerAction {
    RelayRequest {
        name: Name,
        entry: EntryId,
        link: LinkId,
        request: Request,
    },
    RelayResponse {
        name: Name,
        entry: EntryId,
        link: LinkId,
        response: Response,
    },
}

/// Forwarding engine for one node.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `F`: Next-hop enumeration
/// - `P`: Position source
/// - `R`: Random number generator
/// - `Clk`: Clock/timer implementation
pub struct Forwarder<T, F, P, R, Clk> {
    // Dependencies (injected)
    pub(crate) transport: T,
    fib: F,
    pub(crate) position: P,
    pub(crate) random: R,
    clock: Clk,

    pub(crate) config: ForwarderConfig,
    pub(crate) pit: PendingTable,
    pub(crate) timers: TimerQueue<TimerAction>,
    events: EventChannel,
    pub(crate) metrics: ForwarderMetrics,
}

impl<T, F, P, R, Clk> Forwarder<T, F, P, R, Clk>
where
    T: Transport,
    F: Fib,
    P: PositionSource,
    R: Random,
    Clk: Clock,
{
    /// Callers validate `config` first; an invalid one trips a debug assertion.
    pub fn new(transport: T, fib: F, position: P, random: R, clock: Clk, config: ForwarderConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "invalid forwarder config: {:?}", config);
        Self {
            transport,
            fib,
            position,
            random,
            clock,
            config,
            pit: PendingTable::new(),
            timers: TimerQueue::new(),
            events: EventChannel::new(),
            metrics: ForwarderMetrics::default(),
        }
    }

    /// Run the forwarder's main loop.
    ///
    /// Wakes on an inbound packet or the next timer or expiry deadline.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        loop {
            let wake = match self.next_deadline() {
                Some(deadline) => deadline,
                None => self.clock.now() + IDLE_WAKE,
            };

            let result = select(
                self.transport.incoming().receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            let now = self.clock.now();
            match result {
                Either::First(incoming) => self.handle_incoming(incoming, now),
                Either::Second(()) => self.handle_timer(now),
            }
        }
    }

    /// Earliest time the forwarder has work to do.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        match (self.timers.next_deadline(), self.pit.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Dispatch a received packet.
    pub fn handle_incoming(&mut self, incoming: Incoming, now: Timestamp) {
        match incoming.packet {
            Packet::Request(request) => self.handle_request(incoming.link, request, now),
            Packet::Response(response) => self.on_response_received(incoming.link, response, now),
        }
    }

    /// Classify a request as new or duplicate by its nonce.
    pub fn handle_request(&mut self, link: LinkId, request: Request, now: Timestamp) {
        self.metrics.requests_received += 1;
        let known = self
            .pit
            .get(&request.name)
            .is_some_and(|entry| entry.has_nonce(request.nonce));
        if known || self.pit.is_dead_nonce(&request.name, request.nonce, now) {
            self.on_duplicate_request_received(link, &request);
        } else {
            self.on_request_received(link, request, now);
        }
    }

    /// A request with a nonce not yet seen for its name.
    pub fn on_request_received(&mut self, ingress: LinkId, request: Request, now: Timestamp) {
        self.emit(&request.name, ActionKind::Received, Some(ingress));

        let entry = self.pit.find_or_insert(&request, now);
        entry.insert_in_record(ingress, request.nonce, now, self.config.request_lifetime);
        let entry_id = entry.id();

        let self_pos = self.position.position();
        let sender = request.geo_tag;
        let route = self.route_of(&request.name);

        let mut eligible = 0usize;
        let mut suppressed = 0usize;

        for hop in self.fib.next_hops(&request.name) {
            match hop.kind {
                LinkKind::PointToPoint => {
                    if hop.link == ingress {
                        continue;
                    }
                    self.send_request(hop.link, &request);
                }
                LinkKind::Broadcast => {
                    let pending = self
                        .pit
                        .get(&request.name)
                        .and_then(|entry| entry.scheduled_relay(hop.link))
                        .copied();
                    if let Some(relay) = pending {
                        debug!(name = %request.name, link = %hop.link, "relay already scheduled");
                        self.evaluate_cancel(&request.name, hop.link, relay, sender, &route, self_pos);
                        eligible += 1;
                        continue;
                    }

                    let descriptor = route.as_ref().ok().and_then(Option::as_ref);
                    if should_suppress_relay(&self.config, self_pos, sender, descriptor) {
                        debug!(name = %request.name, link = %hop.link, "relay suppressed");
                        self.metrics.relays_suppressed += 1;
                        self.emit(&request.name, ActionKind::RelaySuppressed, Some(hop.link));
                        suppressed += 1;
                        continue;
                    }

                    let delay = compute_relay_delay(&self.config, &mut self.random, self_pos, sender);
                    if delay == Duration::ZERO {
                        self.send_request(hop.link, &request);
                    } else {
                        self.schedule_relay(&request, entry_id, hop.link, delay, now);
                    }
                }
            }
            eligible += 1;
        }

        if eligible == 0 {
            let reason = if suppressed > 0 {
                RejectReason::Suppressed
            } else {
                RejectReason::NoRoute
            };
            self.reject(&request.name, reason, now);
        }
    }

    /// A copy of a request this node already knows, heard on `ingress`.
    ///
    /// If a relay is pending on that link, the copy is evidence that someone
    /// else relayed it and the pending relay may be redundant.
    pub fn on_duplicate_request_received(&mut self, ingress: LinkId, request: &Request) {
        self.metrics.duplicates_received += 1;
        self.emit(&request.name, ActionKind::ReceivedDuplicate, Some(ingress));

        let Some(relay) = self
            .pit
            .get(&request.name)
            .and_then(|entry| entry.scheduled_relay(ingress))
            .copied()
        else {
            debug!(name = %request.name, link = %ingress, "duplicate with no relay scheduled");
            return;
        };

        let route = self.route_of(&request.name);
        let self_pos = self.position.position();
        self.evaluate_cancel(&request.name, ingress, relay, request.geo_tag, &route, self_pos);
    }

    /// Fire every due timer and expire stale records.
    pub fn handle_timer(&mut self, now: Timestamp) {
        while let Some((id, action)) = self.timers.pop_due(now) {
            match action {
                TimerAction::RelayRequest {
                    name,
                    entry,
                    link,
                    request,
                } => self.fire_relay(id, &name, entry, link, &request),
                TimerAction::RelayResponse {
                    name,
                    entry,
                    link,
                    response,
                } => self.fire_response(id, &name, entry, link, &response, now),
            }
        }
        self.expire_entries(now);
    }

    fn fire_relay(&mut self, id: TimerId, name: &Name, entry: EntryId, link: LinkId, request: &Request) {
        let live = self
            .pit
            .get_live_mut(name, entry)
            .is_some_and(|entry| entry.finish_scheduled_relay(link, id));
        if !live || self.transport.link_kind(link).is_none() {
            debug!(%name, %link, "stale relay timer");
            self.metrics.stale_timers += 1;
            return;
        }
        self.send_request(link, request);
    }

    fn schedule_relay(
        &mut self,
        request: &Request,
        entry: EntryId,
        link: LinkId,
        delay: Duration,
        now: Timestamp,
    ) {
        let timer = self.timers.schedule(
            now + delay,
            TimerAction::RelayRequest {
                name: request.name.clone(),
                entry,
                link,
                request: request.clone(),
            },
        );
        if let Some(entry) = self.pit.get_mut(&request.name) {
            entry.set_scheduled_relay(
                link,
                ScheduledRelay {
                    timer,
                    trigger_sender: request.geo_tag,
                },
            );
        }
        debug!(name = %request.name, %link, %delay, "relay scheduled");
        self.metrics.relays_scheduled += 1;
        self.emit(&request.name, ActionKind::RelayScheduled, Some(link));
    }

    fn evaluate_cancel(
        &mut self,
        name: &Name,
        link: LinkId,
        relay: ScheduledRelay,
        new_sender: Option<Position>,
        route: &Result<Option<RouteDescriptor>, DescriptorError>,
        self_pos: Option<Position>,
    ) {
        // Malformed descriptors never cancel.
        let Ok(route) = route else {
            return;
        };
        let target = route.as_ref().map(|r| r.target);
        if !should_cancel_scheduled_relay(&self.config, self_pos, relay.trigger_sender, new_sender, target) {
            return;
        }
        if let Some(entry) = self.pit.get_mut(name) {
            entry.take_scheduled_relay(link);
        }
        self.timers.cancel(relay.timer);
        debug!(%name, %link, "relay canceled");
        self.metrics.relays_canceled += 1;
        self.emit(name, ActionKind::RelayCanceled, Some(link));
    }

    fn reject(&mut self, name: &Name, reason: RejectReason, now: Timestamp) {
        debug!(%name, ?reason, "request rejected");
        self.metrics.requests_rejected += 1;
        self.remove_entry(name, now);
        self.emit(name, ActionKind::Rejected(reason), None);
    }

    fn expire_entries(&mut self, now: Timestamp) {
        for name in self.pit.expired(now) {
            debug!(%name, "pending request expired");
            self.metrics.entries_expired += 1;
            self.remove_entry(&name, now);
        }
        self.pit.purge_dead_nonces(now);
    }

    /// Drop a record together with every timer it owns.
    pub(crate) fn remove_entry(&mut self, name: &Name, now: Timestamp) {
        let dead_until = now + self.config.request_lifetime;
        if let Some(entry) = self.pit.remove(name, dead_until) {
            for timer in entry.timers() {
                self.timers.cancel(timer);
            }
        }
    }

    pub(crate) fn send_request(&mut self, link: LinkId, request: &Request) {
        let mut copy = request.clone();
        copy.geo_tag = self.position.position();
        debug!(name = %copy.name, %link, "request sent");
        self.transport.send(link, Packet::Request(copy));
        self.metrics.requests_sent += 1;
        self.emit(&request.name, ActionKind::RelaySent, Some(link));
    }

    /// Parse the route descriptor, logging malformed ones.
    pub(crate) fn route_of(&mut self, name: &Name) -> Result<Option<RouteDescriptor>, DescriptorError> {
        let route = RouteDescriptor::from_name(name);
        if let Err(err) = &route {
            warn!(%name, %err, "malformed route descriptor");
            self.metrics.malformed_descriptors += 1;
        }
        route
    }

    /// Push an event to the events channel. Dropped when full.
    pub(crate) fn emit(&self, name: &Name, kind: ActionKind, link: Option<LinkId>) {
        let _ = self.events.try_send(Event {
            name: name.clone(),
            kind,
            link,
            position: self.position.position(),
        });
    }

    // --- Accessors ---

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ForwarderMetrics {
        &self.metrics
    }

    /// Protocol events, for observers.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pit
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn position_source(&self) -> &P {
        &self.position
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    /// Drain queued events.
    pub fn take_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_receive() {
            events.push(event);
        }
        events
    }
}
