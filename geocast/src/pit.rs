//! Pending-request table.
//!
//! One record per request name tracks who is waiting for the response and
//! which delayed relays are in flight. Records are owned by the table; timers
//! refer to a record by `(name, EntryId)` and must look it up again when they
//! fire. A record that was removed and recreated under the same name gets a
//! new id, so a stale timer never acts on the newcomer.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::geometry::Position;
use crate::time::{Duration, Timestamp};
use crate::timer::TimerId;
use crate::types::{LinkId, Name, Request};

/// Identity of one incarnation of a pending-request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

/// A downstream waiting for the response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InRecord {
    pub nonce: u32,
    pub expiry: Timestamp,
}

/// A delayed relay held on an egress broadcast link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledRelay {
    pub timer: TimerId,
    /// Geometry tag of the request copy that caused the scheduling.
    pub trigger_sender: Option<Position>,
}

/// Bookkeeping for one request name.
#[derive(Debug, Clone)]
pub struct PitEntry {
    id: EntryId,
    name: Name,
    /// First request copy seen, relayed on later hops.
    request: Request,
    in_records: BTreeMap<LinkId, InRecord>,
    nonces: BTreeSet<u32>,
    scheduled_relays: BTreeMap<LinkId, ScheduledRelay>,
    scheduled_responses: BTreeMap<LinkId, TimerId>,
    expiry: Timestamp,
}

impl PitEntry {
    fn new(id: EntryId, request: Request, now: Timestamp) -> Self {
        Self {
            id,
            name: request.name.clone(),
            request,
            in_records: BTreeMap::new(),
            nonces: BTreeSet::new(),
            scheduled_relays: BTreeMap::new(),
            scheduled_responses: BTreeMap::new(),
            expiry: now,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn expiry(&self) -> Timestamp {
        self.expiry
    }

    /// Whether a request with this nonce was already seen for the name.
    pub fn has_nonce(&self, nonce: u32) -> bool {
        self.nonces.contains(&nonce)
    }

    pub fn nonces(&self) -> impl Iterator<Item = u32> + '_ {
        self.nonces.iter().copied()
    }

    /// Record a request arrival from `link`, extending the record lifetime.
    pub fn insert_in_record(&mut self, link: LinkId, nonce: u32, now: Timestamp, lifetime: Duration) {
        let expiry = now + lifetime;
        self.in_records.insert(link, InRecord { nonce, expiry });
        self.nonces.insert(nonce);
        self.expiry = self.expiry.max(expiry);
    }

    pub fn in_record(&self, link: LinkId) -> Option<&InRecord> {
        self.in_records.get(&link)
    }

    pub fn remove_in_record(&mut self, link: LinkId) -> Option<InRecord> {
        self.in_records.remove(&link)
    }

    /// Downstreams whose record has not expired at `now`.
    pub fn live_downstreams(&self, now: Timestamp) -> Vec<LinkId> {
        self.in_records
            .iter()
            .filter(|(_, rec)| rec.expiry > now)
            .map(|(link, _)| *link)
            .collect()
    }

    pub fn scheduled_relay(&self, link: LinkId) -> Option<&ScheduledRelay> {
        self.scheduled_relays.get(&link)
    }

    pub fn set_scheduled_relay(&mut self, link: LinkId, relay: ScheduledRelay) {
        self.scheduled_relays.insert(link, relay);
    }

    pub fn take_scheduled_relay(&mut self, link: LinkId) -> Option<ScheduledRelay> {
        self.scheduled_relays.remove(&link)
    }

    /// Remove the relay on `link` only if it is still the one `timer` refers to.
    pub fn finish_scheduled_relay(&mut self, link: LinkId, timer: TimerId) -> bool {
        match self.scheduled_relays.get(&link) {
            Some(relay) if relay.timer == timer => {
                self.scheduled_relays.remove(&link);
                true
            }
            _ => false,
        }
    }

    pub fn scheduled_response(&self, link: LinkId) -> Option<TimerId> {
        self.scheduled_responses.get(&link).copied()
    }

    pub fn set_scheduled_response(&mut self, link: LinkId, timer: TimerId) {
        self.scheduled_responses.insert(link, timer);
    }

    pub fn take_scheduled_response(&mut self, link: LinkId) -> Option<TimerId> {
        self.scheduled_responses.remove(&link)
    }

    /// Remove the response on `link` only if it is still the one `timer` refers to.
    pub fn finish_scheduled_response(&mut self, link: LinkId, timer: TimerId) -> bool {
        if self.scheduled_responses.get(&link) == Some(&timer) {
            self.scheduled_responses.remove(&link);
            true
        } else {
            false
        }
    }

    /// All timers owned by this record.
    pub fn timers(&self) -> impl Iterator<Item = TimerId> + '_ {
        self.scheduled_relays
            .values()
            .map(|relay| relay.timer)
            .chain(self.scheduled_responses.values().copied())
    }

    /// Take every pending request relay, leaving responses in place.
    pub fn drain_scheduled_relays(&mut self) -> Vec<(LinkId, ScheduledRelay)> {
        core::mem::take(&mut self.scheduled_relays)
            .into_iter()
            .collect()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.scheduled_relays.is_empty() || !self.scheduled_responses.is_empty()
    }

    /// Nothing left to wait for or send.
    pub fn is_finished(&self) -> bool {
        self.in_records.is_empty() && !self.has_pending_work()
    }
}

/// The table of pending-request records plus recently retired nonces.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<Name, PitEntry>,
    /// Nonces of removed records, to catch late copies looping back.
    dead_nonces: HashMap<(Name, u32), Timestamp>,
    next_id: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &Name) -> Option<&PitEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut PitEntry> {
        self.entries.get_mut(name)
    }

    /// Look up a record only if it is the same incarnation as `id`.
    pub fn get_live_mut(&mut self, name: &Name, id: EntryId) -> Option<&mut PitEntry> {
        self.entries.get_mut(name).filter(|entry| entry.id == id)
    }

    /// Find the record for `request`, creating it if absent.
    pub fn find_or_insert(&mut self, request: &Request, now: Timestamp) -> &mut PitEntry {
        let next_id = &mut self.next_id;
        self.entries
            .entry(request.name.clone())
            .or_insert_with(|| {
                let id = EntryId(*next_id);
                *next_id += 1;
                PitEntry::new(id, request.clone(), now)
            })
    }

    /// Remove a record and remember its nonces until `dead_until`.
    pub fn remove(&mut self, name: &Name, dead_until: Timestamp) -> Option<PitEntry> {
        let entry = self.entries.remove(name)?;
        for nonce in entry.nonces() {
            self.dead_nonces.insert((name.clone(), nonce), dead_until);
        }
        Some(entry)
    }

    /// Whether `(name, nonce)` belongs to a retired record.
    pub fn is_dead_nonce(&self, name: &Name, nonce: u32, now: Timestamp) -> bool {
        self.dead_nonces
            .get(&(name.clone(), nonce))
            .is_some_and(|until| *until > now)
    }

    /// Earliest record expiry.
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.entries.values().map(|entry| entry.expiry).min()
    }

    /// Names of records that expired at or before `now`.
    pub fn expired(&self, now: Timestamp) -> Vec<Name> {
        self.entries
            .values()
            .filter(|entry| entry.expiry <= now)
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Forget retired nonces whose window has passed.
    pub fn purge_dead_nonces(&mut self, now: Timestamp) {
        self.dead_nonces.retain(|_, until| *until > now);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PitEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerQueue;

    fn request(name: &str, nonce: u32) -> Request {
        Request::new(Name::parse(name), nonce)
    }

    #[test]
    fn test_find_or_insert_reuses_record() {
        let mut table = PendingTable::new();
        let now = Timestamp::from_secs(1);
        let id = table.find_or_insert(&request("/a", 1), now).id();
        let again = table.find_or_insert(&request("/a", 2), now).id();
        assert_eq!(id, again);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_in_records_extend_expiry() {
        let mut table = PendingTable::new();
        let lifetime = Duration::from_secs(4);
        let entry = table.find_or_insert(&request("/a", 1), Timestamp::ZERO);
        entry.insert_in_record(LinkId(1), 1, Timestamp::ZERO, lifetime);
        entry.insert_in_record(LinkId(2), 2, Timestamp::from_secs(2), lifetime);

        assert_eq!(entry.expiry(), Timestamp::from_secs(6));
        assert!(entry.has_nonce(1) && entry.has_nonce(2));
        assert_eq!(
            entry.live_downstreams(Timestamp::from_secs(5)),
            alloc::vec![LinkId(2)]
        );
    }

    #[test]
    fn test_recreated_record_has_new_id() {
        let mut table = PendingTable::new();
        let now = Timestamp::ZERO;
        let name = Name::parse("/a");
        let old = table.find_or_insert(&request("/a", 1), now).id();
        table.remove(&name, Timestamp::from_secs(4));
        let new = table.find_or_insert(&request("/a", 2), now).id();

        assert_ne!(old, new);
        assert!(table.get_live_mut(&name, old).is_none());
        assert!(table.get_live_mut(&name, new).is_some());
    }

    #[test]
    fn test_dead_nonces() {
        let mut table = PendingTable::new();
        let name = Name::parse("/a");
        let entry = table.find_or_insert(&request("/a", 7), Timestamp::ZERO);
        entry.insert_in_record(LinkId(1), 7, Timestamp::ZERO, Duration::from_secs(1));
        table.remove(&name, Timestamp::from_secs(4));

        assert!(table.is_dead_nonce(&name, 7, Timestamp::from_secs(3)));
        assert!(!table.is_dead_nonce(&name, 8, Timestamp::from_secs(3)));
        assert!(!table.is_dead_nonce(&name, 7, Timestamp::from_secs(4)));

        table.purge_dead_nonces(Timestamp::from_secs(5));
        assert!(!table.is_dead_nonce(&name, 7, Timestamp::ZERO));
    }

    #[test]
    fn test_finish_scheduled_relay_checks_timer() {
        let mut timers: TimerQueue<()> = TimerQueue::new();
        let stale = timers.schedule(Timestamp::from_millis(10), ());
        let current = timers.schedule(Timestamp::from_millis(20), ());

        let mut table = PendingTable::new();
        let entry = table.find_or_insert(&request("/a", 1), Timestamp::ZERO);
        entry.set_scheduled_relay(
            LinkId(1),
            ScheduledRelay {
                timer: current,
                trigger_sender: None,
            },
        );

        assert!(!entry.finish_scheduled_relay(LinkId(1), stale));
        assert!(entry.scheduled_relay(LinkId(1)).is_some());
        assert!(entry.finish_scheduled_relay(LinkId(1), current));
        assert!(entry.scheduled_relay(LinkId(1)).is_none());
    }

    #[test]
    fn test_expired_and_next_expiry() {
        let mut table = PendingTable::new();
        let lifetime = Duration::from_secs(4);
        table
            .find_or_insert(&request("/a", 1), Timestamp::ZERO)
            .insert_in_record(LinkId(1), 1, Timestamp::ZERO, lifetime);
        table
            .find_or_insert(&request("/b", 2), Timestamp::ZERO)
            .insert_in_record(LinkId(1), 2, Timestamp::from_secs(2), lifetime);

        assert_eq!(table.next_expiry(), Some(Timestamp::from_secs(4)));
        assert_eq!(
            table.expired(Timestamp::from_secs(4)),
            alloc::vec![Name::parse("/a")]
        );
        assert!(table.expired(Timestamp::from_secs(3)).is_empty());
    }

    #[test]
    fn test_finished_record() {
        let mut table = PendingTable::new();
        let entry = table.find_or_insert(&request("/a", 1), Timestamp::ZERO);
        assert!(entry.is_finished());
        entry.insert_in_record(LinkId(3), 1, Timestamp::ZERO, Duration::from_secs(1));
        assert!(!entry.is_finished());
        entry.remove_in_record(LinkId(3));
        assert!(entry.is_finished());
    }
}
