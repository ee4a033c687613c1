//! Collaborator seams for transport, routing, positioning, time, and randomness.
//!
//! The forwarding engine makes decisions only. Everything it consumes comes
//! through these traits so that the same engine runs over a radio driver, a
//! simulator, or the mocks in [`test_impls`]:
//! - [`Transport`] delivers received packets and transmits on a link
//! - [`Fib`] enumerates next hops for a request name
//! - [`PositionSource`] reports where this node is right now
//! - [`Clock`] supplies time and wakes the async driver
//! - [`Random`] draws contention jitter

use alloc::vec::Vec;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geometry::Position;
use crate::time::Timestamp;
use crate::types::{Event, Incoming, LinkId, LinkKind, Name, NextHop, Packet};

/// Queue size for the inbound transport channel.
pub(crate) const TRANSPORT_QUEUE_SIZE: usize = 16;

/// Queue size for the event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 32;

/// Mutex type used for channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// Inbound packet channel type.
pub type TransportInChannel = Channel<ChannelMutex, Incoming, TRANSPORT_QUEUE_SIZE>;

/// Protocol event channel. Events are dropped when it is full.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Link layer backend.
///
/// - Radio ISR or simulator calls `incoming().try_send(pkt)` on reception
/// - The forwarder awaits `incoming().receive()` in its run loop
/// - The forwarder calls `send()` to transmit, immediately or from a timer
pub trait Transport {
    /// Channel for received packets.
    fn incoming(&self) -> &TransportInChannel;

    /// Transmit a packet on a link. Delivery is best effort.
    fn send(&mut self, link: LinkId, packet: Packet);

    /// Capability of a link, or `None` if the link no longer exists.
    fn link_kind(&self, link: LinkId) -> Option<LinkKind>;
}

/// Next-hop enumeration for request names.
pub trait Fib {
    /// Candidate egress links for `name`, in preference order.
    fn next_hops(&self, name: &Name) -> Vec<NextHop>;
}

/// Current position of this node.
pub trait PositionSource {
    /// `None` when the node has no fix.
    fn position(&self) -> Option<Position>;
}

/// Time source trait for real or simulated time.
///
/// # Example (embedded with embassy)
///
/// ```text
/// struct EmbassyClock;
///
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = impl Future<Output = ()>;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_micros(embassy_time::Instant::now().as_micros())
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         embassy_time::Timer::at(embassy_time::Instant::from_micros(time.as_micros()))
///     }
/// }
/// ```
pub trait Clock {
    /// Future type returned by sleep_until.
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    /// Get the current timestamp.
    fn now(&self) -> Timestamp;

    /// Sleep until the given timestamp.
    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Random number generator trait.
///
/// Used for contention jitter on request and response relays. One instance
/// lives for the whole forwarder so successive draws are independent.
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

/// Seedable jitter source backed by ChaCha8.
///
/// ```
/// use geocast::traits::{Random, SeededRandom};
///
/// let mut a = SeededRandom::new(7);
/// let mut b = SeededRandom::new(7);
/// assert_eq!(a.gen_range(0, 1000), b.gen_range(0, 1000));
/// ```
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }
}

impl Random for SeededRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::collections::BTreeMap;
    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;

    /// Transport that records every transmission.
    pub struct MockTransport {
        incoming: TransportInChannel,
        links: BTreeMap<LinkId, LinkKind>,
        sent: Vec<(LinkId, Packet)>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                incoming: Channel::new(),
                links: BTreeMap::new(),
                sent: Vec::new(),
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a link and its capability.
        pub fn with_link(mut self, link: LinkId, kind: LinkKind) -> Self {
            self.links.insert(link, kind);
            self
        }

        /// Remove a link, as if its face went down.
        pub fn remove_link(&mut self, link: LinkId) {
            self.links.remove(&link);
        }

        /// Take all sent packets in transmission order.
        pub fn take_sent(&mut self) -> Vec<(LinkId, Packet)> {
            core::mem::take(&mut self.sent)
        }

        pub fn sent(&self) -> &[(LinkId, Packet)] {
            &self.sent
        }
    }

    impl Transport for MockTransport {
        fn incoming(&self) -> &TransportInChannel {
            &self.incoming
        }

        fn send(&mut self, link: LinkId, packet: Packet) {
            self.sent.push((link, packet));
        }

        fn link_kind(&self, link: LinkId) -> Option<LinkKind> {
            self.links.get(&link).copied()
        }
    }

    /// Static prefix routes with longest-prefix match.
    #[derive(Default)]
    pub struct MockFib {
        routes: Vec<(Name, Vec<NextHop>)>,
    }

    impl MockFib {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_route(mut self, prefix: Name, hops: Vec<NextHop>) -> Self {
            self.routes.push((prefix, hops));
            self
        }
    }

    impl Fib for MockFib {
        fn next_hops(&self, name: &Name) -> Vec<NextHop> {
            self.routes
                .iter()
                .filter(|(prefix, _)| prefix.is_prefix_of(name))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, hops)| hops.clone())
                .unwrap_or_default()
        }
    }

    /// Position that tests can move.
    #[derive(Default)]
    pub struct MockPosition {
        current: Cell<Option<Position>>,
    }

    impl MockPosition {
        pub fn at(position: Position) -> Self {
            Self {
                current: Cell::new(Some(position)),
            }
        }

        pub fn unknown() -> Self {
            Self::default()
        }

        pub fn set(&self, position: Option<Position>) {
            self.current.set(position);
        }
    }

    impl PositionSource for MockPosition {
        fn position(&self) -> Option<Position> {
            self.current.get()
        }
    }

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            // Tests advance time manually.
            ready(())
        }
    }

    /// Mock random for testing (deterministic LCG).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            if max <= min {
                return min;
            }
            min + (self.state % (max - min))
        }
    }

    /// Random source that always returns the lower bound.
    #[derive(Default)]
    pub struct MinRandom;

    impl Random for MinRandom {
        fn gen_range(&mut self, min: u64, _max: u64) -> u64 {
            min
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::test_impls::*;
    use super::*;

    #[test]
    fn test_seeded_random_reproducible() {
        let mut a = SeededRandom::new(42);
        let mut b = SeededRandom::new(42);
        let xs: Vec<u64> = (0..16).map(|_| a.gen_range(20_000, 100_001)).collect();
        let ys: Vec<u64> = (0..16).map(|_| b.gen_range(20_000, 100_001)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| (20_000..=100_000).contains(x)));

        a.reseed(42);
        assert_eq!(a.gen_range(20_000, 100_001), xs[0]);
    }

    #[test]
    fn test_seeded_random_empty_range() {
        let mut rng = SeededRandom::new(1);
        assert_eq!(rng.gen_range(5, 5), 5);
        assert_eq!(rng.gen_range(9, 3), 9);
    }

    #[test]
    fn test_mock_fib_longest_prefix() {
        let fib = MockFib::new()
            .with_route(Name::parse("/a"), vec![NextHop::broadcast(LinkId(1))])
            .with_route(Name::parse("/a/b"), vec![NextHop::point_to_point(LinkId(2))]);
        assert_eq!(
            fib.next_hops(&Name::parse("/a/b/c")),
            vec![NextHop::point_to_point(LinkId(2))]
        );
        assert_eq!(
            fib.next_hops(&Name::parse("/a/x")),
            vec![NextHop::broadcast(LinkId(1))]
        );
        assert!(fib.next_hops(&Name::parse("/z")).is_empty());
    }

    #[test]
    fn test_mock_transport_records_sends() {
        let mut transport = MockTransport::new().with_link(LinkId(1), LinkKind::Broadcast);
        assert_eq!(transport.link_kind(LinkId(1)), Some(LinkKind::Broadcast));
        assert_eq!(transport.link_kind(LinkId(2)), None);

        let req = crate::types::Request::new(Name::parse("/x"), 1);
        transport.send(LinkId(1), Packet::Request(req));
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());
    }
}
