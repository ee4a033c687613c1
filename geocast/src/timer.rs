//! Cancellable one-shot timers.
//!
//! Timers fire in non-decreasing deadline order, ties in scheduling order.
//! Identifiers are never reused, so cancelling a handle that already fired
//! or was already cancelled is a no-op and can never hit a newer timer.

use alloc::collections::{BTreeMap, BinaryHeap};
use core::cmp::Reverse;
use core::fmt;

use crate::time::Timestamp;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Min-heap of deadlines with lazy removal of cancelled entries.
pub struct TimerQueue<A> {
    heap: BinaryHeap<Reverse<(Timestamp, u64)>>,
    live: BTreeMap<u64, (Timestamp, A)>,
    next_id: u64,
}

impl<A> Default for TimerQueue<A> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<A> TimerQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire at `deadline`.
    pub fn schedule(&mut self, deadline: Timestamp, action: A) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((deadline, id)));
        self.live.insert(id, (deadline, action));
        TimerId(id)
    }

    /// Cancel a timer. Returns whether it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id.0).is_some()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.live.contains_key(&id.0)
    }

    pub fn deadline(&self, id: TimerId) -> Option<Timestamp> {
        self.live.get(&id.0).map(|(deadline, _)| *deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(TimerId, A)> {
        self.discard_cancelled();
        let Reverse((deadline, id)) = *self.heap.peek()?;
        if deadline > now {
            return None;
        }
        self.heap.pop();
        self.live.remove(&id).map(|(_, action)| (TimerId(id), action))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn drain(queue: &mut TimerQueue<&'static str>, now: Timestamp) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, action)) = queue.pop_due(now) {
            fired.push(action);
        }
        fired
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(Timestamp::from_millis(30), "c");
        queue.schedule(Timestamp::from_millis(10), "a");
        queue.schedule(Timestamp::from_millis(20), "b");

        assert_eq!(queue.next_deadline(), Some(Timestamp::from_millis(10)));
        assert!(drain(&mut queue, Timestamp::from_millis(5)).is_empty());
        assert_eq!(drain(&mut queue, Timestamp::from_millis(25)), ["a", "b"]);
        assert_eq!(drain(&mut queue, Timestamp::from_millis(30)), ["c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ties_are_fifo() {
        let mut queue = TimerQueue::new();
        let t = Timestamp::from_millis(50);
        queue.schedule(t, "first");
        queue.schedule(t, "second");
        queue.schedule(t, "third");
        assert_eq!(drain(&mut queue, t), ["first", "second", "third"]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut queue = TimerQueue::new();
        let a = queue.schedule(Timestamp::from_millis(10), "a");
        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));

        // A newer timer never shares the cancelled id.
        let b = queue.schedule(Timestamp::from_millis(10), "b");
        assert_ne!(a, b);
        assert!(!queue.cancel(a));
        assert!(queue.is_pending(b));
        assert_eq!(drain(&mut queue, Timestamp::from_millis(10)), ["b"]);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut queue = TimerQueue::new();
        let a = queue.schedule(Timestamp::from_millis(1), "a");
        assert_eq!(drain(&mut queue, Timestamp::from_millis(1)), ["a"]);
        assert!(!queue.cancel(a));
        assert_eq!(queue.deadline(a), None);
    }

    #[test]
    fn test_next_deadline_skips_cancelled() {
        let mut queue = TimerQueue::new();
        let early = queue.schedule(Timestamp::from_millis(5), "early");
        queue.schedule(Timestamp::from_millis(15), "late");
        queue.cancel(early);
        assert_eq!(queue.next_deadline(), Some(Timestamp::from_millis(15)));
        assert_eq!(queue.len(), 1);
    }
}
