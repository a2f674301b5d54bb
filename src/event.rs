//! Event records for the discrete-event kernel.
//!
//! An event is a timestamp, a tie-breaking sequence number and an opaque
//! action. The record (`Event`) is a cheap copyable description; the
//! action itself is a boxed closure owned by the scheduler until it runs
//! or is cancelled.

use std::cmp::Ordering;
use std::fmt;

use crate::error::SimResult;
use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing event identifier, doubling as the handle
/// returned by `schedule`.
///
/// Two events scheduled for the same `VirtualTime` are ordered by their
/// `EventId`, which corresponds to scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly increasing event-ID generator.
///
/// Each scheduler owns exactly one. The counter is never reset, not even
/// by `destroy`, so handles from an earlier run can never alias events of
/// a later one.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Action ────────────────────────────────────────────────────────────

/// The work carried by an event.
///
/// Receives the owning context mutably so it can inspect and change
/// simulation state and schedule follow-up events. Returning an error
/// aborts the current run.
pub type Action<C> = Box<dyn FnOnce(&mut C) -> SimResult<()>>;

// ── Event ─────────────────────────────────────────────────────────────

/// The scheduling record of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub id: EventId,
    /// The virtual time at which this event fires.
    pub scheduled_at: VirtualTime,
}

impl Event {
    pub fn new(id: EventId, scheduled_at: VirtualTime) -> Self {
        Event { id, scheduled_at }
    }
}

/// Ordering: smallest `(scheduled_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here
/// to turn it into a min-heap.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.scheduled_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_ids_count_up_from_zero() {
        let mut ids = EventIdGen::new();
        assert_eq!(ids.next_id(), EventId::new(0));
        assert_eq!(ids.next_id(), EventId::new(1));
        assert_eq!(ids.peek(), EventId::new(2));
    }

    #[test]
    fn test_heap_pops_earliest_then_lowest_id() {
        let mut heap = BinaryHeap::new();
        heap.push(Event::new(EventId::new(3), VirtualTime::from_nanos(20)));
        heap.push(Event::new(EventId::new(2), VirtualTime::from_nanos(10)));
        heap.push(Event::new(EventId::new(0), VirtualTime::from_nanos(20)));
        heap.push(Event::new(EventId::new(1), VirtualTime::from_nanos(10)));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|e| e.id.raw()).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_event_display() {
        let e = Event::new(EventId::new(42), VirtualTime::from_millis(3));
        assert_eq!(e.to_string(), "E#42@+3ms");
    }
}
