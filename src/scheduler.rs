//! Deterministic event scheduler and the cooperative run loop.
//!
//! Uses a `BinaryHeap` with reversed `Ord` on `Event` as a min-heap keyed
//! by `(scheduled_at, id)`. Because event IDs are strictly increasing,
//! events at equal times dispatch in the order they were scheduled.
//!
//! Actions live in a side table keyed by `EventId`; cancelling removes the
//! action and leaves the heap entry behind, which is skipped when popped.

use std::collections::{BTreeMap, BinaryHeap};

use tracing::{debug, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::{Action, Event, EventId, EventIdGen};
use crate::time::{TimeDelta, VirtualTime};

struct Pending<C> {
    at: VirtualTime,
    action: Action<C>,
}

/// The core deterministic scheduler.
///
/// Generic over the context `C` its actions operate on. It owns the clock,
/// the event queue and the ID generator; all scheduling goes through it.
pub struct Scheduler<C> {
    /// Min-heap (via reversed Ord on Event).
    queue: BinaryHeap<Event>,
    pending: BTreeMap<EventId, Pending<C>>,
    destroy: Vec<(EventId, Action<C>)>,
    id_gen: EventIdGen,
    now: VirtualTime,
    stopped: bool,
    events_processed: u64,
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            pending: BTreeMap::new(),
            destroy: Vec::new(),
            id_gen: EventIdGen::new(),
            now: VirtualTime::ZERO,
            stopped: false,
            events_processed: 0,
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule `action` to run `delay` after now.
    ///
    /// Fails with `InvalidDelay` if `delay` is negative.
    pub fn schedule<F>(&mut self, delay: TimeDelta, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut C) -> SimResult<()> + 'static,
    {
        let at = self.now.checked_add(delay)?;
        Ok(self.insert(at, Box::new(action)))
    }

    /// Schedule `action` at the current time, after everything already
    /// scheduled for now.
    pub fn schedule_now<F>(&mut self, action: F) -> EventId
    where
        F: FnOnce(&mut C) -> SimResult<()> + 'static,
    {
        self.insert(self.now, Box::new(action))
    }

    /// Schedule `action` at an absolute time, which must not be in the past.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut C) -> SimResult<()> + 'static,
    {
        if at < self.now {
            let behind = self.now.since(at).ok_or(SimError::TimeOverflow)?;
            return Err(SimError::InvalidDelay {
                delay: TimeDelta::from_nanos(-behind.nanos()),
            });
        }
        Ok(self.insert(at, Box::new(action)))
    }

    /// Register an action to run once when the simulation is destroyed.
    pub fn schedule_destroy<F>(&mut self, action: F) -> EventId
    where
        F: FnOnce(&mut C) -> SimResult<()> + 'static,
    {
        let id = self.id_gen.next_id();
        self.destroy.push((id, Box::new(action)));
        id
    }

    fn insert(&mut self, at: VirtualTime, action: Action<C>) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at));
        self.pending.insert(id, Pending { at, action });
        trace!(event = %id, at = %at, "scheduled");
        id
    }

    /// Make a pending event inert.
    ///
    /// Returns `false` if the event already ran or was already cancelled;
    /// that is not an error.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.pending.remove(&id).is_some() {
            debug!(event = %id, "cancelled");
            return true;
        }
        let before = self.destroy.len();
        self.destroy.retain(|(pending, _)| *pending != id);
        before != self.destroy.len()
    }

    /// Whether `id` is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Time remaining until `id` fires, or `None` if it is not pending.
    pub fn delay_left(&self, id: EventId) -> Option<TimeDelta> {
        self.pending.get(&id).and_then(|p| p.at.since(self.now))
    }

    /// Number of pending (not cancelled) events.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time of the earliest pending event.
    pub fn next_time(&mut self) -> Option<VirtualTime> {
        self.discard_cancelled();
        self.queue.peek().map(|e| e.scheduled_at)
    }

    /// Request that the run loop return before dispatching another event.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Total events dispatched since creation or the last `reset`.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Returns the next event ID that will be assigned.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.queue.peek() {
            if self.pending.contains_key(&top.id) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Pop the next live event, advancing the clock to its time.
    pub fn pop_next(&mut self) -> Option<(Event, Action<C>)> {
        while let Some(event) = self.queue.pop() {
            let Some(pending) = self.pending.remove(&event.id) else {
                continue;
            };
            debug_assert!(event.scheduled_at >= self.now, "time went backward");
            self.now = event.scheduled_at;
            self.events_processed += 1;
            return Some((event, pending.action));
        }
        None
    }

    /// Take the destroy actions in registration order.
    pub fn take_destroy_actions(&mut self) -> Vec<(EventId, Action<C>)> {
        std::mem::take(&mut self.destroy)
    }

    /// Drop every pending event and rewind the clock to zero.
    ///
    /// The ID generator keeps counting.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.destroy.clear();
        self.now = VirtualTime::ZERO;
        self.stopped = false;
        self.events_processed = 0;
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .field("stopped", &self.stopped)
            .field("events_processed", &self.events_processed)
            .finish()
    }
}

// ── Run loop ──────────────────────────────────────────────────────────

/// A context that owns the scheduler driving it.
///
/// The run loop pops an event from the context's own scheduler and hands
/// the action the whole context, so actions can reach every piece of
/// simulation state through one `&mut` borrow.
pub trait EventContext: Sized {
    fn scheduler(&self) -> &Scheduler<Self>;
    fn scheduler_mut(&mut self) -> &mut Scheduler<Self>;
}

/// Execute exactly one event.
///
/// Returns `Ok(None)` when the queue is empty.
pub fn step<C: EventContext>(ctx: &mut C) -> SimResult<Option<Event>> {
    let Some((event, action)) = ctx.scheduler_mut().pop_next() else {
        return Ok(None);
    };
    trace!(event = %event.id, now = %event.scheduled_at, "dispatch");
    if let Err(err) = action(ctx) {
        warn!(event = %event.id, now = %event.scheduled_at, error = %err, "event action failed, aborting run");
        return Err(err);
    }
    Ok(Some(event))
}

/// Run until the queue is empty or `stop` is called.
///
/// Returns the number of events dispatched by this call. An action error
/// aborts the run and is returned; unexecuted events stay queued.
pub fn run<C: EventContext>(ctx: &mut C) -> SimResult<u64> {
    run_while(ctx, |_| true)
}

/// Run every event scheduled at or before `limit`, then advance the clock
/// to `limit` unless the run was stopped.
pub fn run_until<C: EventContext>(ctx: &mut C, limit: VirtualTime) -> SimResult<u64> {
    let processed = run_while(ctx, |next| next <= limit)?;
    let sched = ctx.scheduler_mut();
    if !sched.is_stopped() && sched.now < limit {
        sched.now = limit;
    }
    Ok(processed)
}

fn run_while<C, P>(ctx: &mut C, mut admit: P) -> SimResult<u64>
where
    C: EventContext,
    P: FnMut(VirtualTime) -> bool,
{
    ctx.scheduler_mut().stopped = false;
    let mut processed = 0u64;
    loop {
        let sched = ctx.scheduler_mut();
        if sched.stopped {
            debug!(now = %sched.now, "run stopped");
            break;
        }
        match sched.next_time() {
            Some(next) if admit(next) => {}
            _ => break,
        }
        if step(ctx)?.is_some() {
            processed += 1;
        }
    }
    Ok(processed)
}

/// Run the destroy actions, then release every pending event and rewind
/// the clock.
pub fn destroy<C: EventContext>(ctx: &mut C) -> SimResult<()> {
    let actions = ctx.scheduler_mut().take_destroy_actions();
    let released = ctx.scheduler().pending_count();
    for (id, action) in actions {
        trace!(event = %id, "destroy action");
        action(ctx)?;
    }
    ctx.scheduler_mut().reset();
    debug!(released, "scheduler destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Minimal context: a scheduler plus a log of what ran and when.
    #[derive(Default)]
    struct Ctx {
        sched: Scheduler<Ctx>,
        log: Vec<(u64, &'static str)>,
    }

    impl EventContext for Ctx {
        fn scheduler(&self) -> &Scheduler<Self> {
            &self.sched
        }
        fn scheduler_mut(&mut self) -> &mut Scheduler<Self> {
            &mut self.sched
        }
    }

    fn record(tag: &'static str) -> impl FnOnce(&mut Ctx) -> SimResult<()> {
        move |ctx: &mut Ctx| {
            let now = ctx.sched.now().nanos();
            ctx.log.push((now, tag));
            Ok(())
        }
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut ctx = Ctx::default();
        let d = TimeDelta::from_nanos(10);
        ctx.sched.schedule(d, record("first")).unwrap();
        ctx.sched.schedule(d, record("second")).unwrap();
        ctx.sched.schedule(d, record("third")).unwrap();

        run(&mut ctx).unwrap();
        assert_eq!(ctx.log, vec![(10, "first"), (10, "second"), (10, "third")]);
    }

    #[test]
    fn test_time_ordering() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(30), record("late")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(10), record("early")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(20), record("mid")).unwrap();

        let processed = run(&mut ctx).unwrap();
        assert_eq!(processed, 3);
        assert_eq!(ctx.log, vec![(10, "early"), (20, "mid"), (30, "late")]);
        assert_eq!(ctx.sched.now(), VirtualTime::from_nanos(30));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut ctx = Ctx::default();
        let err = ctx
            .sched
            .schedule(TimeDelta::from_nanos(-1), record("never"))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidDelay { .. }));
        assert!(ctx.sched.is_empty());
    }

    #[test]
    fn test_schedule_at_in_past_rejected() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(50), record("a")).unwrap();
        run(&mut ctx).unwrap();
        let err = ctx
            .sched
            .schedule_at(VirtualTime::from_nanos(20), record("b"))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::InvalidDelay {
                delay: TimeDelta::from_nanos(-30)
            }
        );
    }

    #[test]
    fn test_action_schedules_followup() {
        let mut ctx = Ctx::default();

        fn tick(ctx: &mut Ctx) -> SimResult<()> {
            let now = ctx.sched.now().nanos();
            ctx.log.push((now, "tick"));
            if now < 30 {
                ctx.sched.schedule(TimeDelta::from_nanos(10), tick)?;
            }
            Ok(())
        }

        ctx.sched.schedule_now(tick);
        run(&mut ctx).unwrap();
        assert_eq!(
            ctx.log,
            vec![(0, "tick"), (10, "tick"), (20, "tick"), (30, "tick")]
        );
    }

    #[test]
    fn test_schedule_now_runs_after_existing_same_time_events() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(5), |ctx: &mut Ctx| {
            ctx.log.push((5, "outer"));
            ctx.sched.schedule_now(record("nested"));
            Ok(())
        })
        .unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(5), record("sibling")).unwrap();

        run(&mut ctx).unwrap();
        assert_eq!(ctx.log, vec![(5, "outer"), (5, "sibling"), (5, "nested")]);
    }

    #[test]
    fn test_cancel_pending_event() {
        let mut ctx = Ctx::default();
        let keep = ctx.sched.schedule(TimeDelta::from_nanos(1), record("keep")).unwrap();
        let drop = ctx.sched.schedule(TimeDelta::from_nanos(2), record("drop")).unwrap();

        assert!(ctx.sched.cancel(drop));
        assert!(!ctx.sched.is_pending(drop));
        assert!(ctx.sched.is_pending(keep));
        assert_eq!(ctx.sched.pending_count(), 1);

        run(&mut ctx).unwrap();
        assert_eq!(ctx.log, vec![(1, "keep")]);
        assert_eq!(ctx.sched.events_processed(), 1);
    }

    #[test]
    fn test_cancel_after_execution_is_noop() {
        let mut ctx = Ctx::default();
        let id = ctx.sched.schedule(TimeDelta::from_nanos(1), record("ran")).unwrap();
        run(&mut ctx).unwrap();
        assert!(!ctx.sched.cancel(id));
        assert!(!ctx.sched.cancel(id));
    }

    #[test]
    fn test_delay_left() {
        let mut ctx = Ctx::default();
        let id = ctx.sched.schedule(TimeDelta::from_nanos(100), record("x")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(40), record("y")).unwrap();
        step(&mut ctx).unwrap();
        assert_eq!(ctx.sched.delay_left(id), Some(TimeDelta::from_nanos(60)));
    }

    #[test]
    fn test_stop_from_action() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(1), record("a")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(2), |ctx: &mut Ctx| {
            ctx.log.push((2, "stop"));
            ctx.sched.stop();
            Ok(())
        })
        .unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(3), record("c")).unwrap();

        let processed = run(&mut ctx).unwrap();
        assert_eq!(processed, 2);
        assert_eq!(ctx.log, vec![(1, "a"), (2, "stop")]);
        assert_eq!(ctx.sched.pending_count(), 1);

        // A second run resumes with what is left.
        run(&mut ctx).unwrap();
        assert_eq!(ctx.log.last(), Some(&(3, "c")));
    }

    #[test]
    fn test_run_until_advances_clock() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(10), record("in")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(100), record("out")).unwrap();

        let processed = run_until(&mut ctx, VirtualTime::from_nanos(50)).unwrap();
        assert_eq!(processed, 1);
        assert_eq!(ctx.sched.now(), VirtualTime::from_nanos(50));
        assert_eq!(ctx.sched.pending_count(), 1);
    }

    #[test]
    fn test_action_error_aborts_run() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(1), |_: &mut Ctx| {
            Err(SimError::TimeOverflow)
        })
        .unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(2), record("after")).unwrap();

        assert_eq!(run(&mut ctx).unwrap_err(), SimError::TimeOverflow);
        assert!(ctx.log.is_empty());
        assert_eq!(ctx.sched.pending_count(), 1);
    }

    #[test]
    fn test_destroy_runs_hooks_and_releases_events() {
        let mut ctx = Ctx::default();
        ctx.sched.schedule(TimeDelta::from_nanos(7), record("a")).unwrap();
        ctx.sched.schedule(TimeDelta::from_nanos(99), record("never")).unwrap();
        ctx.sched.schedule_destroy(record("destroy"));
        run_until(&mut ctx, VirtualTime::from_nanos(10)).unwrap();

        destroy(&mut ctx).unwrap();
        assert_eq!(ctx.log, vec![(7, "a"), (10, "destroy")]);
        assert!(ctx.sched.is_empty());
        assert_eq!(ctx.sched.now(), VirtualTime::ZERO);
        assert_eq!(ctx.sched.next_time(), None);
    }

    #[test]
    fn test_cancel_destroy_action() {
        let mut ctx = Ctx::default();
        let id = ctx.sched.schedule_destroy(record("destroy"));
        assert!(ctx.sched.cancel(id));
        destroy(&mut ctx).unwrap();
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn test_empty_run() {
        let mut ctx = Ctx::default();
        assert_eq!(run(&mut ctx).unwrap(), 0);
        assert!(step(&mut ctx).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_fires_at_exactly_now_plus_delay(
            start in 0u64..1_000_000,
            delays in proptest::collection::vec(0i64..1_000_000, 1..50),
        ) {
            let mut ctx = Ctx::default();
            run_until(&mut ctx, VirtualTime::from_nanos(start)).unwrap();
            for d in &delays {
                ctx.sched.schedule(TimeDelta::from_nanos(*d), record("x")).unwrap();
            }
            run(&mut ctx).unwrap();
            let mut fired: Vec<u64> = ctx.log.iter().map(|(t, _)| *t).collect();
            let mut expected: Vec<u64> = delays.iter().map(|d| start + *d as u64).collect();
            expected.sort_unstable();
            prop_assert!(fired.windows(2).all(|w| w[0] <= w[1]));
            fired.sort_unstable();
            prop_assert_eq!(fired, expected);
        }

        #[test]
        fn prop_fifo_among_equal_times(times in proptest::collection::vec(0u64..5, 1..60)) {
            #[derive(Default)]
            struct Seq {
                sched: Scheduler<Seq>,
                order: Vec<(u64, usize)>,
            }
            impl EventContext for Seq {
                fn scheduler(&self) -> &Scheduler<Self> { &self.sched }
                fn scheduler_mut(&mut self) -> &mut Scheduler<Self> { &mut self.sched }
            }

            let mut ctx = Seq::default();
            for (i, t) in times.iter().enumerate() {
                ctx.sched.schedule(TimeDelta::from_nanos(*t as i64), move |c: &mut Seq| {
                    let now = c.sched.now().nanos();
                    c.order.push((now, i));
                    Ok(())
                }).unwrap();
            }
            run(&mut ctx).unwrap();

            let mut expected: Vec<(u64, usize)> =
                times.iter().enumerate().map(|(i, t)| (*t, i)).collect();
            // Stable sort by time keeps insertion order among equals.
            expected.sort_by_key(|(t, _)| *t);
            prop_assert_eq!(ctx.order, expected);
        }
    }
}
