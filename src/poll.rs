//! Cooperative single-threaded scheduler.
//!
//! There is no preemption and no blocking: every registered callback must
//! return before [`Poller::service`] moves on to the next one. Three
//! registries exist:
//!
//! - [`Always`](Poller::register_always) — run on every call to
//!   `service()`; used where latency matters (e.g. draining a write port).
//! - [`OnDemand`](Poller::register_on_demand) — run once per `service()`
//!   call, but only after something called [`OnDemandHandle::request`]
//!   since the last run. Used for deferred packet delivery so an ISR can
//!   enqueue without doing the delivery work itself.
//! - [`Timer`](Poller::register_timer) — ordered by absolute deadline; a
//!   [`TimeRef`](crate::time::TimeRef) supplies "now".
//!
//! `AtomicLock` stands in for an interrupt disable/enable pair.
//! There are no real interrupts on a hosted target, so it is a plain
//! `Cell`-guarded reentrancy check rather than a hardware primitive, but
//! it keeps the locking discipline visible at the call sites that need
//! it (the `MultiBuffer` free list and delivery queue).

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::time::TimeRef;

/// A critical-section guard. On a hosted build this only detects
/// reentrancy (which would indicate a logic bug, since the model assumes
/// a single producer/consumer pair); real ISR-driven targets would swap
/// this for a disable/enable-interrupts pair.
#[derive(Default)]
pub struct AtomicLock {
    held: Cell<bool>,
}

impl AtomicLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the lock held. Panics on reentrant acquisition.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        assert!(!self.held.get(), "AtomicLock reentered");
        self.held.set(true);
        let result = f();
        self.held.set(false);
        result
    }
}

type AlwaysCallback = Box<dyn FnMut()>;
type OnDemandCallback = Box<dyn FnMut()>;
type TimerCallback = Box<dyn FnMut()>;

struct OnDemandEntry {
    requested: Rc<Cell<bool>>,
    callback: RefCell<OnDemandCallback>,
}

/// A handle used to request that a registered on-demand callback run on
/// the next `Poller::service()` call.
#[derive(Clone)]
pub struct OnDemandHandle {
    requested: Rc<Cell<bool>>,
}

impl OnDemandHandle {
    pub fn request(&self) {
        self.requested.set(true);
    }
}

struct TimerEntry {
    deadline_millis: u64,
    id: u64,
    callback: RefCell<TimerCallback>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_millis == other.deadline_millis && self.id == other.id
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest deadline first.
        other
            .deadline_millis
            .cmp(&self.deadline_millis)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// The central poller. Global state elsewhere in the process is kept to
/// two singletons (the polling scheduler and the default log sink);
/// callers are free to construct one `Poller` and hand `&Poller`/handles
/// around rather than using a true singleton, which is the more
/// idiomatic Rust shape and is what this crate does.
pub struct Poller {
    always: RefCell<Vec<AlwaysCallback>>,
    on_demand: RefCell<Vec<OnDemandEntry>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    next_timer_id: Cell<u64>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            always: RefCell::new(Vec::new()),
            on_demand: RefCell::new(Vec::new()),
            timers: RefCell::new(BinaryHeap::new()),
            next_timer_id: Cell::new(0),
        }
    }

    pub fn register_always(&self, callback: impl FnMut() + 'static) {
        self.always.borrow_mut().push(Box::new(callback));
    }

    pub fn register_on_demand(&self, callback: impl FnMut() + 'static) -> OnDemandHandle {
        let requested = Rc::new(Cell::new(false));
        self.on_demand.borrow_mut().push(OnDemandEntry {
            requested: requested.clone(),
            callback: RefCell::new(Box::new(callback)),
        });
        OnDemandHandle { requested }
    }

    /// Schedule a one-shot callback at `deadline_millis` (absolute, per
    /// the `TimeRef` passed to `service`).
    pub fn register_timer(&self, deadline_millis: u64, callback: impl FnMut() + 'static) {
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id + 1);
        self.timers.borrow_mut().push(TimerEntry {
            deadline_millis,
            id,
            callback: RefCell::new(Box::new(callback)),
        });
    }

    /// Run one iteration: all `Always` callbacks, any `OnDemand`
    /// callbacks that were requested since the last call, and any timers
    /// whose deadline has passed according to `clock`.
    pub fn service(&self, clock: &dyn TimeRef) {
        for cb in self.always.borrow_mut().iter_mut() {
            cb();
        }
        for entry in self.on_demand.borrow_mut().iter_mut() {
            if entry.requested.replace(false) {
                (entry.callback.borrow_mut())();
            }
        }
        let now = clock.now_millis();
        loop {
            let due = matches!(self.timers.borrow().peek(), Some(t) if t.deadline_millis <= now);
            if !due {
                break;
            }
            let entry = self.timers.borrow_mut().pop().unwrap();
            (entry.callback.borrow_mut())();
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FakeClock;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn always_runs_every_service_call() {
        let poller = Poller::new();
        let clock = FakeClock::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        poller.register_always(move || c.set(c.get() + 1));
        poller.service(&clock);
        poller.service(&clock);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn on_demand_runs_only_when_requested() {
        let poller = Poller::new();
        let clock = FakeClock::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let handle = poller.register_on_demand(move || c.set(c.get() + 1));
        poller.service(&clock);
        assert_eq!(count.get(), 0);
        handle.request();
        poller.service(&clock);
        assert_eq!(count.get(), 1);
        poller.service(&clock);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let poller = Poller::new();
        let clock = FakeClock::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let l1 = log.clone();
        poller.register_timer(100, move || l1.borrow_mut().push(100));
        let l2 = log.clone();
        poller.register_timer(50, move || l2.borrow_mut().push(50));
        clock.advance_millis(40);
        poller.service(&clock);
        assert!(log.borrow().is_empty());
        clock.advance_millis(20); // now 60
        poller.service(&clock);
        assert_eq!(*log.borrow(), vec![50]);
        clock.advance_millis(100); // now 160
        poller.service(&clock);
        assert_eq!(*log.borrow(), vec![50, 100]);
        assert_eq!(poller.pending_timers(), 0);
    }

    #[test]
    #[should_panic(expected = "reentered")]
    fn atomic_lock_detects_reentrancy() {
        let lock = AtomicLock::new();
        lock.with_lock(|| {
            lock.with_lock(|| {});
        });
    }
}
