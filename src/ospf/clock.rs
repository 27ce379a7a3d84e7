//! Time sources and the scheduled-work queue behind every protocol timer
//! (hello, dead, wait, SPF coalescing).
//!
//! The engine never sleeps on its own: timers are entries in a priority
//! queue of `(fire_at, kind)` that [`super::OspfEngine::tick`] drains
//! against whatever [`Clock`] the engine was built with. In async mode a
//! tokio task calls `tick` periodically against a [`RealClock`]; tests
//! drive a [`VirtualClock`] by hand and get fully deterministic runs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use super::RouterId;

/// Monotonic millisecond time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time, anchored at construction.
pub struct RealClock {
    start: std::time::Instant,
}

impl RealClock {
    pub fn new() -> Self {
        RealClock { start: std::time::Instant::now() }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Manually advanced time source for deterministic tests.
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock { now: AtomicU64::new(0) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What a timer does when it fires. Doubles as the timer's identity for
/// rescheduling and cancellation: scheduling the same kind again replaces
/// the earlier entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum TimerKind {
    /// Periodic hello transmission on an interface.
    Hello(String),
    /// End of the Waiting period on an interface; runs DR election.
    Wait(String),
    /// A neighbor's inactivity timer on an interface.
    Dead(String, RouterId),
    /// The SPF coalescing delay.
    SpfDelay,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    fire_at: u64,
    generation: u64,
    kind: TimerKind,
}

/// Priority queue of pending timers with lazy cancellation: each schedule
/// bumps the generation for its kind, and stale heap entries are dropped
/// when popped.
pub(crate) struct TimerQueue {
    heap: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    generations: DashMap<TimerKind, u64>,
    counter: AtomicU64,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            heap: Mutex::new(BinaryHeap::new()),
            generations: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Schedules `kind` to fire at `fire_at`, replacing any pending entry
    /// of the same kind.
    pub fn schedule(&self, fire_at: u64, kind: TimerKind) {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst);
        self.generations.insert(kind.clone(), generation);
        self.heap.lock().unwrap().push(Reverse(TimerEntry { fire_at, generation, kind }));
    }

    /// Cancels any pending entry of `kind`.
    pub fn cancel(&self, kind: &TimerKind) {
        self.generations.remove(kind);
    }

    /// Cancels every pending timer.
    pub fn clear(&self) {
        self.heap.lock().unwrap().clear();
        self.generations.clear();
    }

    /// Pops every entry due at `now`, most overdue first. A popped entry is
    /// consumed; periodic timers are rescheduled by the caller.
    pub fn due(&self, now: u64) -> Vec<TimerKind> {
        let mut heap = self.heap.lock().unwrap();
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let Reverse(entry) = heap.pop().unwrap();
            let live = self.generations.get(&entry.kind).map(|g| *g) == Some(entry.generation);
            if live {
                self.generations.remove(&entry.kind);
                fired.push(entry.kind);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_advances_monotonically() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(250);
        clock.advance(750);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn due_returns_only_expired_entries() {
        let q = TimerQueue::new();
        q.schedule(100, TimerKind::SpfDelay);
        q.schedule(500, TimerKind::Hello("eth0".to_string()));
        assert_eq!(q.due(100), vec![TimerKind::SpfDelay]);
        assert!(q.due(400).is_empty());
        assert_eq!(q.due(500), vec![TimerKind::Hello("eth0".to_string())]);
    }

    #[test]
    fn reschedule_supersedes_earlier_entry() {
        let q = TimerQueue::new();
        let kind = TimerKind::Hello("eth0".to_string());
        q.schedule(100, kind.clone());
        q.schedule(300, kind.clone());
        assert!(q.due(200).is_empty());
        assert_eq!(q.due(300), vec![kind]);
    }

    #[test]
    fn cancel_discards_pending_entry() {
        let q = TimerQueue::new();
        let kind = TimerKind::Wait("eth1".to_string());
        q.schedule(100, kind.clone());
        q.cancel(&kind);
        assert!(q.due(1000).is_empty());
    }
}
