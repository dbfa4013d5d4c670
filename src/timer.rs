//! Timer wheel with deterministic tie-break and O(1) logical cancellation
//! via generation handles (L8, §4.5).
//!
//! Timers live in a flat-slot arena, not a hierarchical wheel: the spec's
//! "flat-slot arena" phrasing describes exactly [`crate::util::Arena`], so
//! [`TimerWheel`] is a thin domain layer over one. Cancellation is O(1)
//! because it only has to bump the slot's generation and flip its
//! alive-flag — no search through a bucket list is needed.

use crate::error::KernelError;
use crate::types::Time;
use crate::util::{Arena, ArenaIndex};

/// A handle to a registered timer: `(slot, generation)`, opaque outside
/// this module.
pub type TimerHandle = ArenaIndex;

struct TimerSlot<W> {
    deadline: Time,
    waker: W,
    insertion_seq: u64,
    alive: bool,
}

/// One expired timer returned by [`TimerWheel::collect_expired`].
pub struct ExpiredTimer<W> {
    /// The handle that had been registered for this timer.
    pub handle: TimerHandle,
    /// The deadline it was registered for.
    pub deadline: Time,
    /// The waker payload supplied at registration.
    pub waker: W,
}

/// Default duration ceiling: 24 hours, expressed in nanoseconds (§4.5).
pub const DEFAULT_MAX_DURATION_NANOS: u64 = 24 * 60 * 60 * 1_000_000_000;

/// The flat-slot timer arena.
pub struct TimerWheel<W> {
    slots: Arena<TimerSlot<W>>,
    now: Time,
    next_insertion_seq: u64,
    max_duration_nanos: u64,
}

impl<W> TimerWheel<W> {
    /// Create a wheel with room for `capacity` live timers, starting at
    /// `Time::ZERO`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arena::with_capacity(capacity),
            now: Time::ZERO,
            next_insertion_seq: 0,
            max_duration_nanos: DEFAULT_MAX_DURATION_NANOS,
        }
    }

    /// The wheel's current logical time.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.now
    }

    /// Configure the duration ceiling (default 24h in ns).
    pub fn set_max_duration(&mut self, nanos: u64) {
        self.max_duration_nanos = nanos;
    }

    /// Register a timer at `deadline`, returning its handle.
    ///
    /// # Errors
    ///
    /// - [`KernelError::TimerDurationExceeded`] if `deadline` is further
    ///   than `max_duration_nanos` past `now`.
    /// - [`KernelError::TimerResourceExhausted`] if the wheel is at
    ///   capacity.
    pub fn register(&mut self, deadline: Time, waker: W) -> Result<TimerHandle, KernelError> {
        if deadline.duration_since(self.now) > self.max_duration_nanos {
            return Err(KernelError::TimerDurationExceeded);
        }
        let insertion_seq = self.next_insertion_seq;
        self.next_insertion_seq += 1;
        self.slots
            .insert(TimerSlot {
                deadline,
                waker,
                insertion_seq,
                alive: true,
            })
            .map_err(|_| KernelError::TimerResourceExhausted)
    }

    /// Cancel a timer in O(1) by flipping its alive-flag.
    ///
    /// Returns `true` if the timer was live and is now cancelled, `false`
    /// if the handle was already stale/consumed/unknown.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.slots.get_mut(handle) {
            Ok(slot) if slot.alive => {
                slot.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Cancel `old_handle` and register a new timer with the same waker
    /// at `deadline` (or a replacement waker if supplied).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn update(
        &mut self,
        old_handle: TimerHandle,
        deadline: Time,
        waker: W,
    ) -> Result<TimerHandle, KernelError> {
        self.cancel(old_handle);
        self.register(deadline, waker)
    }

    /// Advance the wheel's logical time. Monotonic: `now` may only move
    /// forward.
    ///
    /// # Errors
    ///
    /// [`KernelError::TimerNotMonotonic`] if `now` is earlier than the
    /// wheel's current time.
    pub fn advance(&mut self, now: Time) -> Result<(), KernelError> {
        if now < self.now {
            return Err(KernelError::TimerNotMonotonic);
        }
        self.now = now;
        Ok(())
    }

    /// Whether any alive timer remains registered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|(_, slot)| slot.alive)
    }

    /// Number of live timers currently registered.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|(_, slot)| slot.alive).count()
    }
}

impl<W: Clone> TimerWheel<W> {
    /// Collect every alive timer with `deadline <= now`, sorted by
    /// `(deadline ASC, insertion_seq ASC)`, marking each dead and emitting
    /// up to `max` payloads (§4.5, §8 property 8).
    pub fn collect_expired(&mut self, now: Time, max: usize) -> Vec<ExpiredTimer<W>> {
        let mut expired: Vec<(ArenaIndex, Time, u64, W)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.alive && slot.deadline <= now)
            .map(|(idx, slot)| (idx, slot.deadline, slot.insertion_seq, slot.waker.clone()))
            .collect();
        expired.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
        expired.truncate(max);

        let mut out = Vec::with_capacity(expired.len());
        for (idx, deadline, _, waker) in expired {
            if let Ok(slot) = self.slots.get_mut(idx) {
                slot.alive = false;
            }
            out.push(ExpiredTimer {
                handle: idx,
                deadline,
                waker,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s5_timer_ordering() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(8);
        wheel.register(Time::from_nanos(100), 1).unwrap();
        wheel.register(Time::from_nanos(100), 2).unwrap();
        wheel.register(Time::from_nanos(50), 3).unwrap();

        let expired = wheel.collect_expired(Time::from_nanos(200), 3);
        let payloads: Vec<u32> = expired.iter().map(|e| e.waker).collect();
        assert_eq!(payloads, vec![3, 1, 2]);
    }

    #[test]
    fn collect_expired_marks_dead_exactly_once() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(8);
        wheel.register(Time::from_nanos(10), 1).unwrap();
        let first = wheel.collect_expired(Time::from_nanos(20), 10);
        assert_eq!(first.len(), 1);
        let second = wheel.collect_expired(Time::from_nanos(20), 10);
        assert!(second.is_empty());
    }

    #[test]
    fn cancel_is_logical_and_idempotent() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(8);
        let handle = wheel.register(Time::from_nanos(10), 1).unwrap();
        assert!(wheel.cancel(handle));
        assert!(!wheel.cancel(handle));
        let expired = wheel.collect_expired(Time::from_nanos(100), 10);
        assert!(expired.is_empty());
    }

    #[test]
    fn advance_is_monotonic_only() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(4);
        wheel.advance(Time::from_nanos(10)).unwrap();
        assert!(matches!(
            wheel.advance(Time::from_nanos(5)),
            Err(KernelError::TimerNotMonotonic)
        ));
        wheel.advance(Time::from_nanos(10)).unwrap();
    }

    #[test]
    fn duration_ceiling_is_enforced() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(4);
        wheel.set_max_duration(100);
        assert!(wheel.register(Time::from_nanos(101), 1).is_err());
        wheel.register(Time::from_nanos(100), 1).unwrap();
    }

    #[test]
    fn update_cancels_old_and_registers_new() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(4);
        let handle = wheel.register(Time::from_nanos(10), 1).unwrap();
        let updated = wheel.update(handle, Time::from_nanos(50), 2).unwrap();
        let expired = wheel.collect_expired(Time::from_nanos(50), 10);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].handle, updated);
        assert_eq!(expired[0].waker, 2);
    }

    #[test]
    fn pending_count_excludes_cancelled_and_expired() {
        let mut wheel: TimerWheel<u32> = TimerWheel::new(4);
        let a = wheel.register(Time::from_nanos(10), 1).unwrap();
        wheel.register(Time::from_nanos(20), 2).unwrap();
        assert_eq!(wheel.pending_count(), 2);
        wheel.cancel(a);
        assert_eq!(wheel.pending_count(), 1);
        wheel.collect_expired(Time::from_nanos(20), 10);
        assert!(!wheel.has_pending());
    }
}
