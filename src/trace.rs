//! Deterministic event trace and reference-replay divergence detection
//! (L9, §4.6).
//!
//! Every lifecycle event in the kernel calls [`Trace::emit`]. Storage is a
//! fixed-capacity ring (1024 slots per §4.6): once full, the oldest event
//! is overwritten and [`Trace::overflowed`] is set, but the FNV-1a hash
//! chain accumulator is independent running state and is **not** reset by
//! storage wraparound (see `DESIGN.md` Open Question 1) — only an explicit
//! [`Trace::reset`] resets both the ring and the digest.

use crate::types::Time;
use crate::util::Fnv1a;

/// Default trace-ring capacity (§4.6).
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// The kind of lifecycle event a [`TraceEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    /// A region opened.
    RegionOpen,
    /// A region requested close.
    RegionClose,
    /// A region reached `Closed`.
    RegionClosed,
    /// A task was spawned.
    TaskSpawn,
    /// The scheduler is about to poll a task.
    SchedPoll,
    /// A task reached `Completed`.
    SchedComplete,
    /// A cancel witness was installed or strengthened.
    CancelRequested,
    /// An obligation was reserved.
    ObligationReserve,
    /// An obligation was committed.
    ObligationCommit,
    /// An obligation was aborted.
    ObligationAbort,
    /// An obligation was discovered leaked at finalize.
    ObligationLeak,
    /// A timer fired (was returned by `collect_expired`).
    TimerFired,
    /// The scheduler observed all tasks terminal.
    Quiescent,
    /// The scheduler's poll-quota budget reached zero.
    BudgetExhausted,
    /// An admission surface rejected a request under the overload policy.
    AdmissionRejected,
}

/// One entry in the event trace: `(sequence, kind, entity_id, aux, status)`
/// per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    /// Globally monotonic sequence number.
    pub sequence: u64,
    /// What kind of event this is.
    pub kind: TraceKind,
    /// The packed 64-bit handle (or other entity identifier) this event
    /// concerns.
    pub entity_id: u64,
    /// Auxiliary data whose meaning depends on `kind` (e.g. a parent id, a
    /// status code, a timer deadline).
    pub aux: u64,
}

impl TraceEvent {
    fn fold(&self, acc: &mut Fnv1a) {
        acc.write_u64(self.sequence);
        acc.write_u64(self.kind as u64);
        acc.write_u64(self.entity_id);
        acc.write_u64(self.aux);
    }
}

/// The result of comparing a recorded trace against a reference, per
/// §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayResult {
    /// The two traces matched exactly, including the final digest.
    Match,
    /// The recorded trace has a different length than the reference.
    LengthMismatch {
        /// The index the comparison stopped at.
        index: usize,
    },
    /// An event's `kind` differed from the reference at `index`.
    KindMismatch {
        /// The index the divergence was found at.
        index: usize,
    },
    /// An event's `entity_id` differed from the reference at `index`.
    EntityMismatch {
        /// The index the divergence was found at.
        index: usize,
    },
    /// An event's `aux` differed from the reference at `index`.
    AuxMismatch {
        /// The index the divergence was found at.
        index: usize,
    },
    /// Every event matched but the final hash-chain digest did not.
    DigestMismatch,
}

/// The deterministic event trace.
pub struct Trace {
    ring: Vec<TraceEvent>,
    capacity: usize,
    write_pos: usize,
    next_sequence: u64,
    digest: Fnv1a,
    overflowed: bool,
    reference: Option<Vec<TraceEvent>>,
}

impl Trace {
    /// Create a trace with the default 1024-slot ring.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create a trace with an explicit ring capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            next_sequence: 0,
            digest: Fnv1a::new(),
            overflowed: false,
            reference: None,
        }
    }

    /// Reset the ring, sequence counter, digest, and reference — the only
    /// operation allowed to reset the hash chain (§4.6, Global Invariants).
    pub fn reset(&mut self) {
        self.ring.clear();
        self.write_pos = 0;
        self.next_sequence = 0;
        self.digest = Fnv1a::new();
        self.overflowed = false;
        self.reference = None;
    }

    /// Record one event, folding it into the hash chain, and return the
    /// sequence number it was assigned.
    pub fn emit(&mut self, kind: TraceKind, entity_id: u64, aux: u64) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let event = TraceEvent {
            sequence,
            kind,
            entity_id,
            aux,
        };
        event.fold(&mut self.digest);

        if self.ring.len() < self.capacity {
            self.ring.push(event);
        } else {
            self.ring[self.write_pos] = event;
            self.overflowed = true;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity.max(1);
        sequence
    }

    /// Number of events currently retained in the ring (after any
    /// wraparound eviction).
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.ring.len()
    }

    /// Fetch the `i`th retained event, in storage order (oldest retained
    /// first once the ring has wrapped).
    #[must_use]
    pub fn event_get(&self, i: usize) -> Option<&TraceEvent> {
        if self.ring.len() < self.capacity {
            self.ring.get(i)
        } else {
            self.ring.get((self.write_pos + i) % self.capacity)
        }
    }

    /// Whether the ring's storage has wrapped at least once (the digest
    /// is unaffected; see module docs).
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// The current hash-chain digest: the canonical replay-identity value.
    #[must_use]
    pub fn digest(&self) -> u64 {
        self.digest.finish()
    }

    /// The sequence number the next emitted event will be assigned — a
    /// true monotonic counter, not a digest (see [`HindsightEvent`][he]'s
    /// `trace_seq_at_log` field).
    ///
    /// [he]: crate::hindsight::HindsightEvent
    #[must_use]
    pub(crate) const fn sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Load the expected event sequence for a subsequent
    /// [`verify`](Self::verify) call.
    pub fn replay_load_reference(&mut self, events: Vec<TraceEvent>) {
        self.reference = Some(events);
    }

    /// Walk the recorded ring (in storage order) against the loaded
    /// reference in lockstep, returning the first divergence.
    #[must_use]
    pub fn replay_verify(&self) -> ReplayResult {
        let Some(reference) = &self.reference else {
            return ReplayResult::LengthMismatch { index: 0 };
        };
        if reference.len() != self.event_count() {
            return ReplayResult::LengthMismatch {
                index: reference.len().min(self.event_count()),
            };
        }
        for i in 0..reference.len() {
            let expected = &reference[i];
            let Some(actual) = self.event_get(i) else {
                return ReplayResult::LengthMismatch { index: i };
            };
            if actual.kind != expected.kind {
                return ReplayResult::KindMismatch { index: i };
            }
            if actual.entity_id != expected.entity_id {
                return ReplayResult::EntityMismatch { index: i };
            }
            if actual.aux != expected.aux {
                return ReplayResult::AuxMismatch { index: i };
            }
        }
        let mut acc = Fnv1a::new();
        for event in reference {
            event.fold(&mut acc);
        }
        if acc.finish() != self.digest() {
            return ReplayResult::DigestMismatch;
        }
        ReplayResult::Match
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s4_replay_digest_determinism() {
        fn run() -> u64 {
            let mut trace = Trace::new();
            for i in 0..4u64 {
                trace.emit(TraceKind::TaskSpawn, i, 0);
            }
            for i in 0..4u64 {
                trace.emit(TraceKind::SchedComplete, i, 0);
            }
            trace.digest()
        }
        let digest1 = run();
        let digest2 = run();
        assert_eq!(digest1, digest2);
        assert_ne!(digest1, 0);
    }

    #[test]
    fn ring_wraps_and_sets_overflow_but_digest_keeps_chaining() {
        let mut trace = Trace::with_capacity(2);
        trace.emit(TraceKind::TaskSpawn, 0, 0);
        trace.emit(TraceKind::TaskSpawn, 1, 0);
        assert!(!trace.overflowed());
        let digest_before = trace.digest();
        trace.emit(TraceKind::TaskSpawn, 2, 0);
        assert!(trace.overflowed());
        assert_eq!(trace.event_count(), 2);
        assert_ne!(trace.digest(), digest_before);
        assert_eq!(trace.event_get(0).unwrap().entity_id, 1);
        assert_eq!(trace.event_get(1).unwrap().entity_id, 2);
    }

    #[test]
    fn reset_clears_ring_and_digest() {
        let mut trace = Trace::new();
        trace.emit(TraceKind::TaskSpawn, 0, 0);
        trace.reset();
        assert_eq!(trace.event_count(), 0);
        assert_eq!(trace.digest(), Fnv1a::new().finish());
    }

    #[test]
    fn replay_verify_matches_identical_reference() {
        let mut trace = Trace::new();
        let e0 = trace.emit(TraceKind::TaskSpawn, 1, 0);
        let e1 = trace.emit(TraceKind::SchedComplete, 1, 0);
        let reference = vec![
            TraceEvent { sequence: e0, kind: TraceKind::TaskSpawn, entity_id: 1, aux: 0 },
            TraceEvent { sequence: e1, kind: TraceKind::SchedComplete, entity_id: 1, aux: 0 },
        ];
        trace.replay_load_reference(reference);
        assert_eq!(trace.replay_verify(), ReplayResult::Match);
    }

    #[test]
    fn replay_verify_reports_first_divergence() {
        let mut trace = Trace::new();
        trace.emit(TraceKind::TaskSpawn, 1, 0);
        trace.emit(TraceKind::SchedComplete, 1, 0);
        let reference = vec![
            TraceEvent { sequence: 0, kind: TraceKind::TaskSpawn, entity_id: 1, aux: 0 },
            TraceEvent { sequence: 1, kind: TraceKind::SchedComplete, entity_id: 99, aux: 0 },
        ];
        trace.replay_load_reference(reference);
        assert_eq!(trace.replay_verify(), ReplayResult::EntityMismatch { index: 1 });
    }

    #[test]
    fn replay_verify_reports_length_mismatch() {
        let mut trace = Trace::new();
        trace.emit(TraceKind::TaskSpawn, 1, 0);
        trace.replay_load_reference(vec![
            TraceEvent { sequence: 0, kind: TraceKind::TaskSpawn, entity_id: 1, aux: 0 },
            TraceEvent { sequence: 1, kind: TraceKind::TaskSpawn, entity_id: 2, aux: 0 },
        ]);
        assert!(matches!(trace.replay_verify(), ReplayResult::LengthMismatch { .. }));
    }
}
