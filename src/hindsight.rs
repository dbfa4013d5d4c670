//! Nondeterminism-boundary ring, an independent replay-identity digest,
//! and flush-on-divergence diagnostics (L10, §4.7).
//!
//! Hindsight is a *separate* bounded ring from the event [`crate::trace::Trace`]
//! (capacity 256 vs. 1024): it exists to answer "what nondeterminism did
//! this run actually observe" (clock reads, entropy draws, reactor
//! readiness, signal arrivals, scheduler tie-breaks, timer coalescing),
//! independent of the lifecycle trace.

use crate::util::Fnv1a;

/// Default hindsight-ring capacity (§4.7).
pub const DEFAULT_RING_CAPACITY: usize = 256;

/// Fixed scratch size used by [`Hindsight::flush_json`] (§4.7: "fixed 8
/// KiB scratch").
pub const FLUSH_SCRATCH_BYTES: usize = 8 * 1024;

/// The category of nondeterminism a [`HindsightEvent`] captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NondeterminismKind {
    /// A wall-clock or monotonic-clock read.
    ClockRead,
    /// A draw from an entropy source.
    EntropyDraw,
    /// A reactor/IO readiness observation.
    ReactorReadiness,
    /// A signal arrival.
    SignalArrival,
    /// A scheduler tie-break between equal-priority ready tasks (§4.2).
    SchedulerTieBreak,
    /// A timer-coalescing decision.
    TimerCoalescing,
}

/// One boundary event: `(sequence, nondeterminism_kind, entity_id,
/// observed_value, trace_seq_at_log)` per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HindsightEvent {
    /// Globally monotonic hindsight sequence number.
    pub sequence: u64,
    /// What kind of nondeterminism this records.
    pub kind: NondeterminismKind,
    /// The entity this observation concerns.
    pub entity_id: u64,
    /// The observed value (clock reading, entropy word, readiness mask,
    /// ...).
    pub observed_value: u64,
    /// The event-trace sequence number at the moment this was logged, so
    /// hindsight and trace can be correlated during diagnosis.
    pub trace_seq_at_log: u64,
}

impl HindsightEvent {
    fn fold(&self, acc: &mut Fnv1a) {
        acc.write_u64(self.sequence);
        acc.write_u64(self.kind as u64);
        acc.write_u64(self.entity_id);
        acc.write_u64(self.observed_value);
        acc.write_u64(self.trace_seq_at_log);
    }
}

/// Policy flags controlling auto-flush behaviour (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HindsightPolicy {
    /// Auto-flush when the ghost-monitor violation count observed this
    /// session is greater than zero.
    pub flush_on_ghost_violation: bool,
    /// Auto-flush when a trace digest divergence is detected.
    pub flush_on_digest_divergence: bool,
}

/// The nondeterminism-boundary ring.
pub struct Hindsight {
    ring: Vec<HindsightEvent>,
    capacity: usize,
    write_pos: usize,
    next_sequence: u64,
    digest: Fnv1a,
    overflowed: bool,
    policy: HindsightPolicy,
}

impl Hindsight {
    /// Create a hindsight ring with the default 256-slot capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create a hindsight ring with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            next_sequence: 0,
            digest: Fnv1a::new(),
            overflowed: false,
            policy: HindsightPolicy::default(),
        }
    }

    /// Reset the ring, sequence counter, and digest.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.write_pos = 0;
        self.next_sequence = 0;
        self.digest = Fnv1a::new();
        self.overflowed = false;
    }

    /// Install the auto-flush policy.
    pub fn set_policy(&mut self, policy: HindsightPolicy) {
        self.policy = policy;
    }

    /// The currently installed policy.
    #[must_use]
    pub const fn policy(&self) -> HindsightPolicy {
        self.policy
    }

    /// Record one nondeterminism-boundary observation.
    pub fn log(
        &mut self,
        kind: NondeterminismKind,
        entity_id: u64,
        observed_value: u64,
        trace_seq_at_log: u64,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let event = HindsightEvent {
            sequence,
            kind,
            entity_id,
            observed_value,
            trace_seq_at_log,
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

    /// Number of events currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Independent FNV-1a digest over the ring's contents: a second
    /// replay-identity fingerprint, orthogonal to the event trace's.
    #[must_use]
    pub fn digest(&self) -> u64 {
        self.digest.finish()
    }

    /// Compare this ring's digest against an externally computed
    /// expectation.
    #[must_use]
    pub fn check_divergence(&self, expected_digest: u64) -> bool {
        self.digest() != expected_digest
    }

    /// Serialise the currently retained window as JSON into a fixed
    /// scratch buffer, without any additional heap allocation beyond that
    /// buffer.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the serialised form would not fit in
    /// [`FLUSH_SCRATCH_BYTES`] bytes.
    pub fn flush_json(&self, out: &mut [u8; FLUSH_SCRATCH_BYTES]) -> Result<usize, ()> {
        use std::io::Write;
        let mut cursor = std::io::Cursor::new(&mut out[..]);
        write!(cursor, "[").map_err(|_| ())?;
        for (i, event) in self.ring.iter().enumerate() {
            if i > 0 {
                write!(cursor, ",").map_err(|_| ())?;
            }
            write!(
                cursor,
                "{{\"sequence\":{},\"kind\":{},\"entity_id\":{},\"observed_value\":{},\"trace_seq_at_log\":{}}}",
                event.sequence, event.kind as u64, event.entity_id, event.observed_value, event.trace_seq_at_log
            )
            .map_err(|_| ())?;
        }
        write!(cursor, "]").map_err(|_| ())?;
        Ok(cursor.position() as usize)
    }
}

impl Default for Hindsight {
    fn default() -> Self {
        Self::new()
    }
}
