//! Error taxonomy and the per-task diagnostic error ledger (L-AMBIENT, §7).
//!
//! [`KernelError`] is the Rust rendering of "a status enum with Ok or one of
//! the taxonomised errors" from §6: every public kernel operation returns
//! `Result<T, KernelError>`. Variants are grouped by the families in §6's
//! status taxonomy table (1xx general .. 15xx replay) and [`KernelError::code`]
//! reproduces the stable numeric family code so a hosting application can
//! switch on it without matching the full enum.
//!
//! [`TaskErrorLedger`] is the "macro-based try-propagation" design note
//! rendered as a small ring-buffered diagnostic log: [`record_error!`] wraps
//! a fallible call, appends `(task, status, operation, file, line, sequence)`
//! to the ledger, and re-propagates the error via `?`. The ledger never
//! influences control flow — it is read-only diagnostics.

use crate::types::{ObligationId, RegionId, TaskId};
use core::fmt;

/// The taxonomised error surface for every public kernel operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    // ---- 1xx general / programmer contract -----------------------------
    /// An argument violated a precondition (e.g. zero channel capacity).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The entity addressed by a handle does not exist in its arena.
    #[error("not found")]
    NotFound,
    /// An entity that must be created exactly once already exists.
    #[error("already exists")]
    AlreadyExists,
    /// A caller-supplied buffer was too small for the requested output.
    #[error("buffer too small: need {needed}, have {have}")]
    BufferTooSmall {
        /// Bytes/slots required.
        needed: usize,
        /// Bytes/slots the caller supplied.
        have: usize,
    },
    /// A hook (allocator, clock, entropy, log, reactor) required by an
    /// operation was not installed.
    #[error("hook missing: {0}")]
    HookMissing(&'static str),
    /// A hook was installed but returned a malformed result.
    #[error("hook invalid: {0}")]
    HookInvalid(&'static str),

    // ---- 2xx transitions -------------------------------------------------
    /// The attempted state change is not in the relevant transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Source state (`Display` of the entity's state enum).
        from: &'static str,
        /// Rejected destination state.
        to: &'static str,
    },

    // ---- 3xx region --------------------------------------------------
    /// The region is not in `Open` state and cannot accept this operation.
    #[error("region not open")]
    RegionNotOpen,
    /// The region has been poisoned and rejects further spawn/reserve.
    #[error("region poisoned")]
    RegionPoisoned,
    /// The region could not finalize because child tasks are still active.
    #[error("tasks still active")]
    TasksStillActive,
    /// The region could not finalize because obligations remain unresolved.
    #[error("obligations unresolved")]
    ObligationsUnresolved,
    /// The region arena is at capacity.
    #[error("region at capacity")]
    RegionAtCapacity,

    // ---- 4xx task ------------------------------------------------------
    /// The task arena is at capacity.
    #[error("task resource exhausted")]
    TaskResourceExhausted,
    /// `get_outcome` was called on a task that has not completed.
    #[error("task not completed")]
    TaskNotCompleted,
    /// The capture arena for a region ran out of space for `spawn_captured`.
    #[error("capture arena exhausted")]
    CaptureArenaExhausted,

    // ---- 5xx obligation -----------------------------------------------
    /// The obligation arena is at capacity.
    #[error("obligation resource exhausted")]
    ObligationResourceExhausted,
    /// An obligation was resolved (commit/abort) more than once.
    #[error("obligation already resolved")]
    ObligationAlreadyResolved,

    // ---- 6xx cancellation witness ---------------------------------------
    /// A new cancel witness named an earlier phase than one already
    /// observed.
    #[error("cancel witness phase regression")]
    WitnessPhaseRegression,
    /// A new cancel witness named a less severe reason than one already
    /// observed.
    #[error("cancel witness reason weakened")]
    WitnessReasonWeakened,
    /// A new cancel witness named a different task than the chain started
    /// for.
    #[error("cancel witness task mismatch")]
    WitnessTaskMismatch,
    /// A new cancel witness named a different region than the chain started
    /// for.
    #[error("cancel witness region mismatch")]
    WitnessRegionMismatch,
    /// A new cancel witness named an earlier epoch than one already
    /// observed.
    #[error("cancel witness epoch mismatch")]
    WitnessEpochMismatch,
    /// Cancel propagation exceeded the configured chain depth limit.
    #[error("cancel propagation depth exceeded")]
    PropagationDepthExceeded,

    // ---- 7xx channel -----------------------------------------------------
    /// The channel has no free capacity for a new reservation.
    #[error("channel full")]
    ChannelFull,
    /// The channel's sender and receiver have both closed.
    #[error("channel disconnected")]
    Disconnected,
    /// The channel's state does not permit this operation (e.g. permit
    /// reuse).
    #[error("invalid channel state")]
    InvalidChannelState,
    /// `try_recv` found no queued value while the sender is still open.
    #[error("would block")]
    WouldBlock,
    /// Region finalize found a channel that was not fully drained/closed.
    #[error("channel not drained")]
    ChannelNotDrained,

    // ---- 8xx timer -------------------------------------------------------
    /// The timer wheel arena is at capacity.
    #[error("timer resource exhausted")]
    TimerResourceExhausted,
    /// A registered duration exceeded the configured ceiling.
    #[error("timer duration exceeded")]
    TimerDurationExceeded,
    /// `advance` was called with a `now` earlier than the wheel's current
    /// time.
    #[error("timer advance moved backwards")]
    TimerNotMonotonic,
    /// Region finalize found timers still pending.
    #[error("timers pending")]
    TimersPending,

    // ---- 9xx quiescence ----------------------------------------------
    /// `quiescence_check`/`drain` observed a region that has not reached
    /// quiescence.
    #[error("quiescence not reached")]
    QuiescenceNotReached,
    /// A drain operation found child regions that have not closed.
    #[error("regions not closed")]
    RegionsNotClosed,
    /// Scheduler drain found incomplete children past the cleanup
    /// allowance.
    #[error("incomplete children")]
    IncompleteChildren,

    // ---- 10xx resource / capacity -----------------------------------
    /// A generic fixed-capacity arena/ring has been exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),
    /// An admission surface rejected the request under the overload
    /// policy.
    #[error("admission closed")]
    AdmissionClosed,
    /// The scheduler's poll-quota budget reached zero before quiescence.
    #[error("poll budget exhausted")]
    PollBudgetExhausted,

    // ---- 11xx stale handle --------------------------------------------
    /// The handle names a slot that was never allocated.
    #[error("stale handle: not found")]
    StaleHandleNotFound,
    /// The handle names a slot whose generation has since moved on.
    #[error("stale handle: generation mismatch")]
    StaleHandle,

    // ---- 12xx hook -------------------------------------------------------
    /// The allocator hook has been sealed and rejects further allocation.
    #[error("allocator sealed")]
    AllocatorSealed,

    // ---- 13xx affinity -----------------------------------------------
    /// A hardened build detected a cross-domain access.
    #[error("affinity violation")]
    AffinityViolation,
    /// An entity was accessed before being bound to a domain.
    #[error("affinity not bound")]
    AffinityNotBound,
    /// An entity was bound to a domain more than once.
    #[error("affinity already bound")]
    AffinityAlreadyBound,
    /// An affinity-bound entity requires an explicit transfer before
    /// crossing domains.
    #[error("affinity transfer required")]
    AffinityTransferRequired,
    /// The affinity table is at capacity.
    #[error("affinity table full")]
    AffinityTableFull,

    // ---- 14xx codec equivalence (external surface, kernel-observed) ----
    /// A codec/semantic equivalence comparator reported a mismatch.
    #[error("codec equivalence mismatch")]
    EquivalenceMismatch,

    // ---- 15xx replay -----------------------------------------------------
    /// Two independently produced trace/hindsight streams diverged.
    #[error("replay mismatch")]
    ReplayMismatch,
    /// A nondeterminism-boundary observation violated the determinism
    /// contract (e.g. wall-clock read in deterministic mode).
    #[error("determinism violation: {0}")]
    DeterminismViolation(&'static str),
}

impl KernelError {
    /// The stable numeric status family this error belongs to, per §6's
    /// "codes are grouped in stable families" taxonomy. Family membership
    /// never changes for a given variant across releases.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_)
            | Self::NotFound
            | Self::AlreadyExists
            | Self::BufferTooSmall { .. } => 100,
            Self::HookMissing(_) => 1200,
            Self::HookInvalid(_) => 1201,
            Self::InvalidTransition { .. } => 200,
            Self::RegionNotOpen => 300,
            Self::RegionPoisoned => 301,
            Self::TasksStillActive => 302,
            Self::ObligationsUnresolved => 303,
            Self::RegionAtCapacity => 304,
            Self::TaskResourceExhausted => 400,
            Self::TaskNotCompleted => 401,
            Self::CaptureArenaExhausted => 402,
            Self::ObligationResourceExhausted => 500,
            Self::ObligationAlreadyResolved => 501,
            Self::WitnessPhaseRegression => 600,
            Self::WitnessReasonWeakened => 601,
            Self::WitnessTaskMismatch => 602,
            Self::WitnessRegionMismatch => 603,
            Self::WitnessEpochMismatch => 604,
            Self::PropagationDepthExceeded => 605,
            Self::ChannelFull => 700,
            Self::Disconnected => 701,
            Self::InvalidChannelState => 702,
            Self::WouldBlock => 703,
            Self::ChannelNotDrained => 704,
            Self::TimerResourceExhausted => 800,
            Self::TimerDurationExceeded => 801,
            Self::TimerNotMonotonic => 802,
            Self::TimersPending => 803,
            Self::QuiescenceNotReached => 900,
            Self::RegionsNotClosed => 901,
            Self::IncompleteChildren => 902,
            Self::ResourceExhausted(_) => 1000,
            Self::AdmissionClosed => 1001,
            Self::PollBudgetExhausted => 1002,
            Self::StaleHandleNotFound => 1100,
            Self::StaleHandle => 1101,
            Self::AllocatorSealed => 1202,
            Self::AffinityViolation => 1300,
            Self::AffinityNotBound => 1301,
            Self::AffinityAlreadyBound => 1302,
            Self::AffinityTransferRequired => 1303,
            Self::AffinityTableFull => 1304,
            Self::EquivalenceMismatch => 1400,
            Self::ReplayMismatch => 1500,
            Self::DeterminismViolation(_) => 1501,
        }
    }
}

impl From<crate::util::ArenaError> for KernelError {
    fn from(err: crate::util::ArenaError) -> Self {
        match err {
            crate::util::ArenaError::Full => Self::ResourceExhausted("arena"),
            crate::util::ArenaError::NotFound => Self::StaleHandleNotFound,
            crate::util::ArenaError::Stale => Self::StaleHandle,
        }
    }
}

impl From<crate::types::CancelWitnessError> for KernelError {
    fn from(err: crate::types::CancelWitnessError) -> Self {
        match err {
            crate::types::CancelWitnessError::PhaseRegression => Self::WitnessPhaseRegression,
            crate::types::CancelWitnessError::ReasonWeakened => Self::WitnessReasonWeakened,
            crate::types::CancelWitnessError::TaskMismatch => Self::WitnessTaskMismatch,
            crate::types::CancelWitnessError::RegionMismatch => Self::WitnessRegionMismatch,
            crate::types::CancelWitnessError::EpochMismatch => Self::WitnessEpochMismatch,
        }
    }
}

/// A convenience alias for `Result<T, KernelError>`, the return shape of
/// every public kernel operation.
pub type Result<T> = core::result::Result<T, KernelError>;

/// The entity an error-ledger entry was recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSubject {
    /// Recorded against a task.
    Task(TaskId),
    /// Recorded against a region (no task in scope, e.g. `region::open`).
    Region(RegionId),
    /// Recorded against an obligation.
    Obligation(ObligationId),
}

impl fmt::Display for LedgerSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "{id}"),
            Self::Region(id) => write!(f, "{id}"),
            Self::Obligation(id) => write!(f, "{id}"),
        }
    }
}

/// One diagnostic entry in a [`TaskErrorLedger`]: `(task, status,
/// operation, file, line, sequence)` per §7's propagation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The entity the failing operation was performed on behalf of.
    pub subject: LedgerSubject,
    /// The error that was returned.
    pub status: KernelError,
    /// The name of the operation that failed (e.g. `"channel::try_reserve"`).
    pub operation: &'static str,
    /// Source file of the call site, via `file!()`.
    pub file: &'static str,
    /// Source line of the call site, via `line!()`.
    pub line: u32,
    /// Ledger-global monotonic sequence number.
    pub sequence: u64,
}

/// Per-subject ring buffer of diagnostic ledger entries.
///
/// Depth is fixed at construction (16 per subject by default, per §7); the
/// ledger is purely diagnostic and never influences control flow. Non-fatal
/// conditions (obligation leak, ghost-monitor violation) are recorded here
/// but do not abort the scheduler loop.
pub struct TaskErrorLedger {
    depth: usize,
    max_subjects: usize,
    entries: Vec<Vec<LedgerEntry>>,
    subjects: Vec<LedgerSubject>,
    next_sequence: u64,
}

impl TaskErrorLedger {
    /// Default per-subject ring depth, per §7 ("depth 16, 64 task slots").
    pub const DEFAULT_DEPTH: usize = 16;
    /// Default number of distinct subjects tracked before the oldest
    /// subject's entries are evicted.
    pub const DEFAULT_MAX_SUBJECTS: usize = 64;

    /// Create a ledger with the default depth/subject-count from §7.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_DEPTH, Self::DEFAULT_MAX_SUBJECTS)
    }

    /// Create a ledger with an explicit per-subject depth and subject
    /// count.
    #[must_use]
    pub fn with_capacity(depth: usize, max_subjects: usize) -> Self {
        Self {
            depth,
            max_subjects,
            entries: Vec::with_capacity(max_subjects),
            subjects: Vec::with_capacity(max_subjects),
            next_sequence: 0,
        }
    }

    fn subject_slot(&mut self, subject: LedgerSubject) -> usize {
        if let Some(pos) = self.subjects.iter().position(|s| *s == subject) {
            return pos;
        }
        if self.subjects.len() >= self.max_subjects {
            self.subjects.remove(0);
            self.entries.remove(0);
        }
        self.subjects.push(subject);
        self.entries.push(Vec::with_capacity(self.depth));
        self.subjects.len() - 1
    }

    /// Record one ledger entry, overwriting the oldest entry for this
    /// subject if its ring is full.
    pub fn record(
        &mut self,
        subject: LedgerSubject,
        status: KernelError,
        operation: &'static str,
        file: &'static str,
        line: u32,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let slot = self.subject_slot(subject);
        let ring = &mut self.entries[slot];
        if ring.len() >= self.depth {
            ring.remove(0);
        }
        ring.push(LedgerEntry {
            subject,
            status,
            operation,
            file,
            line,
            sequence,
        });
    }

    /// Entries recorded for one subject, oldest first.
    #[must_use]
    pub fn entries_for(&self, subject: LedgerSubject) -> &[LedgerEntry] {
        match self.subjects.iter().position(|s| *s == subject) {
            Some(pos) => &self.entries[pos],
            None => &[],
        }
    }

    /// Total number of entries currently retained across all subjects.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }

    /// Clear all recorded entries (diagnostic reset; does not affect
    /// `next_sequence`).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.subjects.clear();
    }
}

impl Default for TaskErrorLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `$expr` (a `Result<T, KernelError>`); on `Err`, record a
/// [`LedgerEntry`] into `$ledger` for `$subject`/`$op` and propagate the
/// error, exactly as the success path would via `?`.
///
/// This is the crate's rendering of the "macro-based try-propagation"
/// design note: a polymorphic early-return over the status sum type with
/// the side effect of writing a ledger entry.
#[macro_export]
macro_rules! record_error {
    ($ledger:expr, $subject:expr, $op:expr, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                $ledger.record($subject, err.clone(), $op, file!(), line!());
                return Err(err);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    #[test]
    fn ledger_records_and_evicts_per_subject_ring() {
        let mut ledger = TaskErrorLedger::with_capacity(2, 4);
        let task = TaskId::new_for_test(1, 0);
        let subject = LedgerSubject::Task(task);
        ledger.record(subject, KernelError::NotFound, "op1", file!(), line!());
        ledger.record(subject, KernelError::ChannelFull, "op2", file!(), line!());
        ledger.record(subject, KernelError::WouldBlock, "op3", file!(), line!());
        let entries = ledger.entries_for(subject);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, "op2");
        assert_eq!(entries[1].operation, "op3");
    }

    #[test]
    fn ledger_sequence_is_monotonic_across_subjects() {
        let mut ledger = TaskErrorLedger::new();
        let t1 = LedgerSubject::Task(TaskId::new_for_test(1, 0));
        let t2 = LedgerSubject::Task(TaskId::new_for_test(2, 0));
        ledger.record(t1, KernelError::NotFound, "a", file!(), line!());
        ledger.record(t2, KernelError::NotFound, "b", file!(), line!());
        let seq_a = ledger.entries_for(t1)[0].sequence;
        let seq_b = ledger.entries_for(t2)[0].sequence;
        assert!(seq_b > seq_a);
    }

    #[test]
    fn ledger_evicts_oldest_subject_when_full() {
        let mut ledger = TaskErrorLedger::with_capacity(2, 1);
        let t1 = LedgerSubject::Task(TaskId::new_for_test(1, 0));
        let t2 = LedgerSubject::Task(TaskId::new_for_test(2, 0));
        ledger.record(t1, KernelError::NotFound, "a", file!(), line!());
        ledger.record(t2, KernelError::NotFound, "b", file!(), line!());
        assert!(ledger.entries_for(t1).is_empty());
        assert_eq!(ledger.entries_for(t2).len(), 1);
    }

    #[test]
    fn error_codes_match_family_table() {
        assert_eq!(KernelError::NotFound.code(), 100);
        assert_eq!(KernelError::RegionNotOpen.code(), 300);
        assert_eq!(KernelError::TaskResourceExhausted.code(), 400);
        assert_eq!(KernelError::ObligationResourceExhausted.code(), 500);
        assert_eq!(KernelError::WitnessPhaseRegression.code(), 600);
        assert_eq!(KernelError::ChannelFull.code(), 700);
        assert_eq!(KernelError::TimerResourceExhausted.code(), 800);
        assert_eq!(KernelError::QuiescenceNotReached.code(), 900);
        assert_eq!(KernelError::ResourceExhausted("x").code(), 1000);
        assert_eq!(KernelError::StaleHandleNotFound.code(), 1100);
        assert_eq!(KernelError::AllocatorSealed.code(), 1202);
        assert_eq!(KernelError::AffinityViolation.code(), 1300);
        assert_eq!(KernelError::EquivalenceMismatch.code(), 1400);
        assert_eq!(KernelError::ReplayMismatch.code(), 1500);
    }
}
