//! Cancellation reason and kind types.
//!
//! Cancellation in this kernel is a first-class protocol, not a silent
//! drop. This module defines the types that describe why and how
//! cancellation occurred.

use crate::types::id::{RegionId, TaskId};
use core::fmt;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation due to timeout/deadline.
    Timeout,
    /// Cancellation due to fail-fast policy (sibling failed).
    FailFast,
    /// Cancellation due to losing a race (another branch completed first).
    RaceLost,
    /// Cancellation due to parent region being cancelled/closing.
    ParentCancelled,
    /// Cancellation due to runtime shutdown.
    Shutdown,
}

impl CancelKind {
    /// Returns the severity of this cancellation kind.
    ///
    /// Higher severity cancellations take precedence when strengthening.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::FailFast | Self::RaceLost => 2,
            Self::ParentCancelled => 3,
            Self::Shutdown => 4,
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::FailFast => write!(f, "fail-fast"),
            Self::RaceLost => write!(f, "race lost"),
            Self::ParentCancelled => write!(f, "parent cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a fail-fast cancellation reason (sibling failed).
    #[must_use]
    pub const fn sibling_failed() -> Self {
        Self::new(CancelKind::FailFast)
    }

    /// Creates a race loser cancellation reason.
    ///
    /// Used when a task is cancelled because another task in a race completed first.
    #[must_use]
    pub const fn race_loser() -> Self {
        Self::new(CancelKind::RaceLost)
    }

    /// Creates a race lost cancellation reason (alias for race_loser).
    ///
    /// Used when a task is cancelled because another task in a race completed first.
    #[must_use]
    pub const fn race_lost() -> Self {
        Self::new(CancelKind::RaceLost)
    }

    /// Creates a parent-cancelled cancellation reason.
    #[must_use]
    pub const fn parent_cancelled() -> Self {
        Self::new(CancelKind::ParentCancelled)
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Strengthens this reason with another, keeping the more severe one.
    ///
    /// Returns `true` if the reason was changed.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        if other.kind > self.kind {
            self.kind = other.kind;
            self.message = other.message;
            return true;
        }

        if other.kind < self.kind {
            return false;
        }

        match (self.message, other.message) {
            (None, Some(msg)) => {
                self.message = Some(msg);
                true
            }
            (Some(current), Some(candidate)) if candidate < current => {
                self.message = Some(candidate);
                true
            }
            _ => false,
        }
    }

    /// Returns true if this reason indicates shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self.kind, CancelKind::Shutdown)
    }

    /// Returns the kind of this cancellation reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// A stage of cancel propagation, used to order [`CancelWitness`] updates.
///
/// Propagation moves strictly forward through these phases; a witness
/// update that names an earlier phase than one already observed for the
/// same task is a protocol violation ([`CancelWitnessError::PhaseRegression`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CancelPhase {
    /// Cancellation has been requested but not yet observed by the task.
    Requested,
    /// The task has observed the request and begun cooperating.
    Propagating,
    /// The task is running cleanup (obligation resolution, cleanup stack
    /// unwind).
    Cleaning,
    /// The task has reached a terminal cancelled state.
    Finalized,
}

/// Configuration bounding how far a single cancellation may propagate
/// through the region/task tree before it is treated as a runaway
/// propagation and reported rather than followed further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAttributionConfig {
    /// Maximum number of parent-to-child hops a cancellation may cross.
    pub max_propagation_depth: u16,
}

impl CancelAttributionConfig {
    /// Default propagation depth limit.
    pub const DEFAULT_MAX_DEPTH: u16 = 16;
}

impl Default for CancelAttributionConfig {
    fn default() -> Self {
        Self {
            max_propagation_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Violations detected while advancing a [`CancelWitness`] chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelWitnessError {
    /// The new witness names a phase earlier than the last observed phase.
    PhaseRegression,
    /// The new witness names a cancel reason less severe than the last
    /// observed reason, for the same phase.
    ReasonWeakened,
    /// The new witness names a different task than the chain was started
    /// for.
    TaskMismatch,
    /// The new witness names a different region than the chain was started
    /// for.
    RegionMismatch,
    /// The new witness names an epoch earlier than the last observed
    /// epoch.
    EpochMismatch,
}

impl fmt::Display for CancelWitnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhaseRegression => write!(f, "cancel phase moved backwards"),
            Self::ReasonWeakened => write!(f, "cancel reason weakened"),
            Self::TaskMismatch => write!(f, "cancel witness task mismatch"),
            Self::RegionMismatch => write!(f, "cancel witness region mismatch"),
            Self::EpochMismatch => write!(f, "cancel witness epoch moved backwards"),
        }
    }
}

impl std::error::Error for CancelWitnessError {}

/// A point-in-time record of cancel propagation for one task: which phase
/// it has reached, under which reason, in which region, as of which
/// scheduler epoch.
///
/// A chain of witnesses for the same `(task, region)` pair must advance
/// strictly: phase never regresses, reason severity never decreases, and
/// epoch never regresses. [`CancelWitness::advance`] enforces this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelWitness {
    /// Current propagation phase.
    pub phase: CancelPhase,
    /// The reason under which this task is being cancelled.
    pub reason: CancelReason,
    /// The task this witness describes.
    pub task: TaskId,
    /// The region that owns this task.
    pub region: RegionId,
    /// The scheduler epoch this witness was recorded at.
    pub epoch: u64,
}

impl CancelWitness {
    /// Start a new witness chain at [`CancelPhase::Requested`].
    #[must_use]
    pub const fn new(reason: CancelReason, task: TaskId, region: RegionId, epoch: u64) -> Self {
        Self {
            phase: CancelPhase::Requested,
            reason,
            task,
            region,
            epoch,
        }
    }

    /// Validate and apply the next witness in the chain, returning the
    /// first violation encountered rather than partially applying it.
    ///
    /// # Errors
    ///
    /// See [`CancelWitnessError`] for the individual monotonicity
    /// invariants enforced here.
    pub fn advance(&mut self, next: Self) -> Result<(), CancelWitnessError> {
        if next.task != self.task {
            return Err(CancelWitnessError::TaskMismatch);
        }
        if next.region != self.region {
            return Err(CancelWitnessError::RegionMismatch);
        }
        if next.epoch < self.epoch {
            return Err(CancelWitnessError::EpochMismatch);
        }
        if next.phase < self.phase {
            return Err(CancelWitnessError::PhaseRegression);
        }
        if next.reason.kind < self.reason.kind {
            return Err(CancelWitnessError::ReasonWeakened);
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(_test_name: &str) {}

    #[test]
    fn severity_ordering() {
        init_test("severity_ordering");
        assert!(CancelKind::User.severity() < CancelKind::Timeout.severity());
        assert!(CancelKind::Timeout.severity() < CancelKind::FailFast.severity());
        assert!(CancelKind::FailFast.severity() < CancelKind::ParentCancelled.severity());
        assert!(CancelKind::ParentCancelled.severity() < CancelKind::Shutdown.severity());
    }

    #[test]
    fn strengthen_takes_more_severe() {
        init_test("strengthen_takes_more_severe");
        let mut reason = CancelReason::new(CancelKind::User);
        let strengthened = reason.strengthen(&CancelReason::timeout());
        assert!(strengthened);
        assert!(reason.kind == CancelKind::Timeout);

        let strengthened_shutdown = reason.strengthen(&CancelReason::shutdown());
        assert!(strengthened_shutdown);
        assert!(reason.kind == CancelKind::Shutdown);

        // Less severe should not change.
        let unchanged = !reason.strengthen(&CancelReason::timeout());
        assert!(unchanged);
        assert!(reason.kind == CancelKind::Shutdown);
    }

    #[test]
    fn strengthen_is_idempotent() {
        init_test("strengthen_is_idempotent");
        let mut reason = CancelReason::timeout();
        let unchanged = !reason.strengthen(&CancelReason::timeout());
        assert!(unchanged);
        assert!(reason.kind == CancelKind::Timeout);
    }

    #[test]
    fn strengthen_is_associative() {
        init_test("strengthen_is_associative");
        fn combine(mut a: CancelReason, b: &CancelReason) -> CancelReason {
            a.strengthen(b);
            a
        }

        let a = CancelReason::user("a");
        let b = CancelReason::timeout();
        let c = CancelReason::shutdown();

        let left = combine(combine(a.clone(), &b), &c);
        let right = {
            let bc = combine(b, &c);
            combine(a, &bc)
        };

        assert!(left == right);
    }

    #[test]
    fn strengthen_same_kind_picks_deterministic_message() {
        init_test("strengthen_same_kind_picks_deterministic_message");
        let mut reason = CancelReason::user("b");
        let changed = reason.strengthen(&CancelReason::user("a"));
        assert!(changed);
        assert!(reason.kind == CancelKind::User);
        assert!(reason.message == Some("a"));
    }

    #[test]
    fn strengthen_resets_message_when_kind_increases() {
        init_test("strengthen_resets_message_when_kind_increases");
        let mut reason = CancelReason::user("please stop");
        let changed = reason.strengthen(&CancelReason::shutdown());
        assert!(changed);
        assert!(reason.kind == CancelKind::Shutdown);
        assert!(reason.message.is_none());
    }

    #[test]
    fn witness_advances_through_phases() {
        let task = TaskId::new_for_test(1, 0);
        let region = RegionId::new_for_test(1, 0);
        let mut witness = CancelWitness::new(CancelReason::timeout(), task, region, 0);
        let next = CancelWitness {
            phase: CancelPhase::Propagating,
            ..witness.clone()
        };
        assert!(witness.advance(next).is_ok());
        assert_eq!(witness.phase, CancelPhase::Propagating);
    }

    #[test]
    fn witness_rejects_phase_regression() {
        let task = TaskId::new_for_test(1, 0);
        let region = RegionId::new_for_test(1, 0);
        let mut witness = CancelWitness {
            phase: CancelPhase::Cleaning,
            ..CancelWitness::new(CancelReason::timeout(), task, region, 0)
        };
        let regressed = CancelWitness {
            phase: CancelPhase::Requested,
            ..witness.clone()
        };
        assert_eq!(
            witness.advance(regressed),
            Err(CancelWitnessError::PhaseRegression)
        );
    }

    #[test]
    fn witness_rejects_weakened_reason() {
        let task = TaskId::new_for_test(1, 0);
        let region = RegionId::new_for_test(1, 0);
        let mut witness = CancelWitness::new(CancelReason::shutdown(), task, region, 0);
        let weakened = CancelWitness {
            reason: CancelReason::timeout(),
            ..witness.clone()
        };
        assert_eq!(
            witness.advance(weakened),
            Err(CancelWitnessError::ReasonWeakened)
        );
    }

    #[test]
    fn witness_rejects_task_or_region_mismatch() {
        let task = TaskId::new_for_test(1, 0);
        let other_task = TaskId::new_for_test(2, 0);
        let region = RegionId::new_for_test(1, 0);
        let mut witness = CancelWitness::new(CancelReason::timeout(), task, region, 0);
        let mismatched = CancelWitness {
            task: other_task,
            ..witness.clone()
        };
        assert_eq!(
            witness.advance(mismatched),
            Err(CancelWitnessError::TaskMismatch)
        );
    }

    #[test]
    fn witness_rejects_epoch_regression() {
        let task = TaskId::new_for_test(1, 0);
        let region = RegionId::new_for_test(1, 0);
        let mut witness = CancelWitness::new(CancelReason::timeout(), task, region, 5);
        let regressed = CancelWitness {
            epoch: 4,
            ..witness.clone()
        };
        assert_eq!(
            witness.advance(regressed),
            Err(CancelWitnessError::EpochMismatch)
        );
    }

    #[test]
    fn default_attribution_config_matches_spec_depth() {
        assert_eq!(CancelAttributionConfig::default().max_propagation_depth, 16);
    }
}
