//! Table-driven transition authority (L1).
//!
//! Every state change to a region, task, or obligation is validated against
//! a compile-time-constant boolean table before it is allowed to happen.
//! These tables are the single source of truth for "is `from -> to` legal";
//! nothing elsewhere in the crate mutates entity state without going
//! through one of the `*_transition_allowed` functions below.

use core::fmt;

/// Lifecycle state of a [`crate::record::region::Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    /// Accepting spawns, reservations, and channel/timer creation.
    Open,
    /// Close has been requested; no new spawns/reservations are admitted.
    Closing,
    /// Waiting for outstanding tasks/obligations to reach a terminal state.
    Draining,
    /// Running registered cleanup callbacks.
    Finalizing,
    /// Terminal: the region and everything it owned is done.
    Closed,
}

impl RegionState {
    const fn index(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Draining => 2,
            Self::Finalizing => 3,
            Self::Closed => 4,
        }
    }
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Draining => "draining",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

const REGION_STATES: usize = 5;

#[rustfmt::skip]
const REGION_TABLE: [[bool; REGION_STATES]; REGION_STATES] = {
    // rows = from, cols = to, indices per RegionState::index
    //             Open   Closing Draining Finalizing Closed
    let mut t = [[false; REGION_STATES]; REGION_STATES];
    t[0][1] = true; // Open -> Closing
    t[1][2] = true; // Closing -> Draining
    t[1][3] = true; // Closing -> Finalizing
    t[2][3] = true; // Draining -> Finalizing
    t[3][4] = true; // Finalizing -> Closed
    t
};

/// Whether `from -> to` is a legal region transition.
#[must_use]
pub const fn region_transition_allowed(from: RegionState, to: RegionState) -> bool {
    REGION_TABLE[from.index()][to.index()]
}

/// Lifecycle state of a [`crate::record::task::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Spawned, not yet polled.
    Created,
    /// Actively polled, not cancelled.
    Running,
    /// A cancel witness has been installed; not yet observed by the task.
    CancelRequested,
    /// The task has observed cancellation and is running cleanup.
    Cancelling,
    /// Cleanup has finished; about to reach Completed.
    Finalizing,
    /// Terminal: an outcome has been recorded.
    Completed,
}

impl TaskState {
    const fn index(self) -> usize {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::CancelRequested => 2,
            Self::Cancelling => 3,
            Self::Finalizing => 4,
            Self::Completed => 5,
        }
    }

    /// Whether this state has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::CancelRequested => "cancel-requested",
            Self::Cancelling => "cancelling",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

const TASK_STATES: usize = 6;

#[rustfmt::skip]
const TASK_TABLE: [[bool; TASK_STATES]; TASK_STATES] = {
    //                  Created Running CancelReq Cancelling Finalizing Completed
    let mut t = [[false; TASK_STATES]; TASK_STATES];
    // Created -> {Running, CancelRequested, Completed}
    t[0][1] = true;
    t[0][2] = true;
    t[0][5] = true;
    // Running -> {CancelRequested, Completed}
    t[1][2] = true;
    t[1][5] = true;
    // CancelRequested -> {CancelRequested, Cancelling, Completed}
    t[2][2] = true;
    t[2][3] = true;
    t[2][5] = true;
    // Cancelling -> {Cancelling, Finalizing, Completed}
    t[3][3] = true;
    t[3][4] = true;
    t[3][5] = true;
    // Finalizing -> {Finalizing, Completed}
    t[4][4] = true;
    t[4][5] = true;
    t
};

/// Whether `from -> to` is a legal task transition.
///
/// Self-transitions on `CancelRequested`, `Cancelling`, and `Finalizing` are
/// legal: they are how witness strengthening (same state, stricter cancel
/// reason/phase) is expressed without a state change.
#[must_use]
pub const fn task_transition_allowed(from: TaskState, to: TaskState) -> bool {
    TASK_TABLE[from.index()][to.index()]
}

/// Lifecycle state of a [`crate::record::obligation::Obligation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObligationState {
    /// Reserved against a region, not yet resolved.
    Reserved,
    /// Resolved: the committed path.
    Committed,
    /// Resolved: the aborted path.
    Aborted,
    /// Discovered unresolved at region finalization.
    Leaked,
}

impl ObligationState {
    const fn index(self) -> usize {
        match self {
            Self::Reserved => 0,
            Self::Committed => 1,
            Self::Aborted => 2,
            Self::Leaked => 3,
        }
    }

    /// Whether this state has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Reserved)
    }
}

impl fmt::Display for ObligationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reserved => "reserved",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
            Self::Leaked => "leaked",
        };
        write!(f, "{s}")
    }
}

const OBLIGATION_STATES: usize = 4;

#[rustfmt::skip]
const OBLIGATION_TABLE: [[bool; OBLIGATION_STATES]; OBLIGATION_STATES] = {
    let mut t = [[false; OBLIGATION_STATES]; OBLIGATION_STATES];
    t[0][1] = true; // Reserved -> Committed
    t[0][2] = true; // Reserved -> Aborted
    t[0][3] = true; // Reserved -> Leaked
    t
};

/// Whether `from -> to` is a legal obligation transition.
#[must_use]
pub const fn obligation_transition_allowed(from: ObligationState, to: ObligationState) -> bool {
    OBLIGATION_TABLE[from.index()][to.index()]
}

/// A transition was attempted that the relevant table forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition<S> {
    /// State the entity was in.
    pub from: S,
    /// State the caller attempted to move to.
    pub to: S,
}

impl<S: fmt::Display> fmt::Display for InvalidTransition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition: {} -> {}", self.from, self.to)
    }
}

impl<S: fmt::Debug + fmt::Display> std::error::Error for InvalidTransition<S> {}
