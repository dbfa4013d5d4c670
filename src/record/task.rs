//! Task entity record (§3 "Task") and the `Pollable` poll-function
//! contract the scheduler drives.

use crate::transition::TaskState;
use crate::types::cancel::CancelWitness;
use crate::types::{Outcome, RegionId, TaskId};

/// The application-level error type carried in a task's terminal
/// [`Outcome`]. Kept as a boxed `dyn` so the scheduler's task table does
/// not need to be generic over every task's error type.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// The outcome a completed task settled into.
pub type TaskOutcome = Outcome<TaskError>;

/// What a single call to a task's poll function reported.
#[derive(Debug)]
pub enum PollOutcome {
    /// The task completed successfully.
    Ready,
    /// The task is not done; it should be polled again next round.
    Pending,
    /// The task completed with an application-level error.
    Err(TaskError),
}

/// The per-poll contract the scheduler drives.
///
/// Deliberately not `std::future::Future`: per the Design Notes, the
/// kernel does not impose a coroutine shape, and a bespoke trait avoids
/// pulling in waker-registration machinery the deterministic,
/// single-poll-context scheduling model does not need. A task observes
/// cancellation by calling [`crate::kernel::Kernel::checkpoint`] from
/// inside its own `poll` body.
pub trait Pollable: Send {
    /// Advance the task by one scheduler round.
    fn poll(&mut self) -> PollOutcome;
}

/// A boxed [`Pollable`], the shape stored in the task arena.
pub type BoxedPollable = Box<dyn Pollable>;

/// The task entity record (§3).
pub struct TaskRecord {
    id: TaskId,
    region: RegionId,
    state: TaskState,
    poll_fn: BoxedPollable,
    outcome: Option<TaskOutcome>,
    witness: Option<CancelWitness>,
    /// Offset/length into the owning region's capture arena, if this task
    /// was created via `spawn_captured`.
    capture: Option<(usize, usize)>,
    /// Number of consecutive polls performed while in `Cancelling`, used to
    /// enforce the bounded cleanup allowance (§4.2).
    cancelling_polls: u32,
}

impl TaskRecord {
    /// Create a new task record in `Created` state.
    #[must_use]
    pub fn new(id: TaskId, region: RegionId, poll_fn: BoxedPollable) -> Self {
        Self {
            id,
            region,
            state: TaskState::Created,
            poll_fn,
            outcome: None,
            witness: None,
            capture: None,
            cancelling_polls: 0,
        }
    }

    /// Attach a capture-arena span to this task record (`spawn_captured`).
    pub fn set_capture(&mut self, span: (usize, usize)) {
        self.capture = Some(span);
    }

    /// The capture-arena span attached to this task, if any.
    #[must_use]
    pub const fn capture(&self) -> Option<(usize, usize)> {
        self.capture
    }

    /// This task's own handle.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Fix up this record's self-handle once its arena slot is known (see
    /// [`crate::record::region::RegionRecord::set_id`]).
    pub(crate) fn set_id(&mut self, id: TaskId) {
        self.id = id;
    }

    /// The region that owns this task.
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Set the lifecycle state directly; callers must have already
    /// validated the transition.
    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Whether this task has reached its terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The currently installed cancel witness, if any.
    #[must_use]
    pub const fn witness(&self) -> Option<&CancelWitness> {
        self.witness.as_ref()
    }

    /// Install or strengthen the cancel witness on this task.
    pub fn set_witness(&mut self, witness: CancelWitness) {
        self.witness = Some(witness);
    }

    /// The outcome recorded when this task reached `Completed`, if any.
    #[must_use]
    pub const fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    /// Record the terminal outcome. Only meaningful once, when the task
    /// transitions into `Completed`.
    pub fn set_outcome(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }

    /// Invoke the task's poll function for one scheduler round.
    pub fn poll(&mut self) -> PollOutcome {
        self.poll_fn.poll()
    }

    /// Number of consecutive rounds this task has spent in `Cancelling`.
    #[must_use]
    pub const fn cancelling_polls(&self) -> u32 {
        self.cancelling_polls
    }

    /// Bump the cancelling-poll counter; reset when leaving `Cancelling`.
    pub fn bump_cancelling_polls(&mut self) {
        self.cancelling_polls = self.cancelling_polls.saturating_add(1);
    }

    /// Reset the cancelling-poll counter (e.g. on leaving `Cancelling`).
    pub fn reset_cancelling_polls(&mut self) {
        self.cancelling_polls = 0;
    }
}
