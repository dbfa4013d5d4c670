//! The deterministic kernel (L15): owns every entity arena and wires the
//! transition tables, two-phase channels, timer wheel, trace/hindsight
//! recorders, ghost monitor, and adaptive decision surfaces into the single
//! public operation surface described by §6.
//!
//! Every method here corresponds to one of §6's abstract operations. There
//! is deliberately no global/`static` state: a [`Kernel`] is a value, and a
//! host that wants several independent deterministic runs constructs
//! several kernels rather than resetting shared mutable state (§9 "global
//! singletons become an explicit runtime context with reset entry
//! points").

use crate::adaptive::AdaptiveSurface;
use crate::channel::{Channel, ChannelState, Permit};
use crate::cleanup::CleanupHandle;
use crate::error::{KernelError, LedgerSubject, Result, TaskErrorLedger};
use crate::ghost::{GhostMonitor, GhostRecord, NullGhostMonitor};
use crate::hindsight::{Hindsight, HindsightPolicy, NondeterminismKind};
use crate::overload::{Admission, AdmissionPolicy, CoreFallback};
use crate::record::task::{BoxedPollable, TaskError};
use crate::record::{ObligationRecord, RegionRecord, TaskRecord};
use crate::scheduler::{DEFAULT_CLEANUP_ALLOWANCE, SchedulerOutcome};
use crate::timer::{ExpiredTimer, TimerWheel};
use crate::trace::{Trace, TraceKind};
use crate::transition::{
    ObligationState, RegionState, TaskState, obligation_transition_allowed,
    region_transition_allowed, task_transition_allowed,
};
use crate::types::cancel::CancelAttributionConfig;
use crate::types::{
    Budget, CancelReason, CancelWitness, ChannelId, ObligationId, Outcome, RegionId, TaskId, Time,
};
use crate::util::{Arena, ArenaIndex, DetHashMap};

/// The value type carried by channels in this kernel. The kernel is not
/// generic over channel payloads (§9 "a bespoke trait avoids pulling in
/// machinery the model does not need"): hosts that need richer payloads
/// encode/decode through `u64` the same way they would through any other
/// fixed-width wire slot.
pub type ChannelValue = u64;

/// The waker payload a timer fires with. Left as an opaque `u64` the host
/// assigns meaning to (e.g. an encoded `(TaskId, reason)` pair), matching
/// `ChannelValue`'s non-generic treatment.
pub type TimerWaker = u64;

/// Sizing and policy knobs for [`Kernel::new`]. Every field has a
/// conservative default via [`KernelConfig::default`] sized for unit/
/// integration tests; hosts that need larger arenas construct their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Capacity of the region arena.
    pub region_capacity: usize,
    /// Capacity of the task arena.
    pub task_capacity: usize,
    /// Capacity of the obligation arena.
    pub obligation_capacity: usize,
    /// Capacity of the channel arena.
    pub channel_capacity: usize,
    /// Capacity of the timer wheel.
    pub timer_capacity: usize,
    /// Bytes given to each region's capture arena.
    pub capture_arena_bytes: usize,
    /// Slots given to each region's cleanup stack.
    pub cleanup_stack_capacity: usize,
    /// Consecutive `Cancelling` polls allowed before a task is
    /// force-completed (§4.2 "bounded cleanup").
    pub cleanup_allowance: u32,
    /// Bounds how far a single cancellation propagates (§4.3).
    pub cancel_attribution: CancelAttributionConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            region_capacity: 256,
            task_capacity: 1024,
            obligation_capacity: 256,
            channel_capacity: 256,
            timer_capacity: 256,
            capture_arena_bytes: 4096,
            cleanup_stack_capacity: 32,
            cleanup_allowance: DEFAULT_CLEANUP_ALLOWANCE,
            cancel_attribution: CancelAttributionConfig {
                max_propagation_depth: CancelAttributionConfig::DEFAULT_MAX_DEPTH,
            },
        }
    }
}

/// The runtime kernel: every entity arena, the event trace, the
/// nondeterminism ring, the per-task error ledger, the ghost monitor, and
/// any registered adaptive decision surfaces.
pub struct Kernel {
    config: KernelConfig,
    regions: Arena<RegionRecord>,
    tasks: Arena<TaskRecord>,
    obligations: Arena<ObligationRecord>,
    channels: Arena<Channel<ChannelValue>>,
    timers: TimerWheel<TimerWaker>,
    trace: Trace,
    hindsight: Hindsight,
    errors: TaskErrorLedger,
    ghost: Box<dyn GhostMonitor>,
    adaptive: DetHashMap<String, AdaptiveSurface>,
    overload: CoreFallback,
    /// Current cancellation epoch. Bumped once per [`Kernel::cancel_propagate`]
    /// wave; direct [`Kernel::task_cancel`] calls reuse the current epoch.
    epoch: u64,
}

impl Kernel {
    /// Construct a kernel with the given sizing configuration and a
    /// no-op ghost monitor.
    #[must_use]
    pub fn new(config: KernelConfig) -> Self {
        Self::with_ghost_monitor(config, Box::new(NullGhostMonitor))
    }

    /// Construct a kernel with an explicit ghost monitor (e.g. a
    /// [`crate::ghost::RecordingGhostMonitor`] for test assertions).
    #[must_use]
    pub fn with_ghost_monitor(config: KernelConfig, ghost: Box<dyn GhostMonitor>) -> Self {
        Self {
            regions: Arena::with_capacity(config.region_capacity),
            tasks: Arena::with_capacity(config.task_capacity),
            obligations: Arena::with_capacity(config.obligation_capacity),
            channels: Arena::with_capacity(config.channel_capacity),
            timers: TimerWheel::new(config.timer_capacity),
            trace: Trace::new(),
            hindsight: Hindsight::new(),
            errors: TaskErrorLedger::new(),
            ghost,
            adaptive: DetHashMap::default(),
            overload: CoreFallback::new(),
            epoch: 0,
            config,
        }
    }

    /// This kernel's sizing/policy configuration.
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The per-task diagnostic error ledger (§7); read-only, never
    /// influences control flow.
    #[must_use]
    pub const fn error_ledger(&self) -> &TaskErrorLedger {
        &self.errors
    }

    // ---- private accessors -------------------------------------------

    fn region(&self, id: RegionId) -> Result<&RegionRecord> {
        Ok(self.regions.get(id.arena_index())?)
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut RegionRecord> {
        Ok(self.regions.get_mut(id.arena_index())?)
    }

    fn task(&self, id: TaskId) -> Result<&TaskRecord> {
        Ok(self.tasks.get(id.arena_index())?)
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord> {
        Ok(self.tasks.get_mut(id.arena_index())?)
    }

    fn obligation(&self, id: ObligationId) -> Result<&ObligationRecord> {
        Ok(self.obligations.get(id.arena_index())?)
    }

    fn obligation_mut(&mut self, id: ObligationId) -> Result<&mut ObligationRecord> {
        Ok(self.obligations.get_mut(id.arena_index())?)
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel<ChannelValue>> {
        Ok(self.channels.get_mut(id.arena_index())?)
    }

    fn channel(&self, id: ChannelId) -> Result<&Channel<ChannelValue>> {
        Ok(self.channels.get(id.arena_index())?)
    }

    fn emit_trace(&mut self, kind: TraceKind, entity_id: u64, aux: u64) -> u64 {
        self.trace.emit(kind, entity_id, aux)
    }

    fn record_ledger(
        &mut self,
        subject: LedgerSubject,
        status: &KernelError,
        operation: &'static str,
    ) {
        self.errors
            .record(subject, status.clone(), operation, file!(), 0);
    }

    fn ensure_region_open(&self, id: RegionId) -> Result<()> {
        let region = self.region(id)?;
        if region.is_poisoned() {
            return Err(KernelError::RegionPoisoned);
        }
        if region.state() != RegionState::Open {
            return Err(KernelError::RegionNotOpen);
        }
        Ok(())
    }

    fn transition_region(&mut self, id: RegionId, to: RegionState) -> Result<()> {
        let from = self.region(id)?.state();
        if !region_transition_allowed(from, to) {
            self.ghost.observe(GhostRecord::IllegalTransition {
                from: region_state_label(from),
                to: region_state_label(to),
                task: None,
            });
            return Err(KernelError::InvalidTransition {
                from: region_state_label(from),
                to: region_state_label(to),
            });
        }
        self.region_mut(id)?.set_state(to);
        Ok(())
    }

    fn transition_task(&mut self, id: TaskId, to: TaskState) -> Result<()> {
        let from = self.task(id)?.state();
        if !task_transition_allowed(from, to) {
            self.ghost.observe(GhostRecord::IllegalTransition {
                from: task_state_label(from),
                to: task_state_label(to),
                task: Some(id),
            });
            return Err(KernelError::InvalidTransition {
                from: task_state_label(from),
                to: task_state_label(to),
            });
        }
        self.task_mut(id)?.set_state(to);
        Ok(())
    }

    fn transition_obligation(&mut self, id: ObligationId, to: ObligationState) -> Result<()> {
        let from = self.obligation(id)?.state();
        if !obligation_transition_allowed(from, to) {
            self.ghost.observe(GhostRecord::IllegalTransition {
                from: obligation_state_label(from),
                to: obligation_state_label(to),
                task: None,
            });
            return Err(KernelError::InvalidTransition {
                from: obligation_state_label(from),
                to: obligation_state_label(to),
            });
        }
        self.obligation_mut(id)?.set_state(to);
        Ok(())
    }

    // ---- region operations (§6 "Region") ------------------------------

    /// Open a new region, optionally nested under `parent`.
    ///
    /// # Errors
    ///
    /// [`KernelError::RegionAtCapacity`] if the region arena is full.
    pub fn region_open(&mut self, parent: Option<RegionId>) -> Result<RegionId> {
        if let Some(p) = parent {
            self.ensure_region_open(p)?;
        }
        let placeholder = RegionId::from_arena(ArenaIndex::new(0, 0));
        let record = RegionRecord::new(
            placeholder,
            parent,
            self.config.capture_arena_bytes,
            self.config.cleanup_stack_capacity,
        );
        let idx = match self.regions.insert(record) {
            Ok(idx) => idx,
            Err(_) => return Err(KernelError::RegionAtCapacity),
        };
        let id = RegionId::from_arena(idx);
        self.region_mut(id)?.set_id(id);
        self.emit_trace(TraceKind::RegionOpen, id.arena_index().to_bits(), 0);
        Ok(id)
    }

    /// Current lifecycle state of a region.
    pub fn region_get_state(&self, id: RegionId) -> Result<RegionState> {
        Ok(self.region(id)?.state())
    }

    /// Request a region close: `Open -> Closing`. A no-op if the region is
    /// already past `Open`.
    pub fn region_close(&mut self, id: RegionId) -> Result<()> {
        if self.region(id)?.state() == RegionState::Open {
            self.transition_region(id, RegionState::Closing)?;
            self.emit_trace(TraceKind::RegionClose, id.arena_index().to_bits(), 0);
        }
        Ok(())
    }

    /// Poison a region: further spawns/reservations are rejected without
    /// changing the region's lifecycle state.
    pub fn region_poison(&mut self, id: RegionId) -> Result<()> {
        self.region_mut(id)?.poison();
        Ok(())
    }

    fn region_is_quiescent(&self, id: RegionId) -> Result<bool> {
        let region = self.region(id)?;
        let tasks = &self.tasks;
        Ok(region.is_quiescent(|t| tasks.get(t.arena_index()).is_ok_and(TaskRecord::is_terminal)))
    }

    /// Drive a region to `Closed`: run the scheduler, request close, then
    /// keep running/advancing until the region reaches `Closed` or
    /// `budget` is exhausted (§4.2 "drain").
    ///
    /// # Errors
    ///
    /// [`KernelError::PollBudgetExhausted`] if `budget` runs out before the
    /// region reaches `Closed`.
    pub fn region_drain(&mut self, id: RegionId, mut budget: Budget) -> Result<()> {
        self.scheduler_run(id, &mut budget)?;
        self.region_close(id)?;
        loop {
            match self.region(id)?.state() {
                RegionState::Closed => return Ok(()),
                RegionState::Closing => {
                    self.transition_region(id, RegionState::Draining)?;
                }
                RegionState::Draining => {
                    if self.region_is_quiescent(id)? {
                        self.transition_region(id, RegionState::Finalizing)?;
                    } else {
                        self.scheduler_run(id, &mut budget)?;
                    }
                }
                RegionState::Finalizing => {
                    self.finalize_region(id)?;
                }
                RegionState::Open => unreachable!("region_close already left Open"),
            }
        }
    }

    fn finalize_region(&mut self, id: RegionId) -> Result<()> {
        let children: Vec<TaskId> = self.region(id)?.children().to_vec();
        for t in &children {
            if !self.task(*t)?.is_terminal() {
                return Err(KernelError::TasksStillActive);
            }
        }
        let obligations: Vec<ObligationId> = self.region(id)?.obligations().iter().copied().collect();
        for o in obligations {
            if self.obligation(o).is_ok_and(|rec| !rec.is_resolved()) {
                self.transition_obligation(o, ObligationState::Leaked)?;
                self.region_mut(id)?.remove_obligation(o);
                self.emit_trace(TraceKind::ObligationLeak, o.arena_index().to_bits(), 0);
                self.ghost.observe(GhostRecord::ObligationLeaked {
                    obligation: o,
                    region: id,
                });
            }
        }
        self.region_mut(id)?.cleanup().drain();
        self.transition_region(id, RegionState::Closed)?;
        self.emit_trace(TraceKind::RegionClosed, id.arena_index().to_bits(), 0);
        Ok(())
    }

    /// Whether a region has reached quiescence: every child task terminal
    /// and every obligation resolved (§8 property 1).
    pub fn region_quiescence_check(&self, id: RegionId) -> Result<bool> {
        self.region_is_quiescent(id)
    }

    // ---- task operations (§6 "Task") ----------------------------------

    /// Spawn a task into `region`.
    ///
    /// # Errors
    ///
    /// [`KernelError::RegionNotOpen`]/[`KernelError::RegionPoisoned`] if the
    /// region cannot accept spawns, [`KernelError::TaskResourceExhausted`]
    /// if the task arena is full.
    pub fn task_spawn(&mut self, region: RegionId, poll_fn: BoxedPollable) -> Result<TaskId> {
        self.ensure_region_open(region)?;
        let placeholder = TaskId::from_arena(ArenaIndex::new(0, 0));
        let record = TaskRecord::new(placeholder, region, poll_fn);
        let idx = match self.tasks.insert(record) {
            Ok(idx) => idx,
            Err(_) => return Err(KernelError::TaskResourceExhausted),
        };
        let id = TaskId::from_arena(idx);
        self.task_mut(id)?.set_id(id);
        self.region_mut(region)?.add_child(id);
        self.emit_trace(TraceKind::TaskSpawn, id.arena_index().to_bits(), 0);
        Ok(id)
    }

    /// Spawn a task whose captured user data lives in `region`'s capture
    /// arena, returning the task id and the `(offset, len)` span the bytes
    /// were copied into.
    ///
    /// # Errors
    ///
    /// As [`Kernel::task_spawn`], plus [`KernelError::CaptureArenaExhausted`]
    /// if the region's capture arena cannot fit `capture_bytes`.
    pub fn task_spawn_captured(
        &mut self,
        region: RegionId,
        poll_fn: BoxedPollable,
        capture_bytes: &[u8],
    ) -> Result<(TaskId, (usize, usize))> {
        self.ensure_region_open(region)?;
        let offset = self
            .region_mut(region)?
            .capture()
            .allocate(capture_bytes.len())
            .ok_or(KernelError::CaptureArenaExhausted)?;
        self.region_mut(region)?
            .capture()
            .slice_mut(offset, capture_bytes.len())
            .copy_from_slice(capture_bytes);
        let id = self.task_spawn(region, poll_fn)?;
        let span = (offset, capture_bytes.len());
        self.task_mut(id)?.set_capture(span);
        Ok((id, span))
    }

    /// Current lifecycle state of a task.
    pub fn task_get_state(&self, id: TaskId) -> Result<TaskState> {
        Ok(self.task(id)?.state())
    }

    /// The terminal outcome of a completed task.
    ///
    /// # Errors
    ///
    /// [`KernelError::TaskNotCompleted`] if the task has not reached
    /// `Completed`.
    pub fn task_get_outcome(&self, id: TaskId) -> Result<&Outcome<TaskError>> {
        self.task(id)?.outcome().ok_or(KernelError::TaskNotCompleted)
    }

    /// Request cancellation of a single task under `reason`, installing or
    /// strengthening its cancel witness (§4.3). A no-op on an already
    /// terminal task.
    pub fn task_cancel(&mut self, id: TaskId, reason: CancelReason) -> Result<()> {
        let epoch = self.epoch;
        self.cancel_task_with_epoch(id, reason, epoch)
    }

    fn cancel_task_with_epoch(&mut self, id: TaskId, reason: CancelReason, epoch: u64) -> Result<()> {
        let state = self.task(id)?.state();
        if state.is_terminal() {
            return Ok(());
        }
        let region = self.task(id)?.region();
        let existing = self.task(id)?.witness().cloned();
        let witness = match existing {
            Some(mut current) => {
                let mut strengthened = current.reason.clone();
                strengthened.strengthen(&reason);
                let next = CancelWitness {
                    phase: current.phase,
                    reason: strengthened,
                    task: id,
                    region,
                    epoch: epoch.max(current.epoch),
                };
                current.advance(next)?;
                current
            }
            None => CancelWitness::new(reason, id, region, epoch),
        };
        self.task_mut(id)?.set_witness(witness);
        let target = match state {
            TaskState::Created | TaskState::Running | TaskState::CancelRequested => {
                TaskState::CancelRequested
            }
            TaskState::Cancelling => TaskState::Cancelling,
            TaskState::Finalizing => TaskState::Finalizing,
            TaskState::Completed => return Ok(()),
        };
        self.transition_task(id, target)?;
        self.emit_trace(TraceKind::CancelRequested, id.arena_index().to_bits(), 0);
        Ok(())
    }

    /// Cancel every non-terminal task in `region` under `reason`, returning
    /// the number of tasks affected (§4.3).
    ///
    /// # Errors
    ///
    /// [`KernelError::PropagationDepthExceeded`] if the region has more
    /// non-terminal children than `config().cancel_attribution.max_propagation_depth`;
    /// no task is mutated in that case.
    pub fn cancel_propagate(&mut self, region: RegionId, reason: CancelReason) -> Result<usize> {
        let mut pending = Vec::new();
        for t in self.region(region)?.children().to_vec() {
            if self.task(t).is_ok_and(|tr| !tr.is_terminal()) {
                pending.push(t);
            }
        }
        if pending.len() > self.config.cancel_attribution.max_propagation_depth as usize {
            return Err(KernelError::PropagationDepthExceeded);
        }
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let mut count = 0usize;
        for t in pending {
            self.cancel_task_with_epoch(t, reason.clone(), epoch)?;
            count += 1;
        }
        Ok(count)
    }

    /// The cooperative finalize path: a task in `Cancelling` that has
    /// observed its own cancellation calls this to settle into
    /// `Completed` with outcome `Cancelled` (§4.3).
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidTransition`] if the task is not currently in
    /// `Cancelling`.
    pub fn task_finalize(&mut self, id: TaskId) -> Result<()> {
        self.transition_task(id, TaskState::Finalizing)?;
        self.transition_task(id, TaskState::Completed)?;
        let reason = self
            .task(id)?
            .witness()
            .map(|w| w.reason.clone())
            .unwrap_or_default();
        self.task_mut(id)?.set_outcome(Outcome::Cancelled(reason));
        self.emit_trace(TraceKind::SchedComplete, id.arena_index().to_bits(), 0);
        Ok(())
    }

    /// Read a task's current cancel state without mutating anything
    /// (§4.3 "tasks read cancel state via a checkpoint call").
    pub fn task_checkpoint(&self, id: TaskId) -> Result<(bool, CancelReason)> {
        let task = self.task(id)?;
        match task.witness() {
            Some(w)
                if matches!(
                    task.state(),
                    TaskState::CancelRequested | TaskState::Cancelling | TaskState::Finalizing
                ) =>
            {
                Ok((true, w.reason.clone()))
            }
            _ => Ok((false, CancelReason::default())),
        }
    }

    fn advance_cancel_phase(&mut self, id: TaskId) -> Result<()> {
        use crate::types::cancel::CancelPhase;
        match self.task(id)?.state() {
            TaskState::CancelRequested => {
                self.transition_task(id, TaskState::Cancelling)?;
                if let Some(w) = self.task(id)?.witness() {
                    if w.phase < CancelPhase::Propagating {
                        let mut next = w.clone();
                        next.phase = CancelPhase::Propagating;
                        self.task_mut(id)?.set_witness(next);
                    }
                }
            }
            TaskState::Cancelling => {
                if let Some(w) = self.task(id)?.witness() {
                    if w.phase < CancelPhase::Cleaning {
                        let mut next = w.clone();
                        next.phase = CancelPhase::Cleaning;
                        self.task_mut(id)?.set_witness(next);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn complete_task(&mut self, id: TaskId, outcome: Outcome<TaskError>) -> Result<()> {
        let final_outcome = {
            let task = self.task(id)?;
            if matches!(task.state(), TaskState::Cancelling | TaskState::CancelRequested) {
                task.witness()
                    .map_or(outcome, |w| Outcome::Cancelled(w.reason.clone()))
            } else {
                outcome
            }
        };
        self.transition_task(id, TaskState::Completed)?;
        self.task_mut(id)?.set_outcome(final_outcome);
        self.emit_trace(TraceKind::SchedComplete, id.arena_index().to_bits(), 0);
        Ok(())
    }

    fn force_complete_cancelled(&mut self, id: TaskId) -> Result<()> {
        let reason = self
            .task(id)?
            .witness()
            .map(|w| w.reason.clone())
            .unwrap_or_default();
        self.transition_task(id, TaskState::Completed)?;
        self.task_mut(id)?.set_outcome(Outcome::Cancelled(reason));
        self.task_mut(id)?.reset_cancelling_polls();
        self.emit_trace(TraceKind::SchedComplete, id.arena_index().to_bits(), 0);
        Ok(())
    }

    // ---- obligation operations (§6 "Obligation") -----------------------

    /// Reserve a new obligation against `region`.
    ///
    /// # Errors
    ///
    /// [`KernelError::RegionNotOpen`]/[`KernelError::RegionPoisoned`], or
    /// [`KernelError::ObligationResourceExhausted`] if the obligation arena
    /// is full.
    pub fn obligation_reserve(&mut self, region: RegionId) -> Result<ObligationId> {
        self.ensure_region_open(region)?;
        let placeholder = ObligationId::from_arena(ArenaIndex::new(0, 0));
        let record = ObligationRecord::new(placeholder, region);
        let idx = match self.obligations.insert(record) {
            Ok(idx) => idx,
            Err(_) => return Err(KernelError::ObligationResourceExhausted),
        };
        let id = ObligationId::from_arena(idx);
        self.obligation_mut(id)?.set_id(id);
        self.region_mut(region)?.add_obligation(id);
        self.emit_trace(TraceKind::ObligationReserve, id.arena_index().to_bits(), 0);
        Ok(id)
    }

    fn resolve_obligation(
        &mut self,
        id: ObligationId,
        target: ObligationState,
        kind: TraceKind,
    ) -> Result<()> {
        if self.obligation(id)?.is_resolved() {
            return Err(KernelError::ObligationAlreadyResolved);
        }
        self.transition_obligation(id, target)?;
        let region = self.obligation(id)?.region();
        self.region_mut(region)?.remove_obligation(id);
        self.emit_trace(kind, id.arena_index().to_bits(), 0);
        Ok(())
    }

    /// Resolve an obligation on the committed path.
    ///
    /// # Errors
    ///
    /// [`KernelError::ObligationAlreadyResolved`] if already resolved.
    pub fn obligation_commit(&mut self, id: ObligationId) -> Result<()> {
        self.resolve_obligation(id, ObligationState::Committed, TraceKind::ObligationCommit)
    }

    /// Resolve an obligation on the aborted path.
    ///
    /// # Errors
    ///
    /// [`KernelError::ObligationAlreadyResolved`] if already resolved.
    pub fn obligation_abort(&mut self, id: ObligationId) -> Result<()> {
        self.resolve_obligation(id, ObligationState::Aborted, TraceKind::ObligationAbort)
    }

    // ---- channel operations (§6 "Channel", §4.4) -----------------------

    /// Create a bounded channel of `capacity` slots against `region`.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidArgument`] if `capacity` is zero, or
    /// [`KernelError::ResourceExhausted`] if the channel arena is full.
    pub fn channel_create(&mut self, region: RegionId, capacity: usize) -> Result<ChannelId> {
        self.ensure_region_open(region)?;
        let placeholder = ChannelId::from_arena(ArenaIndex::new(0, 0));
        let channel = Channel::new(placeholder, capacity)?;
        let idx = self.channels.insert(channel)?;
        let id = ChannelId::from_arena(idx);
        self.channel_mut(id)?.set_id(id);
        self.region_mut(region)?.add_channel(id);
        Ok(id)
    }

    /// Close the sender side of a channel.
    pub fn channel_close_sender(&mut self, id: ChannelId) -> Result<()> {
        self.channel_mut(id)?.close_sender();
        Ok(())
    }

    /// Close the receiver side of a channel, discarding any queued values.
    pub fn channel_close_receiver(&mut self, id: ChannelId) -> Result<()> {
        self.channel_mut(id)?.close_receiver();
        Ok(())
    }

    /// Reserve one slot of capacity, returning a single-use permit.
    pub fn channel_try_reserve(&mut self, id: ChannelId) -> Result<Permit> {
        self.channel_mut(id)?.try_reserve()
    }

    /// Consume a permit, enqueueing `value`.
    pub fn channel_permit_send(&mut self, permit: Permit, value: ChannelValue) -> Result<()> {
        self.channel_mut(permit.channel())?.permit_send(permit, value)
    }

    /// Consume a permit without enqueueing, returning its capacity.
    pub fn channel_permit_abort(&mut self, permit: Permit) -> Result<()> {
        self.channel_mut(permit.channel())?.permit_abort(permit)
    }

    /// Pop the head of a channel's queue.
    pub fn channel_try_recv(&mut self, id: ChannelId) -> Result<ChannelValue> {
        self.channel_mut(id)?.try_recv()
    }

    /// Current lifecycle state of a channel.
    pub fn channel_get_state(&self, id: ChannelId) -> Result<ChannelState> {
        Ok(self.channel(id)?.state())
    }

    /// Number of committed values currently queued.
    pub fn channel_queue_len(&self, id: ChannelId) -> Result<usize> {
        Ok(self.channel(id)?.queue_len())
    }

    /// Number of outstanding (reserved, not yet sent/aborted) permits.
    pub fn channel_reserved_count(&self, id: ChannelId) -> Result<usize> {
        Ok(self.channel(id)?.reserved_count())
    }

    // ---- timer operations (§6 "Timer wheel") --------------------------

    /// Register a deadline/waker pair against `region`'s timer wheel.
    pub fn timer_register(
        &mut self,
        region: RegionId,
        deadline: Time,
        waker: TimerWaker,
    ) -> Result<ArenaIndex> {
        self.ensure_region_open(region)?;
        let handle = self.timers.register(deadline, waker)?;
        self.region_mut(region)?.add_timer(handle);
        Ok(handle)
    }

    /// Cancel a previously registered timer. Returns `false` if it had
    /// already fired or been cancelled.
    pub fn timer_cancel(&mut self, handle: ArenaIndex) -> bool {
        self.timers.cancel(handle)
    }

    /// Replace a timer's deadline/waker, cancelling the old registration
    /// first.
    pub fn timer_update(
        &mut self,
        old_handle: ArenaIndex,
        deadline: Time,
        waker: TimerWaker,
    ) -> Result<ArenaIndex> {
        Ok(self.timers.update(old_handle, deadline, waker)?)
    }

    /// Collect every timer whose deadline has passed `now`, up to `max`,
    /// in `(deadline, insertion_seq)` order, emitting a trace event per
    /// fired timer.
    pub fn timer_collect_expired(&mut self, now: Time, max: usize) -> Vec<ExpiredTimer<TimerWaker>> {
        let expired = self.timers.collect_expired(now, max);
        for e in &expired {
            self.trace.emit(TraceKind::TimerFired, e.handle.to_bits(), e.deadline.as_nanos());
        }
        expired
    }

    /// Advance the timer wheel's notion of "now".
    pub fn timer_advance(&mut self, now: Time) -> Result<()> {
        Ok(self.timers.advance(now)?)
    }

    /// Set the maximum duration a timer may be registered for.
    pub fn timer_set_max_duration(&mut self, nanos: u64) {
        self.timers.set_max_duration(nanos);
    }

    /// The timer wheel's current notion of "now", used as the kernel's
    /// deterministic clock for budget deadline checks.
    #[must_use]
    pub fn timer_now(&self) -> Time {
        self.timers.now()
    }

    // ---- scheduler (§6 "Scheduler", §4.2) -----------------------------

    /// Run the cooperative round-robin scheduler over `region`'s children
    /// until the region is quiescent or `budget` is exhausted.
    ///
    /// # Errors
    ///
    /// [`KernelError::PollBudgetExhausted`] if `budget` runs out first.
    pub fn scheduler_run(&mut self, region: RegionId, budget: &mut Budget) -> Result<SchedulerOutcome> {
        loop {
            if self.region_is_quiescent(region)? {
                self.emit_trace(TraceKind::Quiescent, region.arena_index().to_bits(), 0);
                return Ok(SchedulerOutcome::Quiescent);
            }
            let mut ready: Vec<TaskId> = self.region(region)?.children().to_vec();
            ready.retain(|t| self.task(*t).is_ok_and(|tr| !tr.is_terminal()));
            ready.sort_by_key(|t| t.arena_index());
            if ready.is_empty() {
                // Not quiescent (obligations still outstanding) but nothing
                // pollable remains; further progress needs external action.
                return Ok(SchedulerOutcome::Quiescent);
            }
            for t in ready {
                if self.task(t).is_ok_and(TaskRecord::is_terminal) {
                    continue;
                }
                if budget.consume(1) {
                    self.emit_trace(TraceKind::BudgetExhausted, region.arena_index().to_bits(), 0);
                    return Err(KernelError::PollBudgetExhausted);
                }
                if budget.is_exhausted_at(Some(self.timers.now())) {
                    self.emit_trace(TraceKind::BudgetExhausted, region.arena_index().to_bits(), 0);
                    return Err(KernelError::PollBudgetExhausted);
                }
                if self.task(t)?.state() == TaskState::Created {
                    self.transition_task(t, TaskState::Running)?;
                }
                let was_cancel_requested = self.task(t)?.state() == TaskState::CancelRequested;
                self.emit_trace(TraceKind::SchedPoll, t.arena_index().to_bits(), 0);
                let poll_result = match self.task_mut(t) {
                    Ok(task) => task.poll(),
                    Err(err) => {
                        self.record_ledger(LedgerSubject::Task(t), &err, "kernel::scheduler_run");
                        return Err(err);
                    }
                };
                match poll_result {
                    crate::record::task::PollOutcome::Ready => {
                        self.complete_task(t, Outcome::Ok)?;
                    }
                    crate::record::task::PollOutcome::Pending => {
                        if self.task(t)?.state() == TaskState::Cancelling {
                            self.task_mut(t)?.bump_cancelling_polls();
                            if self.task(t)?.cancelling_polls() >= self.config.cleanup_allowance {
                                self.force_complete_cancelled(t)?;
                            }
                        }
                    }
                    crate::record::task::PollOutcome::Err(err) => {
                        self.complete_task(t, Outcome::Err(err))?;
                    }
                }
                if was_cancel_requested {
                    self.advance_cancel_phase(t)?;
                }
            }
        }
    }

    // ---- trace operations (§6 "Trace") --------------------------------

    /// Reset the event trace (ring, sequence counter, digest, reference).
    pub fn trace_reset(&mut self) {
        self.trace.reset();
    }

    /// Emit a trace event directly (for host-level events outside the
    /// kernel's own lifecycle bookkeeping), returning its sequence number.
    pub fn trace_emit(&mut self, kind: TraceKind, entity_id: u64, aux: u64) -> u64 {
        self.trace.emit(kind, entity_id, aux)
    }

    /// Number of events currently retained in the trace ring.
    #[must_use]
    pub fn trace_event_count(&self) -> usize {
        self.trace.event_count()
    }

    /// Fetch the `i`th retained trace event, oldest-first.
    #[must_use]
    pub fn trace_event_get(&self, i: usize) -> Option<&crate::trace::TraceEvent> {
        self.trace.event_get(i)
    }

    /// The running hash-chain digest over every event ever emitted.
    #[must_use]
    pub fn trace_digest(&self) -> u64 {
        self.trace.digest()
    }

    /// Load a reference event stream to replay-verify against.
    pub fn trace_replay_load_reference(&mut self, events: Vec<crate::trace::TraceEvent>) {
        self.trace.replay_load_reference(events);
    }

    /// Verify the loaded reference stream against this trace's own
    /// history.
    #[must_use]
    pub fn trace_replay_verify(&self) -> crate::trace::ReplayResult {
        self.trace.replay_verify()
    }

    // ---- hindsight operations (§6 "Hindsight") -------------------------

    /// Reset the nondeterminism ring (ring, sequence counter, digest).
    pub fn hindsight_reset(&mut self) {
        self.hindsight.reset();
    }

    /// Log one nondeterminism-boundary observation.
    pub fn hindsight_log(
        &mut self,
        kind: NondeterminismKind,
        entity_id: u64,
        observed_value: u64,
    ) -> u64 {
        let trace_seq = self.trace.sequence();
        self.hindsight.log(kind, entity_id, observed_value, trace_seq)
    }

    /// Serialize the hindsight ring as JSON into `out`, returning the
    /// number of bytes written.
    pub fn hindsight_flush_json(
        &self,
        out: &mut [u8; crate::hindsight::FLUSH_SCRATCH_BYTES],
    ) -> std::result::Result<usize, ()> {
        self.hindsight.flush_json(out)
    }

    /// The running hash-chain digest over every nondeterminism observation
    /// ever logged.
    #[must_use]
    pub fn hindsight_digest(&self) -> u64 {
        self.hindsight.digest()
    }

    /// Whether the hindsight digest has diverged from `expected_digest`.
    #[must_use]
    pub fn hindsight_check_divergence(&self, expected_digest: u64) -> bool {
        self.hindsight.check_divergence(expected_digest)
    }

    /// Install a new hindsight flush policy.
    pub fn hindsight_set_policy(&mut self, policy: HindsightPolicy) {
        self.hindsight.set_policy(policy);
    }

    // ---- adaptive decision operations (§6 "Adaptive", §4.9) ------------

    /// Register a named adaptive decision surface.
    ///
    /// # Errors
    ///
    /// [`KernelError::AlreadyExists`] if `name` is already registered, else
    /// propagates [`AdaptiveSurface::new`]'s validation errors.
    pub fn adaptive_register(&mut self, name: impl Into<String>, surface: AdaptiveSurface) -> Result<()> {
        let name = name.into();
        if self.adaptive.contains_key(&name) {
            return Err(KernelError::AlreadyExists);
        }
        self.adaptive.insert(name, surface);
        Ok(())
    }

    fn adaptive_surface_mut(&mut self, name: &str) -> Result<&mut AdaptiveSurface> {
        self.adaptive.get_mut(name).ok_or(KernelError::NotFound)
    }

    fn adaptive_surface(&self, name: &str) -> Result<&AdaptiveSurface> {
        self.adaptive.get(name).ok_or(KernelError::NotFound)
    }

    /// Install a new fallback policy and decision budget on a registered
    /// surface.
    pub fn adaptive_set_policy(
        &mut self,
        name: &str,
        policy: crate::adaptive::FallbackPolicy,
        budget: crate::adaptive::AdaptiveBudget,
    ) -> Result<()> {
        let surface = self.adaptive_surface_mut(name)?;
        surface.set_policy(policy);
        surface.set_budget(budget);
        Ok(())
    }

    /// Observe a state transition on a registered surface.
    pub fn adaptive_observe(&mut self, name: &str, state_index: usize) -> Result<()> {
        self.adaptive_surface_mut(name)?.observe(state_index);
        Ok(())
    }

    /// Evaluate a registered surface's contract for its current posterior.
    pub fn adaptive_decide(
        &mut self,
        name: &str,
        ctx: &crate::adaptive::EvalContext,
    ) -> Result<crate::adaptive::DecisionOutcome> {
        Ok(self.adaptive_surface_mut(name)?.decide(ctx))
    }

    /// Fetch the `i`th retained ledger entry for a surface, oldest-first.
    pub fn adaptive_ledger_get(
        &self,
        name: &str,
        i: usize,
    ) -> Result<Option<&crate::adaptive::AdaptiveLedgerEntry>> {
        Ok(self.adaptive_surface(name)?.ledger_get(i))
    }

    /// The running digest over every decision a surface has ever made.
    pub fn adaptive_ledger_digest(&self, name: &str) -> Result<u64> {
        Ok(self.adaptive_surface(name)?.ledger_digest())
    }

    // ---- overload / admission (§6 overload policy, §8 isomorphism) -----

    /// Evaluate the installed CORE-fallback admission policy for
    /// `used`/`capacity`.
    #[must_use]
    pub fn overload_evaluate(&self, used: u64, capacity: u64) -> Admission {
        self.overload.evaluate(used, capacity)
    }

    /// Install a new CORE-fallback threshold.
    pub fn overload_set_policy(&mut self, policy: CoreFallback) {
        self.overload = policy;
    }

    /// Check admission via the installed policy and emit an
    /// `AdmissionRejected` trace event if rejected.
    pub fn admission_check(&mut self, used: u64, capacity: u64) -> Admission {
        let admission = self.overload.evaluate(used, capacity);
        if admission.triggered() {
            self.emit_trace(TraceKind::AdmissionRejected, used, capacity);
        }
        admission
    }

    // ---- snapshot (L15, aggregate replay comparison) -------------------

    /// Capture a deterministic, point-in-time projection of every region,
    /// task, obligation, channel, and the timer wheel's pending count,
    /// correlated to the current trace digest.
    #[must_use]
    pub fn snapshot(&self) -> crate::snapshot::Snapshot {
        let regions = self
            .regions
            .iter()
            .map(|(_, r)| crate::snapshot::RegionSnapshot {
                id: r.id(),
                state: r.state(),
                poisoned: r.is_poisoned(),
                child_count: r.children().len(),
                obligation_count: r.obligations().len(),
            })
            .collect();
        let tasks = self
            .tasks
            .iter()
            .map(|(_, t)| crate::snapshot::TaskSnapshot {
                id: t.id(),
                region: t.region(),
                state: t.state(),
                has_witness: t.witness().is_some(),
            })
            .collect();
        let obligations = self
            .obligations
            .iter()
            .map(|(_, o)| crate::snapshot::ObligationSnapshot {
                id: o.id(),
                region: o.region(),
                state: o.state(),
            })
            .collect();
        let channels = self
            .channels
            .iter()
            .map(|(_, c)| crate::snapshot::ChannelSnapshot {
                id: c.id(),
                state: c.state(),
                queue_len: c.queue_len(),
                reserved_count: c.reserved_count(),
                capacity: c.capacity(),
            })
            .collect();
        crate::snapshot::Snapshot {
            regions,
            tasks,
            obligations,
            channels,
            timers: crate::snapshot::TimerSnapshot {
                pending_count: self.timers.pending_count(),
            },
            trace_digest: self.trace.digest(),
        }
    }
}

const fn region_state_label(state: RegionState) -> &'static str {
    match state {
        RegionState::Open => "open",
        RegionState::Closing => "closing",
        RegionState::Draining => "draining",
        RegionState::Finalizing => "finalizing",
        RegionState::Closed => "closed",
    }
}

const fn task_state_label(state: TaskState) -> &'static str {
    match state {
        TaskState::Created => "created",
        TaskState::Running => "running",
        TaskState::CancelRequested => "cancel-requested",
        TaskState::Cancelling => "cancelling",
        TaskState::Finalizing => "finalizing",
        TaskState::Completed => "completed",
    }
}

const fn obligation_state_label(state: ObligationState) -> &'static str {
    match state {
        ObligationState::Reserved => "reserved",
        ObligationState::Committed => "committed",
        ObligationState::Aborted => "aborted",
        ObligationState::Leaked => "leaked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::task::{PollOutcome, Pollable};

    struct YieldN {
        remaining: u32,
    }

    impl Pollable for YieldN {
        fn poll(&mut self) -> PollOutcome {
            if self.remaining == 0 {
                PollOutcome::Ready
            } else {
                self.remaining -= 1;
                PollOutcome::Pending
            }
        }
    }

    fn yields(n: u32) -> BoxedPollable {
        Box::new(YieldN { remaining: n })
    }

    #[test]
    fn region_open_spawn_drain_completes() {
        let mut kernel = Kernel::new(KernelConfig::default());
        let region = kernel.region_open(None).unwrap();
        let task = kernel.task_spawn(region, yields(0)).unwrap();
        kernel
            .region_drain(region, Budget::new().with_poll_quota(10))
            .unwrap();
        assert_eq!(kernel.region_get_state(region).unwrap(), RegionState::Closed);
        assert!(matches!(kernel.task_get_outcome(task).unwrap(), Outcome::Ok));
    }

    #[test]
    fn task_arena_exhaustion_is_reported() {
        let mut kernel = Kernel::new(KernelConfig {
            task_capacity: 1,
            ..KernelConfig::default()
        });
        let region = kernel.region_open(None).unwrap();
        kernel.task_spawn(region, yields(0)).unwrap();
        assert!(matches!(
            kernel.task_spawn(region, yields(0)),
            Err(KernelError::TaskResourceExhausted)
        ));
    }

    #[test]
    fn obligation_double_resolve_is_rejected() {
        let mut kernel = Kernel::new(KernelConfig::default());
        let region = kernel.region_open(None).unwrap();
        let obligation = kernel.obligation_reserve(region).unwrap();
        kernel.obligation_commit(obligation).unwrap();
        assert!(matches!(
            kernel.obligation_abort(obligation),
            Err(KernelError::ObligationAlreadyResolved)
        ));
    }

    #[test]
    fn cancel_propagate_counts_non_terminal_children() {
        let mut kernel = Kernel::new(KernelConfig::default());
        let region = kernel.region_open(None).unwrap();
        for _ in 0..8 {
            kernel.task_spawn(region, yields(5)).unwrap();
        }
        let affected = kernel
            .cancel_propagate(region, CancelReason::shutdown())
            .unwrap();
        assert_eq!(affected, 8);
    }

    #[test]
    fn cancel_propagate_bounds_depth() {
        let mut kernel = Kernel::new(KernelConfig {
            cancel_attribution: CancelAttributionConfig {
                max_propagation_depth: 2,
            },
            ..KernelConfig::default()
        });
        let region = kernel.region_open(None).unwrap();
        for _ in 0..3 {
            kernel.task_spawn(region, yields(5)).unwrap();
        }
        assert!(matches!(
            kernel.cancel_propagate(region, CancelReason::shutdown()),
            Err(KernelError::PropagationDepthExceeded)
        ));
    }

    #[test]
    fn finalize_leaks_unresolved_obligations_but_still_closes() {
        let mut kernel = Kernel::new(KernelConfig::default());
        let region = kernel.region_open(None).unwrap();
        let obligation = kernel.obligation_reserve(region).unwrap();
        kernel
            .region_drain(region, Budget::new().with_poll_quota(10))
            .unwrap();
        assert_eq!(kernel.region_get_state(region).unwrap(), RegionState::Closed);
        assert_eq!(kernel.obligation(obligation).unwrap().state(), ObligationState::Leaked);
    }

    #[test]
    fn checkpoint_reports_cancellation_without_mutating_state() {
        let mut kernel = Kernel::new(KernelConfig::default());
        let region = kernel.region_open(None).unwrap();
        let task = kernel.task_spawn(region, yields(5)).unwrap();
        kernel.task_cancel(task, CancelReason::user("stop")).unwrap();
        let (cancelled, reason) = kernel.task_checkpoint(task).unwrap();
        assert!(cancelled);
        assert_eq!(reason.message, Some("stop"));
        assert_eq!(kernel.task_get_state(task).unwrap(), TaskState::CancelRequested);
    }
}
