//! detcore: a deterministic structured-concurrency runtime kernel.
//!
//! # Overview
//!
//! detcore provides bounded, replayable execution of cooperative tasks
//! grouped into hierarchical regions with explicit lifecycle, explicit
//! obligations (linearity tokens), bounded channels, a timer wheel, and a
//! full event-trace/replay subsystem. It is the execution substrate for
//! latency-sensitive or safety-critical workloads — high-frequency trading
//! bursts, automotive watchdog loops, router admission control — where
//! every scheduling decision must be reproducible from a seed and fixture.
//!
//! # Core Guarantees
//!
//! - **Structured lifetimes**: every task belongs to a region; a region
//!   only reaches `Closed` once every child task is terminal and every
//!   obligation resolved.
//! - **Explicit obligations**: a linearity token reserved against a region
//!   must be committed or aborted exactly once, or it is reported `Leaked`
//!   at region finalization — never silently dropped.
//! - **Two-phase channel sends**: `try_reserve` → `permit_send` /
//!   `permit_abort` so capacity is never claimed and lost.
//! - **Deterministic scheduling**: ready-queue iteration by ascending slot
//!   index, timer firing by `(deadline, insertion_seq)`, globally monotonic
//!   trace sequence numbers — two runs of the same fixture produce
//!   byte-identical trace digests.
//! - **Cooperative, witnessed cancellation**: cancellation is a strictly
//!   monotonic `(phase, reason)` witness, observed at checkpoints, never a
//!   silent drop.
//!
//! # Module Structure
//!
//! - [`types`]: core types (handles, outcome lattice, budgets, cancel
//!   witnesses)
//! - [`record`]: region/task/obligation entity records (L6)
//! - [`transition`]: the three table-driven transition authorities (L1)
//! - [`kernel`]: the [`kernel::Kernel`], wiring every subsystem behind the
//!   public operation surface
//! - [`channel`]: the bounded two-phase MPSC channel (L7)
//! - [`timer`]: the timer wheel (L8)
//! - [`trace`]: the event trace / hash-chain / replay-verify subsystem (L9)
//! - [`hindsight`]: the nondeterminism-boundary ring (L10)
//! - [`cleanup`]: the LIFO cleanup stack (L4)
//! - [`snapshot`]: aggregate point-in-time state capture across regions,
//!   tasks, obligations, channels, and the timer wheel, for replay
//!   comparison (L15)
//! - [`overload`]: CORE-fallback admission policy and isomorphism sweep
//!   (L13)
//! - [`adaptive`]: expected-loss adaptive decision surfaces (L14)
//! - [`ghost`]: the ghost-monitor hook trait the kernel emits invariant
//!   violations through (L-GHOST)
//! - [`error`]: the status taxonomy and per-task error ledger (L-AMBIENT)
//! - [`observability`]: structured logging level types and the
//!   `tracing`-gated event macro (L-LOG)
//! - [`util`]: arenas, deterministic hashing, FNV-1a (L0)
//!
//! # API Stability
//!
//! detcore is currently in the 0.x series. Public items should be treated
//! as **unstable** and subject to change; [`types::Budget`],
//! [`types::Outcome`], and [`kernel::Kernel`] are intended to stabilize
//! first.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![cfg_attr(test, allow(clippy::large_stack_arrays))]

pub mod adaptive;
pub mod channel;
pub mod cleanup;
pub mod error;
pub mod ghost;
pub mod hindsight;
pub mod kernel;
pub mod observability;
pub mod overload;
pub mod record;
pub mod scheduler;
pub mod snapshot;
pub mod timer;
pub mod trace;
pub mod transition;
pub mod types;
pub mod util;

pub use error::{KernelError, LedgerEntry, LedgerSubject, Result, TaskErrorLedger};
pub use kernel::{ChannelValue, Kernel, KernelConfig, TimerWaker};
pub use overload::{Admission, AdmissionPolicy, CoreFallback};
pub use record::{ObligationRecord, PollOutcome, Pollable, RegionRecord, TaskRecord};
pub use snapshot::{Snapshot, SnapshotDivergence};
pub use transition::{ObligationState, RegionState, TaskState};
pub use types::{
    Budget, CancelKind, CancelPhase, CancelReason, CancelWitness, ChannelId, ObligationId,
    Outcome, RegionId, Severity, TaskId, Time,
};
