//! Core types shared across the kernel.
//!
//! - [`id`]: Identifier types (`RegionId`, `TaskId`, `ObligationId`,
//!   `ChannelId`, `Time`)
//! - [`outcome`]: Four-valued outcome lattice with a left-biased join
//! - [`cancel`]: Cancellation reason/kind/witness types (L11)
//! - [`budget`]: Resource envelope algebra (L3)

pub mod budget;
pub mod cancel;
pub mod id;
pub mod outcome;

pub use budget::Budget;
pub use cancel::{
    CancelAttributionConfig, CancelKind, CancelPhase, CancelReason, CancelWitness,
    CancelWitnessError,
};
pub use id::{ChannelId, ObligationId, RegionId, TaskId, Time};
pub use outcome::{Outcome, OutcomeError, PanicPayload, Severity, join2, join_outcomes};
