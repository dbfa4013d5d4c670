//! Aggregate point-in-time state capture across L6–L8 for replay comparison
//! (L15).
//!
//! A [`Snapshot`] is a flat, deterministically ordered projection of every
//! region, task, channel, and timer the kernel currently owns. Two kernels
//! driven from the same fixture and seed must produce identical snapshots
//! at the same trace sequence — this is the aggregate counterpart to
//! [`crate::trace::Trace`]'s per-event replay identity, useful for
//! asserting "the whole world looks the same" rather than replaying the
//! event-by-event history. Entries are sorted by ascending slot index
//! (matching [`crate::util::Arena::iter`]'s own iteration order) so the
//! digest is stable regardless of internal `HashMap`/`HashSet` iteration
//! order elsewhere in the kernel.

use crate::channel::ChannelState;
use crate::transition::{ObligationState, RegionState, TaskState};
use crate::types::{ChannelId, ObligationId, RegionId, TaskId};
use crate::util::Fnv1a;

/// A region's projected state at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSnapshot {
    /// The region's handle.
    pub id: RegionId,
    /// Lifecycle state.
    pub state: RegionState,
    /// Whether the region is poisoned.
    pub poisoned: bool,
    /// Number of child tasks (terminal or not).
    pub child_count: usize,
    /// Number of obligations still reserved against this region.
    pub obligation_count: usize,
}

/// A task's projected state at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// The task's handle.
    pub id: TaskId,
    /// The owning region.
    pub region: RegionId,
    /// Lifecycle state.
    pub state: TaskState,
    /// Whether the task carries an installed cancel witness.
    pub has_witness: bool,
}

/// An obligation's projected state at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObligationSnapshot {
    /// The obligation's handle.
    pub id: ObligationId,
    /// The owning region.
    pub region: RegionId,
    /// Lifecycle state.
    pub state: ObligationState,
}

/// A channel's projected state at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// The channel's handle.
    pub id: ChannelId,
    /// Lifecycle state.
    pub state: ChannelState,
    /// Committed values currently queued.
    pub queue_len: usize,
    /// Outstanding (reserved, unresolved) permits.
    pub reserved_count: usize,
    /// Declared fixed capacity.
    pub capacity: usize,
}

/// Aggregate count of live timers, without exposing individual deadlines
/// (deadlines are host-assigned opaque payloads; the count and pending
/// status are what a snapshot comparison needs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    /// Number of currently alive (not fired, not cancelled) timers.
    pub pending_count: usize,
}

/// A full point-in-time capture of every entity the kernel owns, in
/// deterministic (ascending slot index) order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Regions, ascending by slot index.
    pub regions: Vec<RegionSnapshot>,
    /// Tasks, ascending by slot index.
    pub tasks: Vec<TaskSnapshot>,
    /// Obligations, ascending by slot index.
    pub obligations: Vec<ObligationSnapshot>,
    /// Channels, ascending by slot index.
    pub channels: Vec<ChannelSnapshot>,
    /// Timer wheel aggregate state.
    pub timers: TimerSnapshot,
    /// The trace hash-chain digest at the moment this snapshot was taken,
    /// so a snapshot can be correlated back to a specific trace sequence.
    pub trace_digest: u64,
}

impl Snapshot {
    /// Fold this snapshot's fields into an FNV-1a digest, the same
    /// mixing function the trace and hindsight rings use, so all three
    /// replay-identity fingerprints are comparable in kind.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut acc = Fnv1a::new();
        acc.write_u64(self.regions.len() as u64);
        for r in &self.regions {
            acc.write_u64(r.id.arena_index().to_bits());
            acc.write_u64(r.state as u64);
            acc.write_u64(u64::from(r.poisoned));
            acc.write_u64(r.child_count as u64);
            acc.write_u64(r.obligation_count as u64);
        }
        acc.write_u64(self.tasks.len() as u64);
        for t in &self.tasks {
            acc.write_u64(t.id.arena_index().to_bits());
            acc.write_u64(t.region.arena_index().to_bits());
            acc.write_u64(t.state as u64);
            acc.write_u64(u64::from(t.has_witness));
        }
        acc.write_u64(self.obligations.len() as u64);
        for o in &self.obligations {
            acc.write_u64(o.id.arena_index().to_bits());
            acc.write_u64(o.region.arena_index().to_bits());
            acc.write_u64(o.state as u64);
        }
        acc.write_u64(self.channels.len() as u64);
        for c in &self.channels {
            acc.write_u64(c.id.arena_index().to_bits());
            acc.write_u64(c.state as u64);
            acc.write_u64(c.queue_len as u64);
            acc.write_u64(c.reserved_count as u64);
            acc.write_u64(c.capacity as u64);
        }
        acc.write_u64(self.timers.pending_count as u64);
        acc.write_u64(self.trace_digest);
        acc.finish()
    }

    /// Compare two snapshots field-for-field, returning the first
    /// mismatch found (region/task/obligation/channel count or entry
    /// mismatch, timer count mismatch, or a clean digest match).
    #[must_use]
    pub fn diverges_from(&self, reference: &Self) -> Option<SnapshotDivergence> {
        if self.regions.len() != reference.regions.len() {
            return Some(SnapshotDivergence::RegionCountMismatch);
        }
        for (i, (a, b)) in self.regions.iter().zip(&reference.regions).enumerate() {
            if a != b {
                return Some(SnapshotDivergence::RegionMismatch { index: i });
            }
        }
        if self.tasks.len() != reference.tasks.len() {
            return Some(SnapshotDivergence::TaskCountMismatch);
        }
        for (i, (a, b)) in self.tasks.iter().zip(&reference.tasks).enumerate() {
            if a != b {
                return Some(SnapshotDivergence::TaskMismatch { index: i });
            }
        }
        if self.obligations.len() != reference.obligations.len() {
            return Some(SnapshotDivergence::ObligationCountMismatch);
        }
        for (i, (a, b)) in self.obligations.iter().zip(&reference.obligations).enumerate() {
            if a != b {
                return Some(SnapshotDivergence::ObligationMismatch { index: i });
            }
        }
        if self.channels.len() != reference.channels.len() {
            return Some(SnapshotDivergence::ChannelCountMismatch);
        }
        for (i, (a, b)) in self.channels.iter().zip(&reference.channels).enumerate() {
            if a != b {
                return Some(SnapshotDivergence::ChannelMismatch { index: i });
            }
        }
        if self.timers != reference.timers {
            return Some(SnapshotDivergence::TimerMismatch);
        }
        None
    }
}

/// The first point of divergence found by [`Snapshot::diverges_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDivergence {
    /// Region counts differ.
    RegionCountMismatch,
    /// A region's projected state differs at `index`.
    RegionMismatch {
        /// Position in the (ascending slot-index) region list.
        index: usize,
    },
    /// Task counts differ.
    TaskCountMismatch,
    /// A task's projected state differs at `index`.
    TaskMismatch {
        /// Position in the (ascending slot-index) task list.
        index: usize,
    },
    /// Obligation counts differ.
    ObligationCountMismatch,
    /// An obligation's projected state differs at `index`.
    ObligationMismatch {
        /// Position in the (ascending slot-index) obligation list.
        index: usize,
    },
    /// Channel counts differ.
    ChannelCountMismatch,
    /// A channel's projected state differs at `index`.
    ChannelMismatch {
        /// Position in the (ascending slot-index) channel list.
        index: usize,
    },
    /// The timer wheel's pending count differs.
    TimerMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Snapshot {
        Snapshot::default()
    }

    #[test]
    fn identical_empty_snapshots_match() {
        assert_eq!(empty().diverges_from(&empty()), None);
        assert_eq!(empty().digest(), empty().digest());
    }

    #[test]
    fn region_count_mismatch_is_reported() {
        let mut a = empty();
        a.regions.push(RegionSnapshot {
            id: RegionId::new_for_test(0, 0),
            state: RegionState::Open,
            poisoned: false,
            child_count: 0,
            obligation_count: 0,
        });
        assert_eq!(
            a.diverges_from(&empty()),
            Some(SnapshotDivergence::RegionCountMismatch)
        );
    }

    #[test]
    fn digest_changes_when_a_task_state_differs() {
        let mut a = empty();
        a.tasks.push(TaskSnapshot {
            id: TaskId::new_for_test(0, 0),
            region: RegionId::new_for_test(0, 0),
            state: TaskState::Running,
            has_witness: false,
        });
        let mut b = a.clone();
        b.tasks[0].state = TaskState::Completed;
        assert_ne!(a.digest(), b.digest());
        assert_eq!(
            a.diverges_from(&b),
            Some(SnapshotDivergence::TaskMismatch { index: 0 })
        );
    }
}
