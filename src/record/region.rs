//! Region entity record (§3 "Region").

use crate::cleanup::CleanupStack;
use crate::transition::RegionState;
use crate::types::{ChannelId, ObligationId, RegionId, TaskId};
use crate::util::{ArenaIndex, DetHashSet};

/// A fixed-size byte pool a region hands out slices of to captured task
/// user-data (`spawn_captured`). Allocation is bump-pointer and never
/// shrinks mid-region; the whole arena is reclaimed when the region is
/// destroyed.
#[derive(Debug)]
pub struct CaptureArena {
    storage: Vec<u8>,
    cursor: usize,
}

impl CaptureArena {
    /// Create a capture arena with exactly `capacity` bytes of backing
    /// storage.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity],
            cursor: 0,
        }
    }

    /// Total declared capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes already handed out.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.cursor
    }

    /// Bump-allocate `len` bytes, returning the offset they start at.
    ///
    /// Returns `None` if the arena does not have `len` bytes of headroom
    /// remaining.
    pub fn allocate(&mut self, len: usize) -> Option<usize> {
        let end = self.cursor.checked_add(len)?;
        if end > self.storage.len() {
            return None;
        }
        let offset = self.cursor;
        self.cursor = end;
        Some(offset)
    }

    /// Byte slice for a previously allocated `(offset, len)` span.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.storage[offset..offset + len]
    }

    /// Mutable byte slice for a previously allocated `(offset, len)` span.
    #[must_use]
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.storage[offset..offset + len]
    }
}

/// The region entity record (§3).
pub struct RegionRecord {
    id: RegionId,
    state: RegionState,
    parent: Option<RegionId>,
    children: Vec<TaskId>,
    obligations: DetHashSet<ObligationId>,
    channels: DetHashSet<ChannelId>,
    timers: DetHashSet<ArenaIndex>,
    poisoned: bool,
    cleanup: CleanupStack,
    capture: CaptureArena,
}

impl RegionRecord {
    /// Create a new region record in `Open` state with the given capture
    /// arena and cleanup-stack capacities.
    #[must_use]
    pub fn new(
        id: RegionId,
        parent: Option<RegionId>,
        capture_capacity: usize,
        cleanup_capacity: usize,
    ) -> Self {
        Self {
            id,
            state: RegionState::Open,
            parent,
            children: Vec::new(),
            obligations: DetHashSet::default(),
            channels: DetHashSet::default(),
            timers: DetHashSet::default(),
            poisoned: false,
            cleanup: CleanupStack::with_capacity(cleanup_capacity),
            capture: CaptureArena::with_capacity(capture_capacity),
        }
    }

    /// This region's own handle.
    #[must_use]
    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// Fix up this record's self-handle once its arena slot is known.
    ///
    /// `new` constructs the record before the arena assigns a slot, so the
    /// kernel inserts with a placeholder id and corrects it immediately
    /// after; nothing else may call this once the region is reachable.
    pub(crate) fn set_id(&mut self, id: RegionId) {
        self.id = id;
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RegionState {
        self.state
    }

    /// Set the lifecycle state directly. Callers must have already
    /// validated the transition via [`crate::transition::region_transition_allowed`];
    /// this setter performs no validation itself so the kernel layer can
    /// emit trace/ghost events around the check.
    pub fn set_state(&mut self, state: RegionState) {
        self.state = state;
    }

    /// The parent region, if any (regions may nest).
    #[must_use]
    pub const fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    /// Tasks spawned directly into this region, in spawn order.
    #[must_use]
    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    /// Record a newly spawned child task.
    pub fn add_child(&mut self, task: TaskId) {
        self.children.push(task);
    }

    /// Obligations reserved against this region.
    #[must_use]
    pub fn obligations(&self) -> &DetHashSet<ObligationId> {
        &self.obligations
    }

    /// Record a newly reserved obligation.
    pub fn add_obligation(&mut self, obligation: ObligationId) {
        self.obligations.insert(obligation);
    }

    /// Drop an obligation from the tracked set once it resolves.
    pub fn remove_obligation(&mut self, obligation: ObligationId) {
        self.obligations.remove(&obligation);
    }

    /// Channels created against this region.
    #[must_use]
    pub fn channels(&self) -> &DetHashSet<ChannelId> {
        &self.channels
    }

    /// Record a newly created channel.
    pub fn add_channel(&mut self, channel: ChannelId) {
        self.channels.insert(channel);
    }

    /// Timers registered against this region.
    #[must_use]
    pub fn timers(&self) -> &DetHashSet<ArenaIndex> {
        &self.timers
    }

    /// Record a newly registered timer.
    pub fn add_timer(&mut self, timer: ArenaIndex) {
        self.timers.insert(timer);
    }

    /// Drop a timer from the tracked set once it fires or is cancelled.
    pub fn remove_timer(&mut self, timer: ArenaIndex) {
        self.timers.remove(&timer);
    }

    /// Whether `poison` has been called on this region.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Poison the region: further spawn/reserve calls fail, without
    /// changing `state`.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    /// This region's cleanup stack.
    #[must_use]
    pub fn cleanup(&mut self) -> &mut CleanupStack {
        &mut self.cleanup
    }

    /// This region's capture arena.
    #[must_use]
    pub fn capture(&mut self) -> &mut CaptureArena {
        &mut self.capture
    }

    /// Whether every child task is terminal and every obligation is
    /// resolved — the quiescence predicate (§4.2, §8 property 1).
    #[must_use]
    pub fn is_quiescent(&self, task_is_terminal: impl Fn(TaskId) -> bool) -> bool {
        self.children.iter().all(|t| task_is_terminal(*t)) && self.obligations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_arena_bump_allocates() {
        let mut arena = CaptureArena::with_capacity(16);
        let a = arena.allocate(8).unwrap();
        let b = arena.allocate(8).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 8);
        assert!(arena.allocate(1).is_none());
    }

    #[test]
    fn capture_arena_slice_roundtrip() {
        let mut arena = CaptureArena::with_capacity(4);
        let off = arena.allocate(4).unwrap();
        arena.slice_mut(off, 4).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.slice(off, 4), &[1, 2, 3, 4]);
    }

    #[test]
    fn region_poison_does_not_change_state() {
        let mut region = RegionRecord::new(RegionId::new_for_test(0, 0), None, 64, 8);
        region.poison();
        assert!(region.is_poisoned());
        assert_eq!(region.state(), RegionState::Open);
    }

    #[test]
    fn region_quiescent_when_children_terminal_and_obligations_resolved() {
        let mut region = RegionRecord::new(RegionId::new_for_test(0, 0), None, 64, 8);
        let t1 = TaskId::new_for_test(1, 0);
        region.add_child(t1);
        assert!(!region.is_quiescent(|_| false));
        assert!(region.is_quiescent(|_| true));

        let obligation = ObligationId::new_for_test(0, 0);
        region.add_obligation(obligation);
        assert!(!region.is_quiescent(|_| true));
        region.remove_obligation(obligation);
        assert!(region.is_quiescent(|_| true));
    }
}
