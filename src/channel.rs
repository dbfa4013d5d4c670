//! Bounded MPSC channel with a two-phase reserve/commit-or-abort send
//! protocol (L7, §4.4).
//!
//! A [`Channel`] is owned by a region and backed by a fixed-capacity ring.
//! Sending is split into [`Channel::try_reserve`] (allocate a single-use
//! [`Permit`]) and [`Channel::permit_send`] / [`Channel::permit_abort`]
//! (consume it). This is what makes capacity accounting race-free without
//! locks: a reservation is charged against `capacity` the moment it is
//! made, so a sender can never observe headroom that a second sender has
//! already claimed.

use crate::error::KernelError;
use crate::types::ChannelId;
use std::collections::VecDeque;

/// Lifecycle state of a [`Channel`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Both ends open.
    Open,
    /// The sender side has closed; the receiver may still drain the
    /// queue.
    SenderClosed,
    /// The receiver side has closed; the queue has been discarded.
    ReceiverClosed,
    /// Both ends have closed.
    FullyClosed,
}

/// A single-use token proving a reserved slot on a channel.
///
/// Token `0` is reserved as "invalid" per §4.4; [`Channel::try_reserve`]
/// never issues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permit {
    channel: ChannelId,
    token: u64,
}

impl Permit {
    /// The channel this permit was reserved against.
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// A bounded, single-producer-capable-of-many ring with two-phase send
/// accounting.
pub struct Channel<T> {
    id: ChannelId,
    capacity: usize,
    queue: VecDeque<T>,
    reserved: usize,
    state: ChannelState,
    next_token: u64,
    /// Outstanding permits: token -> expected-to-be-consumed marker. A
    /// free slot is simply absent from this table.
    outstanding: std::collections::HashMap<u64, (), crate::util::DetBuildHasher>,
}

impl<T> Channel<T> {
    /// Create a channel with the given handle and fixed capacity.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidArgument`] if `capacity` is zero.
    pub fn new(id: ChannelId, capacity: usize) -> Result<Self, KernelError> {
        if capacity == 0 {
            return Err(KernelError::InvalidArgument("channel capacity must be nonzero"));
        }
        Ok(Self {
            id,
            capacity,
            queue: VecDeque::with_capacity(capacity),
            reserved: 0,
            state: ChannelState::Open,
            next_token: 1,
            outstanding: std::collections::HashMap::default(),
        })
    }

    /// This channel's own handle.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Fix up this record's self-handle once its arena slot is known (see
    /// [`crate::record::region::RegionRecord::set_id`]).
    pub(crate) fn set_id(&mut self, id: ChannelId) {
        self.id = id;
    }

    /// Declared fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of committed values currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of outstanding (not yet sent or aborted) permits.
    #[must_use]
    pub const fn reserved_count(&self) -> usize {
        self.reserved
    }

    fn check_invariant(&self) {
        debug_assert!(self.queue.len() + self.reserved <= self.capacity);
    }

    /// Reserve one slot of capacity, returning a single-use [`Permit`].
    ///
    /// # Errors
    ///
    /// - [`KernelError::ChannelFull`] if `queue_len + reserved_count ==
    ///   capacity`.
    /// - [`KernelError::Disconnected`] if the receiver has closed.
    /// - [`KernelError::InvalidChannelState`] if the sender side has
    ///   already closed.
    pub fn try_reserve(&mut self) -> Result<Permit, KernelError> {
        match self.state {
            ChannelState::ReceiverClosed | ChannelState::FullyClosed => {
                return Err(KernelError::Disconnected);
            }
            ChannelState::SenderClosed => return Err(KernelError::InvalidChannelState),
            ChannelState::Open => {}
        }
        if self.queue.len() + self.reserved >= self.capacity {
            return Err(KernelError::ChannelFull);
        }
        let token = self.next_token;
        self.next_token += 1;
        self.outstanding.insert(token, ());
        self.reserved += 1;
        self.check_invariant();
        Ok(Permit {
            channel: self.id,
            token,
        })
    }

    /// Consume a permit, enqueueing `value` at the tail.
    ///
    /// FIFO order is guaranteed with respect to commit order (the order
    /// `permit_send` calls are made), not reservation order — see
    /// `DESIGN.md` Open Question C.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidChannelState`] if `permit` addresses this
    /// channel but has already been consumed (sent or aborted).
    pub fn permit_send(&mut self, permit: Permit, value: T) -> Result<(), KernelError> {
        self.consume_permit(permit)?;
        self.queue.push_back(value);
        self.reserved -= 1;
        self.check_invariant();
        Ok(())
    }

    /// Consume a permit without enqueueing, returning its capacity to the
    /// channel.
    ///
    /// # Errors
    ///
    /// Same as [`permit_send`](Self::permit_send).
    pub fn permit_abort(&mut self, permit: Permit) -> Result<(), KernelError> {
        self.consume_permit(permit)?;
        self.reserved -= 1;
        self.check_invariant();
        Ok(())
    }

    fn consume_permit(&mut self, permit: Permit) -> Result<(), KernelError> {
        if permit.channel != self.id {
            return Err(KernelError::InvalidChannelState);
        }
        if self.outstanding.remove(&permit.token).is_none() {
            return Err(KernelError::InvalidChannelState);
        }
        Ok(())
    }

    /// Pop the head of the queue.
    ///
    /// # Errors
    ///
    /// - [`KernelError::WouldBlock`] if the queue is empty and the sender
    ///   side is still open.
    /// - [`KernelError::Disconnected`] if the queue is empty and the
    ///   sender has closed.
    pub fn try_recv(&mut self) -> Result<T, KernelError> {
        if let Some(value) = self.queue.pop_front() {
            return Ok(value);
        }
        match self.state {
            ChannelState::SenderClosed | ChannelState::FullyClosed => {
                Err(KernelError::Disconnected)
            }
            ChannelState::Open | ChannelState::ReceiverClosed => Err(KernelError::WouldBlock),
        }
    }

    /// Close the sender side. The queue (anything already committed) is
    /// preserved so the receiver can drain it.
    pub fn close_sender(&mut self) {
        self.state = match self.state {
            ChannelState::Open => ChannelState::SenderClosed,
            ChannelState::ReceiverClosed => ChannelState::FullyClosed,
            other => other,
        };
    }

    /// Close the receiver side. The queue is discarded immediately since
    /// nothing can ever read it again.
    pub fn close_receiver(&mut self) {
        self.queue.clear();
        self.state = match self.state {
            ChannelState::Open => ChannelState::ReceiverClosed,
            ChannelState::SenderClosed => ChannelState::FullyClosed,
            other => other,
        };
    }

    /// Whether the channel has fully closed and drained, i.e. safe for
    /// region finalize to consider it resolved.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        matches!(self.state, ChannelState::FullyClosed) && self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> Channel<i32> {
        Channel::new(ChannelId::new_for_test(0, 0), capacity).unwrap()
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            Channel::<i32>::new(ChannelId::new_for_test(0, 0), 0),
            Err(KernelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn scenario_s2_fifo_channel() {
        let mut ch = channel(4);
        let mut permits = Vec::new();
        for _ in 0..4 {
            permits.push(ch.try_reserve().unwrap());
        }
        assert!(matches!(ch.try_reserve(), Err(KernelError::ChannelFull)));
        for (permit, value) in permits.into_iter().zip([1, 2, 3, 4]) {
            ch.permit_send(permit, value).unwrap();
        }
        assert_eq!(ch.try_recv().unwrap(), 1);
        assert_eq!(ch.try_recv().unwrap(), 2);
        assert_eq!(ch.try_recv().unwrap(), 3);
        assert_eq!(ch.try_recv().unwrap(), 4);
        assert!(matches!(ch.try_recv(), Err(KernelError::WouldBlock)));
    }

    #[test]
    fn permit_reuse_is_rejected() {
        let mut ch = channel(2);
        let permit = ch.try_reserve().unwrap();
        ch.permit_send(permit, 1).unwrap();
        assert!(matches!(
            ch.permit_send(permit, 2),
            Err(KernelError::InvalidChannelState)
        ));
        assert!(matches!(
            ch.permit_abort(permit),
            Err(KernelError::InvalidChannelState)
        ));
    }

    #[test]
    fn abort_returns_capacity() {
        let mut ch = channel(1);
        let permit = ch.try_reserve().unwrap();
        assert!(matches!(ch.try_reserve(), Err(KernelError::ChannelFull)));
        ch.permit_abort(permit).unwrap();
        assert_eq!(ch.reserved_count(), 0);
        ch.try_reserve().unwrap();
    }

    #[test]
    fn close_receiver_discards_queue_close_sender_preserves() {
        let mut preserved = channel(2);
        let permit = preserved.try_reserve().unwrap();
        preserved.permit_send(permit, 1).unwrap();
        preserved.close_sender();
        assert_eq!(preserved.queue_len(), 1);
        assert_eq!(preserved.try_recv().unwrap(), 1);

        let mut discarded = channel(2);
        let permit = discarded.try_reserve().unwrap();
        discarded.permit_send(permit, 1).unwrap();
        discarded.close_receiver();
        assert_eq!(discarded.queue_len(), 0);
    }

    #[test]
    fn closing_both_sides_reaches_fully_closed_and_drained() {
        let mut ch = channel(1);
        ch.close_sender();
        ch.close_receiver();
        assert_eq!(ch.state(), ChannelState::FullyClosed);
        assert!(ch.is_drained());
    }

    #[test]
    fn invariant_holds_after_interleaved_operations() {
        let mut ch = channel(3);
        let p1 = ch.try_reserve().unwrap();
        let p2 = ch.try_reserve().unwrap();
        ch.permit_send(p1, 10).unwrap();
        let p3 = ch.try_reserve().unwrap();
        ch.permit_abort(p2).unwrap();
        ch.permit_send(p3, 20).unwrap();
        assert!(ch.queue_len() + ch.reserved_count() <= ch.capacity());
        assert_eq!(ch.try_recv().unwrap(), 10);
        assert_eq!(ch.try_recv().unwrap(), 20);
    }
}
