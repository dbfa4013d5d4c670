//! LIFO cleanup stack with generation-validated handles (L4).
//!
//! Each region owns one [`CleanupStack`]. Callbacks registered via
//! [`CleanupStack::push`] run in reverse registration order when the stack
//! is [`CleanupStack::drain`]ed, exactly once each — the deterministic
//! unwind a region performs while finalizing.

use crate::util::{Arena, ArenaError, ArenaIndex};

/// A handle to a pushed cleanup callback, returned by [`CleanupStack::push`].
pub type CleanupHandle = ArenaIndex;

type Callback = Box<dyn FnOnce() + Send>;

/// LIFO stack of cleanup callbacks for one region.
pub struct CleanupStack {
    slots: Arena<Callback>,
    order: Vec<ArenaIndex>,
    drained: bool,
}

impl CleanupStack {
    /// Create a stack with room for `capacity` pending callbacks.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Arena::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            drained: false,
        }
    }

    /// Register a callback, returning the handle that addresses it. A push
    /// after a full drain is allowed and clears the `drained` flag.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Full`] if capacity has been reached.
    pub fn push<F>(&mut self, callback: F) -> Result<CleanupHandle, ArenaError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.slots.insert(Box::new(callback))?;
        self.order.push(handle);
        self.drained = false;
        Ok(handle)
    }

    /// Remove a callback before it runs, without invoking it.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::NotFound`]/[`ArenaError::Stale`] if `handle`
    /// does not address a live callback.
    pub fn pop(&mut self, handle: CleanupHandle) -> Result<(), ArenaError> {
        self.slots.remove(handle)?;
        self.order.retain(|h| *h != handle);
        Ok(())
    }

    /// Number of callbacks currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no callbacks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.len() == 0
    }

    /// Whether this stack has been drained since its last push.
    #[must_use]
    pub const fn is_drained(&self) -> bool {
        self.drained
    }

    /// Invoke every still-pending callback exactly once, top (most recently
    /// pushed) to bottom, then mark the stack drained.
    pub fn drain(&mut self) {
        for handle in self.order.drain(..).rev() {
            if let Ok(callback) = self.slots.remove(handle) {
                callback();
            }
        }
        self.drained = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn drain_runs_callbacks_in_lifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::with_capacity(4);
        for i in 0..3 {
            let log = Arc::clone(&log);
            stack.push(move || log.lock().unwrap().push(i)).unwrap();
        }
        stack.drain();
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn drain_runs_each_callback_exactly_once() {
        let count = Arc::new(Mutex::new(0));
        let mut stack = CleanupStack::with_capacity(5);
        for _ in 0..5 {
            let count = Arc::clone(&count);
            stack.push(move || *count.lock().unwrap() += 1).unwrap();
        }
        stack.drain();
        assert_eq!(*count.lock().unwrap(), 5);
        stack.drain();
        assert_eq!(*count.lock().unwrap(), 5);
    }

    #[test]
    fn popped_callback_does_not_run() {
        let ran = Arc::new(Mutex::new(false));
        let mut stack = CleanupStack::with_capacity(4);
        let ran2 = Arc::clone(&ran);
        let handle = stack.push(move || *ran2.lock().unwrap() = true).unwrap();
        stack.pop(handle).unwrap();
        stack.drain();
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn drained_flag_resets_on_repush() {
        let mut stack: CleanupStack = CleanupStack::with_capacity(2);
        stack.push(|| {}).unwrap();
        stack.drain();
        assert!(stack.is_drained());
        stack.push(|| {}).unwrap();
        assert!(!stack.is_drained());
    }

    #[test]
    fn full_stack_rejects_push() {
        let mut stack: CleanupStack = CleanupStack::with_capacity(1);
        stack.push(|| {}).unwrap();
        assert_eq!(stack.push(|| {}), Err(ArenaError::Full));
    }
}
