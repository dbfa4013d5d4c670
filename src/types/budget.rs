//! Budget algebra: the resource envelope attached to cleanup, cancellation,
//! and scheduling work.
//!
//! A [`Budget`] bounds four independent dimensions — a deadline, a poll
//! quota, a cost quota, and a priority — and the algebra defines how two
//! budgets combine ([`Budget::meet`], the most restrictive of each
//! dimension) and how a budget is spent ([`Budget::consume`]).

use crate::types::id::Time;
use core::fmt;

/// A resource envelope: how long, how many polls, how much cost, and at
/// what priority a piece of work may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// The latest time by which this work must have reached a terminal
    /// state. `None` means no deadline.
    pub deadline: Option<Time>,
    /// Remaining number of scheduler polls this work may consume.
    pub poll_quota: u32,
    /// Remaining abstract cost units this work may consume.
    pub cost_quota: u64,
    /// Scheduling priority; higher values are serviced first within the
    /// cancel lane.
    pub priority: u8,
}

impl Budget {
    /// An unconstrained budget: no deadline, maximal quotas, lowest
    /// priority.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadline: None,
            poll_quota: u32::MAX,
            cost_quota: u64::MAX,
            priority: 0,
        }
    }

    /// Set the poll quota.
    #[must_use]
    pub const fn with_poll_quota(mut self, poll_quota: u32) -> Self {
        self.poll_quota = poll_quota;
        self
    }

    /// Set the cost quota.
    #[must_use]
    pub const fn with_cost_quota(mut self, cost_quota: u64) -> Self {
        self.cost_quota = cost_quota;
        self
    }

    /// Set the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Time) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Combine two budgets into the most restrictive envelope that
    /// satisfies both: the earlier deadline, the smaller quotas, and the
    /// higher priority (priority is a "how urgent", not a limit, so the
    /// meet takes the max).
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        Self {
            deadline: match (self.deadline, other.deadline) {
                (Some(a), Some(b)) => Some(if a < b { a } else { b }),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            },
            poll_quota: self.poll_quota.min(other.poll_quota),
            cost_quota: self.cost_quota.min(other.cost_quota),
            priority: self.priority.max(other.priority),
        }
    }

    /// Spend one poll and `cost` abstract units. Returns `true` if the
    /// budget was exhausted by this call (saturating, never underflows).
    pub fn consume(&mut self, cost: u64) -> bool {
        self.poll_quota = self.poll_quota.saturating_sub(1);
        self.cost_quota = self.cost_quota.saturating_sub(cost);
        self.is_exhausted_at(None)
    }

    /// Whether the budget has run out of poll or cost quota, or (if `now`
    /// is given) its deadline has passed.
    #[must_use]
    pub fn is_exhausted_at(&self, now: Option<Time>) -> bool {
        if self.poll_quota == 0 || self.cost_quota == 0 {
            return true;
        }
        match (self.deadline, now) {
            (Some(deadline), Some(now)) => now >= deadline,
            _ => false,
        }
    }

    /// Whether the quotas alone (ignoring any deadline) are exhausted.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.poll_quota == 0 || self.cost_quota == 0
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Budget(polls={}, cost={}, priority={}",
            self.poll_quota, self.cost_quota, self.priority
        )?;
        if let Some(deadline) = self.deadline {
            write!(f, ", deadline={deadline}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_takes_tighter_quotas() {
        let a = Budget::new().with_poll_quota(10).with_cost_quota(100);
        let b = Budget::new().with_poll_quota(5).with_cost_quota(200);
        let m = a.meet(b);
        assert_eq!(m.poll_quota, 5);
        assert_eq!(m.cost_quota, 100);
    }

    #[test]
    fn meet_takes_earlier_deadline() {
        let a = Budget::new().with_deadline(Time::from_secs(10));
        let b = Budget::new().with_deadline(Time::from_secs(5));
        assert_eq!(a.meet(b).deadline, Some(Time::from_secs(5)));
    }

    #[test]
    fn meet_takes_higher_priority() {
        let a = Budget::new().with_priority(10);
        let b = Budget::new().with_priority(200);
        assert_eq!(a.meet(b).priority, 200);
    }

    #[test]
    fn consume_decrements_and_reports_exhaustion() {
        let mut b = Budget::new().with_poll_quota(1).with_cost_quota(5);
        assert!(!b.consume(1));
        assert_eq!(b.poll_quota, 0);
        assert!(b.is_exhausted());
    }

    #[test]
    fn consume_never_underflows() {
        let mut b = Budget::new().with_poll_quota(0).with_cost_quota(0);
        assert!(b.consume(100));
        assert_eq!(b.poll_quota, 0);
        assert_eq!(b.cost_quota, 0);
    }

    #[test]
    fn deadline_exhaustion_requires_now() {
        let b = Budget::new().with_deadline(Time::from_secs(1));
        assert!(!b.is_exhausted_at(None));
        assert!(b.is_exhausted_at(Some(Time::from_secs(2))));
        assert!(!b.is_exhausted_at(Some(Time::from_millis(500))));
    }
}
