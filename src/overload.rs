//! Overload / admission policy: the domain-agnostic CORE fallback and the
//! isomorphism sweep that checks an accelerated policy never admits what
//! CORE rejects (L13, §4.8).

/// The admission decision an [`AdmissionPolicy`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request is admitted.
    Admit,
    /// The request is rejected under the admission-closed status.
    Reject,
}

impl Admission {
    /// Whether this decision is a rejection.
    #[must_use]
    pub const fn triggered(self) -> bool {
        matches!(self, Self::Reject)
    }
}

/// Anything that can answer "admit or reject" for a `(used, capacity)`
/// pair.
pub trait AdmissionPolicy {
    /// Evaluate the policy for the given load.
    fn evaluate(&self, used: u64, capacity: u64) -> Admission;
}

/// The domain-agnostic CORE fallback policy (§4.8): reject once load
/// reaches 90%, or unconditionally if capacity is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreFallback {
    /// Load percentage (of `capacity`) at or above which CORE rejects.
    pub reject_at_percent: u64,
}

impl CoreFallback {
    /// The spec-mandated threshold: reject at 90% load.
    pub const DEFAULT_THRESHOLD_PERCENT: u64 = 90;

    /// Construct the standard CORE policy (reject at 90%).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reject_at_percent: Self::DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl Default for CoreFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionPolicy for CoreFallback {
    fn evaluate(&self, used: u64, capacity: u64) -> Admission {
        if capacity == 0 {
            return Admission::Reject;
        }
        let load_percent = used.saturating_mul(100) / capacity;
        if load_percent >= self.reject_at_percent {
            Admission::Reject
        } else {
            Admission::Admit
        }
    }
}

/// The first `(used, capacity)` pair, if any, where an accelerated policy
/// admits something CORE rejects — a counterexample to the isomorphism
/// contract.
#[must_use]
pub fn isomorphism_counterexample(
    accelerated: &dyn AdmissionPolicy,
    capacity: u64,
) -> Option<(u64, Admission, Admission)> {
    let fallback = CoreFallback::new();
    (0..=capacity).find_map(|used| {
        let accel = accelerated.evaluate(used, capacity);
        let core = fallback.evaluate(used, capacity);
        if !accel.triggered() && core.triggered() {
            Some((used, accel, core))
        } else {
            None
        }
    })
}

/// Whether `accelerated` satisfies the isomorphism contract against CORE
/// over the full `0..=capacity` sweep (§4.8, §8 property 7, scenario S6).
#[must_use]
pub fn isomorphism_holds(accelerated: &dyn AdmissionPolicy, capacity: u64) -> bool {
    isomorphism_counterexample(accelerated, capacity).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_admits_below_ninety_percent() {
        let core = CoreFallback::new();
        assert_eq!(core.evaluate(89, 100), Admission::Admit);
        assert_eq!(core.evaluate(90, 100), Admission::Reject);
    }

    #[test]
    fn core_rejects_zero_capacity() {
        let core = CoreFallback::new();
        assert_eq!(core.evaluate(0, 0), Admission::Reject);
    }

    struct StricterPolicy;
    impl AdmissionPolicy for StricterPolicy {
        fn evaluate(&self, used: u64, capacity: u64) -> Admission {
            if capacity == 0 {
                return Admission::Reject;
            }
            let load = used.saturating_mul(100) / capacity;
            if load >= 80 { Admission::Reject } else { Admission::Admit }
        }
    }

    struct LaxPolicy;
    impl AdmissionPolicy for LaxPolicy {
        fn evaluate(&self, used: u64, capacity: u64) -> Admission {
            if capacity == 0 {
                return Admission::Reject;
            }
            let load = used.saturating_mul(100) / capacity;
            if load >= 95 { Admission::Reject } else { Admission::Admit }
        }
    }

    #[test]
    fn scenario_s6_stricter_policy_preserves_isomorphism() {
        assert!(isomorphism_holds(&StricterPolicy, 100));
    }

    #[test]
    fn laxer_policy_breaks_isomorphism() {
        let counterexample = isomorphism_counterexample(&LaxPolicy, 100);
        assert!(counterexample.is_some());
        let (used, accel, core) = counterexample.unwrap();
        assert!(used >= 90 && used < 95);
        assert_eq!(accel, Admission::Admit);
        assert_eq!(core, Admission::Reject);
    }

    #[test]
    fn core_is_isomorphic_to_itself() {
        let core = CoreFallback::new();
        assert!(isomorphism_holds(&core, 200));
    }
}
