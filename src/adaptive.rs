//! Adaptive expected-loss decision layer (L14, §4.9).
//!
//! [`AdaptiveSurface`] is a thin kernel-side [`DecisionContract`] over the
//! workspace's `detcore-decision` crate: the kernel owns the state/action
//! space and loss matrix, `detcore-decision::evaluate` does the Bayesian
//! expected-loss arithmetic and fallback-policy check, and this module adds
//! the ring-buffered audit ledger (same shape as [`crate::trace::Trace`] and
//! [`crate::hindsight::Hindsight`]) plus the decision-budget override that
//! forces the fallback action once a region's adaptive budget is spent.
//!
//! A `decision_budget` of `0` means *unlimited* (§4.9 Open Question):
//! distinguishing "no budget configured" from "budget exhausted" would need
//! a second field, so the surface instead treats zero as the sentinel for
//! "never force a budget fallback", matching how [`crate::types::Budget`]
//! already treats `poll_quota`/`cost_quota` as hard counters with no such
//! sentinel — the adaptive layer is the one place in the kernel where zero
//! is deliberately overloaded, and it is documented here and in
//! `DESIGN.md`.

pub use detcore_decision::{
    DecisionAuditEntry, DecisionContract, DecisionOutcome, EvalContext, FallbackPolicy,
    LossMatrix, Posterior, ValidationError,
};
pub use detcore_evidence::EvidenceLedger;
pub use detcore_ids::{DecisionId, PolicyId, SchemaVersion, TraceId};

use crate::error::KernelError;
use crate::util::Fnv1a;

/// Wire-format version of the [`AdaptiveLedgerEntry`] shape this module
/// stamps on every retained decision, so a downstream comparator can check
/// compatibility before deserializing an exported ledger.
pub const LEDGER_ENTRY_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Rewrites a [`Posterior`] given an observed state index.
///
/// The default [`LikelihoodWeightedUpdate`] assigns the observed state a
/// high likelihood and every other state an equal share of the remainder,
/// then lets [`Posterior::bayesian_update`] do the normalization.
pub trait PosteriorUpdateRule {
    /// Apply one observation to `posterior`.
    fn update(&self, posterior: &mut Posterior, observed_state: usize);
}

/// The default update rule: observed state gets `high` likelihood, every
/// other state gets `low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodWeightedUpdate {
    /// Likelihood assigned to the observed state.
    pub high: f64,
    /// Likelihood assigned to every other state.
    pub low: f64,
}

impl Default for LikelihoodWeightedUpdate {
    fn default() -> Self {
        Self { high: 0.9, low: 0.1 }
    }
}

impl PosteriorUpdateRule for LikelihoodWeightedUpdate {
    fn update(&self, posterior: &mut Posterior, observed_state: usize) {
        let mut likelihoods = vec![self.low; posterior.len()];
        if let Some(slot) = likelihoods.get_mut(observed_state) {
            *slot = self.high;
        }
        posterior.bayesian_update(&likelihoods);
    }
}

/// A per-region decision budget: the number of decisions that may consult
/// the contract before every further call is forced to the fallback
/// action. `total == 0` means unlimited (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdaptiveBudget {
    total: u32,
    used: u32,
}

impl AdaptiveBudget {
    /// An unlimited budget (the default).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self { total: 0, used: 0 }
    }

    /// A budget that allows exactly `total` contract-backed decisions
    /// before forcing fallback. `total == 0` means unlimited.
    #[must_use]
    pub const fn with_total(total: u32) -> Self {
        Self { total, used: 0 }
    }

    /// Whether the budget has been exhausted (always `false` if unlimited).
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.total != 0 && self.used >= self.total
    }

    /// Remaining contract-backed decisions, or `None` if unlimited.
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        if self.total == 0 {
            None
        } else {
            Some(self.total.saturating_sub(self.used))
        }
    }

    fn record_use(&mut self) {
        if self.total != 0 {
            self.used = self.used.saturating_add(1);
        }
    }

    /// Reset the used counter without changing `total`.
    pub fn reset_usage(&mut self) {
        self.used = 0;
    }
}

/// Default adaptive-ledger ring capacity: small relative to the event
/// trace since each decision is already a coarse-grained summary.
pub const DEFAULT_LEDGER_CAPACITY: usize = 128;

/// One retained decision for [`AdaptiveSurface::ledger_get`].
///
/// The audit payload is a `detcore-evidence` [`EvidenceLedger`] entry
/// (derived from `detcore-decision`'s own [`DecisionAuditEntry`] via its
/// `to_evidence_ledger` conversion) rather than the decision crate's native
/// audit type, so the ring this module maintains is directly exportable
/// through `detcore-evidence`'s JSONL exporter or card renderer by a
/// hosting application without any further conversion.
#[derive(Debug, Clone)]
pub struct AdaptiveLedgerEntry {
    /// Globally monotonic sequence number within this surface.
    pub sequence: u64,
    /// The fallback policy in effect when this decision was made, as a
    /// versioned identifier — bumped every time [`AdaptiveSurface::set_policy`]
    /// installs a new policy, so the ledger can distinguish decisions made
    /// under different policy generations.
    pub policy_id: PolicyId,
    /// Wire-format version of this entry's shape ([`LEDGER_ENTRY_SCHEMA_VERSION`]).
    pub schema_version: SchemaVersion,
    /// The evidence-ledger rendering of the audit entry.
    pub evidence: EvidenceLedger,
}

impl AdaptiveLedgerEntry {
    fn fold(&self, acc: &mut Fnv1a) {
        acc.write_u64(self.sequence);
        acc.write_u64(self.policy_id.version().into());
        acc.write_u64(self.policy_id.name().len() as u64);
        acc.write(self.policy_id.name().as_bytes());
        acc.write_u64(u64::from(self.schema_version.major));
        acc.write_u64(u64::from(self.schema_version.minor));
        acc.write_u64(u64::from(self.schema_version.patch));
        acc.write_u64(self.evidence.ts_unix_ms);
        acc.write_u64(self.evidence.component.len() as u64);
        acc.write(self.evidence.component.as_bytes());
        acc.write_u64(self.evidence.action.len() as u64);
        acc.write(self.evidence.action.as_bytes());
        acc.write_u64(self.evidence.chosen_expected_loss.to_bits());
        acc.write_u64(u64::from(self.evidence.fallback_active));
    }
}

/// A kernel-side decision surface: state space, action set, loss matrix,
/// fallback policy, posterior, decision budget, and a ring-buffered audit
/// ledger, all bundled behind the workspace's shared [`DecisionContract`]
/// machinery (§4.9).
pub struct AdaptiveSurface<U = LikelihoodWeightedUpdate> {
    name: String,
    states: Vec<String>,
    actions: Vec<String>,
    losses: LossMatrix,
    fallback_action: usize,
    policy: FallbackPolicy,
    posterior: Posterior,
    budget: AdaptiveBudget,
    update_rule: U,
    ledger: Vec<AdaptiveLedgerEntry>,
    ledger_capacity: usize,
    ledger_write_pos: usize,
    next_sequence: u64,
    digest: Fnv1a,
    policy_version: u32,
}

impl AdaptiveSurface<LikelihoodWeightedUpdate> {
    /// Construct a surface with the default [`LikelihoodWeightedUpdate`]
    /// posterior update rule and a uniform prior.
    ///
    /// # Errors
    ///
    /// Propagates [`ValidationError`] (wrapped in [`KernelError`]) if the
    /// loss matrix or fallback action index is invalid.
    pub fn new(
        name: impl Into<String>,
        state_names: Vec<String>,
        action_names: Vec<String>,
        loss_values: Vec<f64>,
        fallback_action: usize,
        policy: FallbackPolicy,
    ) -> Result<Self, KernelError> {
        Self::with_update_rule(
            name,
            state_names,
            action_names,
            loss_values,
            fallback_action,
            policy,
            LikelihoodWeightedUpdate::default(),
        )
    }
}

impl<U: PosteriorUpdateRule> AdaptiveSurface<U> {
    /// Construct a surface with an explicit posterior update rule.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidArgument`] if `fallback_action` is out of
    ///   range for `action_names`.
    /// - [`KernelError::InvalidArgument`] if the loss matrix fails
    ///   validation (empty spaces, dimension mismatch, negative loss).
    pub fn with_update_rule(
        name: impl Into<String>,
        state_names: Vec<String>,
        action_names: Vec<String>,
        loss_values: Vec<f64>,
        fallback_action: usize,
        policy: FallbackPolicy,
        update_rule: U,
    ) -> Result<Self, KernelError> {
        if fallback_action >= action_names.len() {
            return Err(KernelError::InvalidArgument("fallback action index out of range"));
        }
        let posterior = Posterior::uniform(state_names.len());
        let losses = LossMatrix::new(state_names.clone(), action_names.clone(), loss_values)
            .map_err(|_| KernelError::InvalidArgument("invalid loss matrix"))?;
        Ok(Self {
            name: name.into(),
            states: state_names,
            actions: action_names,
            losses,
            fallback_action,
            policy,
            posterior,
            budget: AdaptiveBudget::unlimited(),
            update_rule,
            ledger: Vec::with_capacity(DEFAULT_LEDGER_CAPACITY),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            ledger_write_pos: 0,
            next_sequence: 0,
            digest: Fnv1a::new(),
            policy_version: 1,
        })
    }

    /// Install a new fallback policy, bumping [`Self::policy_id`]'s version
    /// so ledger entries recorded afterward are attributable to a distinct
    /// policy generation (§4.9 "policy evolution tracking").
    pub fn set_policy(&mut self, policy: FallbackPolicy) {
        self.policy = policy;
        self.policy_version += 1;
    }

    /// The versioned identifier of the fallback policy currently installed
    /// on this surface, bumped by every [`Self::set_policy`] call.
    #[must_use]
    pub fn policy_id(&self) -> PolicyId {
        PolicyId::new(self.name.clone(), self.policy_version)
    }

    /// Install a new decision budget (see module docs for the `0` =
    /// unlimited convention).
    pub fn set_budget(&mut self, budget: AdaptiveBudget) {
        self.budget = budget;
    }

    /// The currently installed budget.
    #[must_use]
    pub const fn budget(&self) -> AdaptiveBudget {
        self.budget
    }

    /// The current posterior (read-only).
    #[must_use]
    pub fn posterior(&self) -> &Posterior {
        &self.posterior
    }

    /// Observe `state_index`, updating the posterior in place.
    pub fn observe(&mut self, state_index: usize) {
        self.update_rule.update(&mut self.posterior, state_index);
    }

    /// Evaluate the contract for the current posterior, recording the
    /// outcome in the audit ledger and charging the decision budget.
    ///
    /// If the budget is exhausted the outcome is forced to the fallback
    /// action regardless of what the fallback *policy* (calibration drift,
    /// e-process, CI width) would otherwise decide — the budget and the
    /// policy are independent fallback triggers, and either may fire.
    pub fn decide(&mut self, ctx: &EvalContext) -> DecisionOutcome {
        let mut outcome = detcore_decision::evaluate(self, &self.posterior, ctx);
        if !outcome.fallback_active && self.budget.is_exhausted() {
            outcome = self.force_fallback(outcome);
        }
        self.budget.record_use();
        let policy_id = self.policy_id();
        self.push_ledger(policy_id, outcome.audit_entry.to_evidence_ledger());
        outcome
    }

    fn force_fallback(&self, prior: DecisionOutcome) -> DecisionOutcome {
        let action_index = self.fallback_action;
        let action_name = self.actions[action_index].clone();
        let expected_loss = prior
            .expected_losses
            .get(&action_name)
            .copied()
            .unwrap_or(prior.expected_loss);
        let mut audit_entry = prior.audit_entry;
        audit_entry.action_chosen = action_name.clone();
        audit_entry.expected_loss = expected_loss;
        audit_entry.fallback_active = true;
        DecisionOutcome {
            action_index,
            action_name,
            expected_loss,
            expected_losses: prior.expected_losses,
            fallback_active: true,
            audit_entry,
        }
    }

    fn push_ledger(&mut self, policy_id: PolicyId, evidence: EvidenceLedger) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let entry = AdaptiveLedgerEntry {
            sequence,
            policy_id,
            schema_version: LEDGER_ENTRY_SCHEMA_VERSION,
            evidence,
        };
        entry.fold(&mut self.digest);

        if self.ledger.len() < self.ledger_capacity {
            self.ledger.push(entry);
        } else {
            self.ledger[self.ledger_write_pos] = entry;
        }
        self.ledger_write_pos = (self.ledger_write_pos + 1) % self.ledger_capacity.max(1);
    }

    /// Number of retained ledger entries.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    /// Fetch the `i`th retained ledger entry, oldest-first.
    #[must_use]
    pub fn ledger_get(&self, i: usize) -> Option<&AdaptiveLedgerEntry> {
        if self.ledger.len() < self.ledger_capacity {
            self.ledger.get(i)
        } else {
            self.ledger.get((self.ledger_write_pos + i) % self.ledger_capacity)
        }
    }

    /// The running FNV-1a digest over every decision ever recorded by this
    /// surface, independent of ledger ring wraparound (same contract as
    /// [`crate::trace::Trace::digest`]).
    #[must_use]
    pub fn ledger_digest(&self) -> u64 {
        self.digest.finish()
    }

    /// Reset the posterior to uniform, clear the ledger and digest, and
    /// zero the budget's usage counter (but not its configured total).
    pub fn reset(&mut self) {
        self.posterior = Posterior::uniform(self.states.len());
        self.ledger.clear();
        self.ledger_write_pos = 0;
        self.next_sequence = 0;
        self.digest = Fnv1a::new();
        self.budget.reset_usage();
    }
}

impl<U: PosteriorUpdateRule> DecisionContract for AdaptiveSurface<U> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_space(&self) -> &[String] {
        &self.states
    }

    fn action_set(&self) -> &[String] {
        &self.actions
    }

    fn loss_matrix(&self) -> &LossMatrix {
        &self.losses
    }

    fn update_posterior(&self, posterior: &mut Posterior, state_index: usize) {
        self.update_rule.update(posterior, state_index);
    }

    fn choose_action(&self, posterior: &Posterior) -> usize {
        self.losses.bayes_action(posterior)
    }

    fn fallback_action(&self) -> usize {
        self.fallback_action
    }

    fn fallback_policy(&self) -> &FallbackPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state(policy: FallbackPolicy) -> AdaptiveSurface {
        AdaptiveSurface::new(
            "scheduler_admission",
            vec!["healthy".into(), "degraded".into()],
            vec!["continue".into(), "shed".into()],
            vec![0.0, 0.3, 0.8, 0.1],
            0,
            policy,
        )
        .unwrap()
    }

    fn ctx(calibration: f64, random: u128) -> EvalContext {
        EvalContext {
            calibration_score: calibration,
            e_process: 1.0,
            ci_width: 0.1,
            decision_id: DecisionId::from_parts(1_700_000_000_000, random),
            trace_id: TraceId::from_parts(1_700_000_000_000, random),
            ts_unix_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn rejects_out_of_range_fallback_action() {
        let err = AdaptiveSurface::new(
            "x",
            vec!["s".into()],
            vec!["a".into()],
            vec![0.0],
            1,
            FallbackPolicy::default(),
        );
        assert!(matches!(err, Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn decide_picks_bayes_optimal_action_when_calibrated() {
        let mut surface = two_state(FallbackPolicy::default());
        surface.observe(1);
        let outcome = surface.decide(&ctx(0.95, 1));
        assert!(!outcome.fallback_active);
        assert_eq!(outcome.action_name, "shed");
    }

    #[test]
    fn decide_forces_fallback_on_low_calibration() {
        let mut surface = two_state(FallbackPolicy::default());
        surface.observe(1);
        let outcome = surface.decide(&ctx(0.2, 2));
        assert!(outcome.fallback_active);
        assert_eq!(outcome.action_name, "continue");
    }

    #[test]
    fn zero_budget_is_unlimited() {
        let mut surface = two_state(FallbackPolicy::default());
        surface.set_budget(AdaptiveBudget::unlimited());
        for i in 0..50 {
            let outcome = surface.decide(&ctx(0.99, i));
            assert!(!outcome.fallback_active);
        }
    }

    #[test]
    fn exhausted_budget_forces_fallback_even_when_well_calibrated() {
        let mut surface = two_state(FallbackPolicy::default());
        surface.set_budget(AdaptiveBudget::with_total(2));
        let first = surface.decide(&ctx(0.99, 1));
        assert!(!first.fallback_active);
        let second = surface.decide(&ctx(0.99, 2));
        assert!(!second.fallback_active);
        let third = surface.decide(&ctx(0.99, 3));
        assert!(third.fallback_active);
        assert_eq!(third.action_name, "continue");
    }

    #[test]
    fn ledger_records_every_decision_and_digest_is_deterministic() {
        fn run() -> u64 {
            let mut surface = two_state(FallbackPolicy::default());
            for i in 0..5u128 {
                surface.decide(&ctx(0.9, i));
            }
            surface.ledger_digest()
        }
        assert_eq!(run(), run());
    }

    #[test]
    fn ledger_len_tracks_decisions_up_to_capacity() {
        let mut surface = two_state(FallbackPolicy::default());
        for i in 0..3u128 {
            surface.decide(&ctx(0.9, i));
        }
        assert_eq!(surface.ledger_len(), 3);
        assert_eq!(surface.ledger_get(0).unwrap().sequence, 0);
    }

    #[test]
    fn set_policy_bumps_policy_id_version_and_ledger_reflects_it() {
        let mut surface = two_state(FallbackPolicy::default());
        assert_eq!(surface.policy_id().version(), 1);
        surface.decide(&ctx(0.9, 1));
        assert_eq!(surface.ledger_get(0).unwrap().policy_id.version(), 1);

        surface.set_policy(FallbackPolicy::default());
        assert_eq!(surface.policy_id().version(), 2);
        surface.decide(&ctx(0.9, 2));
        assert_eq!(surface.ledger_get(1).unwrap().policy_id.version(), 2);
    }

    #[test]
    fn reset_clears_ledger_and_restores_uniform_posterior() {
        let mut surface = two_state(FallbackPolicy::default());
        surface.observe(1);
        surface.decide(&ctx(0.9, 1));
        surface.reset();
        assert_eq!(surface.ledger_len(), 0);
        assert_eq!(surface.ledger_digest(), Fnv1a::new().finish());
        assert_eq!(surface.posterior().probs(), &[0.5, 0.5]);
    }
}
