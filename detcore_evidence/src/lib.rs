//! Canonical `EvidenceLedger` schema for the deterministic kernel workspace.
//!
//! An [`EvidenceLedger`] entry is the audit record produced every time a
//! component makes a Bayesian expected-loss decision (see `detcore-decision`).
//! It is deliberately flat and `serde`-friendly so it can be exported as
//! JSONL ([`export`]) or rendered for humans ([`render`]).

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod export;
pub mod render;

/// A single audited decision, linking an action choice to the posterior and
/// loss context that produced it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvidenceLedger {
    /// Unix timestamp in milliseconds when the decision was made.
    pub ts_unix_ms: u64,
    /// Name of the component/contract that made the decision.
    pub component: String,
    /// The action that was chosen.
    pub action: String,
    /// Posterior distribution over states at decision time.
    pub posterior: Vec<f64>,
    /// Expected loss for every candidate action, keyed by action name.
    pub expected_loss_by_action: HashMap<String, f64>,
    /// Expected loss of the chosen action.
    pub chosen_expected_loss: f64,
    /// Calibration score at decision time.
    pub calibration_score: f64,
    /// Whether the fallback heuristic was active for this decision.
    pub fallback_active: bool,
    /// Top contributing features, `(name, weight)`, most significant first.
    pub top_features: Vec<(String, f64)>,
}

/// Validation errors produced while building an [`EvidenceLedger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// A required field was never set.
    MissingField(&'static str),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field: {field}"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for [`EvidenceLedger`] entries.
///
/// `component`, `action`, `posterior`, `chosen_expected_loss`, and
/// `calibration_score` are required; everything else defaults to empty.
#[derive(Clone, Debug, Default)]
pub struct EvidenceLedgerBuilder {
    ts_unix_ms: Option<u64>,
    component: Option<String>,
    action: Option<String>,
    posterior: Option<Vec<f64>>,
    expected_loss_by_action: HashMap<String, f64>,
    chosen_expected_loss: Option<f64>,
    calibration_score: Option<f64>,
    fallback_active: bool,
    top_features: Vec<(String, f64)>,
}

impl EvidenceLedgerBuilder {
    /// Start a new builder with no fields set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decision timestamp.
    #[must_use]
    pub fn ts_unix_ms(mut self, ts: u64) -> Self {
        self.ts_unix_ms = Some(ts);
        self
    }

    /// Set the component/contract name.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set the chosen action name.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Set the full posterior snapshot.
    #[must_use]
    pub fn posterior(mut self, posterior: Vec<f64>) -> Self {
        self.posterior = Some(posterior);
        self
    }

    /// Record the expected loss of a candidate action.
    #[must_use]
    pub fn expected_loss(mut self, action: impl Into<String>, loss: f64) -> Self {
        self.expected_loss_by_action.insert(action.into(), loss);
        self
    }

    /// Set the expected loss of the chosen action.
    #[must_use]
    pub fn chosen_expected_loss(mut self, loss: f64) -> Self {
        self.chosen_expected_loss = Some(loss);
        self
    }

    /// Set the calibration score.
    #[must_use]
    pub fn calibration_score(mut self, score: f64) -> Self {
        self.calibration_score = Some(score);
        self
    }

    /// Mark whether the fallback heuristic was active.
    #[must_use]
    pub fn fallback_active(mut self, active: bool) -> Self {
        self.fallback_active = active;
        self
    }

    /// Record a top contributing feature.
    #[must_use]
    pub fn top_feature(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.top_features.push((name.into(), weight));
        self
    }

    /// Finish building, validating that required fields were set.
    pub fn build(self) -> Result<EvidenceLedger, BuildError> {
        Ok(EvidenceLedger {
            ts_unix_ms: self.ts_unix_ms.ok_or(BuildError::MissingField("ts_unix_ms"))?,
            component: self.component.ok_or(BuildError::MissingField("component"))?,
            action: self.action.ok_or(BuildError::MissingField("action"))?,
            posterior: self.posterior.ok_or(BuildError::MissingField("posterior"))?,
            expected_loss_by_action: self.expected_loss_by_action,
            chosen_expected_loss: self
                .chosen_expected_loss
                .ok_or(BuildError::MissingField("chosen_expected_loss"))?,
            calibration_score: self
                .calibration_score
                .ok_or(BuildError::MissingField("calibration_score"))?,
            fallback_active: self.fallback_active,
            top_features: self.top_features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_component() {
        let err = EvidenceLedgerBuilder::new()
            .ts_unix_ms(1)
            .action("a")
            .posterior(vec![1.0])
            .chosen_expected_loss(0.0)
            .calibration_score(1.0)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingField("component"));
    }

    #[test]
    fn build_succeeds_with_required_fields() {
        let entry = EvidenceLedgerBuilder::new()
            .ts_unix_ms(1)
            .component("scheduler")
            .action("preempt")
            .posterior(vec![0.5, 0.5])
            .chosen_expected_loss(0.1)
            .calibration_score(0.9)
            .build()
            .unwrap();
        assert_eq!(entry.component, "scheduler");
        assert!(!entry.fallback_active);
        assert!(entry.top_features.is_empty());
    }
}
