//! Physics vs. expected value reconciliation
//!
//! Runs once, after every die of a roll is locked. The only place a roll total
//! is computed.

use serde::{Deserialize, Serialize};

/// Which value wins when physics and an externally supplied value disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReconcilePolicy {
    /// The simulation is the fairness source; expected values are ignored
    #[default]
    PhysicsAuthoritative,
    /// Physics is cosmetic; the pre-resolved value is shown
    ExpectedAuthoritative,
    /// Physics values are shown and mismatches are recorded
    LogDivergence,
}

impl ReconcilePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePolicy::PhysicsAuthoritative => "physics",
            ReconcilePolicy::ExpectedAuthoritative => "expected",
            ReconcilePolicy::LogDivergence => "log",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "physics" | "physics-authoritative" => Some(ReconcilePolicy::PhysicsAuthoritative),
            "expected" | "expected-authoritative" => Some(ReconcilePolicy::ExpectedAuthoritative),
            "log" | "log-divergence" => Some(ReconcilePolicy::LogDivergence),
            _ => None,
        }
    }
}

/// A die whose physical value differs from the value it was expected to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub die_index: usize,
    pub physics_value: u32,
    pub expected_value: u32,
}

/// Final values of a roll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub values: Vec<u32>,
    pub total: i32,
    /// Filled only under `LogDivergence`
    pub divergences: Vec<Divergence>,
}

/// `sum(values) + modifier`
pub fn total(values: &[u32], modifier: i32) -> i32 {
    values.iter().map(|&v| v as i32).sum::<i32>() + modifier
}

/// Apply a policy to per-die physics values and optional expected values.
///
/// `expected` is indexed like `physics`; missing entries count as `None`.
pub fn reconcile(
    policy: ReconcilePolicy,
    physics: &[u32],
    expected: &[Option<u32>],
    modifier: i32,
) -> Reconciled {
    let expected_at = |i: usize| expected.get(i).copied().flatten();

    let values: Vec<u32> = match policy {
        ReconcilePolicy::ExpectedAuthoritative => physics
            .iter()
            .enumerate()
            .map(|(i, &p)| expected_at(i).unwrap_or(p))
            .collect(),
        ReconcilePolicy::PhysicsAuthoritative | ReconcilePolicy::LogDivergence => physics.to_vec(),
    };

    let mut divergences = Vec::new();
    if policy == ReconcilePolicy::LogDivergence {
        for (die_index, &physics_value) in physics.iter().enumerate() {
            if let Some(expected_value) = expected_at(die_index) {
                if expected_value != physics_value {
                    log::warn!(
                        "die {die_index}: physics shows {physics_value}, expected {expected_value}"
                    );
                    divergences.push(Divergence {
                        die_index,
                        physics_value,
                        expected_value,
                    });
                }
            }
        }
    }

    let total = total(&values, modifier);
    Reconciled {
        values,
        total,
        divergences,
    }
}
