//! Scoring function for the balanced strategy

use crate::agent::ModelDescriptor;
use serde::{Deserialize, Serialize};

/// Weights for the balanced score. Lower scores win.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancedWeights {
    pub cost: f64,
    pub latency: f64,
    /// Applied to `1 - success_rate`
    pub reliability: f64,
}

impl Default for BalancedWeights {
    fn default() -> Self {
        Self {
            cost: 0.4,
            latency: 0.3,
            reliability: 0.3,
        }
    }
}

impl BalancedWeights {
    /// Weights must be non-negative and sum to 1.
    pub fn validate(&self) -> Result<(), String> {
        if [self.cost, self.latency, self.reliability]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err("Balanced weights must be non-negative".to_string());
        }
        let sum = self.cost + self.latency + self.reliability;
        if (sum - 1.0).abs() > 1e-6 {
            Err(format!("Balanced weights must sum to 1.0, got {}", sum))
        } else {
            Ok(())
        }
    }
}

/// Divisors used to bring cost and latency into [0, 1] for one candidate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    max_cost: f64,
    max_latency: f64,
}

impl Normalizer {
    /// Largest value in the set, or 1 when every value is zero.
    pub fn for_candidates(candidates: &[&ModelDescriptor]) -> Self {
        let floor = |max: f64| if max > 0.0 { max } else { 1.0 };
        let max_cost = candidates
            .iter()
            .map(|m| m.combined_cost())
            .fold(0.0_f64, f64::max);
        let max_latency = candidates
            .iter()
            .map(|m| m.avg_latency_ms)
            .fold(0.0_f64, f64::max);
        Self {
            max_cost: floor(max_cost),
            max_latency: floor(max_latency),
        }
    }
}

/// Balanced score for one model.
pub fn balanced_score(
    model: &ModelDescriptor,
    normalizer: &Normalizer,
    weights: &BalancedWeights,
) -> f64 {
    let cost = model.combined_cost() / normalizer.max_cost;
    let latency = model.avg_latency_ms / normalizer.max_latency;
    let unreliability = 1.0 - model.success_rate.clamp(0.0, 1.0);
    weights.cost * cost + weights.latency * latency + weights.reliability * unreliability
}
