//! Model selection policy
//!
//! Maps a scenario to a [`SelectionStrategy`] and applies it to the live
//! catalog to pick exactly one model. Every pick is appended to a
//! [`DecisionLog`].

use std::sync::Arc;

pub mod decision;
pub mod error;
pub mod scenarios;
pub mod scoring;
pub mod strategies;

pub use decision::{
    DecisionLog, RingDecisionLog, SelectionContext, SelectionDecision, DEFAULT_DECISION_CAPACITY,
};
pub use error::SelectionError;
pub use scenarios::{ScenarioTable, DEFAULT_SCENARIOS};
pub use scoring::{balanced_score, BalancedWeights, Normalizer};
pub use strategies::SelectionStrategy;

use crate::agent::ModelDescriptor;
use crate::config::RoutingConfig;

/// Model families ordered from highest to lowest quality. A model takes the
/// rank of its most specific matching entry.
pub const DEFAULT_QUALITY_RANKING: &[&str] = &[
    "claude-3-opus",
    "gpt-4o",
    "claude-3-5-sonnet",
    "gpt-4-turbo",
    "gpt-4",
    "claude-3-sonnet",
    "llama3:70b",
    "mixtral",
    "gpt-4o-mini",
    "claude-3-5-haiku",
    "claude-3-haiku",
    "gpt-3.5-turbo",
    "llama3",
    "mistral",
];

/// Optional limits applied before the strategy runs.
///
/// A limit that excludes every candidate is ignored, so a constraint never
/// turns a selectable model into an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionConstraints {
    /// Ceiling on combined input + output per-token cost
    pub max_cost: Option<f64>,
    /// Ceiling on observed average latency
    pub max_latency_ms: Option<f64>,
}

/// The picked model together with the recorded decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub model: ModelDescriptor,
    pub decision: SelectionDecision,
}

/// Scenario-driven model selector.
pub struct Selector {
    scenarios: ScenarioTable,
    /// Lowercased, highest quality first
    ranking: Vec<String>,
    weights: BalancedWeights,
    log: Arc<dyn DecisionLog>,
}

impl Selector {
    /// Selector with default scenarios, ranking and weights.
    pub fn new(log: Arc<dyn DecisionLog>) -> Self {
        Self {
            scenarios: ScenarioTable::new(),
            ranking: DEFAULT_QUALITY_RANKING
                .iter()
                .map(|s| s.to_string())
                .collect(),
            weights: BalancedWeights::default(),
            log,
        }
    }

    /// Selector configured from the `[routing]` section.
    pub fn from_config(config: &RoutingConfig, log: Arc<dyn DecisionLog>) -> Self {
        Self::new(log)
            .with_scenarios(ScenarioTable::with_overrides(config.scenarios.clone()))
            .with_ranking(config.quality_ranking.clone())
            .with_weights(config.weights)
    }

    pub fn with_scenarios(mut self, scenarios: ScenarioTable) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Replace the quality ranking (highest first). An empty list keeps the
    /// built-in ranking.
    pub fn with_ranking(mut self, ranking: Vec<String>) -> Self {
        if !ranking.is_empty() {
            self.ranking = ranking
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase())
                .collect();
        }
        self
    }

    pub fn with_weights(mut self, weights: BalancedWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn scenarios(&self) -> &ScenarioTable {
        &self.scenarios
    }

    pub fn decision_log(&self) -> &Arc<dyn DecisionLog> {
        &self.log
    }

    /// Runtime override of one scenario's strategy.
    pub fn override_strategy(
        &self,
        scenario: impl Into<String>,
        strategy: SelectionStrategy,
    ) -> Option<SelectionStrategy> {
        self.scenarios.override_strategy(scenario, strategy)
    }

    /// Pick one model for `scenario` from `models`.
    ///
    /// Only available models are considered. When none is available but the
    /// list is non-empty, the first listed model is returned and the decision
    /// is logged as degraded.
    pub fn select(
        &self,
        scenario: &str,
        models: &[ModelDescriptor],
        constraints: &SelectionConstraints,
        context: SelectionContext,
    ) -> Result<Selection, SelectionError> {
        let strategy = self.scenarios.strategy_for(scenario);

        let Some(first) = models.first() else {
            tracing::warn!(scenario = %scenario, "No models to select from");
            return Err(SelectionError::NoModels {
                scenario: scenario.to_string(),
            });
        };

        let available: Vec<&ModelDescriptor> = models.iter().filter(|m| m.is_available).collect();

        let (chosen, degraded) = if available.is_empty() {
            tracing::warn!(
                scenario = %scenario,
                model = %first.key(),
                "No available models, selecting in degraded mode"
            );
            (first, true)
        } else {
            (self.apply(strategy, &available, constraints), false)
        };

        let decision = SelectionDecision::snapshot(
            scenario,
            strategy,
            chosen,
            available.len(),
            degraded,
            context,
        );
        self.log.record(decision.clone());

        Ok(Selection {
            model: chosen.clone(),
            decision,
        })
    }

    /// Apply `strategy` to a non-empty candidate list.
    fn apply<'a>(
        &self,
        strategy: SelectionStrategy,
        candidates: &[&'a ModelDescriptor],
        constraints: &SelectionConstraints,
    ) -> &'a ModelDescriptor {
        match strategy {
            SelectionStrategy::CostOptimized => {
                let pool = constrain(candidates, constraints.max_cost, |m| m.combined_cost());
                min_by(&pool, |m| m.combined_cost())
            }
            SelectionStrategy::LatencyOptimized => {
                let pool = constrain(candidates, constraints.max_latency_ms, |m| m.avg_latency_ms);
                min_by(&pool, |m| m.avg_latency_ms)
            }
            SelectionStrategy::QualityOptimized => self.select_quality(candidates),
            SelectionStrategy::Balanced => {
                let normalizer = Normalizer::for_candidates(candidates);
                min_by(candidates, |m| balanced_score(m, &normalizer, &self.weights))
            }
        }
    }

    /// Candidate with the highest-ranked entry wins; ties keep catalog order
    /// with exact matches ahead of prefix or suffix matches.
    fn select_quality<'a>(&self, candidates: &[&'a ModelDescriptor]) -> &'a ModelDescriptor {
        let mut best: Option<((usize, bool), usize)> = None;
        for (i, model) in candidates.iter().enumerate() {
            let Some(rank) = self.rank_of(&model.name.to_lowercase()) else {
                continue;
            };
            if best.map_or(true, |(top, _)| rank < top) {
                best = Some((rank, i));
            }
        }
        best.map_or(candidates[0], |(_, i)| candidates[i])
    }

    /// Ranking position of a lowercased model name, and whether it was reached
    /// by affix. A model ranks at its exact entry, otherwise at the longest
    /// entry it starts or ends with, so `gpt-4o-mini` never borrows the rank of
    /// `gpt-4o`.
    fn rank_of(&self, name: &str) -> Option<(usize, bool)> {
        if let Some(i) = self.ranking.iter().position(|entry| entry == name) {
            return Some((i, false));
        }
        self.ranking
            .iter()
            .enumerate()
            .filter(|(_, entry)| name.starts_with(entry.as_str()) || name.ends_with(entry.as_str()))
            .max_by_key(|(i, entry)| (entry.len(), std::cmp::Reverse(*i)))
            .map(|(i, _)| (i, true))
    }
}

/// Candidates within `limit`, or all of them when the limit excludes everyone.
fn constrain<'a>(
    candidates: &[&'a ModelDescriptor],
    limit: Option<f64>,
    value: impl Fn(&ModelDescriptor) -> f64,
) -> Vec<&'a ModelDescriptor> {
    let Some(limit) = limit else {
        return candidates.to_vec();
    };
    let within: Vec<&ModelDescriptor> = candidates
        .iter()
        .copied()
        .filter(|m| value(m) <= limit)
        .collect();
    if within.is_empty() {
        candidates.to_vec()
    } else {
        within
    }
}

/// Minimum by `key`; the earliest candidate wins ties.
fn min_by<'a>(
    candidates: &[&'a ModelDescriptor],
    key: impl Fn(&ModelDescriptor) -> f64,
) -> &'a ModelDescriptor {
    let mut best = candidates[0];
    let mut best_key = key(best);
    for candidate in &candidates[1..] {
        let k = key(candidate);
        if k < best_key {
            best = candidate;
            best_key = k;
        }
    }
    best
}
