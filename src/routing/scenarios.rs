//! Scenario to strategy mapping.

use super::SelectionStrategy;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Built-in scenario mappings. Configuration entries are layered on top.
pub const DEFAULT_SCENARIOS: &[(&str, SelectionStrategy)] = &[
    ("resume-parsing", SelectionStrategy::CostOptimized),
    ("summarization", SelectionStrategy::CostOptimized),
    ("agent-rag-retrieval", SelectionStrategy::LatencyOptimized),
    ("chat", SelectionStrategy::LatencyOptimized),
    ("medical-diagnosis", SelectionStrategy::QualityOptimized),
    ("report-analysis", SelectionStrategy::QualityOptimized),
    ("general", SelectionStrategy::Balanced),
];

/// Scenario name to [`SelectionStrategy`], overridable at runtime.
///
/// Unknown scenarios resolve to [`SelectionStrategy::Balanced`] with a warning.
#[derive(Debug)]
pub struct ScenarioTable {
    entries: RwLock<HashMap<String, SelectionStrategy>>,
}

impl ScenarioTable {
    /// Table holding only [`DEFAULT_SCENARIOS`].
    pub fn new() -> Self {
        Self::with_overrides(HashMap::new())
    }

    /// Defaults with `overrides` applied on top.
    pub fn with_overrides(overrides: HashMap<String, SelectionStrategy>) -> Self {
        let mut entries: HashMap<String, SelectionStrategy> = DEFAULT_SCENARIOS
            .iter()
            .map(|(name, strategy)| (name.to_string(), *strategy))
            .collect();
        entries.extend(overrides);
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Strategy for `scenario`.
    pub fn strategy_for(&self, scenario: &str) -> SelectionStrategy {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scenario)
            .copied();
        found.unwrap_or_else(|| {
            tracing::warn!(scenario = %scenario, "Unknown scenario, using balanced strategy");
            SelectionStrategy::Balanced
        })
    }

    /// Replace the strategy for `scenario`, returning the previous mapping.
    pub fn override_strategy(
        &self,
        scenario: impl Into<String>,
        strategy: SelectionStrategy,
    ) -> Option<SelectionStrategy> {
        let scenario = scenario.into();
        tracing::info!(scenario = %scenario, strategy = %strategy, "Scenario strategy overridden");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scenario, strategy)
    }

    /// All mappings sorted by scenario name.
    pub fn entries(&self) -> Vec<(String, SelectionStrategy)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Default for ScenarioTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_scenarios() {
        let table = ScenarioTable::new();
        assert_eq!(
            table.strategy_for("resume-parsing"),
            SelectionStrategy::CostOptimized
        );
        assert_eq!(
            table.strategy_for("agent-rag-retrieval"),
            SelectionStrategy::LatencyOptimized
        );
        assert_eq!(
            table.strategy_for("medical-diagnosis"),
            SelectionStrategy::QualityOptimized
        );
        assert_eq!(table.strategy_for("general"), SelectionStrategy::Balanced);
    }

    #[test]
    fn unknown_scenario_is_balanced() {
        assert_eq!(
            ScenarioTable::new().strategy_for("nonexistent"),
            SelectionStrategy::Balanced
        );
    }

    #[test]
    fn override_replaces_and_returns_previous() {
        let table = ScenarioTable::new();
        let previous = table.override_strategy("general", SelectionStrategy::CostOptimized);
        assert_eq!(previous, Some(SelectionStrategy::Balanced));
        assert_eq!(table.strategy_for("general"), SelectionStrategy::CostOptimized);

        assert_eq!(
            table.override_strategy("triage", SelectionStrategy::QualityOptimized),
            None
        );
    }

    #[test]
    fn configured_overrides_layer_on_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("resume-parsing".to_string(), SelectionStrategy::QualityOptimized);
        overrides.insert("triage".to_string(), SelectionStrategy::LatencyOptimized);
        let table = ScenarioTable::with_overrides(overrides);

        assert_eq!(
            table.strategy_for("resume-parsing"),
            SelectionStrategy::QualityOptimized
        );
        assert_eq!(table.strategy_for("triage"), SelectionStrategy::LatencyOptimized);
        assert_eq!(table.strategy_for("general"), SelectionStrategy::Balanced);
        assert_eq!(table.entries().len(), DEFAULT_SCENARIOS.len() + 1);
    }
}
