//! Routing configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::routing::{BalancedWeights, SelectionStrategy, DEFAULT_DECISION_CAPACITY};

/// `[routing]` section: scenario table, quality ranking and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Scenario name to strategy, layered over the built-in table
    pub scenarios: HashMap<String, SelectionStrategy>,
    /// Model families, highest quality first. Empty keeps the built-in list.
    pub quality_ranking: Vec<String>,
    pub weights: BalancedWeights,
    pub retry: RetryPolicy,
    /// Number of selection decisions retained in memory
    pub decision_log_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            scenarios: HashMap::new(),
            quality_ranking: Vec::new(),
            weights: BalancedWeights::default(),
            retry: RetryPolicy::default(),
            decision_log_capacity: DEFAULT_DECISION_CAPACITY,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights
            .validate()
            .map_err(|message| ConfigError::Validation {
                field: "routing.weights".to_string(),
                message,
            })?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation {
                field: "routing.retry.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Validation {
                field: "routing.retry.multiplier".to_string(),
                message: "must be >= 1.0".to_string(),
            });
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Validation {
                field: "routing.retry.initial_delay_ms".to_string(),
                message: "must not exceed max_delay_ms".to_string(),
            });
        }
        if self.decision_log_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "routing.decision_log_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(empty) = self.quality_ranking.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation {
                field: format!("routing.quality_ranking[{}]", empty),
                message: "ranking entries cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_defaults() {
        let config = RoutingConfig::default();
        assert!(config.scenarios.is_empty());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.decision_log_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_routing_config_parses_scenarios() {
        let toml = r#"
        quality_ranking = ["house-model", "gpt-4o"]

        [scenarios]
        triage = "quality-optimized"
        resume-parsing = "latency-optimized"

        [retry]
        max_attempts = 5
        "#;
        let config: RoutingConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.scenarios.get("triage"),
            Some(&SelectionStrategy::QualityOptimized)
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.quality_ranking.len(), 2);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let toml = "[scenarios]\ntriage = \"fastest\"";
        assert!(toml::from_str::<RoutingConfig>(toml).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = RoutingConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "routing.retry.max_attempts"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = RoutingConfig::default();
        config.weights.cost = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = RoutingConfig::default();
        config.retry.initial_delay_ms = 20_000;
        assert!(config.validate().is_err());
    }
}
