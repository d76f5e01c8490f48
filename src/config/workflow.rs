//! Workflow configuration

use serde::{Deserialize, Serialize};

/// Default lifetime of a cached step output.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// `[workflow]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Reuse step outputs within a session
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    /// Scenario used for LLM steps when the run context names none
    pub default_scenario: String,
    /// Documents fetched per retrieval step when the step does not say
    pub retrieval_top_k: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            default_scenario: "general".to_string(),
            retrieval_top_k: 5,
        }
    }
}

impl WorkflowConfig {
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_defaults() {
        let config = WorkflowConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl().as_secs(), 3600);
        assert_eq!(config.default_scenario, "general");
    }

    #[test]
    fn test_workflow_partial_toml() {
        let config: WorkflowConfig = toml::from_str("cache_enabled = false").unwrap();
        assert!(!config.cache_enabled);
        assert_eq!(config.retrieval_top_k, 5);
    }
}
