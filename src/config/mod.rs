//! Configuration module for Meridian
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`MERIDIAN_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use meridian::config::MeridianConfig;
//!
//! let toml = r#"
//! [[backends]]
//! name = "local"
//! url = "http://localhost:11434"
//! type = "ollama"
//!
//! [routing.scenarios]
//! triage = "quality-optimized"
//! "#;
//! let config: MeridianConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.backends.len(), 1);
//! assert!(config.validate().is_ok());
//! ```

pub mod backend;
pub mod error;
pub mod logging;
pub mod routing;
pub mod workflow;

pub use backend::{BackendConfig, BackendType};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use routing::RoutingConfig;
pub use workflow::WorkflowConfig;

// Sections owned by the modules that consume them
pub use crate::health::HealthCheckConfig;
pub use crate::metrics::AlertThresholds;
pub use crate::security::SecurityConfig;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Annotated example written by `meridian config init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../../meridian.example.toml");

/// Unified configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MeridianConfig {
    /// Upstream backend definitions
    pub backends: Vec<BackendConfig>,
    /// Scenario strategies, quality ranking, retry policy
    pub routing: RoutingConfig,
    pub health_check: HealthCheckConfig,
    pub workflow: WorkflowConfig,
    /// Alert thresholds over per-model performance
    pub alerts: AlertThresholds,
    pub security: SecurityConfig,
    /// Named prompt templates using `{{var}}` placeholders
    pub templates: HashMap<String, String>,
    pub logging: LoggingConfig,
}

impl MeridianConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `MERIDIAN_*` environment variable overrides.
    ///
    /// Invalid values are ignored and the file or default value is kept.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"));

        if let Some(level) = lookup("MERIDIAN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MERIDIAN_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.logging.format = format;
        }
        if let Some(enabled) = flag("MERIDIAN_CONTENT_LOGGING") {
            self.logging.enable_content_logging = enabled;
        }
        if let Some(enabled) = flag("MERIDIAN_HEALTH_CHECK") {
            self.health_check.enabled = enabled;
        }
        if let Some(attempts) = lookup("MERIDIAN_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.routing.retry.max_attempts = attempts;
        }
        if let Some(ttl) = lookup("MERIDIAN_CACHE_TTL").and_then(|v| v.parse().ok()) {
            self.workflow.cache_ttl_seconds = ttl;
        }
        if let Some(enabled) = flag("MERIDIAN_ACCESS_CONTROL") {
            self.security.access_control = enabled;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (i, backend) in self.backends.iter().enumerate() {
            if backend.name.is_empty() {
                return Err(ConfigError::invalid(
                    format!("backends[{}].name", i),
                    "name cannot be empty",
                ));
            }
            if backend.name.contains(':') {
                return Err(ConfigError::invalid(
                    format!("backends[{}].name", i),
                    "name cannot contain ':'",
                ));
            }
            if !names.insert(backend.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("backends[{}].name", i),
                    format!("duplicate backend name '{}'", backend.name),
                ));
            }
            if !(backend.url.starts_with("http://") || backend.url.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    format!("backends[{}].url", i),
                    "URL must start with http:// or https://",
                ));
            }
            if backend.timeout_seconds == 0 {
                return Err(ConfigError::invalid(
                    format!("backends[{}].timeout_seconds", i),
                    "timeout must be non-zero",
                ));
            }
        }

        self.routing.validate()?;

        let alerts = &self.alerts;
        for (field, value) in [
            ("alerts.failure_rate_warning", alerts.failure_rate_warning),
            ("alerts.failure_rate_critical", alerts.failure_rate_critical),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be between 0 and 1"));
            }
        }
        if alerts.failure_rate_warning > alerts.failure_rate_critical {
            return Err(ConfigError::invalid(
                "alerts.failure_rate_warning",
                "must not exceed failure_rate_critical",
            ));
        }
        if alerts.latency_warning_ms > alerts.latency_critical_ms {
            return Err(ConfigError::invalid(
                "alerts.latency_warning_ms",
                "must not exceed latency_critical_ms",
            ));
        }

        if self.workflow.cache_enabled && self.workflow.cache_ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "workflow.cache_ttl_seconds",
                "must be non-zero when caching is enabled",
            ));
        }

        if self.templates.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::invalid("templates", "template names cannot be empty"));
        }

        if let Err(e) = self.security.build_access_control() {
            return Err(ConfigError::invalid("security.grants", e.to_string()));
        }
        for backend in &self.backends {
            if let Some(credential) = &backend.credential {
                if !self.security.credentials.contains_key(credential) {
                    return Err(ConfigError::invalid(
                        format!("backends.{}.credential", backend.name),
                        format!("unknown credential '{}'", credential),
                    ));
                }
            }
        }

        Ok(())
    }
}
