//! Wires configuration into a registry, gateway and telemetry sinks.

use crate::agent::factory::create_agent;
use crate::cli::ConfigArgs;
use crate::config::MeridianConfig;
use crate::gateway::{InferenceGateway, PromptTemplates};
use crate::metrics::{InMemoryUsageStore, PerformanceRecorder};
use crate::registry::Registry;
use crate::retry::RetryExecutor;
use crate::routing::{RingDecisionLog, Selector};
use crate::security::AuditLog;
use anyhow::Context;
use std::sync::Arc;

/// Load the file named by `args` (defaults when it does not exist), then
/// apply environment and CLI overrides and validate.
pub fn load_config(args: &ConfigArgs) -> anyhow::Result<MeridianConfig> {
    let mut config = if args.config.exists() {
        MeridianConfig::load(Some(&args.config))
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        tracing::debug!(path = %args.config.display(), "Config file not found, using defaults");
        MeridianConfig::default()
    };

    config = config.with_env_overrides();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Everything a command needs to serve requests.
pub struct Runtime {
    pub config: MeridianConfig,
    pub registry: Arc<Registry>,
    pub gateway: Arc<InferenceGateway>,
    pub performance: Arc<PerformanceRecorder>,
    pub usage: Arc<InMemoryUsageStore>,
    pub audit: Arc<AuditLog>,
    pub decisions: Arc<RingDecisionLog>,
}

impl Runtime {
    /// Build from configuration. Backends whose adapter cannot be created
    /// (for example a missing API key) are skipped with a warning.
    pub fn build(config: MeridianConfig) -> anyhow::Result<Self> {
        let vault = config
            .security
            .build_vault()
            .context("failed to initialize credential vault")?;
        let client = Arc::new(reqwest::Client::new());

        let performance = Arc::new(PerformanceRecorder::default());
        let registry = Arc::new(Registry::new().with_performance(Arc::clone(&performance)));
        for backend in &config.backends {
            match create_agent(backend, Arc::clone(&client), Some(&vault)) {
                Ok(agent) => {
                    registry.add_agent(agent)?;
                    tracing::info!(
                        name = %backend.name,
                        url = %backend.url,
                        backend_type = %backend.backend_type,
                        "Loaded backend from config"
                    );
                }
                Err(e) => {
                    tracing::warn!(name = %backend.name, error = %e, "Skipping backend");
                }
            }
        }

        let decisions = Arc::new(RingDecisionLog::new(config.routing.decision_log_capacity));
        let selector = Arc::new(Selector::from_config(&config.routing, decisions.clone()));

        let usage = Arc::new(InMemoryUsageStore::new());
        let audit = Arc::new(AuditLog::new(config.security.audit_capacity));
        let mut gateway = InferenceGateway::new(Arc::clone(&registry), selector)
            .with_retry(RetryExecutor::new(config.routing.retry.clone()))
            .with_templates(PromptTemplates::new(config.templates.clone()))
            .with_usage_store(usage.clone())
            .with_audit_sink(audit.clone())
            .with_content_logging(
                config.logging.enable_content_logging,
                config.logging.content_max_chars,
            );
        if let Some(access) = config
            .security
            .build_access_control()
            .context("invalid access grants")?
        {
            gateway = gateway.with_access_control(access);
        }

        Ok(Self {
            config,
            registry,
            gateway: Arc::new(gateway),
            performance,
            usage,
            audit,
            decisions,
        })
    }

    /// Load configuration, start logging and build the runtime.
    pub fn from_args(args: &ConfigArgs) -> anyhow::Result<Self> {
        let config = load_config(args)?;
        // A second init in the same process keeps the first subscriber
        if let Err(e) = crate::logging::init_tracing(&config.logging) {
            tracing::debug!(error = %e, "Tracing already initialized");
        }
        Self::build(config)
    }
}
