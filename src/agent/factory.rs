//! Agent factory for creating InferenceAgent trait objects from configuration.

use super::{
    anthropic::AnthropicAgent, ollama::OllamaAgent, openai::OpenAIAgent, AgentError,
    AgentSettings, InferenceAgent, ModelCache, PricingTable,
};
use crate::config::{BackendConfig, BackendType};
use crate::security::CredentialVault;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Create an agent from backend configuration.
///
/// API keys are resolved in order: inline `api_key`, the env var named by
/// `api_key_env`, then the vault credential named by `credential`. Cloud
/// backends (OpenAI, Anthropic) fail with `AgentError::Configuration` when no
/// key resolves; local ones run unauthenticated.
///
/// # Examples
///
/// ```
/// use meridian::agent::factory::create_agent;
/// use meridian::config::{BackendConfig, BackendType};
/// use reqwest::Client;
/// use std::sync::Arc;
///
/// let config = BackendConfig::new("local", "http://localhost:11434", BackendType::Ollama);
/// let agent = create_agent(&config, Arc::new(Client::new()), None).unwrap();
///
/// assert_eq!(agent.name(), "local");
/// assert_eq!(agent.profile().backend_type, "ollama");
/// ```
pub fn create_agent(
    config: &BackendConfig,
    client: Arc<Client>,
    vault: Option<&CredentialVault>,
) -> Result<Arc<dyn InferenceAgent>, AgentError> {
    let api_key = resolve_api_key(config, vault)?;
    if api_key.is_none() && config.requires_api_key() {
        return Err(AgentError::Configuration(format!(
            "{} backend '{}' requires 'api_key', 'api_key_env' or 'credential'",
            config.backend_type, config.name
        )));
    }

    let pricing = match config.backend_type {
        BackendType::OpenAI | BackendType::Anthropic => PricingTable::new(),
        BackendType::Ollama | BackendType::Generic => PricingTable::empty(),
    };

    let mut settings = AgentSettings::new(&config.name, &config.url)
        .with_timeout(Duration::from_secs(config.timeout_seconds))
        .with_pricing(pricing)
        .with_models(config.models.clone());
    if let Some(key) = api_key {
        settings = settings.with_api_key(key);
    }
    let cache = ModelCache::new(Duration::from_secs(config.catalog_refresh_seconds));

    let agent: Arc<dyn InferenceAgent> = match config.backend_type {
        BackendType::Ollama => Arc::new(OllamaAgent::new(settings, client, cache)),
        BackendType::Anthropic => Arc::new(AnthropicAgent::new(settings, client, cache)),
        BackendType::OpenAI | BackendType::Generic => {
            Arc::new(OpenAIAgent::new(settings, client, cache))
        }
    };
    Ok(agent)
}

fn resolve_api_key(
    config: &BackendConfig,
    vault: Option<&CredentialVault>,
) -> Result<Option<String>, AgentError> {
    if let Some(key) = &config.api_key {
        return Ok(Some(key.clone()));
    }
    if let Some(env_var) = &config.api_key_env {
        let key = std::env::var(env_var).map_err(|e| {
            AgentError::Configuration(format!(
                "Failed to read API key from env var '{}': {}",
                env_var, e
            ))
        })?;
        return Ok(Some(key));
    }
    if let Some(credential) = &config.credential {
        let vault = vault.ok_or_else(|| {
            AgentError::Configuration(format!(
                "Backend '{}' references credential '{}' but no vault is configured",
                config.name, credential
            ))
        })?;
        let key = vault
            .get(credential)
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        return Ok(Some(key));
    }
    Ok(None)
}
