//! Backend configuration

use serde::{Deserialize, Serialize};

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Ollama,
    OpenAI,
    Anthropic,
    /// Any OpenAI-compatible server (vLLM, LM Studio, llama.cpp).
    Generic,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendType::Ollama => "ollama",
            BackendType::OpenAI => "openai",
            BackendType::Anthropic => "anthropic",
            BackendType::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Backend name; the first half of every `backend:model` id.
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Name of a credential held in the security vault.
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_catalog_refresh_seconds")]
    pub catalog_refresh_seconds: u64,
    /// Extra model names advertised alongside the upstream listing.
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_catalog_refresh_seconds() -> u64 {
    60
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, backend_type: BackendType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            backend_type,
            api_key: None,
            api_key_env: None,
            credential: None,
            timeout_seconds: default_timeout_seconds(),
            catalog_refresh_seconds: default_catalog_refresh_seconds(),
            models: Vec::new(),
        }
    }

    /// Cloud backends refuse to start without a key.
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self.backend_type,
            BackendType::OpenAI | BackendType::Anthropic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults_from_toml() {
        let toml = r#"
        name = "local"
        url = "http://localhost:11434"
        type = "ollama"
        "#;
        let backend: BackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(backend.backend_type, BackendType::Ollama);
        assert_eq!(backend.timeout_seconds, 120);
        assert_eq!(backend.catalog_refresh_seconds, 60);
        assert!(!backend.requires_api_key());
    }

    #[test]
    fn test_backend_type_lowercase() {
        let backend: BackendConfig = toml::from_str(
            r#"
            name = "openai"
            url = "https://api.openai.com"
            type = "openai"
            api_key_env = "OPENAI_API_KEY"
            "#,
        )
        .unwrap();
        assert_eq!(backend.backend_type, BackendType::OpenAI);
        assert_eq!(backend.backend_type.to_string(), "openai");
        assert!(backend.requires_api_key());
    }
}
