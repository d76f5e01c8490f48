//! Models command implementation

use crate::agent::ModelDescriptor;
use crate::cli::output::{format_models_json, format_models_table};
use crate::cli::ModelsArgs;
use crate::registry::Registry;

/// Refresh the catalog and render it.
pub async fn handle_models(args: &ModelsArgs, registry: &Registry) -> anyhow::Result<String> {
    if let Some(name) = &args.backend {
        if registry.get_agent(name).is_none() {
            anyhow::bail!("Backend not found: {name}");
        }
    }

    let listed = registry.refresh_catalog().await;
    tracing::debug!(models = listed, "Catalog refreshed");

    let models: Vec<ModelDescriptor> = registry
        .models()
        .into_iter()
        .filter(|m| args.backend.as_ref().is_none_or(|b| &m.backend == b))
        .filter(|m| args.all || m.is_available)
        .collect();

    if args.json {
        Ok(format_models_json(&models)?)
    } else {
        Ok(format_models_table(&models))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::cli::ConfigArgs;
    use std::sync::Arc;

    fn args(backend: Option<&str>, json: bool) -> ModelsArgs {
        ModelsArgs {
            common: ConfigArgs {
                config: "meridian.toml".into(),
                log_level: None,
            },
            json,
            backend: backend.map(String::from),
            all: false,
        }
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry
            .add_agent(Arc::new(MockAgent::new("local").with_models(&["llama3", "mistral"])))
            .unwrap();
        registry
            .add_agent(Arc::new(MockAgent::new("cloud").with_models(&["gpt-4o"])))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_models_lists_every_backend() {
        let output = handle_models(&args(None, false), &registry()).await.unwrap();
        assert!(output.contains("local:llama3"));
        assert!(output.contains("cloud:gpt-4o"));
    }

    #[tokio::test]
    async fn test_models_filter_by_backend_json() {
        let output = handle_models(&args(Some("local"), true), &registry())
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["models"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_models_unknown_backend() {
        let err = handle_models(&args(Some("nope"), false), &registry())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Backend not found"));
    }
}
