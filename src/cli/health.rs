//! Health command implementation

use crate::cli::output::{format_backends_json, format_backends_table, status_icon};
use crate::cli::HealthArgs;
use crate::health::{HealthCheckConfig, HealthChecker};
use crate::registry::{BackendStatus, Registry};
use std::sync::Arc;

/// Probe every backend once and render the resulting status.
pub async fn handle_health(
    args: &HealthArgs,
    registry: Arc<Registry>,
    config: HealthCheckConfig,
) -> anyhow::Result<String> {
    let checker = HealthChecker::new(Arc::clone(&registry), config);
    let outcomes = checker.check_all().await;
    let views = registry.backends();

    if args.json {
        return Ok(format_backends_json(&views)?);
    }

    let healthy = views
        .iter()
        .filter(|v| v.status == BackendStatus::Healthy)
        .count();
    let mut output = format_backends_table(&views);
    output.push('\n');
    output.push_str(&format!(
        "{} {}/{} backends healthy",
        status_icon(if healthy == views.len() {
            BackendStatus::Healthy
        } else {
            BackendStatus::Unhealthy
        }),
        healthy,
        outcomes.len()
    ));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::cli::ConfigArgs;

    fn args(json: bool) -> HealthArgs {
        HealthArgs {
            common: ConfigArgs {
                config: "meridian.toml".into(),
                log_level: None,
            },
            json,
        }
    }

    #[tokio::test]
    async fn test_health_summary_counts() {
        let registry = Arc::new(Registry::new());
        registry
            .add_agent(Arc::new(MockAgent::new("up").with_models(&["m"])))
            .unwrap();
        let down = Arc::new(MockAgent::new("down"));
        down.set_healthy(false);
        registry.add_agent(down).unwrap();

        let output = handle_health(&args(false), registry, HealthCheckConfig::default())
            .await
            .unwrap();
        assert!(output.contains("1/2 backends healthy"));
    }

    #[tokio::test]
    async fn test_health_json() {
        let registry = Arc::new(Registry::new());
        registry
            .add_agent(Arc::new(MockAgent::new("up").with_models(&["m"])))
            .unwrap();

        let output = handle_health(&args(true), registry, HealthCheckConfig::default())
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["backends"][0]["status"], "healthy");
        assert_eq!(parsed["backends"][0]["model_count"], 1);
    }
}
