//! Alerts command implementation

use crate::agent::InferenceRequest;
use crate::cli::output::{format_alerts_json, format_alerts_table};
use crate::cli::AlertsArgs;
use crate::gateway::InferenceGateway;
use crate::metrics::{Alert, AlertThresholds, PerformanceRecorder};

/// Send `rounds` canary calls to every available model, then evaluate
/// `thresholds` over the recorded performance.
pub async fn run_canaries(
    gateway: &InferenceGateway,
    performance: &PerformanceRecorder,
    thresholds: &AlertThresholds,
    prompt: &str,
    rounds: u32,
) -> Vec<Alert> {
    gateway.registry().refresh_catalog().await;
    let models: Vec<String> = gateway
        .registry()
        .models()
        .into_iter()
        .filter(|m| m.is_available)
        .map(|m| m.key())
        .collect();

    for key in &models {
        let request = InferenceRequest::new(prompt).with_model(key.clone());
        for _ in 0..rounds {
            if let Err(e) = gateway.call(&request, "canary", "general").await {
                tracing::debug!(model = %key, code = e.code(), "Canary call failed");
            }
        }
    }

    thresholds.evaluate(&performance.all())
}

pub async fn handle_alerts(
    args: &AlertsArgs,
    gateway: &InferenceGateway,
    performance: &PerformanceRecorder,
    thresholds: &AlertThresholds,
) -> anyhow::Result<String> {
    let alerts = run_canaries(gateway, performance, thresholds, &args.prompt, args.rounds).await;
    if args.json {
        return Ok(format_alerts_json(&alerts)?);
    }
    if alerts.is_empty() {
        return Ok("No alerts".to_string());
    }
    Ok(format_alerts_table(&alerts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::agent::AgentError;
    use crate::metrics::{AlertKind, Severity};
    use crate::registry::Registry;
    use crate::retry::{RetryExecutor, RetryPolicy};
    use crate::routing::{RingDecisionLog, Selector};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_failing_model_raises_critical_alert() {
        let performance = Arc::new(PerformanceRecorder::default());
        let registry = Arc::new(Registry::new().with_performance(Arc::clone(&performance)));
        let flaky = Arc::new(MockAgent::new("flaky").with_models(&["m"]));
        flaky.push_error(AgentError::Network("reset".into()));
        registry.add_agent(flaky).unwrap();
        registry
            .add_agent(Arc::new(MockAgent::new("steady").with_models(&["m"])))
            .unwrap();

        let gateway = InferenceGateway::new(
            Arc::clone(&registry),
            Arc::new(Selector::new(Arc::new(RingDecisionLog::default()))),
        )
        .with_retry(RetryExecutor::new(RetryPolicy::none()));

        let alerts = run_canaries(
            &gateway,
            &performance,
            &AlertThresholds::default(),
            "ping",
            2,
        )
        .await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].model_key, "flaky:m");
        assert_eq!(alerts[0].kind, AlertKind::HighFailureRate);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }
}
