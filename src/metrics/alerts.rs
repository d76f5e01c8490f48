//! Threshold alerts derived from performance aggregates.
//!
//! Alerts are computed on demand and never persisted.

use super::PerformanceMetrics;
use serde::{Deserialize, Serialize};

/// `[alerts]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Failure ratio above which a Warning is raised.
    pub failure_rate_warning: f64,
    /// Failure ratio above which the alert is Critical.
    pub failure_rate_critical: f64,
    pub latency_warning_ms: f64,
    pub latency_critical_ms: f64,
    /// Models with fewer observations are skipped.
    pub min_calls: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            failure_rate_warning: 0.10,
            failure_rate_critical: 0.20,
            latency_warning_ms: 30_000.0,
            latency_critical_ms: 60_000.0,
            min_calls: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    HighFailureRate,
    HighLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub model_key: String,
    pub backend: String,
    pub kind: AlertKind,
    /// The threshold that was crossed.
    pub threshold: f64,
    pub observed: f64,
    pub severity: Severity,
}

impl AlertThresholds {
    /// Alerts for every model breaching a threshold, in input order
    /// (failure-rate alert before latency alert for the same model).
    pub fn evaluate(&self, metrics: &[PerformanceMetrics]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for m in metrics.iter().filter(|m| m.total_calls >= self.min_calls.max(1)) {
            if let Some((severity, threshold)) = classify(
                m.failure_rate,
                self.failure_rate_warning,
                self.failure_rate_critical,
            ) {
                alerts.push(Alert {
                    model_key: m.model_key.clone(),
                    backend: m.backend.clone(),
                    kind: AlertKind::HighFailureRate,
                    threshold,
                    observed: m.failure_rate,
                    severity,
                });
            }
            if let Some((severity, threshold)) = classify(
                m.avg_latency_ms,
                self.latency_warning_ms,
                self.latency_critical_ms,
            ) {
                alerts.push(Alert {
                    model_key: m.model_key.clone(),
                    backend: m.backend.clone(),
                    kind: AlertKind::HighLatency,
                    threshold,
                    observed: m.avg_latency_ms,
                    severity,
                });
            }
        }
        alerts
    }
}

fn classify(observed: f64, warning: f64, critical: f64) -> Option<(Severity, f64)> {
    if observed > critical {
        Some((Severity::Critical, critical))
    } else if observed > warning {
        Some((Severity::Warning, warning))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metrics(calls: u64, failures: u64, avg_latency_ms: f64) -> PerformanceMetrics {
        let mut m = PerformanceMetrics::new("openai", "gpt-4");
        m.total_calls = calls;
        m.failures = failures;
        m.successes = calls - failures;
        m.failure_rate = failures as f64 / calls.max(1) as f64;
        m.success_rate = 1.0 - m.failure_rate;
        m.avg_latency_ms = avg_latency_ms;
        m.last_updated = Utc::now();
        m
    }

    #[test]
    fn test_failure_rate_bands() {
        let thresholds = AlertThresholds::default();

        let quarter = thresholds.evaluate(&[metrics(4, 1, 100.0)]);
        assert_eq!(quarter.len(), 1);
        assert_eq!(quarter[0].kind, AlertKind::HighFailureRate);
        assert_eq!(quarter[0].severity, Severity::Critical);
        assert_eq!(quarter[0].threshold, 0.20);

        let fifteen = thresholds.evaluate(&[metrics(20, 3, 100.0)]);
        assert_eq!(fifteen[0].severity, Severity::Warning);

        // exactly at the threshold does not alert
        assert!(thresholds.evaluate(&[metrics(10, 1, 100.0)]).is_empty());
    }

    #[test]
    fn test_latency_bands() {
        let thresholds = AlertThresholds::default();
        let warn = thresholds.evaluate(&[metrics(5, 0, 45_000.0)]);
        assert_eq!(warn.len(), 1);
        assert_eq!(warn[0].kind, AlertKind::HighLatency);
        assert_eq!(warn[0].severity, Severity::Warning);

        let crit = thresholds.evaluate(&[metrics(5, 0, 61_000.0)]);
        assert_eq!(crit[0].severity, Severity::Critical);
        assert_eq!(crit[0].observed, 61_000.0);
    }

    #[test]
    fn test_both_alerts_for_one_model() {
        let alerts = AlertThresholds::default().evaluate(&[metrics(2, 1, 90_000.0)]);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::HighFailureRate);
        assert_eq!(alerts[1].kind, AlertKind::HighLatency);
    }

    #[test]
    fn test_min_calls_suppresses_sparse_models() {
        let thresholds = AlertThresholds {
            min_calls: 10,
            ..Default::default()
        };
        assert!(thresholds.evaluate(&[metrics(5, 5, 100.0)]).is_empty());
        assert!(AlertThresholds::default()
            .evaluate(&[metrics(0, 0, 0.0)])
            .is_empty());
    }

    #[test]
    fn test_thresholds_from_toml() {
        let thresholds: AlertThresholds = toml::from_str("failure_rate_warning = 0.05").unwrap();
        assert_eq!(thresholds.failure_rate_warning, 0.05);
        assert_eq!(thresholds.failure_rate_critical, 0.20);
    }
}
