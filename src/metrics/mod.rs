//! # Metrics & Usage Recording
//!
//! Telemetry flows out of the gateway on every call into three places:
//!
//! - [`usage`]: one [`UsageRecord`] per successful call, for billing
//! - [`performance`]: running per-model aggregates feeding selection and alerts
//! - Prometheus, through the `metrics` facade
//!
//! ## Prometheus Metrics
//!
//! **Counters:**
//! - `meridian_requests_total{model, backend, status}` - Total calls
//! - `meridian_errors_total{error_type, model}` - Failed calls by type
//! - `meridian_tokens_total{model, backend, type}` - Token counts
//! - `meridian_workflow_steps_total{kind, status}` - Workflow steps
//! - `meridian_stream_disconnects_total{model, backend}` - Streams dropped early
//! - `meridian_token_count_tier_total{tier, model}` - Local token counts by accuracy tier
//!
//! **Histograms:**
//! - `meridian_request_duration_seconds{model, backend}` - Call duration
//!
//! **Gauges:**
//! - `meridian_cost_usd_total{model, backend}` - Spend in USD; only ever
//!   incremented, a gauge because counters are integral
//! - `meridian_backends_total` - Registered backends
//! - `meridian_backends_healthy` - Healthy backends
//! - `meridian_models_available` - Available catalog entries

pub mod alerts;
pub mod performance;
pub mod usage;

pub use alerts::{Alert, AlertKind, AlertThresholds, Severity};
pub use performance::{PerformanceMetrics, PerformanceRecorder};
pub use usage::{
    InMemoryUsageStore, ModelUsage, UsageFilter, UsageRecord, UsageReport, UsageStore,
    UsageStoreError,
};

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::{BackendStatus, Registry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// Replace characters Prometheus rejects in label names with `_`, and prefix
/// a leading digit with `_`.
pub fn sanitize_label(label: &str) -> String {
    let mut sanitized = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    if sanitized.is_empty() || sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Computes registry-derived gauges and renders the Prometheus exposition.
pub struct MetricsCollector {
    registry: Arc<Registry>,
    start_time: Instant,
    /// Thread-safe cache for sanitized Prometheus labels
    label_cache: DashMap<String, String>,
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<Registry>,
        start_time: Instant,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        Self {
            registry,
            start_time,
            label_cache: DashMap::new(),
            prometheus_handle,
        }
    }

    /// Cached [`sanitize_label`].
    pub fn sanitize_label(&self, label: &str) -> String {
        if let Some(cached) = self.label_cache.get(label) {
            return cached.clone();
        }
        let sanitized = sanitize_label(label);
        self.label_cache
            .insert(label.to_string(), sanitized.clone());
        sanitized
    }

    /// Update backend and catalog gauges from the registry.
    pub fn update_catalog_gauges(&self) {
        let backends = self.registry.backends();
        metrics::gauge!("meridian_backends_total").set(backends.len() as f64);

        let healthy = backends
            .iter()
            .filter(|b| b.status == BackendStatus::Healthy)
            .count();
        metrics::gauge!("meridian_backends_healthy").set(healthy as f64);

        let available = self
            .registry
            .models()
            .iter()
            .filter(|m| m.is_available)
            .count();
        metrics::gauge!("meridian_models_available").set(available as f64);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Refresh gauges and render metrics in Prometheus text format.
    pub fn render_metrics(&self) -> String {
        self.update_catalog_gauges();
        self.prometheus_handle.render()
    }
}

/// Initialize the Prometheus recorder with LLM-shaped histogram buckets.
///
/// Durations: [0.1, 0.25, 0.5, 1, 2.5, 5, 10, 30, 60, 120, 300] seconds.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let duration_buckets = &[
        0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("meridian_request_duration_seconds".to_string()),
            duration_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}
