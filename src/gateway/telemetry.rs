//! Per-call telemetry: usage records, performance aggregates, Prometheus
//! counters, audit events and call logs.

use super::GatewayError;
use crate::agent::{InferenceResponse, ModelDescriptor, TokenUsage};
use crate::logging::content_preview;
use crate::metrics::{PerformanceRecorder, UsageRecord, UsageStore};
use crate::security::{AuditAction, AuditEvent, AuditOutcome, AuditSink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Identity of one gateway call, shared by every telemetry write it makes.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub caller_id: String,
    pub scenario: String,
    pub model: ModelDescriptor,
}

impl CallContext {
    pub fn model_key(&self) -> String {
        self.model.key()
    }
}

#[derive(Clone)]
pub struct Telemetry {
    usage: Arc<dyn UsageStore>,
    performance: Arc<PerformanceRecorder>,
    audit: Arc<dyn AuditSink>,
    content_logging: bool,
    content_max_chars: usize,
}

impl Telemetry {
    pub fn new(
        usage: Arc<dyn UsageStore>,
        performance: Arc<PerformanceRecorder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            usage,
            performance,
            audit,
            content_logging: false,
            content_max_chars: 100,
        }
    }

    pub fn with_content_logging(mut self, enabled: bool, max_chars: usize) -> Self {
        self.content_logging = enabled;
        self.content_max_chars = max_chars;
        self
    }

    pub fn with_usage_store(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_performance(mut self, performance: Arc<PerformanceRecorder>) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    pub fn performance(&self) -> &Arc<PerformanceRecorder> {
        &self.performance
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Successful call: usage record, performance sample, counters, audit.
    pub async fn record_success(
        &self,
        ctx: &CallContext,
        prompt: &str,
        response: &InferenceResponse,
        elapsed: Duration,
    ) -> UsageRecord {
        self.record_completion(ctx, prompt, &response.text, response.usage, elapsed)
            .await
    }

    /// Shared by `call` and fully consumed streams.
    pub async fn record_completion(
        &self,
        ctx: &CallContext,
        prompt: &str,
        completion: &str,
        usage: TokenUsage,
        elapsed: Duration,
    ) -> UsageRecord {
        let latency_ms = elapsed.as_millis() as u64;
        let cost = ctx.model.cost_for(&usage);

        self.performance
            .record(&ctx.model.backend, &ctx.model.name, latency_ms as f64, true);

        let record = UsageRecord {
            id: Uuid::new_v4(),
            user_id: ctx.caller_id.clone(),
            model: ctx.model.name.clone(),
            backend: ctx.model.backend.clone(),
            scenario: ctx.scenario.clone(),
            input_tokens: usage.input,
            output_tokens: usage.output,
            total_tokens: usage.total,
            cost_usd: cost,
            latency_ms,
            success: true,
            error_code: None,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.usage.create(record.clone()).await {
            tracing::error!(call_id = %ctx.call_id, error = %e, "Failed to write usage record");
        }

        let model = ctx.model.name.clone();
        let backend = ctx.model.backend.clone();
        metrics::counter!("meridian_requests_total",
            "model" => model.clone(), "backend" => backend.clone(), "status" => "success")
        .increment(1);
        metrics::histogram!("meridian_request_duration_seconds",
            "model" => model.clone(), "backend" => backend.clone())
        .record(elapsed.as_secs_f64());
        metrics::counter!("meridian_tokens_total",
            "model" => model.clone(), "backend" => backend.clone(), "type" => "input")
        .increment(u64::from(usage.input));
        metrics::counter!("meridian_tokens_total",
            "model" => model.clone(), "backend" => backend.clone(), "type" => "output")
        .increment(u64::from(usage.output));
        metrics::gauge!("meridian_cost_usd_total", "model" => model, "backend" => backend)
            .increment(cost);

        self.audit.record(
            AuditEvent::new(
                &ctx.caller_id,
                AuditAction::Inference,
                ctx.model_key(),
                AuditOutcome::Success,
            )
            .with_detail(format!("tokens={} cost_usd={:.6}", usage.total, cost)),
        );

        tracing::info!(
            call_id = %ctx.call_id,
            caller_id = %ctx.caller_id,
            scenario = %ctx.scenario,
            backend = %ctx.model.backend,
            model = %ctx.model.name,
            latency_ms,
            input_tokens = usage.input,
            output_tokens = usage.output,
            cost_usd = cost,
            prompt = content_preview(prompt, self.content_logging, self.content_max_chars).as_deref(),
            completion = content_preview(completion, self.content_logging, self.content_max_chars).as_deref(),
            "Inference call completed"
        );
        record
    }

    /// Failed call: performance sample and error counters only.
    pub fn record_failure(&self, ctx: &CallContext, error: &GatewayError, elapsed: Duration) {
        let latency_ms = elapsed.as_millis() as u64;
        self.performance
            .record(&ctx.model.backend, &ctx.model.name, latency_ms as f64, false);

        metrics::counter!("meridian_requests_total",
            "model" => ctx.model.name.clone(),
            "backend" => ctx.model.backend.clone(),
            "status" => "error")
        .increment(1);
        metrics::counter!("meridian_errors_total",
            "error_type" => error.error_type(),
            "model" => ctx.model.name.clone())
        .increment(1);

        self.audit.record(
            AuditEvent::new(
                &ctx.caller_id,
                AuditAction::Inference,
                ctx.model_key(),
                AuditOutcome::Failure,
            )
            .with_detail(error.code()),
        );

        tracing::error!(
            call_id = %ctx.call_id,
            caller_id = %ctx.caller_id,
            scenario = %ctx.scenario,
            backend = %ctx.model.backend,
            model = %ctx.model.name,
            latency_ms,
            code = error.code(),
            error = %error,
            "Inference call failed"
        );
    }

    /// Access check refused the caller.
    pub fn record_denied(&self, caller_id: &str, resource: &str, scenario: &str) {
        metrics::counter!("meridian_errors_total",
            "error_type" => "access_denied", "model" => resource.to_string())
        .increment(1);
        self.audit.record(AuditEvent::new(
            caller_id,
            AuditAction::AccessDenied,
            resource,
            AuditOutcome::Denied,
        ));
        tracing::warn!(caller_id = %caller_id, model = %resource, scenario = %scenario, "Access denied");
    }

    /// Consumer dropped a stream before it finished. Not a failure.
    pub fn record_disconnect(&self, ctx: &CallContext, elapsed: Duration) {
        metrics::counter!("meridian_stream_disconnects_total",
            "model" => ctx.model.name.clone(), "backend" => ctx.model.backend.clone())
        .increment(1);
        tracing::info!(
            call_id = %ctx.call_id,
            caller_id = %ctx.caller_id,
            backend = %ctx.model.backend,
            model = %ctx.model.name,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stream consumer disconnected"
        );
    }
}
