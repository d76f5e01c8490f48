//! Inference gateway: the single entry point for generation requests.
//!
//! A call is validated, rendered, resolved to one catalog model (pinned by
//! the caller or picked by the [`Selector`]), access-checked, executed
//! through the retry executor, and recorded.

pub mod error;
pub mod telemetry;
pub mod template;

pub use error::{ErrorBody, GatewayError};
pub use telemetry::{CallContext, Telemetry};
pub use template::{PromptTemplates, TemplateError};

use crate::agent::{
    InferenceRequest, InferenceResponse, InvalidRequest, ModelDescriptor, ModelId, SharedAgent,
    StreamChunk, TokenUsage, TokenizerRegistry,
};
use crate::logging::generate_call_id;
use crate::metrics::{InMemoryUsageStore, PerformanceRecorder, UsageStore};
use crate::registry::Registry;
use crate::retry::RetryExecutor;
use crate::routing::{SelectionConstraints, SelectionContext, Selector};
use crate::security::{AccessControl, AuditLog, AuditSink};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Fragments of a gateway stream.
pub type GatewayStream = BoxStream<'static, Result<StreamChunk, GatewayError>>;

/// Request metadata keys read as selection constraints.
pub const MAX_COST_KEY: &str = "max_cost";
pub const MAX_LATENCY_KEY: &str = "max_latency_ms";

/// A request resolved to a model and its adapter.
struct Resolved {
    request: Arc<InferenceRequest>,
    agent: SharedAgent,
    ctx: CallContext,
}

pub struct InferenceGateway {
    registry: Arc<Registry>,
    selector: Arc<Selector>,
    retry: RetryExecutor,
    templates: PromptTemplates,
    access: Option<AccessControl>,
    telemetry: Arc<Telemetry>,
    /// Counts streams the provider did not meter. Defaults to the shared registry.
    tokenizer: Option<Arc<TokenizerRegistry>>,
}

impl InferenceGateway {
    /// Gateway with default retry policy, in-memory usage store and audit log.
    /// Performance samples go to the registry's recorder when it has one.
    pub fn new(registry: Arc<Registry>, selector: Arc<Selector>) -> Self {
        let performance = registry
            .performance()
            .cloned()
            .unwrap_or_else(|| Arc::new(PerformanceRecorder::default()));
        let telemetry = Telemetry::new(
            Arc::new(InMemoryUsageStore::new()),
            performance,
            Arc::new(AuditLog::default()),
        );
        Self {
            registry,
            selector,
            retry: RetryExecutor::default(),
            templates: PromptTemplates::default(),
            access: None,
            telemetry: Arc::new(telemetry),
            tokenizer: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_access_control(mut self, access: AccessControl) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<TokenizerRegistry>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Arc::new(telemetry);
        self
    }

    pub fn with_usage_store(self, usage: Arc<dyn UsageStore>) -> Self {
        self.map_telemetry(|t| t.with_usage_store(usage))
    }

    pub fn with_audit_sink(self, audit: Arc<dyn AuditSink>) -> Self {
        self.map_telemetry(|t| t.with_audit_sink(audit))
    }

    pub fn with_performance(self, performance: Arc<PerformanceRecorder>) -> Self {
        self.map_telemetry(|t| t.with_performance(performance))
    }

    /// Include truncated prompt and completion text in call logs.
    pub fn with_content_logging(self, enabled: bool, max_chars: usize) -> Self {
        self.map_telemetry(|t| t.with_content_logging(enabled, max_chars))
    }

    fn map_telemetry(mut self, f: impl FnOnce(Telemetry) -> Telemetry) -> Self {
        self.telemetry = Arc::new(f((*self.telemetry).clone()));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn selector(&self) -> &Arc<Selector> {
        &self.selector
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Generate a completion for `caller_id` under `scenario`.
    pub async fn call(
        &self,
        request: &InferenceRequest,
        caller_id: &str,
        scenario: &str,
    ) -> Result<InferenceResponse, GatewayError> {
        self.call_in_context(
            request,
            caller_id,
            scenario,
            SelectionContext::for_user(caller_id),
        )
        .await
    }

    /// [`call`](Self::call) with extra selection context for the decision log.
    pub async fn call_in_context(
        &self,
        request: &InferenceRequest,
        caller_id: &str,
        scenario: &str,
        context: SelectionContext,
    ) -> Result<InferenceResponse, GatewayError> {
        let Resolved {
            request,
            agent,
            ctx,
        } = self.resolve(request, caller_id, scenario, context)?;

        let start = Instant::now();
        let model_name = ctx.model.name.clone();
        let outcome = self
            .retry
            .execute("inference", || {
                let agent = Arc::clone(&agent);
                let request = Arc::clone(&request);
                let model = model_name.clone();
                async move { agent.call(&request, &model).await }
            })
            .await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(response) => {
                self.telemetry
                    .record_success(&ctx, &request.prompt, &response, elapsed)
                    .await;
                Ok(response)
            }
            Err(e) => {
                let error = GatewayError::from_retry(e, &ctx.model.backend);
                self.telemetry.record_failure(&ctx, &error, elapsed);
                Err(error)
            }
        }
    }

    /// Stream a completion. Not retried: a partially consumed stream cannot be
    /// replayed. Dropping the returned stream is logged as a disconnect.
    pub async fn stream(
        &self,
        request: &InferenceRequest,
        caller_id: &str,
        scenario: &str,
    ) -> Result<GatewayStream, GatewayError> {
        let Resolved {
            request,
            agent,
            ctx,
        } = self.resolve(
            request,
            caller_id,
            scenario,
            SelectionContext::for_user(caller_id),
        )?;

        let start = Instant::now();
        let mut inner = match agent.stream(&request, &ctx.model.name).await {
            Ok(inner) => inner,
            Err(e) => {
                let error = GatewayError::from_agent(e, &ctx.model.backend, 1);
                self.telemetry.record_failure(&ctx, &error, start.elapsed());
                return Err(error);
            }
        };

        let telemetry = Arc::clone(&self.telemetry);
        let tokenizer = self.tokenizer.clone();
        let stream = async_stream::stream! {
            let mut guard = DisconnectGuard {
                telemetry: Arc::clone(&telemetry),
                ctx: ctx.clone(),
                start,
                finished: false,
            };
            let mut text = String::new();
            let mut metered: Option<TokenUsage> = None;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        text.push_str(&chunk.text);
                        if let Some(counted) = chunk.usage {
                            metered.get_or_insert_with(TokenUsage::default).absorb(counted);
                        }
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        guard.finished = true;
                        let error = GatewayError::from_agent(e, &ctx.model.backend, 1);
                        telemetry.record_failure(&ctx, &error, start.elapsed());
                        yield Err(error);
                        return;
                    }
                }
            }
            guard.finished = true;
            let usage = metered.unwrap_or_else(|| {
                tokenizer
                    .unwrap_or_else(TokenizerRegistry::shared)
                    .usage(&ctx.model.name, &request.prompt, &text)
            });
            telemetry
                .record_completion(&ctx, &request.prompt, &text, usage, start.elapsed())
                .await;
        };
        Ok(Box::pin(stream))
    }

    /// Validation, template rendering, model resolution and access check.
    /// Nothing here touches the network or writes telemetry except an
    /// access-denied audit event.
    fn resolve(
        &self,
        request: &InferenceRequest,
        caller_id: &str,
        scenario: &str,
        context: SelectionContext,
    ) -> Result<Resolved, GatewayError> {
        request.validate()?;
        let request = self.render(request)?;

        let models = self.registry.models();
        let model = match &request.model {
            Some(pinned) => {
                let model = self.pinned(pinned, &models)?;
                self.check_access(caller_id, &model.key(), scenario)?;
                model
            }
            None => {
                let catalog_empty = models.is_empty();
                let permitted = self.permitted(caller_id, models);
                if permitted.is_empty() && !catalog_empty {
                    self.telemetry.record_denied(caller_id, "*", scenario);
                    return Err(GatewayError::AccessDenied {
                        caller: caller_id.to_string(),
                        model: "any catalog model".to_string(),
                    });
                }
                let constraints = constraints_from(&request);
                self.selector
                    .select(scenario, &permitted, &constraints, context)?
                    .model
            }
        };

        let agent = self
            .registry
            .get_agent(&model.backend)
            .ok_or_else(|| GatewayError::ModelNotFound { model: model.key() })?;

        let ctx = CallContext {
            call_id: generate_call_id(),
            caller_id: caller_id.to_string(),
            scenario: scenario.to_string(),
            model,
        };
        tracing::debug!(
            call_id = %ctx.call_id,
            caller_id = %caller_id,
            scenario = %scenario,
            model = %ctx.model_key(),
            "Request resolved"
        );
        Ok(Resolved {
            request: Arc::new(request),
            agent,
            ctx,
        })
    }

    fn render(&self, request: &InferenceRequest) -> Result<InferenceRequest, GatewayError> {
        let Some(name) = &request.template else {
            return Ok(request.clone());
        };
        let prompt = self
            .templates
            .render(name, &request.variables)
            .map_err(|e| InvalidRequest::new("template", e.to_string()))?;
        if prompt.trim().is_empty() {
            return Err(InvalidRequest::new("template", "rendered prompt is empty").into());
        }
        Ok(request.rendered(prompt))
    }

    fn pinned(
        &self,
        pinned: &str,
        models: &[ModelDescriptor],
    ) -> Result<ModelDescriptor, GatewayError> {
        let not_found = || GatewayError::ModelNotFound {
            model: pinned.to_string(),
        };
        let id = ModelId::parse(pinned).ok_or_else(not_found)?;
        let key = id.key();
        models
            .iter()
            .find(|m| m.key() == key)
            .cloned()
            .ok_or_else(not_found)
    }

    fn check_access(&self, caller_id: &str, model_key: &str, scenario: &str) -> Result<(), GatewayError> {
        let Some(access) = &self.access else {
            return Ok(());
        };
        access.check(caller_id, model_key).map_err(|_| {
            self.telemetry.record_denied(caller_id, model_key, scenario);
            GatewayError::AccessDenied {
                caller: caller_id.to_string(),
                model: model_key.to_string(),
            }
        })
    }

    fn permitted(&self, caller_id: &str, models: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
        match &self.access {
            Some(access) => models
                .into_iter()
                .filter(|m| access.is_allowed(caller_id, &m.key()))
                .collect(),
            None => models,
        }
    }
}

/// Logs a disconnect when a stream is dropped before it finished.
struct DisconnectGuard {
    telemetry: Arc<Telemetry>,
    ctx: CallContext,
    start: Instant,
    finished: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.telemetry
                .record_disconnect(&self.ctx, self.start.elapsed());
        }
    }
}

fn constraints_from(request: &InferenceRequest) -> SelectionConstraints {
    let number = |key: &str| request.metadata.get(key).and_then(|v| v.as_f64());
    SelectionConstraints {
        max_cost: number(MAX_COST_KEY),
        max_latency_ms: number(MAX_LATENCY_KEY),
    }
}
