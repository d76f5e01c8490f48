//! Workflow orchestration.
//!
//! Chains gateway calls with retrieval, compression and tool steps. Runs are
//! sequential, parallel, or conditional. Step outputs are cached per session,
//! and a failing step is replaced by fallback output instead of aborting the
//! run.

pub mod cache;
pub mod collaborators;
mod error;
pub mod types;

pub use cache::{cache_key, InMemoryCache, KeyValueCache};
pub use collaborators::{
    Compressed, Compressor, Document, InMemoryRetriever, Retriever, ToolHandler, ToolRegistry,
    TruncatingCompressor,
};
pub use error::{CollaboratorError, WorkflowError};
pub use types::{
    CompressionInput, LlmCallInput, RetrievalInput, StepError, StepKind, StepOutcome, ToolInput,
    WorkflowContext, WorkflowResult, WorkflowStep,
};

use crate::agent::{InferenceRequest, TokenUsage};
use crate::config::WorkflowConfig;
use crate::gateway::template::substitute;
use crate::gateway::InferenceGateway;
use crate::routing::SelectionContext;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use types::value_text;

/// Placeholder names filled from run state and step input.
pub const KNOWLEDGE: &str = "knowledge";
pub const COMPRESSED_HISTORY: &str = "compressedHistory";
pub const USER_INPUT: &str = "userInput";
pub const REPORT_DATA: &str = "reportData";
pub const SYMPTOMS: &str = "symptoms";

/// Outputs visible to later steps of a sequential run.
#[derive(Debug, Default)]
struct RunState {
    outputs: HashMap<String, String>,
    knowledge: Option<String>,
    compressed_history: Option<String>,
}

impl RunState {
    fn absorb(&mut self, kind: &StepKind, outcome: &StepOutcome) {
        self.outputs
            .insert(outcome.id.clone(), value_text(&outcome.output));
        if !outcome.succeeded() {
            return;
        }
        match kind {
            StepKind::RagRetrieval(_) => {
                let docs: Vec<Document> =
                    serde_json::from_value(outcome.output.clone()).unwrap_or_default();
                self.knowledge = Some(
                    docs.iter()
                        .map(|d| d.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
            StepKind::Compression(_) => {
                self.compressed_history = Some(value_text(&outcome.output));
            }
            StepKind::LlmCall(_) | StepKind::ToolUse(_) => {}
        }
    }
}

pub struct WorkflowOrchestrator {
    gateway: Arc<InferenceGateway>,
    config: WorkflowConfig,
    cache: Option<Arc<dyn KeyValueCache>>,
    retriever: Option<Arc<dyn Retriever>>,
    compressor: Option<Arc<dyn Compressor>>,
    tools: ToolRegistry,
}

impl WorkflowOrchestrator {
    /// Orchestrator with an in-memory step cache when caching is enabled.
    pub fn new(gateway: Arc<InferenceGateway>, config: WorkflowConfig) -> Self {
        let cache: Option<Arc<dyn KeyValueCache>> = config
            .cache_enabled
            .then(|| Arc::new(InMemoryCache::new()) as Arc<dyn KeyValueCache>);
        Self {
            gateway,
            config,
            cache,
            retriever: None,
            compressor: None,
            tools: ToolRegistry::default(),
        }
    }

    /// Replace the step cache. Ignored when caching is disabled.
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        if self.config.cache_enabled {
            self.cache = Some(cache);
        }
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run steps in order. Each step sees the outputs of the ones before it.
    pub async fn run_sequential(
        &self,
        steps: &mut [WorkflowStep],
        ctx: &WorkflowContext,
    ) -> Result<WorkflowResult, WorkflowError> {
        check_ids(steps)?;
        let start = Instant::now();
        tracing::info!(
            session_id = %ctx.session_id,
            caller_id = %ctx.caller_id,
            steps = steps.len(),
            mode = "sequential",
            "Workflow started"
        );

        let mut state = RunState::default();
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps.iter_mut() {
            let outcome = self.execute(step, ctx, &state).await;
            state.absorb(&step.kind, &outcome);
            outcomes.push(outcome);
        }

        Ok(self.finish(ctx, outcomes, start))
    }

    /// Run every step concurrently. Steps cannot reference each other.
    pub async fn run_parallel(
        &self,
        steps: &mut [WorkflowStep],
        ctx: &WorkflowContext,
    ) -> Result<WorkflowResult, WorkflowError> {
        check_ids(steps)?;
        let start = Instant::now();
        tracing::info!(
            session_id = %ctx.session_id,
            caller_id = %ctx.caller_id,
            steps = steps.len(),
            mode = "parallel",
            "Workflow started"
        );

        let state = RunState::default();
        let outcomes = futures::future::join_all(
            steps
                .iter_mut()
                .map(|step| self.execute(step, ctx, &state)),
        )
        .await;

        Ok(self.finish(ctx, outcomes, start))
    }

    /// Evaluate `predicate` once and run the chosen branch sequentially.
    pub async fn run_conditional<P>(
        &self,
        predicate: P,
        if_true: &mut [WorkflowStep],
        if_false: &mut [WorkflowStep],
        ctx: &WorkflowContext,
    ) -> Result<WorkflowResult, WorkflowError>
    where
        P: FnOnce(&WorkflowContext) -> bool,
    {
        let taken = predicate(ctx);
        tracing::debug!(session_id = %ctx.session_id, branch = taken, "Condition evaluated");
        let branch = if taken { if_true } else { if_false };
        self.run_sequential(branch, ctx).await
    }

    fn finish(&self, ctx: &WorkflowContext, outcomes: Vec<StepOutcome>, start: Instant) -> WorkflowResult {
        let result = WorkflowResult::from_outcomes(outcomes, start.elapsed().as_millis() as u64);
        tracing::info!(
            session_id = %ctx.session_id,
            success = result.success,
            total_tokens = result.total_tokens,
            duration_ms = result.duration_ms,
            "Workflow completed"
        );
        result
    }

    /// Run one step, consulting the cache first. Never fails: errors become
    /// fallback output.
    async fn execute(
        &self,
        step: &mut WorkflowStep,
        ctx: &WorkflowContext,
        state: &RunState,
    ) -> StepOutcome {
        step.reset();
        let start = Instant::now();
        let key = cache_key(&ctx.session_id, &step.id);
        let kind = step.kind.as_str();

        let (output, tokens, cached, error) = match self.cached(&key).await {
            Some(output) => (output, TokenUsage::default(), true, None),
            None => match self.dispatch(step, ctx, state).await {
                Ok((output, tokens)) => {
                    self.store(&key, &output).await;
                    (output, tokens, false, None)
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        step_id = %step.id,
                        kind,
                        error = %e,
                        "Step failed, using fallback"
                    );
                    let output = match &step.fallback {
                        Some(text) => Value::String(text.clone()),
                        None => json!({ "error": e.to_string(), "code": e.code(), "step": step.id }),
                    };
                    (output, TokenUsage::default(), false, Some(StepError::from(&e)))
                }
            },
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = match (&error, cached) {
            (Some(_), _) => "fallback",
            (None, true) => "cached",
            (None, false) => "success",
        };
        ::metrics::counter!("meridian_workflow_steps_total", "kind" => kind, "status" => status)
            .increment(1);
        tracing::debug!(
            session_id = %ctx.session_id,
            step_id = %step.id,
            kind,
            status,
            latency_ms,
            tokens = tokens.total,
            "Step finished"
        );

        step.output = Some(output.clone());
        step.latency_ms = Some(latency_ms);
        step.tokens = Some(tokens);
        step.error = error.clone();

        StepOutcome {
            id: step.id.clone(),
            name: step.name.clone(),
            kind: kind.to_string(),
            output,
            tokens,
            latency_ms,
            cached,
            error,
        }
    }

    async fn cached(&self, key: &str) -> Option<Value> {
        let cache = self.cache.as_ref()?;
        let text = match cache.get(key).await {
            Ok(hit) => hit?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    async fn store(&self, key: &str, output: &Value) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache
            .set(key, output.to_string(), self.config.cache_ttl())
            .await
        {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn dispatch(
        &self,
        step: &WorkflowStep,
        ctx: &WorkflowContext,
        state: &RunState,
    ) -> Result<(Value, TokenUsage), WorkflowError> {
        match &step.kind {
            StepKind::LlmCall(input) => self.llm_call(&step.id, input, ctx, state).await,
            StepKind::RagRetrieval(input) => {
                let retriever = self
                    .retriever
                    .as_ref()
                    .ok_or(WorkflowError::MissingCollaborator("retriever"))?;
                let top_k = input.top_k.unwrap_or(self.config.retrieval_top_k);
                let docs = retriever
                    .retrieve(&input.query, top_k)
                    .await
                    .map_err(WorkflowError::Retrieval)?;
                Ok((json!(docs), TokenUsage::default()))
            }
            StepKind::Compression(input) => {
                let compressor = self
                    .compressor
                    .as_ref()
                    .ok_or(WorkflowError::MissingCollaborator("compressor"))?;
                let compressed = compressor
                    .compress(&input.messages, input.max_tokens)
                    .await
                    .map_err(WorkflowError::Compression)?;
                Ok((Value::String(compressed.summary), compressed.usage))
            }
            StepKind::ToolUse(input) => {
                let handler = self
                    .tools
                    .get(&input.tool)
                    .ok_or_else(|| WorkflowError::UnknownTool(input.tool.clone()))?;
                let output = handler
                    .invoke(&input.input)
                    .await
                    .map_err(|source| WorkflowError::Tool {
                        tool: input.tool.clone(),
                        source,
                    })?;
                Ok((output, TokenUsage::default()))
            }
        }
    }

    async fn llm_call(
        &self,
        step_id: &str,
        input: &LlmCallInput,
        ctx: &WorkflowContext,
        state: &RunState,
    ) -> Result<(Value, TokenUsage), WorkflowError> {
        let prompt = substitute(&input.prompt, |name| match name {
            KNOWLEDGE => state.knowledge.clone(),
            COMPRESSED_HISTORY => state.compressed_history.clone(),
            USER_INPUT if input.user_input.is_some() => input.user_input.clone(),
            REPORT_DATA if input.report_data.is_some() => input.report_data.clone(),
            SYMPTOMS if input.symptoms.is_some() => input.symptoms.clone(),
            other => state
                .outputs
                .get(other)
                .or_else(|| ctx.variables.get(other))
                .cloned(),
        });

        let mut request = InferenceRequest::new(prompt);
        if let Some(system) = &input.system_prompt {
            request = request.with_system_prompt(system.clone());
        }
        if let Some(max_tokens) = input.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = input.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(model) = &input.model {
            request = request.with_model(model.clone());
        }

        let scenario = input
            .scenario
            .as_deref()
            .or(ctx.scenario.as_deref())
            .unwrap_or(&self.config.default_scenario);
        let selection = SelectionContext::for_user(ctx.caller_id.clone())
            .with_step(step_id)
            .with_agent_type("workflow");

        let response = self
            .gateway
            .call_in_context(&request, &ctx.caller_id, scenario, selection)
            .await?;
        Ok((Value::String(response.text), response.usage))
    }
}

fn check_ids(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStep(step.id.clone()));
        }
    }
    Ok(())
}
