//! Shared test utilities for Meridian integration tests.
//!
//! Builds registries backed by scripted agents and gateways whose retries
//! never sleep.

#![allow(dead_code)]

use async_trait::async_trait;
use meridian::agent::{
    AgentError, AgentProfile, ChunkStream, InferenceAgent, InferenceRequest, InferenceResponse,
    ModelDescriptor, StreamChunk, TokenUsage,
};
use meridian::gateway::InferenceGateway;
use meridian::metrics::{InMemoryUsageStore, PerformanceRecorder};
use meridian::registry::Registry;
use meridian::retry::{RetryExecutor, RetryPolicy, Sleeper};
use meridian::routing::{RingDecisionLog, Selector};
use meridian::security::AuditLog;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Retry sleeper that returns immediately.
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// Retry policy with three attempts and no real waiting.
pub fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        multiplier: 2.0,
    })
    .with_sleeper(Arc::new(NoSleep))
}

/// In-process agent that echoes prompts. Queued errors are returned first,
/// one per call.
pub struct ScriptedAgent {
    name: String,
    models: Vec<String>,
    usage: TokenUsage,
    errors: Mutex<VecDeque<AgentError>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            models: Vec::new(),
            usage: TokenUsage::default(),
            errors: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_models(mut self, names: &[&str]) -> Self {
        self.models = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_usage(mut self, input: u32, output: u32) -> Self {
        self.usage = TokenUsage::new(input, output);
        self
    }

    pub fn push_error(&self, error: AgentError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn begin(&self, request: &InferenceRequest) -> Result<(), AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match self.errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InferenceAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> AgentProfile {
        AgentProfile {
            backend_type: "scripted".to_string(),
            version: None,
        }
    }

    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError> {
        self.begin(request)?;
        Ok(InferenceResponse {
            text: request.prompt.clone(),
            model: model.to_string(),
            backend: self.name.clone(),
            usage: self.usage,
            finish_reason: "stop".to_string(),
            metadata: None,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        _model: &str,
    ) -> Result<ChunkStream, AgentError> {
        self.begin(request)?;
        let chunks = vec![
            Ok(StreamChunk::text(request.prompt.clone())),
            Ok(StreamChunk::usage_only(self.usage)),
        ];
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, AgentError> {
        Ok(self
            .models
            .iter()
            .map(|m| ModelDescriptor::new(&self.name, m))
            .collect())
    }
}

/// Model priced per token, with an observed latency.
pub fn priced_model(backend: &str, name: &str, cost: f64, latency_ms: f64) -> ModelDescriptor {
    ModelDescriptor {
        cost_per_input_token: cost,
        cost_per_output_token: cost,
        avg_latency_ms: latency_ms,
        ..ModelDescriptor::new(backend, name)
    }
}

/// Everything a gateway test wants to inspect afterwards.
pub struct Harness {
    pub registry: Arc<Registry>,
    pub gateway: Arc<InferenceGateway>,
    pub usage: Arc<InMemoryUsageStore>,
    pub audit: Arc<AuditLog>,
    pub decisions: Arc<RingDecisionLog>,
    pub performance: Arc<PerformanceRecorder>,
}

impl Harness {
    /// Gateway over `agents` with a fast retry policy. The catalog is
    /// refreshed before returning.
    pub async fn with_agents(agents: Vec<Arc<ScriptedAgent>>) -> Self {
        let registry = Arc::new(Registry::new());
        for agent in agents {
            registry.add_agent(agent).unwrap();
        }
        Self::with_registry(registry).await
    }

    pub async fn with_registry(registry: Arc<Registry>) -> Self {
        registry.refresh_catalog().await;

        let decisions = Arc::new(RingDecisionLog::default());
        let usage = Arc::new(InMemoryUsageStore::new());
        let audit = Arc::new(AuditLog::default());
        let performance = Arc::new(PerformanceRecorder::default());

        let gateway = InferenceGateway::new(
            Arc::clone(&registry),
            Arc::new(Selector::new(decisions.clone())),
        )
        .with_retry(fast_retry())
        .with_usage_store(usage.clone())
        .with_audit_sink(audit.clone())
        .with_performance(Arc::clone(&performance));

        Self {
            registry,
            gateway: Arc::new(gateway),
            usage,
            audit,
            decisions,
            performance,
        }
    }
}
