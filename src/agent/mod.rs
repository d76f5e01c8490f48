//! Backend adapter layer.
//!
//! This module provides the `InferenceAgent` trait and supporting types that hide
//! provider wire formats (OpenAI chat completions, Anthropic Messages, Ollama
//! native API) behind one contract.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

pub mod anthropic;
pub mod error;
pub mod factory;
pub mod framing;
#[cfg(test)]
pub(crate) mod mock;
pub mod model_cache;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod tokenizer;
pub mod types;

// Re-export key types for convenience
pub use error::AgentError;
pub use model_cache::ModelCache;
pub use pricing::PricingTable;
pub use tokenizer::TokenizerRegistry;
pub use types::{
    AgentProfile, InferenceRequest, InferenceResponse, InvalidRequest, ModelDescriptor, ModelId,
    StreamChunk, TokenUsage,
};

/// Stream of text fragments produced by [`InferenceAgent::stream`].
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, AgentError>>;

/// Unified interface for all LLM inference backends.
///
/// Encapsulates backend-specific HTTP protocols, response parsing, and token
/// accounting. Enables uniform routing without type branching.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn InferenceAgent>`.
/// All async methods use `async_trait` for compatibility with trait objects.
///
/// # Cancellation Safety
///
/// All async methods are cancellation-safe. Dropping a future (or a returned
/// stream) aborts the in-flight HTTP request.
#[async_trait]
pub trait InferenceAgent: Send + Sync + 'static {
    // ========================================================================
    // Identity & Metadata (synchronous)
    // ========================================================================

    /// Backend name as used in model ids (`<name>:<model>`).
    fn name(&self) -> &str;

    /// Agent profile with backend type and version.
    fn profile(&self) -> AgentProfile;

    // ========================================================================
    // Inference (required)
    // ========================================================================

    /// Execute one non-streaming generation request against `model`.
    ///
    /// # Returns
    ///
    /// - `Ok(InferenceResponse)` with normalized token usage
    /// - `Err(AgentError::Upstream)` if backend returned error (4xx, 5xx)
    /// - `Err(AgentError::Network)` if connection failed
    /// - `Err(AgentError::Timeout)` if request exceeded deadline
    /// - `Err(AgentError::InvalidResponse)` if the body could not be decoded
    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError>;

    /// Execute a streaming generation request.
    ///
    /// Errors before the first byte are returned directly; errors after that
    /// are yielded as stream items.
    async fn stream(&self, request: &InferenceRequest, model: &str)
        -> Result<ChunkStream, AgentError>;

    // ========================================================================
    // Discovery & Health
    // ========================================================================

    /// Cheap reachability probe. Never errors; any failure reads as `false`.
    async fn health_check(&self) -> bool;

    /// Models offered by this backend, served from the adapter's [`ModelCache`].
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, AgentError>;

    /// Descriptor for one model. Unknown names (or an unreachable backend)
    /// produce a descriptor with `is_available = false`.
    async fn get_model_info(&self, name: &str) -> ModelDescriptor {
        match self.list_models().await {
            Ok(models) => models
                .into_iter()
                .find(|m| m.name == name)
                .unwrap_or_else(|| ModelDescriptor::unavailable(self.name(), name)),
            Err(e) => {
                tracing::debug!(backend = %self.name(), model = %name, error = %e, "Model lookup failed");
                ModelDescriptor::unavailable(self.name(), name)
            }
        }
    }
}

/// Connection settings shared by the HTTP adapters.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    /// Base URL without trailing slash (e.g., "http://localhost:11434").
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-request timeout for inference calls.
    pub timeout: Duration,
    /// Timeout for health probes and model listing.
    pub probe_timeout: Duration,
    pub pricing: PricingTable,
    /// Static model names to advertise in addition to (or instead of) the
    /// upstream listing.
    pub models: Vec<String>,
}

impl AgentSettings {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(5),
            pricing: PricingTable::new(),
            models: Vec::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    pub(crate) fn probe_timeout_ms(&self) -> u64 {
        self.probe_timeout.as_millis() as u64
    }

    /// Descriptor for `model` on this backend with pricing applied.
    pub(crate) fn describe(&self, model: &str, context_window: u32) -> ModelDescriptor {
        let (input, output) = self.pricing.per_token(model);
        ModelDescriptor {
            context_window,
            cost_per_input_token: input,
            cost_per_output_token: output,
            ..ModelDescriptor::new(&self.name, model)
        }
    }
}

/// Shared handle type stored in the registry.
pub type SharedAgent = Arc<dyn InferenceAgent>;
