//! Unified request/response shapes shared by every backend adapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Rejection produced by [`InferenceRequest::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid '{field}': {message}")]
pub struct InvalidRequest {
    pub field: &'static str,
    pub message: String,
}

impl InvalidRequest {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A provider-neutral "generate text" request.
///
/// Built once through the `with_*` methods and never mutated afterwards; the
/// gateway derives a new request when it renders a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Pinned model in `backend:model` form. Skips policy selection when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Named prompt template rendered before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_template(
        mut self,
        template: impl Into<String>,
        variables: HashMap<String, String>,
    ) -> Self {
        self.template = Some(template.into());
        self.variables = variables;
        self
    }

    /// Copy of this request with a different prompt and no template reference.
    pub fn rendered(&self, prompt: String) -> Self {
        Self {
            prompt,
            template: None,
            variables: HashMap::new(),
            ..self.clone()
        }
    }

    /// Check field constraints before any network activity.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.prompt.trim().is_empty() && self.template.is_none() {
            return Err(InvalidRequest::new("prompt", "prompt must not be empty"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(InvalidRequest::new(
                    "temperature",
                    format!("must be within [0, 2], got {}", t),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(InvalidRequest::new("max_tokens", "must be at least 1"));
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(InvalidRequest::new(
                    "top_p",
                    format!("must be within [0, 1], got {}", p),
                ));
            }
        }
        if self.top_k == Some(0) {
            return Err(InvalidRequest::new("top_k", "must be at least 1"));
        }
        if let Some(model) = &self.model {
            ModelId::parse(model)
                .ok_or_else(|| InvalidRequest::new("model", "expected 'backend:model'"))?;
        }
        Ok(())
    }
}

/// Token accounting normalized across providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    /// Build from optional upstream counters. Absent counts are 0 and an absent
    /// total is derived from the other two.
    pub fn from_counts(input: Option<u32>, output: Option<u32>, total: Option<u32>) -> Self {
        let input = input.unwrap_or(0);
        let output = output.unwrap_or(0);
        Self {
            input,
            output,
            total: total.unwrap_or(input + output),
        }
    }

    /// Fold in counters from a later stream frame. Non-zero counts replace
    /// earlier ones; providers split input and output across frames.
    pub fn absorb(&mut self, later: TokenUsage) {
        if later.input > 0 {
            self.input = later.input;
        }
        if later.output > 0 {
            self.output = later.output;
        }
        self.total = self.total.max(later.total).max(self.input + self.output);
    }
}

/// Result of one successful call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub text: String,
    pub model: String,
    pub backend: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Catalog entry describing one model on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub backend: String,
    pub context_window: u32,
    /// USD per input token.
    pub cost_per_input_token: f64,
    /// USD per output token.
    pub cost_per_output_token: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Observed success ratio in [0, 1].
    pub success_rate: f64,
    pub is_available: bool,
}

impl ModelDescriptor {
    /// Fresh descriptor with no observations and zero cost.
    pub fn new(backend: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            context_window: 4096,
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            avg_latency_ms: 0.0,
            min_latency_ms: 0.0,
            max_latency_ms: 0.0,
            success_rate: 1.0,
            is_available: true,
        }
    }

    /// Descriptor for a model the backend no longer reports.
    pub fn unavailable(backend: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_available: false,
            ..Self::new(backend, name)
        }
    }

    /// Catalog key in `backend:model` form.
    pub fn key(&self) -> String {
        format!("{}:{}", self.backend, self.name)
    }

    pub fn combined_cost(&self) -> f64 {
        self.cost_per_input_token + self.cost_per_output_token
    }

    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        usage.input as f64 * self.cost_per_input_token
            + usage.output as f64 * self.cost_per_output_token
    }
}

/// Parsed `backend:model` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub backend: String,
    pub model: String,
}

impl ModelId {
    /// Split at the first `:` so `ollama:llama3:8b` keeps its model tag.
    pub fn parse(id: &str) -> Option<Self> {
        let (backend, model) = id.split_once(':')?;
        if backend.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            backend: backend.to_string(),
            model: model.to_string(),
        })
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.backend, self.model)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.backend, self.model)
    }
}

/// Metadata describing an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Backend type string (e.g., "ollama", "openai", "anthropic").
    pub backend_type: String,
    pub version: Option<String>,
}

/// One incremental text fragment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Token counters, present only on frames where the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Text-less frame carrying only upstream token counters.
    pub fn usage_only(usage: TokenUsage) -> Self {
        Self {
            text: String::new(),
            finish_reason: None,
            usage: Some(usage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_minimal_request() {
        assert!(InferenceRequest::new("hello").validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_prompt() {
        let err = InferenceRequest::new("   ").validate().unwrap_err();
        assert_eq!(err.field, "prompt");
    }

    #[test]
    fn validate_allows_empty_prompt_with_template() {
        let request = InferenceRequest::new("").with_template("triage", HashMap::new());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validate_checks_numeric_ranges() {
        let cases = [
            (InferenceRequest::new("x").with_temperature(2.5), "temperature"),
            (InferenceRequest::new("x").with_temperature(-0.1), "temperature"),
            (InferenceRequest::new("x").with_max_tokens(0), "max_tokens"),
            (InferenceRequest::new("x").with_top_p(1.5), "top_p"),
            (InferenceRequest::new("x").with_top_k(0), "top_k"),
        ];
        for (request, field) in cases {
            assert_eq!(request.validate().unwrap_err().field, field);
        }
    }

    #[test]
    fn validate_accepts_boundaries() {
        let request = InferenceRequest::new("x")
            .with_temperature(2.0)
            .with_top_p(0.0)
            .with_top_k(1)
            .with_max_tokens(1);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_pinned_model() {
        let err = InferenceRequest::new("x")
            .with_model("gpt-4")
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "model");
    }

    #[test]
    fn model_id_keeps_tag_after_first_colon() {
        let id = ModelId::parse("ollama:llama3:8b").unwrap();
        assert_eq!(id.backend, "ollama");
        assert_eq!(id.model, "llama3:8b");
        assert_eq!(id.to_string(), "ollama:llama3:8b");
    }

    #[test]
    fn model_id_rejects_missing_parts() {
        assert!(ModelId::parse("openai:").is_none());
        assert!(ModelId::parse(":gpt-4").is_none());
        assert!(ModelId::parse("gpt-4").is_none());
    }

    #[test]
    fn token_usage_maps_absent_counts_to_zero() {
        let usage = TokenUsage::from_counts(None, Some(7), None);
        assert_eq!(usage, TokenUsage { input: 0, output: 7, total: 7 });
    }

    #[test]
    fn token_usage_keeps_upstream_total() {
        let usage = TokenUsage::from_counts(Some(3), Some(4), Some(10));
        assert_eq!(usage.total, 10);
    }

    #[test]
    fn token_usage_absorbs_split_stream_counters() {
        let mut usage = TokenUsage::default();
        usage.absorb(TokenUsage::new(25, 1));
        usage.absorb(TokenUsage::from_counts(None, Some(15), None));
        assert_eq!(usage, TokenUsage { input: 25, output: 15, total: 40 });
    }

    #[test]
    fn descriptor_cost_uses_both_rates() {
        let mut model = ModelDescriptor::new("openai", "gpt-4");
        model.cost_per_input_token = 0.00003;
        model.cost_per_output_token = 0.00006;
        let cost = model.cost_for(&TokenUsage::new(1000, 500));
        assert!((cost - 0.06).abs() < 1e-9);
        assert_eq!(model.key(), "openai:gpt-4");
    }

    #[test]
    fn response_survives_json_round_trip() {
        let response = InferenceResponse {
            text: "hi".to_string(),
            model: "gpt-4".to_string(),
            backend: "openai".to_string(),
            usage: TokenUsage::new(3, 1),
            finish_reason: "stop".to_string(),
            metadata: Some(HashMap::from([(
                "id".to_string(),
                serde_json::json!("cmpl-1"),
            )])),
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: InferenceResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
